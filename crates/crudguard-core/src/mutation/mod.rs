pub mod differ;
pub mod model;

pub use differ::MutationDiffer;
pub use model::{RelationOp, RelationWrite, ToManyWrite, ToOneWrite, WriteData};
