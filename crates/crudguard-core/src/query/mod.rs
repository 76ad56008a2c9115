//! Untrusted query descriptor and the typed trees it is validated into

pub mod descriptor;
pub mod order_by;
pub mod where_node;

pub use descriptor::{CrudQueryDescriptor, QueryInput, ResolvedQuery, SelectSpec};
pub use order_by::{OrderBy, OrderByNode, SortDirection};
pub use where_node::{
    parse_validated_where, validate_where, Combinator, Qualifier, RelationFilter, WhereClause,
    WhereNode,
};
