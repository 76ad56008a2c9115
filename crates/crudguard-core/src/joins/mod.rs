//! Relation join allowlisting and inclusion trees.
//!
//! A join path is a dot-delimited chain of relation names starting at the root
//! entity (`posts.comments`). The allowlist is prefix-closed: permitting
//! `posts.comments` permits `posts` too.

pub mod allowlist;
pub mod include;

pub use allowlist::{join_path, validate_default_joins, AllowedJoinSet};
pub use include::IncludeTree;
