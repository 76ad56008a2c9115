//! crudguard core - policy-constrained query and mutation rules
//!
//! This crate turns untrusted, JSON-encoded query descriptors and nested
//! mutation payloads into safe, allowlisted store operations:
//! - Join allowlist closure and nested inclusion trees
//! - Typed filter and sort trees with allowlist validation
//! - Pagination defaults and clamps
//! - Nested-payload diff into connect/create/disconnect instructions
//! - Field redaction for outbound records
//! - Trusted policy predicate injection
//!
//! Nothing here talks to a store; see `crudguard-engine` for the service.

pub mod config;
pub mod errors;
pub mod joins;
pub mod logging_facility;
pub mod mutation;
pub mod pagination;
pub mod policy;
pub mod query;
pub mod redact;
pub mod schema;

// Used by the logging macros
pub use crudguard_core_types as core_types;

// Re-export commonly used types
pub use config::{EntityConfig, EntityRules, ForbiddenPathSpec, PaginationSettings};
pub use errors::{CrudError, ExError, ExErrorKind, Result};
pub use joins::{AllowedJoinSet, IncludeTree};
pub use mutation::{MutationDiffer, WriteData};
pub use pagination::{Pagination, PaginationConfig};
pub use policy::{inject_predicate, AccessPolicy, MustMatchValue, ScopedQuery};
pub use query::{CrudQueryDescriptor, OrderBy, QueryInput, SelectSpec, WhereNode};
pub use redact::FieldPattern;
pub use schema::{DisconnectPolicy, EntitySchema, RelationSchema};
