//! crudguard engine - CRUD orchestration over a persistence client
//!
//! Coordinates the core rules (allowlist, validators, paginator, differ,
//! redactor, policy scoping) with an external store adapter.

pub mod client;
pub mod opts;
pub mod plan;
pub mod response;
pub mod service;

pub use client::{FindArgs, PersistenceClient, RecordKey};
pub use opts::CrudMethodOpts;
pub use plan::QueryPlan;
pub use response::FindManyResponse;
pub use service::CrudService;
