//! Persistence client interface
//!
//! The engine never executes queries itself. A store adapter implements
//! [`PersistenceClient`] and receives fully validated arguments: filters
//! already scoped by policy, inclusion trees already checked against the
//! allowlist, and write data already diffed.

use async_trait::async_trait;
use serde_json::Value;

use crudguard_core::joins::IncludeTree;
use crudguard_core::mutation::WriteData;
use crudguard_core::query::{OrderBy, WhereNode};
use crudguard_core::Result;

/// Arguments for `find_first` / `find_many`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindArgs {
    pub filter: WhereNode,
    pub include: IncludeTree,
    pub order_by: Option<OrderBy>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

/// Unique key of one record: the entity's own id field and its value
#[derive(Debug, Clone, PartialEq)]
pub struct RecordKey {
    pub field: String,
    pub value: Value,
}

impl RecordKey {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// Store operations consumed by the CRUD service
///
/// Errors of kind `NotFound` are surfaced to callers as not found; any
/// other error is reported as an opaque internal failure.
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    /// Insert a record and return it (at least its id field)
    async fn create(&self, model: &str, data: WriteData) -> Result<Value>;

    async fn find_first(&self, model: &str, args: FindArgs) -> Result<Option<Value>>;

    async fn find_many(&self, model: &str, args: FindArgs) -> Result<Vec<Value>>;

    /// Number of records matching `filter`
    async fn count(&self, model: &str, filter: &WhereNode) -> Result<u64>;

    async fn update(&self, model: &str, key: &RecordKey, data: WriteData) -> Result<Value>;

    async fn delete(&self, model: &str, key: &RecordKey) -> Result<()>;
}
