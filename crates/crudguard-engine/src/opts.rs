use std::fmt;
use std::sync::Arc;

use crudguard_core::query::QueryInput;
use crudguard_core_types::RequestContext;

use crate::client::PersistenceClient;

/// Per-call options
#[derive(Clone)]
pub struct CrudMethodOpts {
    /// Client descriptor, possibly scoped by a policy
    pub crud_query: QueryInput,
    /// Server-side switch; never derived from client input
    pub exclude_forbidden_paths: bool,
    /// Client bound to an externally managed transaction; every store call
    /// of the operation goes through it when present
    pub transaction: Option<Arc<dyn PersistenceClient>>,
    pub context: Option<RequestContext>,
}

impl Default for CrudMethodOpts {
    fn default() -> Self {
        Self {
            crud_query: QueryInput::Absent,
            exclude_forbidden_paths: true,
            transaction: None,
            context: None,
        }
    }
}

impl CrudMethodOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<QueryInput>) -> Self {
        self.crud_query = query.into();
        self
    }

    pub fn with_transaction(mut self, transaction: Arc<dyn PersistenceClient>) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Return forbidden fields too; for trusted internal callers only
    pub fn including_forbidden_paths(mut self) -> Self {
        self.exclude_forbidden_paths = false;
        self
    }

    pub fn request_id(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.request_id.as_str())
    }
}

impl fmt::Debug for CrudMethodOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudMethodOpts")
            .field("crud_query", &self.crud_query)
            .field("exclude_forbidden_paths", &self.exclude_forbidden_paths)
            .field("transaction", &self.transaction.is_some())
            .field("context", &self.context)
            .finish()
    }
}
