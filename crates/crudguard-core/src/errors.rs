use crudguard_core_types::{RequestId, TraceId};
use thiserror::Error;

/// Result type alias using the canonical `ExError`
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure a CRUD operation can produce collapses into one of these
/// kinds. Each kind maps to a stable error code that transports can use to
/// pick a response status without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    /// Server configuration is unusable (raised at construction or injection time)
    Configuration,
    /// Untrusted input is structurally malformed
    Validation,
    /// Untrusted input reaches outside the join allowlist
    Forbidden,
    /// No visible record for the given id and filter
    NotFound,

    // Integration/IO
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::Validation => "ERR_VALIDATION",
            ExErrorKind::Forbidden => "ERR_FORBIDDEN",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether the failure was caused by the client's request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExErrorKind::Validation | ExErrorKind::Forbidden | ExErrorKind::NotFound
        )
    }
}

/// Canonical structured error type
///
/// Carries a kind for programmatic handling plus optional context. The
/// context never includes record data: `path` names a join or field path,
/// `model` names the entity the operation ran against.
#[derive(Debug, Clone, PartialEq)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    model: Option<String>,
    path: Option<String>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            model: None,
            path: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add model (entity) context
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add the offending join or field path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add trace ID context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Fill in operation and model context without overwriting what is already set
    pub fn in_context(mut self, op: &str, model: &str) -> Self {
        if self.op.is_none() {
            self.op = Some(op.to_string());
        }
        if self.model.is_none() {
            self.model = Some(model.to_string());
        }
        self
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(model) = &self.model {
            write!(f, " (model: {})", model)?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Domain failures raised by the query and mutation layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CrudError {
    // ===== Configuration =====
    /// A configured default join is not covered by the allowlist
    #[error("defaultJoins contains a path that is not present in allowedJoins: {path}")]
    DefaultJoinNotAllowed { path: String },

    /// A policy predicate is empty or falsy
    #[error("policy predicate may not be empty or falsy")]
    EmptyPolicyPredicate,

    /// Pagination settings are inconsistent
    #[error("invalid pagination config: {reason}")]
    InvalidPaginationConfig { reason: String },

    /// A forbidden path pattern failed to compile
    #[error("invalid forbidden path pattern {pattern}: {reason}")]
    InvalidForbiddenPattern { pattern: String, reason: String },

    /// Configuration source could not be parsed
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ===== Forbidden =====
    /// Join path outside the allowlist
    #[error("Join relation not allowed: {path}")]
    JoinNotAllowed { path: String },

    /// Filter or sort traverses a relation outside the allowlist
    #[error("Relation path not allowed: {path}")]
    RelationNotAllowed { path: String },

    // ===== Validation =====
    /// Query descriptor is not valid JSON or not a JSON object
    #[error("malformed query descriptor: {reason}")]
    MalformedDescriptor { reason: String },

    /// Filter tree has an unusable shape
    #[error("malformed where at {path}: {reason}")]
    MalformedWhere { path: String, reason: String },

    /// Sort descriptor has an unusable shape
    #[error("malformed orderBy at {path}: {reason}")]
    MalformedOrderBy { path: String, reason: String },

    /// Sort direction is neither `asc` nor `desc`
    #[error("invalid sort direction for {path}: {direction}")]
    InvalidSortDirection { path: String, direction: String },

    /// Mutation payload has an unusable shape
    #[error("malformed payload at {path}: {reason}")]
    MalformedPayload { path: String, reason: String },

    /// `null` supplied for a to-many relation
    #[error("to-many relation {relation} cannot be set to null")]
    NullToManyRelation { relation: String },

    /// Scalar field not declared in the entity schema
    #[error("unknown field: {field}")]
    UnknownField { field: String },

    // ===== Lookup =====
    /// No visible record
    #[error("record not found")]
    RecordNotFound,

    // ===== Generic =====
    /// Serialization error (JSON encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CrudError {
    pub fn kind(&self) -> ExErrorKind {
        match self {
            CrudError::DefaultJoinNotAllowed { .. }
            | CrudError::EmptyPolicyPredicate
            | CrudError::InvalidPaginationConfig { .. }
            | CrudError::InvalidForbiddenPattern { .. }
            | CrudError::InvalidConfig { .. } => ExErrorKind::Configuration,
            CrudError::JoinNotAllowed { .. } | CrudError::RelationNotAllowed { .. } => {
                ExErrorKind::Forbidden
            }
            CrudError::MalformedDescriptor { .. }
            | CrudError::MalformedWhere { .. }
            | CrudError::MalformedOrderBy { .. }
            | CrudError::InvalidSortDirection { .. }
            | CrudError::MalformedPayload { .. }
            | CrudError::NullToManyRelation { .. }
            | CrudError::UnknownField { .. } => ExErrorKind::Validation,
            CrudError::RecordNotFound => ExErrorKind::NotFound,
            CrudError::Serialization { .. } => ExErrorKind::Serialization,
            CrudError::Internal { .. } => ExErrorKind::Internal,
        }
    }

    fn path(&self) -> Option<&str> {
        match self {
            CrudError::DefaultJoinNotAllowed { path }
            | CrudError::JoinNotAllowed { path }
            | CrudError::RelationNotAllowed { path }
            | CrudError::MalformedWhere { path, .. }
            | CrudError::MalformedOrderBy { path, .. }
            | CrudError::InvalidSortDirection { path, .. }
            | CrudError::MalformedPayload { path, .. } => Some(path),
            CrudError::NullToManyRelation { relation } => Some(relation),
            CrudError::UnknownField { field } => Some(field),
            _ => None,
        }
    }
}

/// Conversion from CrudError to ExError
///
/// Keeps the human-readable message and lifts the offending path into
/// structured context.
impl From<CrudError> for ExError {
    fn from(err: CrudError) -> Self {
        let mut ex = ExError::new(err.kind()).with_message(err.to_string());
        if let Some(path) = err.path() {
            ex = ex.with_path(path);
        }
        ex
    }
}

impl From<serde_json::Error> for ExError {
    fn from(err: serde_json::Error) -> Self {
        CrudError::Serialization {
            message: err.to_string(),
        }
        .into()
    }
}
