use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::where_node::WhereNode;
use crate::errors::{CrudError, ExError, Result};
use crate::policy::ScopedQuery;

/// Client field selection; `only` wins when both lists are given
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub except: Option<Vec<String>>,
}

impl SelectSpec {
    pub fn only<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: Some(paths.into_iter().map(Into::into).collect()),
            except: None,
        }
    }

    pub fn except<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            only: None,
            except: Some(paths.into_iter().map(Into::into).collect()),
        }
    }
}

/// Untrusted per-request query descriptor
///
/// Every key is optional. `page`, `pageSize` and `orderBy` stay raw JSON here:
/// the paginator decides what counts as usable and falls back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrudQueryDescriptor {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joins: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<SelectSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<Value>,
}

fn malformed(reason: impl Into<String>) -> ExError {
    CrudError::MalformedDescriptor {
        reason: reason.into(),
    }
    .into()
}

impl CrudQueryDescriptor {
    /// Parse a JSON-encoded descriptor; a blank string is the default descriptor
    ///
    /// # Errors
    ///
    /// `MalformedDescriptor` for invalid JSON or a non-object root.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Interpret an already-structured descriptor; `null` is the default descriptor
    ///
    /// # Errors
    ///
    /// `MalformedDescriptor` when the value is not an object or a known key
    /// has the wrong type (e.g. `joins` is not a list of strings).
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(value).map_err(|e| malformed(e.to_string())),
            _ => Err(malformed("descriptor must be a JSON object")),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn with_where(mut self, filter: Value) -> Self {
        self.where_filter = Some(filter);
        self
    }

    pub fn with_joins<I, S>(mut self, joins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.joins = Some(joins.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_select(mut self, select: SelectSpec) -> Self {
        self.select = Some(select);
        self
    }
}

/// How a caller hands the descriptor to a service call
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryInput {
    /// No descriptor: every default applies
    #[default]
    Absent,
    /// JSON text straight from the request
    Raw(String),
    /// Descriptor already decoded by the transport
    Structured(Value),
    /// Client descriptor plus trusted policy predicates
    Scoped(ScopedQuery),
}

/// Descriptor ready for validation, with the trusted predicate kept apart
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedQuery {
    pub descriptor: CrudQueryDescriptor,
    /// Trusted predicates, oldest first
    pub trusted: Vec<WhereNode>,
}

impl QueryInput {
    /// Decode the client descriptor and extract any trusted predicate
    ///
    /// # Errors
    ///
    /// `MalformedDescriptor` when the client part cannot be decoded.
    pub fn resolve(&self) -> Result<ResolvedQuery> {
        match self {
            QueryInput::Absent => Ok(ResolvedQuery::default()),
            QueryInput::Raw(raw) => Ok(ResolvedQuery {
                descriptor: CrudQueryDescriptor::from_json_str(raw)?,
                trusted: Vec::new(),
            }),
            QueryInput::Structured(value) => Ok(ResolvedQuery {
                descriptor: CrudQueryDescriptor::from_value(value.clone())?,
                trusted: Vec::new(),
            }),
            QueryInput::Scoped(scoped) => Ok(ResolvedQuery {
                descriptor: scoped.client().clone(),
                trusted: scoped.policies().to_vec(),
            }),
        }
    }
}

impl From<&str> for QueryInput {
    fn from(raw: &str) -> Self {
        QueryInput::Raw(raw.to_string())
    }
}

impl From<String> for QueryInput {
    fn from(raw: String) -> Self {
        QueryInput::Raw(raw)
    }
}

impl From<Value> for QueryInput {
    fn from(value: Value) -> Self {
        QueryInput::Structured(value)
    }
}

impl From<CrudQueryDescriptor> for QueryInput {
    fn from(descriptor: CrudQueryDescriptor) -> Self {
        QueryInput::Structured(descriptor.to_value())
    }
}

impl From<ScopedQuery> for QueryInput {
    fn from(scoped: ScopedQuery) -> Self {
        QueryInput::Scoped(scoped)
    }
}
