//! Access policy injection
//!
//! A policy produces a server-authored predicate that is ANDed into the
//! client's filter. The predicate is trusted: it is kept apart from the
//! client descriptor and is not checked against the join allowlist, so a
//! policy may filter through relations clients cannot touch.

use serde_json::{json, Map, Value};

use crate::errors::{CrudError, Result};
use crate::query::{CrudQueryDescriptor, QueryInput, WhereNode};

/// Source of a trusted filter predicate for the current request
///
/// Deciding *what* the predicate should be is application logic; the
/// engine only injects it.
pub trait AccessPolicy: Send + Sync {
    /// # Errors
    ///
    /// Configuration errors when the policy cannot build a usable predicate.
    fn predicate(&self) -> Result<Value>;

    /// Scope a request's query with this policy's predicate
    fn scope(&self, input: QueryInput) -> Result<ScopedQuery> {
        inject_predicate(input, self.predicate()?)
    }
}

/// Only records whose attribute at `attribute_path` equals `target` are visible
///
/// # Example
/// ```
/// use crudguard_core::policy::{AccessPolicy, MustMatchValue};
/// use serde_json::json;
///
/// let policy = MustMatchValue::new("author.tenantId", json!(7));
/// assert_eq!(policy.predicate().unwrap(), json!({"author": {"tenantId": 7}}));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MustMatchValue {
    attribute_path: String,
    target: Value,
}

impl MustMatchValue {
    pub fn new(attribute_path: impl Into<String>, target: Value) -> Self {
        Self {
            attribute_path: attribute_path.into(),
            target,
        }
    }
}

impl AccessPolicy for MustMatchValue {
    fn predicate(&self) -> Result<Value> {
        // A falsy target would let the filter match nothing or be ignored
        if is_falsy(&self.target) {
            return Err(CrudError::EmptyPolicyPredicate.into());
        }
        where_from_path(&self.attribute_path, self.target.clone())
    }
}

/// `null`, `false`, `0`, `""`
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Build the nested predicate `{a: {b: value}}` from the dotted path `a.b`
///
/// # Errors
///
/// `InvalidConfig` for an empty path.
pub fn where_from_path(attribute_path: &str, value: Value) -> Result<Value> {
    let segments: Vec<&str> = attribute_path.split('.').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(CrudError::InvalidConfig {
            reason: "policy attribute path is empty".to_string(),
        }
        .into());
    }
    Ok(segments.iter().rev().fold(value, |inner, segment| {
        let mut map = Map::new();
        map.insert((*segment).to_string(), inner);
        Value::Object(map)
    }))
}

/// Client descriptor plus the trusted predicates injected into it, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedQuery {
    policies: Vec<WhereNode>,
    client: CrudQueryDescriptor,
}

impl ScopedQuery {
    pub fn client(&self) -> &CrudQueryDescriptor {
        &self.client
    }

    pub fn policies(&self) -> &[WhereNode] {
        &self.policies
    }

    /// The descriptor as the request boundary would forward it:
    /// `{where: {AND: [policy, clientWhere]}}`, nested once per policy
    ///
    /// # Errors
    ///
    /// `Serialization` if the descriptor cannot be encoded.
    pub fn to_descriptor_string(&self) -> Result<String> {
        let mut filter = self
            .client
            .where_filter
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        for policy in &self.policies {
            filter = json!({ "AND": [policy.to_value(), filter] });
        }
        let descriptor = self.client.clone().with_where(filter);
        Ok(serde_json::to_string(&descriptor)?)
    }
}

/// Wrap a validated client filter in the trusted predicates
///
/// Produces `{AND: [p_n, ... {AND: [p_1, client]}]}`; with no policies the
/// client filter is returned as is.
pub fn scope_where(policies: &[WhereNode], client: WhereNode) -> WhereNode {
    policies
        .iter()
        .fold(client, |inner, policy| WhereNode::all(vec![policy.clone(), inner]))
}

/// AND a trusted predicate into a request's query
///
/// Runs before any allowlist validation. Injecting into an already scoped
/// query stacks the new predicate on top.
///
/// # Errors
///
/// - `EmptyPolicyPredicate` for `null`, `false`, `0`, `""`, `{}` or `[]`
/// - `InvalidConfig` for any other non-object or unparseable predicate
/// - `MalformedDescriptor` when the client descriptor cannot be decoded
pub fn inject_predicate(input: QueryInput, predicate: Value) -> Result<ScopedQuery> {
    let empty_container = match &predicate {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if is_falsy(&predicate) || empty_container {
        return Err(CrudError::EmptyPolicyPredicate.into());
    }
    if !predicate.is_object() {
        return Err(CrudError::InvalidConfig {
            reason: "policy predicate must be a JSON object".to_string(),
        }
        .into());
    }
    let node = WhereNode::parse(&predicate).map_err(|e| CrudError::InvalidConfig {
        reason: format!("policy predicate: {}", e.message()),
    })?;

    let mut scoped = match input {
        QueryInput::Scoped(scoped) => scoped,
        other => ScopedQuery {
            policies: Vec::new(),
            client: other.resolve()?.descriptor,
        },
    };
    scoped.policies.push(node);
    Ok(scoped)
}
