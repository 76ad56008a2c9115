//! Typed filter tree.
//!
//! An untrusted JSON `where` object is parsed into a [`WhereNode`], then
//! checked against the join allowlist. Classification is by shape:
//!
//! - `AND` / `OR` / `NOT` keys are combinators over one node or a list of nodes
//! - an object whose keys are all known operator tokens is a leaf predicate
//! - an object whose keys are all relation qualifiers (`some`, `every`, ...)
//!   is a relation traversal
//! - any other object is a relation traversal too (the to-one shorthand
//!   `{author: {name: "x"}}`), so an unknown key holding an object is always
//!   checked against the allowlist
//! - scalars, `null` and lists of scalars are leaf predicates
//! - a list holding an object is a relation attempt: its path is checked
//!   against the allowlist and then rejected as malformed
//!
//! Leaf content is otherwise never inspected.

use serde_json::{Map, Value};

use crate::errors::{CrudError, Result};
use crate::joins::{join_path, AllowedJoinSet};

/// Scalar filter operator tokens recognised as leaf predicates
pub const OPERATOR_TOKENS: &[&str] = &[
    "equals",
    "not",
    "in",
    "notIn",
    "lt",
    "lte",
    "gt",
    "gte",
    "contains",
    "startsWith",
    "endsWith",
    "mode",
    "search",
    "has",
    "hasEvery",
    "hasSome",
    "isEmpty",
    "isSet",
    "path",
    "string_contains",
    "string_starts_with",
    "string_ends_with",
    "array_contains",
    "array_starts_with",
    "array_ends_with",
];

pub fn is_operator_token(key: &str) -> bool {
    OPERATOR_TOKENS.contains(&key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
    Not,
}

impl Combinator {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "AND" => Some(Combinator::And),
            "OR" => Some(Combinator::Or),
            "NOT" => Some(Combinator::Not),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
            Combinator::Not => "NOT",
        }
    }
}

/// Quantifier over a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Some,
    Every,
    None,
    Is,
    IsNot,
}

impl Qualifier {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "some" => Some(Qualifier::Some),
            "every" => Some(Qualifier::Every),
            "none" => Some(Qualifier::None),
            "is" => Some(Qualifier::Is),
            "isNot" => Some(Qualifier::IsNot),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Qualifier::Some => "some",
            Qualifier::Every => "every",
            Qualifier::None => "none",
            Qualifier::Is => "is",
            Qualifier::IsNot => "isNot",
        }
    }

    /// `is` / `isNot` accept `null` ("has no related record")
    fn accepts_null(&self) -> bool {
        matches!(self, Qualifier::Is | Qualifier::IsNot)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationFilter {
    /// `{rel: {field: ...}}` without a qualifier
    Direct(Box<WhereNode>),
    /// `{rel: {some: {...}, every: {...}}}`; `None` body is `null`
    Qualified(Vec<(Qualifier, Option<WhereNode>)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    Combinator {
        kind: Combinator,
        operands: Vec<WhereNode>,
        /// Whether operands were supplied as a list rather than a single object
        list_form: bool,
    },
    Relation {
        name: String,
        filter: RelationFilter,
    },
    Leaf {
        field: String,
        condition: Value,
    },
}

/// One filter object: the implicit conjunction of its clauses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereNode {
    clauses: Vec<WhereClause>,
}

impl WhereNode {
    /// The empty filter (matches everything)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[WhereClause] {
        &self.clauses
    }

    /// `{AND: [nodes...]}`
    pub fn all(nodes: Vec<WhereNode>) -> Self {
        Self {
            clauses: vec![WhereClause::Combinator {
                kind: Combinator::And,
                operands: nodes,
                list_form: true,
            }],
        }
    }

    /// `{field: value}`
    pub fn field_equals(field: impl Into<String>, value: Value) -> Self {
        Self {
            clauses: vec![WhereClause::Leaf {
                field: field.into(),
                condition: value,
            }],
        }
    }

    /// Parse an untrusted JSON filter without checking the allowlist
    ///
    /// # Errors
    ///
    /// `MalformedWhere` when the value is not an object or a combinator
    /// operand is not an object.
    pub fn parse(value: &Value) -> Result<Self> {
        parse_node(value, "")
    }

    /// Render back to JSON; `parse(v)?.to_value() == v` for accepted input
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for clause in &self.clauses {
            let (key, value) = match clause {
                WhereClause::Combinator {
                    kind,
                    operands,
                    list_form,
                } => {
                    let rendered = if *list_form || operands.len() != 1 {
                        Value::Array(operands.iter().map(WhereNode::to_value).collect())
                    } else {
                        operands[0].to_value()
                    };
                    (kind.key().to_string(), rendered)
                }
                WhereClause::Relation { name, filter } => {
                    let rendered = match filter {
                        RelationFilter::Direct(body) => body.to_value(),
                        RelationFilter::Qualified(parts) => {
                            let mut q = Map::new();
                            for (qualifier, body) in parts {
                                q.insert(
                                    qualifier.key().to_string(),
                                    body.as_ref().map(WhereNode::to_value).unwrap_or(Value::Null),
                                );
                            }
                            Value::Object(q)
                        }
                    };
                    (name.clone(), rendered)
                }
                WhereClause::Leaf { field, condition } => (field.clone(), condition.clone()),
            };
            map.insert(key, value);
        }
        Value::Object(map)
    }
}

/// An object, or a list holding at least one object
pub fn is_relation_shaped(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(Value::is_object),
        _ => false,
    }
}

fn malformed(path: &str, reason: impl Into<String>) -> crate::errors::ExError {
    CrudError::MalformedWhere {
        path: if path.is_empty() {
            "<root>".to_string()
        } else {
            path.to_string()
        },
        reason: reason.into(),
    }
    .into()
}

fn parse_node(value: &Value, path: &str) -> Result<WhereNode> {
    let obj = value
        .as_object()
        .ok_or_else(|| malformed(path, "filter must be a JSON object"))?;

    let mut clauses = Vec::with_capacity(obj.len());
    for (key, child) in obj {
        let clause = if let Some(kind) = Combinator::from_key(key) {
            parse_combinator(kind, child, path)?
        } else {
            parse_keyed(key, child, path)?
        };
        clauses.push(clause);
    }
    Ok(WhereNode { clauses })
}

fn parse_combinator(kind: Combinator, value: &Value, path: &str) -> Result<WhereClause> {
    let (operands, list_form) = match value {
        Value::Array(items) => (
            items
                .iter()
                .map(|item| parse_node(item, path))
                .collect::<Result<Vec<_>>>()?,
            true,
        ),
        Value::Object(_) => (vec![parse_node(value, path)?], false),
        _ => {
            return Err(malformed(
                path,
                format!("{} expects an object or a list of objects", kind.key()),
            ))
        }
    };
    Ok(WhereClause::Combinator {
        kind,
        operands,
        list_form,
    })
}

fn parse_keyed(key: &str, value: &Value, path: &str) -> Result<WhereClause> {
    let Value::Object(map) = value else {
        return Ok(WhereClause::Leaf {
            field: key.to_string(),
            condition: value.clone(),
        });
    };

    if !map.is_empty() && map.keys().all(|k| is_operator_token(k)) {
        return Ok(WhereClause::Leaf {
            field: key.to_string(),
            condition: value.clone(),
        });
    }

    let nested = join_path(path, key);
    if !map.is_empty() && map.keys().all(|k| Qualifier::from_key(k).is_some()) {
        let mut parts = Vec::with_capacity(map.len());
        for (qkey, body) in map {
            let Some(qualifier) = Qualifier::from_key(qkey) else {
                continue;
            };
            let body = match body {
                Value::Null if qualifier.accepts_null() => None,
                Value::Object(_) => Some(parse_node(body, &nested)?),
                _ => {
                    return Err(malformed(
                        &nested,
                        format!("`{}` expects a filter object", qkey),
                    ))
                }
            };
            parts.push((qualifier, body));
        }
        return Ok(WhereClause::Relation {
            name: key.to_string(),
            filter: RelationFilter::Qualified(parts),
        });
    }

    Ok(WhereClause::Relation {
        name: key.to_string(),
        filter: RelationFilter::Direct(Box::new(parse_node(value, &nested)?)),
    })
}

/// Check every relation traversal in `node` against the allowlist
///
/// Combinators recurse at the same path; relation keys extend `current_path`
/// by one segment, which must be allowed before the body is visited.
///
/// # Errors
///
/// `RelationNotAllowed` naming the first traversal outside the allowlist.
pub fn validate_where(node: &WhereNode, allowed: &AllowedJoinSet, current_path: &str) -> Result<()> {
    for clause in &node.clauses {
        match clause {
            WhereClause::Combinator { operands, .. } => {
                for operand in operands {
                    validate_where(operand, allowed, current_path)?;
                }
            }
            WhereClause::Relation { name, filter } => {
                let extended = join_path(current_path, name);
                allowed.require_relation(&extended)?;
                match filter {
                    RelationFilter::Direct(body) => validate_where(body, allowed, &extended)?,
                    RelationFilter::Qualified(parts) => {
                        for body in parts.iter().filter_map(|(_, body)| body.as_ref()) {
                            validate_where(body, allowed, &extended)?;
                        }
                    }
                }
            }
            WhereClause::Leaf { field, condition } => {
                if condition.is_array() && is_relation_shaped(condition) {
                    let extended = join_path(current_path, field);
                    allowed.require_relation(&extended)?;
                    return Err(malformed(&extended, "relation filter must be an object"));
                }
            }
        }
    }
    Ok(())
}

/// Parse and validate an untrusted filter in one step
///
/// # Errors
///
/// `MalformedWhere` (validation) or `RelationNotAllowed` (forbidden).
pub fn parse_validated_where(value: &Value, allowed: &AllowedJoinSet) -> Result<WhereNode> {
    let node = WhereNode::parse(value)?;
    validate_where(&node, allowed, "")?;
    Ok(node)
}
