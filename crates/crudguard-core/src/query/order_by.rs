use serde_json::{Map, Value};
use std::fmt;

use crate::errors::{CrudError, ExError, Result};
use crate::joins::{join_path, AllowedJoinSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sort key: a field on the current entity, or a relation wrapping more keys
#[derive(Debug, Clone, PartialEq)]
pub enum OrderByNode {
    Field {
        field: String,
        direction: SortDirection,
    },
    Relation {
        name: String,
        nested: Vec<OrderByNode>,
    },
}

impl OrderByNode {
    fn to_entry(&self) -> (String, Value) {
        match self {
            OrderByNode::Field { field, direction } => {
                (field.clone(), Value::String(direction.as_str().to_string()))
            }
            OrderByNode::Relation { name, nested } => {
                let mut map = Map::new();
                for node in nested {
                    let (k, v) = node.to_entry();
                    map.insert(k, v);
                }
                (name.clone(), Value::Object(map))
            }
        }
    }
}

/// Validated sort list, in priority order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBy {
    entries: Vec<OrderByNode>,
}

impl OrderBy {
    /// Ascending on a single field, e.g. the default `[{id: "asc"}]`
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            entries: vec![OrderByNode::Field {
                field: field.into(),
                direction: SortDirection::Asc,
            }],
        }
    }

    pub fn entries(&self) -> &[OrderByNode] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a sort list and check every relation key against the allowlist
    ///
    /// Each list element is an object; every key maps either to a direction
    /// string (`"asc"` / `"desc"`) or to a nested object, which is a relation
    /// traversal at the extended path.
    ///
    /// # Errors
    ///
    /// - `MalformedOrderBy` when the list or an element has the wrong shape
    /// - `InvalidSortDirection` for any direction other than `asc` / `desc`
    /// - `RelationNotAllowed` for a relation outside the allowlist
    pub fn parse_validated(value: &Value, allowed: &AllowedJoinSet) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| malformed("<root>", "orderBy must be a list"))?;

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let obj = item
                .as_object()
                .ok_or_else(|| malformed("<root>", "orderBy entries must be objects"))?;
            entries.extend(parse_level(obj, allowed, "")?);
        }
        Ok(Self { entries })
    }

    /// Render as a list with one single-key object per sort key
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|node| {
                    let (k, v) = node.to_entry();
                    let mut map = Map::new();
                    map.insert(k, v);
                    Value::Object(map)
                })
                .collect(),
        )
    }
}

fn malformed(path: &str, reason: &str) -> ExError {
    CrudError::MalformedOrderBy {
        path: path.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn parse_level(
    obj: &Map<String, Value>,
    allowed: &AllowedJoinSet,
    current_path: &str,
) -> Result<Vec<OrderByNode>> {
    let mut nodes = Vec::with_capacity(obj.len());
    for (key, value) in obj {
        let path = join_path(current_path, key);
        let node = match value {
            Value::String(raw) => {
                let direction =
                    SortDirection::parse(raw).ok_or_else(|| CrudError::InvalidSortDirection {
                        path: path.clone(),
                        direction: raw.clone(),
                    })?;
                OrderByNode::Field {
                    field: key.clone(),
                    direction,
                }
            }
            Value::Object(nested) => {
                allowed.require_relation(&path)?;
                OrderByNode::Relation {
                    name: key.clone(),
                    nested: parse_level(nested, allowed, &path)?,
                }
            }
            _ => return Err(malformed(&path, "expected a direction or a relation object")),
        };
        nodes.push(node);
    }
    Ok(nodes)
}
