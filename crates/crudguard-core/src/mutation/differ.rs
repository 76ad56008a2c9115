//! Nested-payload diff
//!
//! Translates an incoming create/update payload, plus the currently persisted
//! state on update, into scalar writes and one instruction per relation field
//! present in the payload. Only one level of relations is diffed: relation
//! values inside a connect/create entry are dropped, after an allowlist check.

use serde_json::{Map, Value};

use super::model::{RelationOp, RelationWrite, ToManyWrite, ToOneWrite, WriteData};
use crate::errors::{CrudError, ExError, Result};
use crate::joins::{join_path, AllowedJoinSet};
use crate::query::where_node::is_relation_shaped;
use crate::schema::{DisconnectPolicy, EntitySchema, RelationSchema};

pub struct MutationDiffer<'a> {
    schema: &'a EntitySchema,
    allowed: &'a AllowedJoinSet,
}

fn malformed(path: &str, reason: &str) -> ExError {
    CrudError::MalformedPayload {
        path: path.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Related id carried by an entry, if any (`null` counts as absent)
fn entry_id<'v>(entry: &'v Map<String, Value>, id_field: &str) -> Option<&'v Value> {
    entry.get(id_field).filter(|id| !id.is_null())
}

impl<'a> MutationDiffer<'a> {
    pub fn new(schema: &'a EntitySchema, allowed: &'a AllowedJoinSet) -> Self {
        Self { schema, allowed }
    }

    /// Diff `incoming` against `existing` (`None` on create)
    ///
    /// The entity's own id field is always stripped; updates are keyed by
    /// the persisted record, never by the payload.
    ///
    /// # Errors
    ///
    /// - `MalformedPayload` when the payload or a relation value has the wrong shape
    /// - `NullToManyRelation` for `null` on a to-many relation
    /// - `RelationNotAllowed` for a relation outside the schema or the allowlist
    /// - `UnknownField` for a scalar key the schema does not declare
    pub fn diff(&self, incoming: &Value, existing: Option<&Value>) -> Result<WriteData> {
        let payload = incoming
            .as_object()
            .ok_or_else(|| malformed("<root>", "payload must be a JSON object"))?;

        let mut out = WriteData::default();
        for (key, value) in payload {
            if *key == self.schema.id_field {
                tracing::debug!(field = %key, "own id stripped from payload");
                continue;
            }

            if self.schema.is_scalar(key) {
                out.scalars.insert(key.clone(), value.clone());
                continue;
            }

            let Some(relation) = self.schema.relation(key) else {
                if is_relation_shaped(value) {
                    return Err(CrudError::RelationNotAllowed { path: key.clone() }.into());
                }
                return Err(CrudError::UnknownField { field: key.clone() }.into());
            };
            self.allowed.require_relation(key)?;

            let current = existing.and_then(|e| e.get(key));
            let op = if relation.to_many {
                RelationOp::ToMany(self.diff_to_many(key, relation, value, current)?)
            } else {
                match self.diff_to_one(key, relation, value, existing.is_some(), current)? {
                    Some(write) => RelationOp::ToOne(write),
                    None => continue,
                }
            };
            out.relations.insert(
                key.clone(),
                RelationWrite {
                    id_field: relation.id_field.clone(),
                    op,
                },
            );
        }
        Ok(out)
    }

    fn diff_to_one(
        &self,
        name: &str,
        relation: &RelationSchema,
        value: &Value,
        is_update: bool,
        current: Option<&Value>,
    ) -> Result<Option<ToOneWrite>> {
        match value {
            Value::Null => {
                // Nothing to let go of on create, or when the link is known to be empty
                if !is_update || matches!(current, Some(Value::Null)) {
                    return Ok(None);
                }
                Ok(Some(match relation.on_disconnect {
                    DisconnectPolicy::Unlink => ToOneWrite::Disconnect,
                    DisconnectPolicy::Delete => ToOneWrite::Delete,
                }))
            }
            Value::Object(entry) => Ok(Some(match entry_id(entry, &relation.id_field) {
                Some(id) => {
                    self.note_ignored_siblings(name, entry, &relation.id_field);
                    ToOneWrite::Connect { id: id.clone() }
                }
                None => ToOneWrite::Create {
                    data: self.sanitize_entry(name, entry, &relation.id_field)?,
                },
            })),
            _ => Err(malformed(name, "to-one relation expects an object or null")),
        }
    }

    fn diff_to_many(
        &self,
        name: &str,
        relation: &RelationSchema,
        value: &Value,
        current: Option<&Value>,
    ) -> Result<ToManyWrite> {
        let entries: Vec<&Value> = match value {
            Value::Null => {
                return Err(CrudError::NullToManyRelation {
                    relation: name.to_string(),
                }
                .into())
            }
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![value],
            _ => return Err(malformed(name, "to-many relation expects a list of objects")),
        };

        let mut write = ToManyWrite::default();
        for entry in entries {
            let entry = entry
                .as_object()
                .ok_or_else(|| malformed(name, "to-many entries must be objects"))?;
            match entry_id(entry, &relation.id_field) {
                Some(id) => {
                    self.note_ignored_siblings(name, entry, &relation.id_field);
                    if !write.connect.contains(id) {
                        write.connect.push(id.clone());
                    }
                }
                None => write
                    .create
                    .push(self.sanitize_entry(name, entry, &relation.id_field)?),
            }
        }

        // Replace-set: previous members missing from the new list are let go
        let previous = current
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|member| member.get(&relation.id_field))
            .filter(|id| !id.is_null());
        for id in previous {
            if write.connect.contains(id) {
                continue;
            }
            let bucket = match relation.on_disconnect {
                DisconnectPolicy::Unlink => &mut write.disconnect,
                DisconnectPolicy::Delete => &mut write.delete,
            };
            if !bucket.contains(id) {
                bucket.push(id.clone());
            }
        }
        Ok(write)
    }

    /// Keep the entry's own fields, dropping its relations and a null id
    ///
    /// Relation-shaped values must still lie inside the allowlist; the first
    /// one that does not fails the whole payload.
    fn sanitize_entry(
        &self,
        relation: &str,
        entry: &Map<String, Value>,
        id_field: &str,
    ) -> Result<Map<String, Value>> {
        let mut data = Map::new();
        for (key, value) in entry {
            if key == id_field {
                continue;
            }
            if is_relation_shaped(value) {
                self.allowed.require_relation(&join_path(relation, key))?;
                tracing::debug!(relation = %relation, field = %key, "nested relation dropped");
                continue;
            }
            data.insert(key.clone(), value.clone());
        }
        Ok(data)
    }

    fn note_ignored_siblings(&self, relation: &str, entry: &Map<String, Value>, id_field: &str) {
        let ignored = entry.keys().filter(|k| k.as_str() != id_field).count();
        if ignored > 0 {
            tracing::debug!(
                relation = %relation,
                ignored_fields = ignored,
                "connect entry carries extra fields; ignored"
            );
        }
    }
}
