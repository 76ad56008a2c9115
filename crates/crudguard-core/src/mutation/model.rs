use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Write instruction for a to-one relation
#[derive(Debug, Clone, PartialEq)]
pub enum ToOneWrite {
    Connect { id: Value },
    Create { data: Map<String, Value> },
    Disconnect,
    Delete,
}

/// Write instructions for a to-many relation
///
/// Together `connect` and `create` describe the complete new association
/// set; `disconnect` / `delete` name previous members that are not in it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToManyWrite {
    pub connect: Vec<Value>,
    pub create: Vec<Map<String, Value>>,
    pub disconnect: Vec<Value>,
    pub delete: Vec<Value>,
}

impl ToManyWrite {
    pub fn is_empty(&self) -> bool {
        self.connect.is_empty()
            && self.create.is_empty()
            && self.disconnect.is_empty()
            && self.delete.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelationOp {
    ToOne(ToOneWrite),
    ToMany(ToManyWrite),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationWrite {
    /// Id field of the related entity, used when rendering keys
    pub id_field: String,
    pub op: RelationOp,
}

impl RelationWrite {
    pub fn to_value(&self) -> Value {
        let key = |id: &Value| {
            let mut map = Map::new();
            map.insert(self.id_field.clone(), id.clone());
            Value::Object(map)
        };
        match &self.op {
            RelationOp::ToOne(ToOneWrite::Connect { id }) => json!({ "connect": key(id) }),
            RelationOp::ToOne(ToOneWrite::Create { data }) => json!({ "create": data }),
            RelationOp::ToOne(ToOneWrite::Disconnect) => json!({ "disconnect": true }),
            RelationOp::ToOne(ToOneWrite::Delete) => json!({ "delete": true }),
            RelationOp::ToMany(write) => {
                let mut map = Map::new();
                let keyed = |ids: &[Value]| Value::Array(ids.iter().map(key).collect());
                if !write.connect.is_empty() {
                    map.insert("connect".to_string(), keyed(&write.connect));
                }
                if !write.create.is_empty() {
                    map.insert(
                        "create".to_string(),
                        Value::Array(write.create.iter().cloned().map(Value::Object).collect()),
                    );
                }
                if !write.disconnect.is_empty() {
                    map.insert("disconnect".to_string(), keyed(&write.disconnect));
                }
                if !write.delete.is_empty() {
                    map.insert("delete".to_string(), keyed(&write.delete));
                }
                Value::Object(map)
            }
        }
    }
}

/// Sanitized payload for one create or update of a root entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteData {
    pub scalars: Map<String, Value>,
    pub relations: BTreeMap<String, RelationWrite>,
}

impl WriteData {
    pub fn relation(&self, name: &str) -> Option<&RelationWrite> {
        self.relations.get(name)
    }

    /// Render in the ORM's nested-write shape
    pub fn to_value(&self) -> Value {
        let mut map = self.scalars.clone();
        for (name, write) in &self.relations {
            map.insert(name.clone(), write.to_value());
        }
        Value::Object(map)
    }
}
