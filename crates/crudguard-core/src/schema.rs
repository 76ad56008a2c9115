//! Explicit per-entity schema
//!
//! The engine never introspects the store: every entity service is handed a
//! schema naming its id field, its scalar fields and its relations (with
//! cardinality, the related entity's id field and what disassociation means).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_ID_FIELD: &str = "id";

pub(crate) fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

/// What happens to a related record that is dropped from an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectPolicy {
    /// Remove the link only; the related record survives
    #[default]
    Unlink,
    /// Delete the related record
    Delete,
}

/// One relation of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RelationSchema {
    pub to_many: bool,
    /// Id field of the related entity (used to tell connect from create)
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default)]
    pub on_disconnect: DisconnectPolicy,
}

impl RelationSchema {
    pub fn to_one() -> Self {
        Self {
            to_many: false,
            id_field: default_id_field(),
            on_disconnect: DisconnectPolicy::Unlink,
        }
    }

    pub fn to_many() -> Self {
        Self {
            to_many: true,
            ..Self::to_one()
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_on_disconnect(mut self, policy: DisconnectPolicy) -> Self {
        self.on_disconnect = policy;
        self
    }
}

/// Shape of a root entity as far as the mutation layer is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub id_field: String,
    pub scalars: BTreeSet<String>,
    pub relations: BTreeMap<String, RelationSchema>,
}

impl EntitySchema {
    /// Create a schema with the given id field and nothing else
    ///
    /// ```
    /// use crudguard_core::schema::{EntitySchema, RelationSchema};
    ///
    /// let schema = EntitySchema::new("id")
    ///     .with_scalars(["email", "name"])
    ///     .with_relation("posts", RelationSchema::to_many())
    ///     .with_relation("country", RelationSchema::to_one());
    ///
    /// assert!(schema.relation("posts").unwrap().to_many);
    /// assert!(schema.is_scalar("email"));
    /// ```
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            scalars: BTreeSet::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn with_scalars<I, S>(mut self, scalars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scalars.extend(scalars.into_iter().map(Into::into));
        self
    }

    pub fn with_relation(mut self, name: impl Into<String>, relation: RelationSchema) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSchema> {
        self.relations.get(name)
    }

    pub fn is_scalar(&self, name: &str) -> bool {
        self.scalars.contains(name)
    }
}

impl Default for EntitySchema {
    fn default() -> Self {
        Self::new(DEFAULT_ID_FIELD)
    }
}
