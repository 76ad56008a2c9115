//! Per-entity configuration
//!
//! [`EntityConfig`] is the serialisable form (TOML or JSON, camelCase keys).
//! [`EntityRules`] is the compiled, validated form a service holds for its
//! lifetime: allowlist closure, default inclusion tree, forbidden patterns
//! and pagination settings are all computed once here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::{CrudError, Result};
use crate::joins::{validate_default_joins, AllowedJoinSet, IncludeTree};
use crate::pagination::{PaginationConfig, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::query::OrderBy;
use crate::redact::FieldPattern;
use crate::schema::{default_id_field, EntitySchema, RelationSchema};

/// A forbidden field: a dotted path, or `{ regex = "..." }`
///
/// Regexes are unanchored and tested against the full dotted path, so
/// `{ regex = "password" }` also removes `passwordHint`. Anchor to match one
/// field name at any depth: `{ regex = '(^|\.)password$' }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForbiddenPathSpec {
    Path(String),
    Regex { regex: String },
}

impl ForbiddenPathSpec {
    fn compile(&self) -> Result<FieldPattern> {
        match self {
            ForbiddenPathSpec::Path(path) => Ok(FieldPattern::path(path)),
            ForbiddenPathSpec::Regex { regex } => FieldPattern::regex(regex),
        }
    }
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn max_page_size() -> u64 {
    MAX_PAGE_SIZE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaginationSettings {
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    #[serde(default = "max_page_size")]
    pub max_page_size: u64,
    /// Falls back to ascending by the id field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_order_by: Option<Value>,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            default_order_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityConfig {
    pub model: String,
    #[serde(default = "default_id_field")]
    pub id_field_name: String,
    #[serde(default)]
    pub allowed_joins: Vec<String>,
    /// Absent means "everything the allowlist permits"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_joins: Option<Vec<String>>,
    #[serde(default)]
    pub forbidden_paths: Vec<ForbiddenPathSpec>,
    #[serde(default)]
    pub pagination_config: PaginationSettings,
    #[serde(default)]
    pub scalars: Vec<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationSchema>,
}

impl EntityConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id_field_name: default_id_field(),
            allowed_joins: Vec::new(),
            default_joins: None,
            forbidden_paths: Vec::new(),
            pagination_config: PaginationSettings::default(),
            scalars: Vec::new(),
            relations: BTreeMap::new(),
        }
    }

    /// # Errors
    ///
    /// `InvalidConfig` when the text is not valid TOML for this shape.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            CrudError::InvalidConfig {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// # Errors
    ///
    /// `InvalidConfig` when the text is not valid JSON for this shape.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            CrudError::InvalidConfig {
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field_name = id_field.into();
        self
    }

    pub fn with_allowed_joins<I, S>(mut self, joins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_joins = joins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_joins<I, S>(mut self, joins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_joins = Some(joins.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_forbidden_path(mut self, path: impl Into<String>) -> Self {
        self.forbidden_paths.push(ForbiddenPathSpec::Path(path.into()));
        self
    }

    pub fn with_forbidden_regex(mut self, regex: impl Into<String>) -> Self {
        self.forbidden_paths.push(ForbiddenPathSpec::Regex {
            regex: regex.into(),
        });
        self
    }

    pub fn with_pagination(mut self, settings: PaginationSettings) -> Self {
        self.pagination_config = settings;
        self
    }

    pub fn with_scalars<I, S>(mut self, scalars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scalars = scalars.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relation(mut self, name: impl Into<String>, relation: RelationSchema) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }
}

/// Validated, read-only rules for one entity
#[derive(Debug, Clone)]
pub struct EntityRules {
    model: String,
    schema: EntitySchema,
    allowed: AllowedJoinSet,
    default_joins: Vec<String>,
    default_include: IncludeTree,
    forbidden: Vec<FieldPattern>,
    pagination: PaginationConfig,
}

impl EntityRules {
    /// Compile and validate a configuration
    ///
    /// # Errors
    ///
    /// Configuration errors: a default join outside the allowlist, an
    /// invalid forbidden regex, inconsistent pagination settings, an
    /// unusable default sort, or a field declared both scalar and relation.
    pub fn from_config(config: &EntityConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(CrudError::InvalidConfig {
                reason: "model name is empty".to_string(),
            }
            .into());
        }
        if let Some(both) = config.scalars.iter().find(|s| config.relations.contains_key(*s)) {
            return Err(CrudError::InvalidConfig {
                reason: format!("{} is declared both as a scalar and as a relation", both),
            }
            .into());
        }

        let allowed = AllowedJoinSet::build(&config.allowed_joins);
        let default_joins = match &config.default_joins {
            Some(joins) => validate_default_joins(joins, &allowed)?,
            None => allowed.iter().map(str::to_string).collect(),
        };
        let default_include = IncludeTree::from_join_list(&default_joins);

        let forbidden = config
            .forbidden_paths
            .iter()
            .map(ForbiddenPathSpec::compile)
            .collect::<Result<Vec<_>>>()?;

        let settings = &config.pagination_config;
        let default_order_by = match &settings.default_order_by {
            Some(value) => OrderBy::parse_validated(value, &allowed).map_err(|e| {
                CrudError::InvalidPaginationConfig {
                    reason: format!("defaultOrderBy: {}", e.message()),
                }
            })?,
            None => OrderBy::ascending(&config.id_field_name),
        };
        let pagination = PaginationConfig::new(
            settings.default_page_size,
            settings.max_page_size,
            default_order_by,
        )?;

        let mut schema = EntitySchema::new(&config.id_field_name).with_scalars(config.scalars.iter().cloned());
        for (name, relation) in &config.relations {
            schema = schema.with_relation(name.clone(), relation.clone());
        }

        Ok(Self {
            model: config.model.clone(),
            schema,
            allowed,
            default_joins,
            default_include,
            forbidden,
            pagination,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn id_field(&self) -> &str {
        &self.schema.id_field
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn allowed(&self) -> &AllowedJoinSet {
        &self.allowed
    }

    pub fn default_joins(&self) -> &[String] {
        &self.default_joins
    }

    pub fn default_include(&self) -> &IncludeTree {
        &self.default_include
    }

    pub fn forbidden(&self) -> &[FieldPattern] {
        &self.forbidden
    }

    pub fn pagination(&self) -> &PaginationConfig {
        &self.pagination
    }
}
