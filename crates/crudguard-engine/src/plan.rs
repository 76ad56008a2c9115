//! Validated read plan for one request

use crudguard_core::errors::Result;
use crudguard_core::joins::IncludeTree;
use crudguard_core::policy::scope_where;
use crudguard_core::query::{parse_validated_where, CrudQueryDescriptor, QueryInput, SelectSpec, WhereNode};
use crudguard_core::EntityRules;

/// Filter and include tree every read of a request runs with
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub descriptor: CrudQueryDescriptor,
    /// Client filter wrapped in any trusted policy predicates
    pub filter: WhereNode,
    pub include: IncludeTree,
}

impl QueryPlan {
    /// Resolve and validate `input` against the entity's rules
    ///
    /// Policy predicates are applied after the client filter is validated
    /// and are not themselves checked against the join allowlist.
    ///
    /// # Errors
    ///
    /// `MalformedDescriptor` / `MalformedWhere` (validation), or
    /// `JoinNotAllowed` / `RelationNotAllowed` (forbidden).
    pub fn build(rules: &EntityRules, input: &QueryInput) -> Result<Self> {
        let resolved = input.resolve()?;
        let client_filter = match &resolved.descriptor.where_filter {
            Some(value) => parse_validated_where(value, rules.allowed())?,
            None => WhereNode::empty(),
        };
        let include = IncludeTree::resolve_requested(
            resolved.descriptor.joins.as_deref(),
            rules.allowed(),
            rules.default_include(),
        )?;
        Ok(Self {
            filter: scope_where(&resolved.trusted, client_filter),
            include,
            descriptor: resolved.descriptor,
        })
    }

    pub fn select(&self) -> Option<&SelectSpec> {
        self.descriptor.select.as_ref()
    }
}
