//! Per-entity CRUD orchestration
//!
//! Each operation runs Parse -> Validate -> Execute -> Redact. All
//! validation finishes before the first mutating store call.
//!
//! Without a transaction in [`CrudMethodOpts`] the visibility check of
//! `update` / `remove` and the write that follows are separate store calls
//! and are not atomic. Pass a transaction-bound client to close that gap.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crudguard_core::errors::{CrudError, ExError, ExErrorKind, Result};
use crudguard_core::joins::IncludeTree;
use crudguard_core::mutation::MutationDiffer;
use crudguard_core::pagination::{self, page_count};
use crudguard_core::query::WhereNode;
use crudguard_core::redact::{prune, FieldPattern};
use crudguard_core::{log_op_end, log_op_error, log_op_start, EntityConfig, EntityRules};

use crate::client::{FindArgs, PersistenceClient, RecordKey};
use crate::opts::CrudMethodOpts;
use crate::plan::QueryPlan;
use crate::response::FindManyResponse;

pub struct CrudService {
    rules: Arc<EntityRules>,
    client: Arc<dyn PersistenceClient>,
}

impl CrudService {
    /// # Errors
    ///
    /// Configuration errors from compiling `config`.
    pub fn new(config: &EntityConfig, client: Arc<dyn PersistenceClient>) -> Result<Self> {
        Ok(Self::from_rules(EntityRules::from_config(config)?, client))
    }

    pub fn from_rules(rules: EntityRules, client: Arc<dyn PersistenceClient>) -> Self {
        Self {
            rules: Arc::new(rules),
            client,
        }
    }

    pub fn rules(&self) -> &EntityRules {
        &self.rules
    }

    fn model(&self) -> &str {
        self.rules.model()
    }

    fn repo<'a>(&'a self, opts: &'a CrudMethodOpts) -> &'a dyn PersistenceClient {
        opts.transaction.as_deref().unwrap_or(self.client.as_ref())
    }

    /// Create a record, then read it back under the same visibility rules
    ///
    /// # Errors
    ///
    /// Validation / Forbidden for a bad query or payload (nothing is
    /// written), NotFound when the new record is not visible to the
    /// caller, Internal for store failures.
    pub async fn create(&self, dto: &Value, opts: &CrudMethodOpts) -> Result<Value> {
        let start = Instant::now();
        log_op_start!("create", model = self.model(), request_id = opts.request_id());
        let result = self.create_inner(dto, opts).await;
        self.finish("create", start, opts, result)
    }

    async fn create_inner(&self, dto: &Value, opts: &CrudMethodOpts) -> Result<Value> {
        self.plan_read(opts)?;
        let data =
            MutationDiffer::new(self.rules.schema(), self.rules.allowed()).diff(dto, None)?;

        let created = self
            .repo(opts)
            .create(self.model(), data)
            .await
            .map_err(store_failure)?;
        let id = self.own_id(&created)?;
        self.find_visible(&id, opts, true).await
    }

    /// One page of visible records plus totals
    ///
    /// # Errors
    ///
    /// Validation / Forbidden for a bad query, Internal for store failures.
    pub async fn find_many(&self, opts: &CrudMethodOpts) -> Result<FindManyResponse> {
        let start = Instant::now();
        log_op_start!("find_many", model = self.model(), request_id = opts.request_id());
        let result = self.find_many_inner(opts).await;
        self.finish("find_many", start, opts, result)
    }

    async fn find_many_inner(&self, opts: &CrudMethodOpts) -> Result<FindManyResponse> {
        let plan = self.plan_read(opts)?;
        let page = pagination::compute(
            plan.descriptor.page.as_ref(),
            plan.descriptor.page_size.as_ref(),
            plan.descriptor.order_by.as_ref(),
            self.rules.pagination(),
            self.rules.allowed(),
        )?;

        let repo = self.repo(opts);
        let total = repo
            .count(self.model(), &plan.filter)
            .await
            .map_err(store_failure)?;
        let mut rows = repo
            .find_many(
                self.model(),
                FindArgs {
                    filter: plan.filter.clone(),
                    include: plan.include.clone(),
                    order_by: Some(page.order_by.clone()),
                    skip: Some(page.skip),
                    take: Some(page.take),
                },
            )
            .await
            .map_err(store_failure)?;

        for row in &mut rows {
            self.redact(row, &plan, opts);
        }
        tracing::debug!(
            model = self.model(),
            row_count = rows.len(),
            total_records = total,
            "page fetched"
        );

        Ok(FindManyResponse {
            data: rows,
            total_records: total,
            page_count: page_count(total, page.page_size),
            page: page.page,
            page_size: page.page_size,
            order_by: page.order_by.to_value(),
        })
    }

    /// The visible record with the given id
    ///
    /// # Errors
    ///
    /// NotFound when no record matches both the id and the (policy-scoped)
    /// filter; Validation / Forbidden for a bad query.
    pub async fn find_one(&self, id: &Value, opts: &CrudMethodOpts) -> Result<Value> {
        let start = Instant::now();
        log_op_start!("find_one", model = self.model(), request_id = opts.request_id());
        let result = self.find_visible(id, opts, true).await;
        self.finish("find_one", start, opts, result)
    }

    /// Update a visible record
    ///
    /// The visibility check doubles as authorization: a record the caller
    /// cannot see is NotFound, never Forbidden. The write is keyed by the
    /// fetched record's own id.
    ///
    /// # Errors
    ///
    /// NotFound, Validation, Forbidden or Internal, as for `find_one` and `create`.
    pub async fn update(&self, id: &Value, dto: &Value, opts: &CrudMethodOpts) -> Result<Value> {
        let start = Instant::now();
        log_op_start!("update", model = self.model(), request_id = opts.request_id());
        let result = self.update_inner(id, dto, opts).await;
        self.finish("update", start, opts, result)
    }

    async fn update_inner(&self, id: &Value, dto: &Value, opts: &CrudMethodOpts) -> Result<Value> {
        let differ = MutationDiffer::new(self.rules.schema(), self.rules.allowed());
        // Payload errors surface before the store is touched
        differ.diff(dto, None)?;

        let relations: Vec<&str> = dto
            .as_object()
            .into_iter()
            .flat_map(|payload| payload.keys())
            .filter(|key| self.rules.schema().relation(key).is_some())
            .map(String::as_str)
            .collect();
        let existing = self.fetch_visible(id, opts, &relations).await?;
        let data = differ.diff(dto, Some(&existing))?;

        let key = RecordKey::new(self.rules.id_field(), self.own_id(&existing)?);
        self.repo(opts)
            .update(self.model(), &key, data)
            .await
            .map_err(store_failure)?;
        self.find_visible(&key.value, opts, true).await
    }

    /// Delete a visible record
    ///
    /// # Errors
    ///
    /// NotFound when the record is not visible, Internal for store failures.
    pub async fn remove(&self, id: &Value, opts: &CrudMethodOpts) -> Result<()> {
        let start = Instant::now();
        log_op_start!("remove", model = self.model(), request_id = opts.request_id());
        let result = self.remove_inner(id, opts).await;
        self.finish("remove", start, opts, result)
    }

    async fn remove_inner(&self, id: &Value, opts: &CrudMethodOpts) -> Result<()> {
        let existing = self.fetch_visible(id, opts, &[]).await?;
        let key = RecordKey::new(self.rules.id_field(), self.own_id(&existing)?);
        self.repo(opts)
            .delete(self.model(), &key)
            .await
            .map_err(store_failure)
    }

    // ===== helpers =====

    fn plan_read(&self, opts: &CrudMethodOpts) -> Result<QueryPlan> {
        QueryPlan::build(&self.rules, &opts.crud_query)
    }

    async fn find_visible(&self, id: &Value, opts: &CrudMethodOpts, redact: bool) -> Result<Value> {
        let plan = self.plan_read(opts)?;
        let mut record = self.first_match(id, &plan, plan.include.clone(), opts).await?;
        if redact {
            self.redact(&mut record, &plan, opts);
        }
        Ok(record)
    }

    /// Unredacted visible record with `relations` loaded for diffing
    async fn fetch_visible(
        &self,
        id: &Value,
        opts: &CrudMethodOpts,
        relations: &[&str],
    ) -> Result<Value> {
        let plan = self.plan_read(opts)?;
        let include = relations
            .iter()
            .fold(plan.include.clone(), |tree, name| tree.with_relation(name));
        self.first_match(id, &plan, include, opts).await
    }

    async fn first_match(
        &self,
        id: &Value,
        plan: &QueryPlan,
        include: IncludeTree,
        opts: &CrudMethodOpts,
    ) -> Result<Value> {
        let by_id = WhereNode::field_equals(self.rules.id_field(), id.clone());
        let filter = if plan.filter.is_empty() {
            by_id
        } else {
            WhereNode::all(vec![plan.filter.clone(), by_id])
        };

        self.repo(opts)
            .find_first(
                self.model(),
                FindArgs {
                    filter,
                    include,
                    ..FindArgs::default()
                },
            )
            .await
            .map_err(store_failure)?
            .ok_or_else(|| CrudError::RecordNotFound.into())
    }

    fn redact(&self, record: &mut Value, plan: &QueryPlan, opts: &CrudMethodOpts) {
        let forbidden: &[FieldPattern] = if opts.exclude_forbidden_paths {
            self.rules.forbidden()
        } else {
            &[]
        };
        prune(record, forbidden, plan.select(), &[self.rules.id_field()]);
    }

    fn own_id(&self, record: &Value) -> Result<Value> {
        record
            .get(self.rules.id_field())
            .filter(|id| !id.is_null())
            .cloned()
            .ok_or_else(|| {
                CrudError::Internal {
                    message: "store returned a record without its id field".to_string(),
                }
                .into()
            })
    }

    fn finish<T>(
        &self,
        op: &'static str,
        start: Instant,
        opts: &CrudMethodOpts,
        result: Result<T>,
    ) -> Result<T> {
        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(value) => {
                log_op_end!(op, duration_ms = duration_ms, model = self.model());
                Ok(value)
            }
            Err(err) => {
                let mut err = err.in_context(op, self.model());
                if let Some(ctx) = &opts.context {
                    err = err.with_request_id(ctx.request_id.clone());
                    if let Some(trace_id) = &ctx.trace_id {
                        err = err.with_trace_id(trace_id.clone());
                    }
                }
                log_op_error!(op, err.clone(), duration_ms = duration_ms, model = self.model());
                Err(err)
            }
        }
    }
}

/// NotFound passes through; every other store failure becomes opaque
fn store_failure(err: ExError) -> ExError {
    if err.kind() == ExErrorKind::NotFound {
        return CrudError::RecordNotFound.into();
    }
    tracing::error!(err_code = err.code(), "store call failed");
    CrudError::Internal {
        message: "store operation failed".to_string(),
    }
    .into()
}
