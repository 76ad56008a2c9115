//! Plan command
//!
//! Usage: crudguard plan <FILE> [--query <JSON>] [--must-match <PATH=VALUE>]...
//!
//! Prints the effective filter, include tree and page window as JSON.

use clap::Args;
use serde_json::{json, Value};
use std::path::PathBuf;

use crudguard_core::pagination;
use crudguard_core::policy::{AccessPolicy, MustMatchValue};
use crudguard_core::query::QueryInput;
use crudguard_engine::QueryPlan;

use super::load_rules;

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Entity config file (.toml or .json)
    pub file: PathBuf,

    /// Query descriptor as JSON (default: empty descriptor)
    #[arg(short, long)]
    pub query: Option<String>,

    /// Scope the query with `attribute.path=value`; the value is read as
    /// JSON when it parses, else as a string. Repeatable.
    #[arg(long = "must-match", value_name = "PATH=VALUE")]
    pub must_match: Vec<String>,
}

/// Execute plan command
pub fn execute(args: PlanArgs) -> Result<(), Box<dyn std::error::Error>> {
    let rules = load_rules(&args.file)?;

    let mut input = QueryInput::from(args.query.unwrap_or_default());
    for spec in &args.must_match {
        let (path, raw) = spec
            .split_once('=')
            .ok_or_else(|| format!("expected PATH=VALUE, got {}", spec))?;
        let target = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        input = QueryInput::Scoped(MustMatchValue::new(path, target).scope(input)?);
    }

    let plan = QueryPlan::build(&rules, &input)?;
    let page = pagination::compute(
        plan.descriptor.page.as_ref(),
        plan.descriptor.page_size.as_ref(),
        plan.descriptor.order_by.as_ref(),
        rules.pagination(),
        rules.allowed(),
    )?;

    let out = json!({
        "model": rules.model(),
        "where": plan.filter.to_value(),
        "include": plan.include.to_value(),
        "select": plan.select(),
        "orderBy": page.order_by.to_value(),
        "page": page.page,
        "pageSize": page.page_size,
        "skip": page.skip,
        "take": page.take,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(())
}
