//! Check-config command
//!
//! Usage: crudguard check-config <FILE>

use clap::Args;
use std::path::PathBuf;

use super::load_rules;

#[derive(Debug, Args)]
pub struct CheckConfigArgs {
    /// Entity config file (.toml or .json)
    pub file: PathBuf,
}

/// Execute check-config command
pub fn execute(args: CheckConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let rules = load_rules(&args.file)?;

    let allowed: Vec<&str> = rules.allowed().iter().collect();
    let pagination = rules.pagination();

    println!("✓ {} is valid", args.file.display());
    println!("model: {}", rules.model());
    println!("id field: {}", rules.id_field());
    println!("allowed joins: {}", list_or_none(&allowed));
    println!(
        "default joins: {}",
        list_or_none(&rules.default_include().paths())
    );
    println!("forbidden patterns: {}", rules.forbidden().len());
    println!(
        "page size: {} (max {}), order by {}",
        pagination.default_page_size(),
        pagination.max_page_size(),
        pagination.default_order_by().to_value()
    );

    Ok(())
}

fn list_or_none<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
