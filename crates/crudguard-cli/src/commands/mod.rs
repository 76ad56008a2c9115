pub mod check_config;
pub mod plan;

use std::error::Error;
use std::path::Path;

use crudguard_core::{EntityConfig, EntityRules};

/// Read and compile an entity config; `.json` files are JSON, anything else TOML
pub fn load_rules(path: &Path) -> Result<EntityRules, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => EntityConfig::from_json_str(&text)?,
        _ => EntityConfig::from_toml_str(&text)?,
    };
    Ok(EntityRules::from_config(&config)?)
}
