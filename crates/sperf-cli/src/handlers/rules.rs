use crate::args::OutputFormat;
use anyhow::Result;
use sperf_runtime::{Config, Pipeline};
use std::path::Path;

pub fn handle(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = Config::load(config_path)?;
    let registry = Pipeline::new(config).rule_registry()?;

    match format {
        OutputFormat::Json => {
            let rules: Vec<serde_json::Value> = registry
                .rules()
                .iter()
                .map(|rule| {
                    serde_json::json!({
                        "id": rule.id(),
                        "description": rule.description(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        OutputFormat::Plain => {
            let width = registry.ids().iter().map(|id| id.len()).max().unwrap_or(0);
            for rule in registry.rules() {
                println!("{:<width$}  {}", rule.id(), rule.description(), width = width);
            }
        }
    }
    Ok(())
}
