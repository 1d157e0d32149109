use carline_agent::tools::{rental_registry, sales_registry, ToolRegistry};
use carline_core::domain::Domain;
use serde_json::{json, Value};

use super::{config_failure, CommandResult, ConfigSelection};

/// Lists the tools each assistant can call.
pub fn run(selection: &ConfigSelection, json_output: bool) -> CommandResult {
    let config = match selection.load() {
        Ok(config) => config,
        Err(error) => return config_failure("tools", &error),
    };

    let registries = match (rental_registry(&config.rental), sales_registry(&config.sales)) {
        (Ok(rental), Ok(sales)) => [(Domain::Rental, rental), (Domain::Sales, sales)],
        (Err(error), _) | (_, Err(error)) => {
            return CommandResult::failure("tools", "tool_registry", error.to_string(), 3)
        }
    };

    if json_output {
        let data: Value = registries
            .iter()
            .map(|(domain, registry)| (domain.as_str().to_string(), describe(registry)))
            .collect::<serde_json::Map<_, _>>()
            .into();
        let total: usize = registries.iter().map(|(_, registry)| registry.len()).sum();
        return CommandResult::success_with_data("tools", format!("{total} tools registered"), Some(data));
    }

    let mut lines = Vec::new();
    for (domain, registry) in &registries {
        lines.push(format!("{domain} ({} tools):", registry.len()));
        for schema in registry.schemas() {
            lines.push(format!("- {}: {}", schema.name, schema.description));
        }
    }
    CommandResult::plain(lines.join("\n"))
}

fn describe(registry: &ToolRegistry) -> Value {
    Value::Array(
        registry
            .schemas()
            .into_iter()
            .map(|schema| {
                json!({
                    "name": schema.name,
                    "description": schema.description,
                    "parameters": schema.parameters,
                })
            })
            .collect(),
    )
}
