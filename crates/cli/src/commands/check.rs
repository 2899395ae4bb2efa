//! `modelrelay check`: Validate the config and resolve every provider.

use std::path::Path;

use modelrelay_core::catalog::Catalog;
use modelrelay_providers::ClientRegistry;

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 ModelRelay Check");
    println!("===================\n");

    let config = super::load_config(config_path)?;
    let catalog = config.catalog()?;
    println!("  ✅ Config valid");

    let problems = unresolved_providers(&catalog, &ClientRegistry::with_defaults());
    for line in &problems {
        println!("  ❌ {line}");
    }

    let mut tasks: Vec<_> = catalog.tasks().collect();
    tasks.sort_by(|a, b| a.name.cmp(&b.name));
    for t in tasks {
        println!(
            "  • task '{}': models [{}], {} attempt(s), {}s backoff",
            t.name,
            t.models.join(", "),
            t.retry_budget,
            t.retry_interval
        );
    }

    println!();
    if problems.is_empty() {
        println!("  🎉 All checks passed!");
        Ok(())
    } else {
        Err(format!("{} provider(s) cannot be resolved", problems.len()).into())
    }
}

/// Describe every provider whose client cannot be built.
fn unresolved_providers(catalog: &Catalog, registry: &ClientRegistry) -> Vec<String> {
    let mut providers: Vec<_> = catalog.providers().collect();
    providers.sort_by(|a, b| a.id.cmp(&b.id));
    providers
        .into_iter()
        .filter_map(|p| registry.resolve(p).err().map(|e| e.to_string()))
        .collect()
}
