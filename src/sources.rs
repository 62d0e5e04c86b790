use anyhow::Result;
use serde::Serialize;

use crate::adapter::AdapterRegistry;
use crate::config::Config;

/// One registered source as shown by `pubh sources` and `GET /sources`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub description: String,
    pub base_url: Option<String>,
    pub max_page_size: u32,
    pub has_token: bool,
}

pub fn source_infos(config: &Config, registry: &AdapterRegistry) -> Vec<SourceInfo> {
    let configured = config.sources.configured();
    registry
        .adapters()
        .iter()
        .map(|adapter| {
            let section = configured
                .iter()
                .find(|(name, _)| *name == adapter.source_name())
                .map(|(_, cfg)| *cfg);
            SourceInfo {
                name: adapter.source_name().to_string(),
                description: adapter.description().to_string(),
                base_url: section.map(|c| c.base().to_string()),
                max_page_size: adapter.max_page_size(),
                has_token: section.map(|c| c.api_token.is_some()).unwrap_or(false),
            }
        })
        .collect()
}

pub fn list_sources(config: &Config) -> Result<()> {
    let registry = AdapterRegistry::from_config(config)?;
    if registry.is_empty() {
        println!("No sources configured. Add a [sources.<name>] section to the config file.");
        return Ok(());
    }

    println!(
        "{:<16} {:>8} {:<6} {}",
        "SOURCE", "PAGE CAP", "TOKEN", "BASE URL"
    );
    for info in source_infos(config, &registry) {
        println!(
            "{:<16} {:>8} {:<6} {}",
            info.name,
            info.max_page_size,
            if info.has_token { "yes" } else { "no" },
            info.base_url.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
