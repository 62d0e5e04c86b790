use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// Owner label stamped on publications created by imports.
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_owner() -> String {
    "import".to_string()
}
fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// One optional section per supported external system.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub dspace: Option<SourceConfig>,
    pub dspace_legacy: Option<SourceConfig>,
    pub dataverse: Option<SourceConfig>,
    pub ojs: Option<SourceConfig>,
}

impl SourcesConfig {
    /// Configured sources as `(name, config)` pairs, in a stable order.
    pub fn configured(&self) -> Vec<(&'static str, &SourceConfig)> {
        let mut out = Vec::new();
        if let Some(c) = &self.dspace {
            out.push(("dspace", c));
        }
        if let Some(c) = &self.dspace_legacy {
            out.push(("dspace_legacy", c));
        }
        if let Some(c) = &self.dataverse {
            out.push(("dataverse", c));
        }
        if let Some(c) = &self.ojs {
            out.push(("ojs", c));
        }
        out
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// API root, e.g. `https://repository.example.edu/server`.
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Lowers the adapter's own page cap; never raises it.
    #[serde(default)]
    pub max_page_size: Option<u32>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl SourceConfig {
    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Effective page cap given the adapter's own limit.
    pub fn page_cap(&self, adapter_max: u32) -> u32 {
        match self.max_page_size {
            Some(n) => n.min(adapter_max),
            None => adapter_max,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Checks the invariants `load_config` guarantees to callers.
pub fn validate(config: &Config) -> Result<()> {
    if config.import.default_page_size == 0 {
        anyhow::bail!("import.default_page_size must be > 0");
    }
    if config.import.owner.trim().is_empty() {
        anyhow::bail!("import.owner must not be empty");
    }

    for (name, source) in config.sources.configured() {
        if !(source.base_url.starts_with("http://") || source.base_url.starts_with("https://")) {
            anyhow::bail!(
                "sources.{}.base_url must start with http:// or https:// (got '{}')",
                name,
                source.base_url
            );
        }
        if source.timeout_secs == 0 {
            anyhow::bail!("sources.{}.timeout_secs must be > 0", name);
        }
        if let Some(max) = source.max_page_size {
            if max == 0 || max > MAX_PAGE_SIZE {
                anyhow::bail!(
                    "sources.{}.max_page_size must be in 1..={}",
                    name,
                    MAX_PAGE_SIZE
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!(
            r#"
[db]
path = "/tmp/pubharvest.sqlite"

[server]
bind = "127.0.0.1:7340"
{}
"#,
            extra
        );
        let config: Config = toml::from_str(&content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.import.owner, "import");
        assert_eq!(config.import.default_page_size, DEFAULT_PAGE_SIZE);
        assert!(config.sources.configured().is_empty());
    }

    #[test]
    fn test_sources_are_listed_in_stable_order() {
        let config = parse(
            r#"
[sources.ojs]
base_url = "https://journals.example.edu/index.php/j"

[sources.dspace]
base_url = "https://repo.example.edu/server/"
max_page_size = 50
"#,
        )
        .unwrap();
        let names: Vec<_> = config.sources.configured().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["dspace", "ojs"]);

        let dspace = config.sources.dspace.as_ref().unwrap();
        assert_eq!(dspace.base(), "https://repo.example.edu/server");
        assert_eq!(dspace.page_cap(100), 50);
        assert_eq!(dspace.timeout_secs, 30);
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let err = parse(
            r#"
[sources.dataverse]
base_url = "data.example.edu"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("sources.dataverse.base_url"));
    }

    #[test]
    fn test_rejects_oversized_page_cap() {
        let err = parse(
            r#"
[sources.ojs]
base_url = "https://journals.example.edu"
max_page_size = 1000
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_page_size"));
    }

    #[test]
    fn test_rejects_zero_default_page_size() {
        let err = parse(
            r#"
[import]
default_page_size = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_page_size"));
    }
}
