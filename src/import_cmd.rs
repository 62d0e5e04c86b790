//! `pubh import` and `pubh import-one`.
//!
//! Thin CLI wrappers around [`batch::run_batch`] and [`batch::import_one`]
//! that resolve the adapter from config, open the store and print a
//! summary (or the raw result with `--json`).

use anyhow::{anyhow, Context, Result};

use crate::adapter::AdapterRegistry;
use crate::batch::{self, BatchRequest};
use crate::config::Config;
use crate::db;
use crate::mint::OutboxMintQueue;
use crate::models::{BatchItemResult, BatchResult};

pub async fn run_import(
    config: &Config,
    source: &str,
    request: &BatchRequest,
    json: bool,
) -> Result<()> {
    let registry = AdapterRegistry::from_config(config)?;
    let adapter = registry.find(source).ok_or_else(|| unknown_source(source, &registry))?;

    let pool = db::connect(config).await?;
    let minter = OutboxMintQueue::new(pool.clone());
    let outcome = batch::run_batch(&pool, adapter, &minter, &config.import.owner, request).await;
    pool.close().await;

    let result = outcome.with_context(|| format!("import from {} failed", source))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(source, &result);
    }
    Ok(())
}

pub async fn run_import_one(
    config: &Config,
    source: &str,
    external_id: &str,
    update_existing: bool,
    json: bool,
) -> Result<()> {
    let registry = AdapterRegistry::from_config(config)?;
    let adapter = registry.find(source).ok_or_else(|| unknown_source(source, &registry))?;

    let pool = db::connect(config).await?;
    let minter = OutboxMintQueue::new(pool.clone());
    let outcome = batch::import_one(
        &pool,
        adapter,
        &minter,
        &config.import.owner,
        external_id,
        update_existing,
    )
    .await;
    pool.close().await;

    let item = outcome.with_context(|| format!("import of {}/{} failed", source, external_id))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        print_item(&item);
    }
    Ok(())
}

fn unknown_source(source: &str, registry: &AdapterRegistry) -> anyhow::Error {
    let names = registry.names();
    if names.is_empty() {
        anyhow!("Unknown source: '{}'. No sources are configured.", source)
    } else {
        anyhow!(
            "Unknown source: '{}'. Configured: {}",
            source,
            names.join(", ")
        )
    }
}

fn print_summary(source: &str, result: &BatchResult) {
    println!("import {}", source);
    for item in &result.items {
        print_item(item);
    }
    println!("  total:     {}", result.total);
    println!("  created:   {}", result.created);
    println!("  updated:   {}", result.updated);
    println!("  unchanged: {}", result.unchanged);
    println!("  skipped:   {}", result.skipped);
    println!("  errors:    {}", result.errors);
    println!("ok");
}

fn print_item(item: &BatchItemResult) {
    match (&item.publication_id, &item.error) {
        (_, Some(error)) => println!("  {:<10} {}  {}", item.status.as_str(), item.external_id, error),
        (Some(id), None) => println!("  {:<10} {}  -> {}", item.status.as_str(), item.external_id, id),
        (None, None) => println!("  {:<10} {}", item.status.as_str(), item.external_id),
    }
}
