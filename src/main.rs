//! # pubharvest CLI (`pubh`)
//!
//! ## Usage
//!
//! ```bash
//! pubh --config ./config/pubharvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pubh init` | Create the SQLite database and run schema migrations |
//! | `pubh sources` | List configured sources |
//! | `pubh import <source>` | Import one page (or `--ids`) from a source |
//! | `pubh import-one <source> <id>` | Import a single record |
//! | `pubh get <id>` | Show a publication with contributors and mappings |
//! | `pubh stats` | Counts per source and pending mint requests |
//! | `pubh serve` | Start the HTTP API |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pubharvest::batch::{BatchRequest, Selection};
use pubharvest::models::PageParams;
use pubharvest::{config, get, import_cmd, migrate, server, sources, stats};

/// pubharvest CLI: idempotent harvesting of publication records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pubharvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pubh",
    about = "pubharvest: idempotent batch harvesting of publication records",
    version,
    long_about = "pubharvest imports publication records from institutional repositories, \
    research-data repositories and journal platforms into a canonical SQLite store. \
    Re-running an import never creates duplicates and one bad record never undoes its batch."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pubharvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent; running it multiple times is safe.
    Init,

    /// List configured sources with their page cap and base URL.
    Sources,

    /// Import one page of records, or an explicit id list, from a source.
    ///
    /// Already-imported records are skipped unless `--update-existing` is
    /// given, in which case records whose content changed are rewritten.
    Import {
        /// Source name: `dspace`, `dspace_legacy`, `dataverse` or `ojs`.
        source: String,

        /// Import exactly these external ids instead of a page.
        #[arg(long, value_delimiter = ',', conflicts_with_all = ["page", "size", "query", "status", "scope"])]
        ids: Option<Vec<String>>,

        /// Zero-based page number.
        #[arg(long)]
        page: Option<u32>,

        /// Page size (clamped to the source's cap).
        #[arg(long)]
        size: Option<u32>,

        /// Search phrase, for sources that support one.
        #[arg(long)]
        query: Option<String>,

        /// Source status filter (journal workflow status code).
        #[arg(long)]
        status: Option<String>,

        /// Collection or sub-repository restriction.
        #[arg(long)]
        scope: Option<String>,

        /// Rewrite publications whose source content changed.
        #[arg(long)]
        update_existing: bool,

        /// Print the batch result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Import a single record by external id.
    ImportOne {
        source: String,
        external_id: String,

        #[arg(long)]
        update_existing: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show a publication by its UUID.
    Get {
        /// Publication UUID.
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Show database statistics.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Import {
            source,
            ids,
            page,
            size,
            query,
            status,
            scope,
            update_existing,
            json,
        } => {
            let selection = match ids {
                Some(ids) => Selection::Ids(ids),
                None => Selection::Page(PageParams {
                    page: page.unwrap_or(0),
                    size: size.unwrap_or(cfg.import.default_page_size),
                    query,
                    status,
                    scope,
                }),
            };
            let request = BatchRequest {
                update_existing,
                selection,
            };
            import_cmd::run_import(&cfg, &source, &request, json).await?;
        }
        Commands::ImportOne {
            source,
            external_id,
            update_existing,
            json,
        } => {
            import_cmd::run_import_one(&cfg, &source, &external_id, update_existing, json).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
