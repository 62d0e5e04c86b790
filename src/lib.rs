//! # pubharvest
//!
//! Idempotent batch harvesting of publication records into a canonical
//! store.
//!
//! pubharvest pulls records from institutional repositories (current and
//! legacy REST APIs), a research-data repository and a journal platform,
//! decides for each record whether it is new, unchanged or modified, and
//! applies the result to a local SQLite store. Re-running an import never
//! creates duplicates, unchanged records are never rewritten, and one bad
//! record never undoes the rest of its batch.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │   Adapters   │──▶│  Batch manager   │──▶│    SQLite    │
//! │ dspace, ojs, │   │ savepoint / item │   │ publications │
//! │ dataverse... │   │  reconcile engine│   │  + mappings  │
//! └──────────────┘   └────────┬─────────┘   └──────────────┘
//!                             │ after commit
//!                             ▼
//!                      ┌──────────────┐
//!                      │ mint outbox  │
//!                      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pubh init                                   # create database
//! pubh sources                                # list configured sources
//! pubh import dspace --size 50                # first page of 50 items
//! pubh import ojs --update-existing --page 1  # re-sync page 2
//! pubh import-one dataverse doi:10.5072/FK2/ABCDEF
//! pubh serve                                  # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Adapter, store and batch error types |
//! | [`adapter`] | `SourceAdapter` trait, registry, fingerprinting |
//! | [`adapter_dspace`] | Institutional repository (current API) |
//! | [`adapter_dspace_legacy`] | Institutional repository (legacy API) |
//! | [`adapter_dataverse`] | Research-data repository |
//! | [`adapter_ojs`] | Journal platform |
//! | [`resolver`] | Mapping lookup |
//! | [`detector`] | Fingerprint comparison |
//! | [`reconcile`] | Per-record reconciliation engine |
//! | [`batch`] | Batch transaction manager |
//! | [`contributors`] | Contributor replacement |
//! | [`mint`] | Mint request hand-off |
//! | [`store`] | Canonical store queries |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod adapter;
pub mod adapter_dataverse;
pub mod adapter_dspace;
pub mod adapter_dspace_legacy;
pub mod adapter_ojs;
pub mod batch;
pub mod config;
pub mod contributors;
pub mod db;
pub mod detector;
pub mod error;
pub mod get;
pub mod import_cmd;
pub mod migrate;
pub mod mint;
pub mod models;
pub mod reconcile;
pub mod resolver;
pub mod server;
pub mod sources;
pub mod stats;
pub mod store;
