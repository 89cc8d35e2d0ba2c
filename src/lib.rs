//! # onec-index
//!
//! Indexes 1C:Enterprise configuration exports (the XML/BSL file tree
//! produced by "Dump configuration to files") into SQLite, and answers
//! structured and full-text queries over the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────────┐   ┌───────────┐
//! │ Export tree  │──▶│  Ingestion pipeline    │──▶│  SQLite    │
//! │ XML + BSL    │   │ locate→parse→resolve  │   │ FTS5 index │
//! └──────────────┘   └───────────────────────┘   └─────┬─────┘
//!                                                      │
//!                                                      ▼
//!                                                ┌───────────┐
//!                                                │ CLI (ocx) │
//!                                                └───────────┘
//! ```
//!
//! Ingestion is two-pass: pass 1 loads objects, attributes, modules and
//! functional-option definitions; pass 2 loads forms and resolves
//! functional-option cross-references against committed pass-1 rows.
//!
//! ## Quick Start
//!
//! ```bash
//! ocx init --database erp.db
//! ocx ingest --database erp.db --export ./export
//! ocx search "РассчитатьСкидку" --database erp.db
//! ocx object structure Контрагенты --database erp.db
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`locator`] | Manifest reading and object file resolution |
//! | [`structural`] | Object XML parsing (both structural dialects) |
//! | [`form`] | Form metadata, UI tree, and module parsing |
//! | [`bsl`] | Module source scanning for procedure declarations |
//! | [`resolver`] | Functional-option cross-reference resolution |
//! | [`loader`] | SQLite entity writes and FTS indexing |
//! | [`ingest`] | Two-pass pipeline orchestration |
//! | [`query`] | Read contract over an index database |
//! | [`registry`] | Project/database registry and store cache |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod bsl;
pub mod config;
pub mod db;
pub mod form;
pub mod ingest;
pub mod loader;
pub mod locator;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod structural;
pub mod xml;
