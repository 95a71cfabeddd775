//! # Codex Indexer
//!
//! Indexes a tree of markdown documents into SQLite and serves full-text
//! search and document reads.
//!
//! ## Architecture
//!
//! ```text
//!  POST /api/index-jobs          codex worker (one loop per process)
//!  codex enqueue                 ┌──────────────────────────────────┐
//!        │                       │ claim ─▶ scan ─▶ sync ─▶ record  │
//!        ▼                       └──┬─────────────────┬─────────────┘
//!  ┌────────────┐  claim_next       │                 │ one transaction
//!  │ index_jobs │◀──────────────────┘                 ▼
//!  └────────────┘                              ┌─────────────────┐
//!                                              │ documents + FTS5│
//!                                              └────────┬────────┘
//!                                   search / get ◀──────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`scanner`] | Filesystem scan: paths, checksums, titles |
//! | [`sync`] | Atomic document synchronization |
//! | [`jobs`] | Persistent job queue with exclusive claims |
//! | [`worker`] | Background polling loop |
//! | [`search`] | FTS5 keyword search |
//! | [`get`] | Document retrieval |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod get;
pub mod jobs;
pub mod migrate;
pub mod models;
pub mod scanner;
pub mod search;
pub mod server;
pub mod sync;
pub mod worker;
