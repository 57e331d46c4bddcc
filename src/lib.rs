//! # Groundwork
//!
//! A local-first retrieval pipeline for grounded question answering.
//!
//! Documents in a directory are split into overlapping windows, embedded,
//! and stored as one collection in a SQLite vector index. Questions are
//! embedded with the same model, the nearest passages are retrieved, and a
//! prompt grounded on those passages is sent to an OpenAI-compatible chat
//! API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  data/docs  │──▶│ Chunk+Embed  │──▶│    SQLite     │
//! │ pdf/txt/md  │   │ (full build) │   │ generations   │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │ top-k
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                  ┌───────────┐        ┌──────────┐
//!                  │ gw ask    │        │   HTTP   │
//!                  │ (prompt + │        │ /query   │
//!                  │   LLM)    │        └──────────┘
//!                  └───────────┘
//! ```
//!
//! The I/O-free pieces (chunker, index, store trait, hash embedder) live in
//! the `groundwork-core` crate.
//!
//! ## Quick Start
//!
//! ```bash
//! gw init                          # create the index
//! gw ingest                        # (re)build from data/docs
//! gw query "what time is check-in?"
//! gw ask "what time is check-in?" --show-sources
//! gw serve                         # JSON API on 127.0.0.1:7341
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`documents`] | Document discovery |
//! | [`extract`] | PDF / text extraction |
//! | [`ingest`] | Full-rebuild ingestion |
//! | [`embedding`] | Embedding backends |
//! | [`sqlite_store`] | SQLite index store |
//! | [`retrieve`] | Query, status, and drop commands |
//! | [`prompt`] | Grounded prompt construction |
//! | [`generate`] | Chat completion client |
//! | [`ask`] | Retrieve + generate |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod generate;
pub mod ingest;
pub mod migrate;
pub mod prompt;
pub mod retrieve;
pub mod server;
pub mod sqlite_store;
