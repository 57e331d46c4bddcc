//! # Groundwork Core
//!
//! Shared, I/O-free logic for Groundwork: data models, the overlapping
//! window chunker, the embedder trait, the index store abstraction, and the
//! [`VectorIndex`](index::VectorIndex) that ties them together.
//!
//! This crate contains no sqlx, HTTP, or filesystem code. Concrete
//! embedders and the SQLite store live in the `groundwork` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod store;
