//! kbrecall - hybrid retrieval over a pre-embedded knowledge base
//!
//! Queries recall candidates by vector similarity and exact metadata match,
//! fuse them with vector hits taking precedence, and optionally reorder the
//! result through an external rerank service. Served over HTTP or the CLI.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod retrieval;
pub mod server;
pub mod store;

pub use error::{KbRecallError, Result};
