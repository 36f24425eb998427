//! trackmatch - resolve playlist tracks against a music catalog.
//!
//! Matching core: text normalization, mix annotation parsing, query
//! generation, candidate scoring and the early-exit query loop. The binary
//! adds a SQLite catalog, playlist-level parallelism and JSON I/O.

pub mod catalog;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod keys;
pub mod logging;
pub mod mix;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod playlist;
pub mod progress;
pub mod query;
pub mod safety;
pub mod scoring;
pub mod telemetry;
