//! Groundchat - knowledge-grounded chat with progressive profile collection
//!
//! Replies are grounded in a static knowledge file through hybrid semantic and lexical
//! retrieval. Across a session the assistant collects the user's name, email and income from
//! free-form text, soliciting at most one missing field at a time and never the same field twice.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod daemon;
pub mod delivery;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod orchestrator;
pub mod profile;
pub mod retrieval;
pub mod storage;

pub use error::{GroundchatError, Result};

/// Crate version reported by the daemon
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
