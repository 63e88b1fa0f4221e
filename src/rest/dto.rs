//! Data Transfer Objects for the stub API.
//!
//! Step submit and resolve bodies are the wire types of [`crate::api`]; only the
//! stub-specific responses live here.

use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Number of sessions held in memory
    pub sessions: usize,
}
