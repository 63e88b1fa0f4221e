//! Remote sync client for the scholarship scoring service
//!
//! This module provides:
//! - The wire types of the step-submit and resolve-final calls
//! - The `SyncClient` trait the wizard drives
//! - An HTTP implementation with retry for transient failures
//! - A recording mock for tests

pub mod error;
pub mod http;
pub mod mock;

pub use error::SyncError;
pub use http::HttpSyncClient;
pub use mock::{MockCall, MockSyncClient};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::profile::{deserialize_field_map, FieldMap};

/// One scholarship in a narrowing result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub scholarship_id: String,
    pub name: String,
    pub provider: String,
    /// Match score, higher is better
    pub score: f64,
    /// Application deadline (if announced)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
}

/// Ranked scholarships returned for a submitted step
pub type ResultSet = Vec<Recommendation>;

/// Body of the step-submit call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSubmitRequest {
    /// Absent on the first submit; the service then creates a session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_field_map")]
    pub fields: FieldMap,
}

/// Answer of the step-submit call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSubmitResponse {
    pub session_id: String,
    #[serde(default)]
    pub recommendations: ResultSet,
}

/// Body of the resolve-final call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveFinalRequest {
    pub session_id: String,
}

/// Answer of the resolve-final call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveFinalResponse {
    pub record_id: String,
}

/// Client of the remote scoring service.
///
/// Both calls are idempotent on the service side: resending the same session and fields
/// never creates a second record.
#[async_trait]
pub trait SyncClient: Send + Sync {
    /// Client name for logging (e.g., "http", "mock")
    fn name(&self) -> &str;

    /// Upsert the given fields.
    ///
    /// Without a session id the service creates a session and returns a fresh id; with one
    /// it updates that session and echoes the same id back.
    async fn submit_step(
        &self,
        fields: &FieldMap,
        session_id: Option<&str>,
    ) -> Result<StepSubmitResponse, SyncError>;

    /// Obtain the durable record id of a finished session
    async fn resolve_final(&self, session_id: &str) -> Result<String, SyncError>;
}
