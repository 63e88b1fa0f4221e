//! In-memory session store of the stub scoring service.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api::ResultSet;
use crate::profile::FieldMap;
use crate::rest::catalog::{self, Scholarship};
use crate::steps::StepRegistry;

/// Accumulated answers of one remote session
#[derive(Debug, Clone, Default)]
pub struct StubSession {
    pub fields: FieldMap,
    /// Assigned on the first resolve and returned unchanged afterwards
    pub record_id: Option<String>,
}

/// Shared state for the stub API
#[derive(Clone)]
pub struct ApiState {
    /// Session id -> session (thread-safe read-write access)
    pub sessions: Arc<RwLock<HashMap<String, StubSession>>>,
    pub catalog: &'static [Scholarship],
    pub registry: Arc<StepRegistry>,
}

impl Default for ApiState {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiState {
    /// State with no sessions, the built-in catalog and the standard questionnaire
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            catalog: catalog::builtin(),
            registry: StepRegistry::standard(),
        }
    }

    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn new_record_id() -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("rec-{}", &id[..12])
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Narrowing for a session after a submit of `submitted`.
    ///
    /// Only answers of the submitted step and the steps before it are scored, so
    /// resubmitting an earlier step reproduces the result that step produced before.
    pub fn narrow(&self, session: &StubSession, submitted: &FieldMap) -> ResultSet {
        let horizon = submitted
            .keys()
            .filter_map(|f| self.registry.step_owning(*f).map(|s| s.index))
            .max()
            .unwrap_or(0);

        let profile: FieldMap = session
            .fields
            .iter()
            .filter(|(field, _)| {
                self.registry
                    .step_owning(**field)
                    .is_some_and(|s| s.index <= horizon)
            })
            .map(|(field, value)| (*field, value.clone()))
            .collect();

        catalog::rank(self.catalog, &profile)
    }
}
