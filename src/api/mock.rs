//! In-memory sync client for tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{Recommendation, ResultSet, StepSubmitResponse, SyncClient, SyncError};
use crate::profile::FieldMap;

/// A call observed by the mock service
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Submit {
        session_id: Option<String>,
        fields: FieldMap,
    },
    Resolve {
        session_id: String,
    },
}

/// Mock implementation of the scoring service.
///
/// Sessions follow upsert semantics, every call is recorded in arrival order, and failures
/// can be scripted ahead of time. The narrowing result depends only on the fields of the
/// call, so resubmitting the same fields reproduces the same result set.
#[derive(Default, Clone)]
pub struct MockSyncClient {
    /// Session id -> accumulated fields
    sessions: Arc<Mutex<HashMap<String, FieldMap>>>,
    /// Record of calls received
    pub call_log: Arc<Mutex<Vec<MockCall>>>,
    /// Errors returned by the next calls, in order
    failures: Arc<Mutex<VecDeque<SyncError>>>,
    /// Errors returned by the next resolve calls only
    resolve_failures: Arc<Mutex<VecDeque<SyncError>>>,
    /// Simulated latency per call
    latency: Arc<Mutex<Option<Duration>>>,
    /// Record id returned by resolve_final instead of the derived one
    record_id: Arc<Mutex<Option<String>>>,
    /// Counter for fresh session ids
    next_session: Arc<Mutex<u64>>,
}

impl MockSyncClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose calls each take `latency` to complete
    pub fn with_latency(latency: Duration) -> Self {
        let mock = Self::new();
        *mock.latency.lock().unwrap() = Some(latency);
        mock
    }

    /// Make the next call fail with `err`
    pub fn fail_next(&self, err: SyncError) {
        self.failures.lock().unwrap().push_back(err);
    }

    /// Make the next resolve_final fail with `err`, letting submits through
    pub fn fail_next_resolve(&self, err: SyncError) {
        self.resolve_failures.lock().unwrap().push_back(err);
    }

    /// Fix the record id returned by resolve_final
    pub fn set_record_id(&self, record_id: &str) {
        *self.record_id.lock().unwrap() = Some(record_id.to_string());
    }

    /// Get the call log
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of submit calls received
    pub fn submit_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Submit { .. }))
            .count()
    }

    /// Fields accumulated for a session
    pub fn session_fields(&self, session_id: &str) -> Option<FieldMap> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Narrowing result the mock returns for a set of fields
    pub fn recommendations_for(fields: &FieldMap) -> ResultSet {
        let key = fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");

        vec![Recommendation {
            scholarship_id: format!("match[{}]", key),
            name: format!("Scholarship for {}", key),
            provider: "mock".to_string(),
            score: fields.len() as f64,
            deadline: None,
        }]
    }

    async fn simulate(&self, call: MockCall) -> Result<(), SyncError> {
        let call_is_resolve = matches!(call, MockCall::Resolve { .. });
        self.call_log.lock().unwrap().push(call);

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if call_is_resolve {
            if let Some(err) = self.resolve_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
        }
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SyncClient for MockSyncClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit_step(
        &self,
        fields: &FieldMap,
        session_id: Option<&str>,
    ) -> Result<StepSubmitResponse, SyncError> {
        self.simulate(MockCall::Submit {
            session_id: session_id.map(str::to_string),
            fields: fields.clone(),
        })
        .await?;

        let mut sessions = self.sessions.lock().unwrap();
        let session_id = match session_id {
            Some(id) if sessions.contains_key(id) => id.to_string(),
            Some(id) => return Err(SyncError::http(404, format!("unknown session '{}'", id))),
            None => {
                let mut next = self.next_session.lock().unwrap();
                *next += 1;
                format!("mock-session-{}", *next)
            }
        };

        sessions
            .entry(session_id.clone())
            .or_default()
            .extend(fields.clone());

        Ok(StepSubmitResponse {
            session_id,
            recommendations: Self::recommendations_for(fields),
        })
    }

    async fn resolve_final(&self, session_id: &str) -> Result<String, SyncError> {
        self.simulate(MockCall::Resolve {
            session_id: session_id.to_string(),
        })
        .await?;

        if !self.sessions.lock().unwrap().contains_key(session_id) {
            return Err(SyncError::http(
                404,
                format!("unknown session '{}'", session_id),
            ));
        }

        Ok(self
            .record_id
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| format!("record-{}", session_id)))
    }
}
