//! Terminal step: resolve the record, hold the loading state, build the redirect

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, instrument};

use super::error::WizardError;
use crate::api::SyncClient;
use crate::config::FinalizeConfig;

/// Visible state of finalization, published for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingPhase {
    Idle,
    /// Waiting for the record id; the loading indicator is shown
    Resolving,
    /// Loading is over and the UI should navigate to `target`
    Redirecting { target: String },
}

/// Where the finished wizard sends the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub record_id: String,
    pub target: String,
}

/// Build the detail view path for a record
pub fn redirect_target(detail_base: &str, record_id: &str) -> String {
    format!("{}/{}", detail_base.trim_end_matches('/'), record_id)
}

pub struct FinalizationHandler {
    client: Arc<dyn SyncClient>,
    min_loading: Duration,
    detail_base: String,
    phase: watch::Sender<LoadingPhase>,
}

impl FinalizationHandler {
    pub fn new(client: Arc<dyn SyncClient>, config: &FinalizeConfig) -> Self {
        let (phase, _) = watch::channel(LoadingPhase::Idle);
        Self {
            client,
            min_loading: Duration::from_millis(config.min_loading_ms),
            detail_base: config.detail_base.clone(),
            phase,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadingPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> LoadingPhase {
        self.phase.borrow().clone()
    }

    /// Resolve the final record id and produce the redirect.
    ///
    /// The loading phase stays `Resolving` for at least the configured minimum duration.
    /// Without a session nothing is sent and no redirect is produced.
    #[instrument(skip(self))]
    pub async fn complete(&self, session_id: Option<&str>) -> Result<Redirect, WizardError> {
        let Some(session_id) = session_id else {
            error!("Finalization attempted without a remote session");
            return Err(WizardError::MissingSession);
        };

        let started = Instant::now();
        self.phase.send_replace(LoadingPhase::Resolving);

        let record_id = match self.client.resolve_final(session_id).await {
            Ok(record_id) => record_id,
            Err(e) => {
                self.phase.send_replace(LoadingPhase::Idle);
                return Err(e.into());
            }
        };

        let elapsed = started.elapsed();
        if elapsed < self.min_loading {
            tokio::time::sleep(self.min_loading - elapsed).await;
        }

        let target = redirect_target(&self.detail_base, &record_id);
        info!(session_id, record_id = %record_id, target = %target, "Wizard finished");
        self.phase.send_replace(LoadingPhase::Redirecting {
            target: target.clone(),
        });

        Ok(Redirect { record_id, target })
    }

    /// Back to idle once the redirect has been handled
    pub fn reset(&self) {
        self.phase.send_replace(LoadingPhase::Idle);
    }
}
