//! Resume on mount and the one-shot return intent

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::profile::ProfileStore;
use crate::state::PersistenceAdapter;
use crate::steps::{StepKind, StepRegistry};

/// Where an out-of-band authentication detour should bring the user back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnTarget {
    /// Back into the questionnaire
    Wizard,
    /// Back to the narrowing result being shown
    Results,
}

impl ReturnTarget {
    /// Greeting for a run that picks up saved progress at this target
    pub fn greeting(self) -> &'static str {
        match self {
            ReturnTarget::Wizard => "Welcome back! Picking up where you left off.",
            ReturnTarget::Results => "Welcome back! Here are the matches you were looking at.",
        }
    }
}

/// Session-scoped, one-shot marker of the return target.
///
/// Lives only as long as the process; `take` hands it out at most once.
#[derive(Debug, Clone, Default)]
pub struct ReturnIntent {
    slot: Arc<Mutex<Option<ReturnTarget>>>,
}

impl ReturnIntent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, target: ReturnTarget) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(target);
    }

    /// Consume the intent
    pub fn take(&self) -> Option<ReturnTarget> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn peek(&self) -> Option<ReturnTarget> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clear(&self) {
        self.take();
    }
}

/// Outcome of mounting the wizard
#[derive(Debug)]
pub struct Resumed {
    pub step_index: usize,
    pub profile: ProfileStore,
    /// True when progress was restored from storage
    pub resumed: bool,
}

/// Restores wizard position and profile from durable storage
pub struct ResumeManager<'a> {
    registry: &'a StepRegistry,
    persistence: &'a PersistenceAdapter,
    intent: &'a ReturnIntent,
}

impl<'a> ResumeManager<'a> {
    pub fn new(
        registry: &'a StepRegistry,
        persistence: &'a PersistenceAdapter,
        intent: &'a ReturnIntent,
    ) -> Self {
        Self {
            registry,
            persistence,
            intent,
        }
    }

    /// Load persisted state and decide where the wizard starts.
    ///
    /// Never calls the remote service. A result step resumed into is stale until the user
    /// acts again.
    pub fn mount(&self) -> Resumed {
        let resumed = match self.persistence.load() {
            Some(persisted) if self.registry.contains(persisted.step_index) => {
                info!(
                    step_index = persisted.step_index,
                    session_id = persisted.profile.session_id.as_deref().unwrap_or("-"),
                    "Resuming wizard"
                );
                Resumed {
                    step_index: persisted.step_index,
                    profile: ProfileStore::rehydrate(persisted.profile),
                    resumed: true,
                }
            }
            Some(persisted) => {
                warn!(
                    step_index = persisted.step_index,
                    last = self.registry.last_index(),
                    "Persisted step is out of range, starting over"
                );
                self.fresh()
            }
            None => self.fresh(),
        };

        let target = match self.registry.describe(resumed.step_index).map(|s| s.kind) {
            Ok(StepKind::Result) => ReturnTarget::Results,
            _ => ReturnTarget::Wizard,
        };
        self.intent.record(target);

        resumed
    }

    fn fresh(&self) -> Resumed {
        if let Err(e) = self.persistence.clear() {
            warn!("Failed to clear stale wizard state: {}", e);
        }
        Resumed {
            step_index: 0,
            profile: ProfileStore::new(),
            resumed: false,
        }
    }
}
