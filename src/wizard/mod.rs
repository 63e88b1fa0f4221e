//! Navigation controller of the recommendation wizard.
//!
//! One generic executor walks the step registry: entry and result steps just move,
//! collect steps validate and submit their owned fields, the final collect step hands
//! over to the finalization handler. Persistence is written only after the remote call
//! of a transition succeeded, so a resume is never ahead of what the user saw.

pub mod error;
pub mod finalize;
pub mod handle;
pub mod resume;

pub use error::WizardError;
pub use finalize::{FinalizationHandler, LoadingPhase, Redirect};
pub use handle::WizardHandle;
pub use resume::{ResumeManager, Resumed, ReturnIntent, ReturnTarget};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{ResultSet, SyncClient, SyncError};
use crate::profile::{FieldMap, FieldName, FieldValue, ProfileRecord, ProfileStore};
use crate::state::PersistenceAdapter;
use crate::steps::{
    validate_step, OutOfRangeError, StepDescriptor, StepKind, StepRegistry, ValidationError,
};

/// Narrowing result tagged with the collect step whose fields produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Narrowing {
    pub collect_step: usize,
    pub recommendations: ResultSet,
}

/// Outcome of a navigation action
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The active step changed
    Moved {
        from: usize,
        to: usize,
        remote_call: bool,
    },
    /// Nothing to do (retreat on the first step)
    Stayed { index: usize },
    /// The wizard completed and was reset; the UI should navigate to the redirect
    Finished(Redirect),
}

/// What a result step can show right now
#[derive(Debug, Clone, PartialEq)]
pub enum ResultView {
    NotResultStep,
    Fresh(ResultSet),
    /// No narrowing held for this step, e.g. after a resume
    Stale,
}

/// Owned view of the wizard for rendering
#[derive(Debug, Clone)]
pub struct WizardSnapshot {
    pub step: StepDescriptor,
    pub profile: ProfileRecord,
    pub results: ResultView,
    pub progress: String,
    pub percentage: u8,
}

impl WizardSnapshot {
    pub fn step_index(&self) -> usize {
        self.step.index
    }
}

pub struct Wizard {
    registry: Arc<StepRegistry>,
    client: Arc<dyn SyncClient>,
    persistence: PersistenceAdapter,
    finalizer: FinalizationHandler,
    intent: ReturnIntent,
    profile: ProfileStore,
    step_index: usize,
    pending: Option<Narrowing>,
}

impl Wizard {
    /// Mount the wizard, resuming persisted progress when there is any
    pub fn mount(
        registry: Arc<StepRegistry>,
        client: Arc<dyn SyncClient>,
        persistence: PersistenceAdapter,
        finalizer: FinalizationHandler,
        intent: ReturnIntent,
    ) -> Self {
        let resumed = ResumeManager::new(&registry, &persistence, &intent).mount();
        Self {
            registry,
            client,
            persistence,
            finalizer,
            intent,
            profile: resumed.profile,
            step_index: resumed.step_index,
            pending: None,
        }
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn session_id(&self) -> Option<&str> {
        self.profile.session_id()
    }

    pub fn profile(&self) -> &ProfileStore {
        &self.profile
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn current_step(&self) -> Result<&StepDescriptor, WizardError> {
        Ok(self.registry.describe(self.step_index)?)
    }

    pub fn pending_recommendations(&self) -> Option<&Narrowing> {
        self.pending.as_ref()
    }

    pub fn finalizer(&self) -> &FinalizationHandler {
        &self.finalizer
    }

    pub fn return_intent(&self) -> &ReturnIntent {
        &self.intent
    }

    /// The narrowing result for the active result step, if it is current
    pub fn result_view(&self) -> ResultView {
        let Ok(step) = self.registry.describe(self.step_index) else {
            return ResultView::NotResultStep;
        };
        if step.kind != StepKind::Result {
            return ResultView::NotResultStep;
        }

        let collect = self.registry.collect_step_for(step.index).map(|s| s.index);
        match &self.pending {
            Some(narrowing) if Some(narrowing.collect_step) == collect => {
                ResultView::Fresh(narrowing.recommendations.clone())
            }
            _ => ResultView::Stale,
        }
    }

    pub fn snapshot(&self) -> Result<WizardSnapshot, WizardError> {
        Ok(WizardSnapshot {
            step: self.current_step()?.clone(),
            profile: self.profile.snapshot(),
            results: self.result_view(),
            progress: self.registry.format_progress(self.step_index),
            percentage: self.registry.percentage_complete(self.step_index),
        })
    }

    /// Answer a field of the active collect step. Nothing is synced or persisted.
    pub fn set_field(&mut self, field: FieldName, value: FieldValue) -> Result<(), WizardError> {
        self.set_fields(FieldMap::from([(field, value)]))
    }

    /// Answer several fields of the active collect step at once.
    ///
    /// Either every answer is taken or none is: a field the step does not own, or a value
    /// of the wrong kind, rejects the whole batch.
    pub fn set_fields(&mut self, fields: FieldMap) -> Result<(), WizardError> {
        let step = self.current_step()?;
        for (field, value) in &fields {
            if !step.owns(*field) {
                return Err(ValidationError {
                    field: *field,
                    message: format!("cannot be changed on step '{}'", step.title),
                }
                .into());
            }
            if !value.matches_kind(field.kind()) {
                return Err(ValidationError {
                    field: *field,
                    message: "has the wrong kind of value".to_string(),
                }
                .into());
            }
        }
        self.profile.merge(fields);
        Ok(())
    }

    /// Move forward.
    ///
    /// On a collect step the owned fields are validated and, unless they are already
    /// synced, submitted. Step pointer, profile and persisted state only change once the
    /// remote call succeeded. On the final collect step the wizard finishes instead.
    pub async fn advance(&mut self) -> Result<Transition, WizardError> {
        let registry = Arc::clone(&self.registry);
        let step = registry.describe(self.step_index)?;

        if step.kind != StepKind::Collect {
            let to = step.next.ok_or(OutOfRangeError {
                index: step.index + 1,
                last: registry.last_index(),
            })?;
            return Ok(self.commit_move(step.index, to, false));
        }

        validate_step(step, &self.profile.snapshot())?;
        let remote_call = self.sync_owned_fields(step).await?;

        match step.next {
            Some(to) => Ok(self.commit_move(step.index, to, remote_call)),
            None => self.finish().await,
        }
    }

    /// Move back one step.
    ///
    /// Leaving a collect step requires its answers to be valid. The narrowing shown at the
    /// target is recomputed from the persisted values of the collect step it belongs to,
    /// so going back reproduces what was shown on the way forward.
    pub async fn retreat(&mut self) -> Result<Transition, WizardError> {
        let registry = Arc::clone(&self.registry);
        let step = registry.describe(self.step_index)?;

        let Some(target) = step.previous else {
            return Ok(Transition::Stayed { index: step.index });
        };

        if step.kind == StepKind::Collect {
            validate_step(step, &self.profile.snapshot())?;
        }

        let remote_call = match registry.collect_step_for(target) {
            Some(collect) => self.recompute(collect).await?,
            None => false,
        };

        Ok(self.commit_move(step.index, target, remote_call))
    }

    /// Drop all progress and start over on the entry step
    pub fn restart(&mut self) {
        if let Err(e) = self.persistence.clear() {
            warn!("Failed to clear wizard state: {}", e);
        }
        self.intent.clear();
        self.finalizer.reset();
        self.profile.clear();
        self.pending = None;
        self.step_index = 0;
        info!("Wizard restarted");
    }

    /// Submit the owned fields of a collect step unless the remote service already has them.
    /// Returns whether a remote call was made.
    async fn sync_owned_fields(&mut self, step: &StepDescriptor) -> Result<bool, WizardError> {
        if self.profile.is_synced(&step.owned_fields) {
            debug!(step = step.index, "Owned fields unchanged, skipping submit");
            return Ok(false);
        }

        let fields = self.profile.values_for(&step.owned_fields);
        self.submit(step.index, fields).await?;
        Ok(true)
    }

    /// Recompute the narrowing for `collect` from persisted values
    async fn recompute(&mut self, collect: &StepDescriptor) -> Result<bool, WizardError> {
        let stored = self
            .persistence
            .load()
            .map(|p| p.profile)
            .unwrap_or_else(|| self.profile.committed().clone());
        let fields = stored.values_for(&collect.owned_fields);

        if fields.is_empty() {
            debug!(step = collect.index, "Nothing stored to recompute from");
            self.pending = None;
            return Ok(false);
        }

        self.submit(collect.index, fields).await?;
        Ok(true)
    }

    async fn submit(&mut self, collect_step: usize, fields: FieldMap) -> Result<(), WizardError> {
        let response = self
            .client
            .submit_step(&fields, self.profile.session_id())
            .await
            .inspect_err(|e| warn!(step = collect_step, client = self.client.name(), "Submit failed: {}", e))?;

        self.ensure_session_stable(&response.session_id)?;
        debug!(
            step = collect_step,
            session_id = %response.session_id,
            recommendations = response.recommendations.len(),
            "Step submitted"
        );

        self.profile.commit(response.session_id, fields);
        self.pending = Some(Narrowing {
            collect_step,
            recommendations: response.recommendations,
        });
        Ok(())
    }

    fn ensure_session_stable(&self, received: &str) -> Result<(), SyncError> {
        match self.profile.session_id() {
            Some(expected) if expected != received => {
                warn!(expected, received, "Remote service returned a different session");
                Err(SyncError::session_mismatch(expected, received))
            }
            _ => Ok(()),
        }
    }

    fn commit_move(&mut self, from: usize, to: usize, remote_call: bool) -> Transition {
        self.step_index = to;
        if let Err(e) = self.persistence.save(to, self.profile.committed()) {
            warn!(step = to, "Failed to persist wizard state: {}", e);
        }
        info!(
            from,
            to,
            session_id = self.profile.session_id().unwrap_or("-"),
            skipped = !remote_call,
            "Step transition"
        );
        Transition::Moved {
            from,
            to,
            remote_call,
        }
    }

    async fn finish(&mut self) -> Result<Transition, WizardError> {
        let redirect = self.finalizer.complete(self.profile.session_id()).await?;

        if let Err(e) = self.persistence.clear() {
            warn!("Failed to clear wizard state after finishing: {}", e);
        }
        self.intent.clear();
        self.profile.clear();
        self.pending = None;
        self.step_index = 0;

        Ok(Transition::Finished(redirect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockCall, MockSyncClient};
    use crate::config::FinalizeConfig;
    use crate::state::{Entries, KeyValueStore, MemoryStore, StoreError, WriteBatch};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        mock: MockSyncClient,
        persistence: PersistenceAdapter,
        wizard: Wizard,
    }

    fn fixture() -> Fixture {
        let mock = MockSyncClient::new();
        let persistence = PersistenceAdapter::new(Arc::new(MemoryStore::new()));
        let wizard = mount(&mock, &persistence);
        Fixture {
            mock,
            persistence,
            wizard,
        }
    }

    fn mount(mock: &MockSyncClient, persistence: &PersistenceAdapter) -> Wizard {
        let client: Arc<dyn SyncClient> = Arc::new(mock.clone());
        let finalizer = FinalizationHandler::new(
            Arc::clone(&client),
            &FinalizeConfig {
                min_loading_ms: 0,
                detail_base: "/recommendations".to_string(),
            },
        );
        Wizard::mount(
            StepRegistry::standard(),
            client,
            persistence.clone(),
            finalizer,
            ReturnIntent::new(),
        )
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn answer_identity(wizard: &mut Wizard, name: &str) {
        wizard.set_field(FieldName::Name, text(name)).unwrap();
        wizard.set_field(FieldName::Email, text("a@x.com")).unwrap();
    }

    #[tokio::test]
    async fn test_entry_advances_without_remote_call() {
        let mut f = fixture();
        let transition = f.wizard.advance().await.unwrap();
        assert_eq!(
            transition,
            Transition::Moved {
                from: 0,
                to: 1,
                remote_call: false
            }
        );
        assert!(f.mock.calls().is_empty());
        assert_eq!(f.persistence.load().unwrap().step_index, 1);
    }

    #[tokio::test]
    async fn test_collect_submits_and_persists() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        answer_identity(&mut f.wizard, "Ayu");

        let transition = f.wizard.advance().await.unwrap();
        assert!(matches!(
            transition,
            Transition::Moved {
                from: 1,
                to: 2,
                remote_call: true
            }
        ));
        assert_eq!(f.wizard.session_id(), Some("mock-session-1"));
        assert!(matches!(f.wizard.result_view(), ResultView::Fresh(_)));

        let persisted = f.persistence.load().unwrap();
        assert_eq!(persisted.step_index, 2);
        assert_eq!(persisted.profile.session_id.as_deref(), Some("mock-session-1"));
        assert_eq!(persisted.profile.get(FieldName::Name), Some(&text("Ayu")));
    }

    #[tokio::test]
    async fn test_invalid_answers_block_advance() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        f.wizard.set_field(FieldName::Name, text("Ayu")).unwrap();
        f.wizard.set_field(FieldName::Email, text("not-an-email")).unwrap();

        let err = f.wizard.advance().await.unwrap_err();
        assert!(matches!(err, WizardError::Validation(ref e) if e.field == FieldName::Email));
        assert_eq!(f.wizard.step_index(), 1);
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_fields_is_all_or_nothing() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();

        let mut mixed = FieldMap::new();
        mixed.insert(FieldName::Name, text("Ayu"));
        mixed.insert(FieldName::Email, FieldValue::Number(1.0));
        let err = f.wizard.set_fields(mixed).unwrap_err();
        assert!(matches!(err, WizardError::Validation(ref e) if e.field == FieldName::Email));
        assert!(f.wizard.profile().get(FieldName::Name).is_none());

        let mut foreign = FieldMap::new();
        foreign.insert(FieldName::Name, text("Ayu"));
        foreign.insert(FieldName::City, text("Bandung"));
        assert!(f.wizard.set_fields(foreign).is_err());
        assert!(f.wizard.profile().get(FieldName::Name).is_none());

        let mut identity = FieldMap::new();
        identity.insert(FieldName::Name, text("Ayu"));
        identity.insert(FieldName::Email, text("a@x.com"));
        f.wizard.set_fields(identity).unwrap();
        assert_eq!(f.wizard.profile().get(FieldName::Name), Some(&text("Ayu")));
        assert_eq!(f.wizard.profile().get(FieldName::Email), Some(&text("a@x.com")));
    }

    #[tokio::test]
    async fn test_field_outside_active_step_is_rejected() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        let err = f.wizard.set_field(FieldName::Gpa, FieldValue::Number(3.2)).unwrap_err();
        assert!(matches!(err, WizardError::Validation(_)));
        assert!(f.wizard.profile().get(FieldName::Gpa).is_none());

        let err = f
            .wizard
            .set_field(FieldName::Name, FieldValue::Flag(true))
            .unwrap_err();
        assert!(matches!(err, WizardError::Validation(_)));
    }

    #[tokio::test]
    async fn test_sync_failure_leaves_state_untouched() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        answer_identity(&mut f.wizard, "Ayu");
        f.mock.fail_next(SyncError::network("offline"));

        let err = f.wizard.advance().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(f.wizard.step_index(), 1);
        assert!(f.wizard.session_id().is_none());
        assert_eq!(f.persistence.load().unwrap().step_index, 1);

        // Retrying the same transition succeeds
        f.wizard.advance().await.unwrap();
        assert_eq!(f.wizard.step_index(), 2);
    }

    /// Store that starts rejecting writes once `broken` is set
    #[derive(Default)]
    struct BreakingStore {
        inner: MemoryStore,
        broken: AtomicBool,
    }

    impl KeyValueStore for BreakingStore {
        fn read_all(&self) -> Result<Entries, StoreError> {
            self.inner.read_all()
        }

        fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.apply(batch)
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_block_progress() {
        let mock = MockSyncClient::new();
        let store = Arc::new(BreakingStore::default());
        let persistence = PersistenceAdapter::new(store.clone());
        let mut wizard = mount(&mock, &persistence);

        wizard.advance().await.unwrap();
        assert_eq!(persistence.load().unwrap().step_index, 1);

        store.broken.store(true, Ordering::SeqCst);
        answer_identity(&mut wizard, "Ayu");
        let transition = wizard.advance().await.unwrap();

        assert_eq!(
            transition,
            Transition::Moved {
                from: 1,
                to: 2,
                remote_call: true
            }
        );
        assert_eq!(wizard.step_index(), 2);
        assert_eq!(wizard.session_id(), Some("mock-session-1"));
        assert_eq!(wizard.profile().get(FieldName::Name), Some(&text("Ayu")));
        assert!(matches!(wizard.result_view(), ResultView::Fresh(_)));

        // The last good pair is still what a restart would see
        let persisted = persistence.load().unwrap();
        assert_eq!(persisted.step_index, 1);
        assert!(persisted.profile.session_id.is_none());
        assert!(persisted.profile.get(FieldName::Name).is_none());
    }

    #[tokio::test]
    async fn test_unchanged_fields_skip_submit() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        answer_identity(&mut f.wizard, "Ayu");
        f.wizard.advance().await.unwrap();
        f.wizard.retreat().await.unwrap();
        assert_eq!(f.wizard.step_index(), 1);

        let before = f.mock.submit_count();
        let transition = f.wizard.advance().await.unwrap();
        assert_eq!(
            transition,
            Transition::Moved {
                from: 1,
                to: 2,
                remote_call: false
            }
        );
        assert_eq!(f.mock.submit_count(), before);
    }

    #[tokio::test]
    async fn test_edited_fields_resubmit_with_same_session() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        answer_identity(&mut f.wizard, "Ayu");
        f.wizard.advance().await.unwrap();
        f.wizard.retreat().await.unwrap();

        f.wizard.set_field(FieldName::Name, text("Ayu Lestari")).unwrap();
        f.wizard.advance().await.unwrap();

        assert_eq!(f.wizard.session_id(), Some("mock-session-1"));
        assert_eq!(f.mock.session_count(), 1);
        match f.mock.calls().last() {
            Some(MockCall::Submit { session_id, fields }) => {
                assert_eq!(session_id.as_deref(), Some("mock-session-1"));
                assert_eq!(fields.get(&FieldName::Name), Some(&text("Ayu Lestari")));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    /// Hands out a new session id on every call
    struct DriftingClient {
        calls: std::sync::Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl SyncClient for DriftingClient {
        fn name(&self) -> &str {
            "drifting"
        }

        async fn submit_step(
            &self,
            _fields: &FieldMap,
            _session_id: Option<&str>,
        ) -> Result<crate::api::StepSubmitResponse, SyncError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            Ok(crate::api::StepSubmitResponse {
                session_id: format!("s-{}", *calls),
                recommendations: Vec::new(),
            })
        }

        async fn resolve_final(&self, session_id: &str) -> Result<String, SyncError> {
            Ok(session_id.to_string())
        }
    }

    #[tokio::test]
    async fn test_session_mismatch_is_not_applied() {
        let client: Arc<dyn SyncClient> = Arc::new(DriftingClient {
            calls: std::sync::Mutex::new(0),
        });
        let persistence = PersistenceAdapter::new(Arc::new(MemoryStore::new()));
        let finalizer = FinalizationHandler::new(Arc::clone(&client), &FinalizeConfig::default());
        let mut wizard = Wizard::mount(
            StepRegistry::standard(),
            client,
            persistence.clone(),
            finalizer,
            ReturnIntent::new(),
        );

        wizard.advance().await.unwrap();
        answer_identity(&mut wizard, "Ayu");
        wizard.advance().await.unwrap();
        assert_eq!(wizard.session_id(), Some("s-1"));
        wizard.advance().await.unwrap();
        wizard.set_field(FieldName::Phone, text("+628123456789")).unwrap();
        wizard.set_field(FieldName::City, text("Bandung")).unwrap();

        let err = wizard.advance().await.unwrap_err();
        assert!(matches!(
            err,
            WizardError::Sync(SyncError::SessionMismatch { .. })
        ));
        assert_eq!(wizard.step_index(), 3);
        assert_eq!(wizard.session_id(), Some("s-1"));
        assert!(wizard.profile().committed().get(FieldName::Phone).is_none());
        assert_eq!(persistence.load().unwrap().step_index, 3);
    }

    #[tokio::test]
    async fn test_retreat_on_entry_is_noop() {
        let mut f = fixture();
        let transition = f.wizard.retreat().await.unwrap();
        assert_eq!(transition, Transition::Stayed { index: 0 });
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_retreat_to_entry_makes_no_call() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        answer_identity(&mut f.wizard, "Ayu");

        let transition = f.wizard.retreat().await.unwrap();
        assert_eq!(
            transition,
            Transition::Moved {
                from: 1,
                to: 0,
                remote_call: false
            }
        );
        assert!(f.mock.calls().is_empty());
        // Answers survive going back
        assert_eq!(f.wizard.profile().get(FieldName::Name), Some(&text("Ayu")));
    }

    #[tokio::test]
    async fn test_retreat_requires_valid_collect_step() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        f.wizard.set_field(FieldName::Name, text("Ayu")).unwrap();

        let err = f.wizard.retreat().await.unwrap_err();
        assert!(matches!(err, WizardError::Validation(_)));
        assert_eq!(f.wizard.step_index(), 1);
    }

    #[tokio::test]
    async fn test_resumed_result_step_is_stale() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        answer_identity(&mut f.wizard, "Ayu");
        f.wizard.advance().await.unwrap();

        let resumed = mount(&f.mock, &f.persistence);
        assert_eq!(resumed.step_index(), 2);
        assert_eq!(resumed.result_view(), ResultView::Stale);
        assert_eq!(resumed.return_intent().peek(), Some(ReturnTarget::Results));
        let calls = f.mock.calls().len();
        drop(resumed);
        assert_eq!(f.mock.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_restart_clears_everything() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        answer_identity(&mut f.wizard, "Ayu");
        f.wizard.advance().await.unwrap();

        f.wizard.restart();
        assert_eq!(f.wizard.step_index(), 0);
        assert!(f.wizard.session_id().is_none());
        assert!(f.wizard.profile().get(FieldName::Name).is_none());
        assert!(f.persistence.load().is_none());
        assert!(f.wizard.return_intent().peek().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_reports_progress() {
        let mut f = fixture();
        f.wizard.advance().await.unwrap();
        let snapshot = f.wizard.snapshot().unwrap();
        assert_eq!(snapshot.step_index(), 1);
        assert_eq!(snapshot.step.kind, StepKind::Collect);
        assert!(snapshot.progress.starts_with("[Identity]"));
        assert_eq!(snapshot.results, ResultView::NotResultStep);
    }
}
