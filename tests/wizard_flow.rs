//! End-to-end wizard flows against the in-memory scoring service
//!
//! These tests verify that:
//! - Progress is persisted after every committed step and resumed on the next mount
//! - Unchanged steps are never resubmitted
//! - The session id never changes once assigned
//! - Remote calls follow the order of user actions, even when issued concurrently
//! - Going back reproduces the narrowing result shown on the way forward
//! - Finalization redirects to the resolved record and cleans up

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use scholar_wizard::api::{MockCall, MockSyncClient, SyncClient, SyncError};
use scholar_wizard::config::FinalizeConfig;
use scholar_wizard::profile::{FieldName, FieldValue};
use scholar_wizard::state::{FileStore, PersistenceAdapter};
use scholar_wizard::steps::StepRegistry;
use scholar_wizard::wizard::{
    FinalizationHandler, ResultView, ReturnIntent, ReturnTarget, Transition, Wizard,
    WizardError, WizardHandle,
};

// ─── Test Context ─────────────────────────────────────────────────────────────

/// Test context holding the state directory and the mock service
struct WizardTestContext {
    _temp_dir: TempDir,
    state_file: std::path::PathBuf,
    mock: MockSyncClient,
    intent: ReturnIntent,
}

impl WizardTestContext {
    fn new() -> Self {
        Self::with_mock(MockSyncClient::new())
    }

    fn with_mock(mock: MockSyncClient) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let state_file = temp_dir.path().join("state").join("wizard-state.json");
        Self {
            _temp_dir: temp_dir,
            state_file,
            mock,
            intent: ReturnIntent::new(),
        }
    }

    fn persistence(&self) -> PersistenceAdapter {
        PersistenceAdapter::new(Arc::new(FileStore::new(&self.state_file)))
    }

    /// Mount a wizard as if the application had just been (re)started
    fn mount(&self) -> Wizard {
        let client: Arc<dyn SyncClient> = Arc::new(self.mock.clone());
        let finalizer = FinalizationHandler::new(
            Arc::clone(&client),
            &FinalizeConfig {
                min_loading_ms: 10,
                detail_base: "/recommendations".to_string(),
            },
        );
        Wizard::mount(
            StepRegistry::standard(),
            client,
            self.persistence(),
            finalizer,
            self.intent.clone(),
        )
    }
}

fn text(s: &str) -> FieldValue {
    FieldValue::Text(s.to_string())
}

fn answers() -> Vec<(FieldName, FieldValue)> {
    vec![
        (FieldName::Name, text("Ayu")),
        (FieldName::Email, text("a@x.com")),
        (FieldName::Phone, text("+6281234567890")),
        (FieldName::City, text("Bandung")),
        (
            FieldName::BirthDate,
            FieldValue::Date(chrono::NaiveDate::from_ymd_opt(2004, 2, 29).unwrap()),
        ),
        (FieldName::Gender, FieldValue::Choice("female".to_string())),
        (FieldName::Address, text("Jl. Dago 12")),
        (
            FieldName::EducationLevel,
            FieldValue::Choice("bachelor".to_string()),
        ),
        (FieldName::Institution, text("Institut Teknologi Bandung")),
        (FieldName::Semester, FieldValue::Number(3.0)),
        (FieldName::FacultyId, text("fti")),
        (FieldName::MajorId, text("informatics")),
        (FieldName::Gpa, FieldValue::Number(3.6)),
        (FieldName::LowIncome, FieldValue::Flag(true)),
        (FieldName::Orphan, FieldValue::Flag(false)),
        (FieldName::HasDisability, FieldValue::Flag(false)),
        (FieldName::HasAchievement, FieldValue::Flag(true)),
        (FieldName::OrganizationExperience, FieldValue::Flag(true)),
    ]
}

/// Fill in the fields of the active step from the standard answers
fn answer_current_step(wizard: &mut Wizard) {
    let owned = wizard.current_step().unwrap().owned_fields.clone();
    for (field, value) in answers() {
        if owned.contains(&field) {
            wizard.set_field(field, value).unwrap();
        }
    }
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_step_is_persisted_and_resumed() {
    let ctx = WizardTestContext::new();
    let mut wizard = ctx.mount();

    wizard.advance().await.unwrap();
    wizard.set_field(FieldName::Name, text("Ayu")).unwrap();
    wizard.set_field(FieldName::Email, text("a@x.com")).unwrap();
    wizard.advance().await.unwrap();

    let session_id = wizard.session_id().unwrap().to_string();
    assert_eq!(wizard.step_index(), 2);
    let persisted = ctx.persistence().load().unwrap();
    assert_eq!(persisted.step_index, 2);
    assert_eq!(persisted.profile.session_id.as_deref(), Some(session_id.as_str()));

    // Reload
    drop(wizard);
    let calls_before = ctx.mock.calls().len();
    let resumed = ctx.mount();

    assert_eq!(resumed.step_index(), 2);
    assert_eq!(resumed.profile().get(FieldName::Name), Some(&text("Ayu")));
    assert_eq!(resumed.session_id(), Some(session_id.as_str()));
    assert_eq!(resumed.result_view(), ResultView::Stale);
    assert_eq!(ctx.mock.calls().len(), calls_before);
    assert_eq!(ctx.intent.take(), Some(ReturnTarget::Results));
    assert_eq!(ctx.intent.take(), None);
}

#[tokio::test]
async fn test_full_run_keeps_one_session_and_redirects() {
    let ctx = WizardTestContext::new();
    ctx.mock.set_record_id("abc123");
    let mut wizard = ctx.mount();

    let mut sessions = Vec::new();
    let redirect = loop {
        answer_current_step(&mut wizard);
        match wizard.advance().await.unwrap() {
            Transition::Finished(redirect) => break redirect,
            Transition::Moved { .. } => {
                if let Some(id) = wizard.session_id() {
                    sessions.push(id.to_string());
                }
            }
            Transition::Stayed { .. } => panic!("advance never stays"),
        }
    };

    assert!(redirect.target.ends_with("/abc123"));
    assert_eq!(redirect.target, "/recommendations/abc123");
    sessions.dedup();
    assert_eq!(sessions.len(), 1);
    assert_eq!(ctx.mock.session_count(), 1);

    // Twelve collect steps, each submitted once, then one resolve
    assert_eq!(ctx.mock.submit_count(), 12);
    assert!(matches!(ctx.mock.calls().last(), Some(MockCall::Resolve { .. })));

    // Completion clears everything
    assert_eq!(wizard.step_index(), 0);
    assert!(wizard.session_id().is_none());
    assert!(ctx.persistence().load().is_none());
    assert!(ctx.intent.peek().is_none());
}

#[tokio::test]
async fn test_idempotent_skip_after_going_back() {
    let ctx = WizardTestContext::new();
    let mut wizard = ctx.mount();

    wizard.advance().await.unwrap();
    for _ in 0..4 {
        answer_current_step(&mut wizard);
        wizard.advance().await.unwrap();
    }
    assert_eq!(wizard.step_index(), 5);
    answer_current_step(&mut wizard);
    let session_id = wizard.session_id().unwrap().to_string();

    // Back to the contact step (5 -> 4 -> 3), then forward again without edits
    wizard.retreat().await.unwrap();
    wizard.retreat().await.unwrap();
    assert_eq!(wizard.step_index(), 3);

    let submits = ctx.mock.submit_count();
    let transition = wizard.advance().await.unwrap();
    assert_eq!(
        transition,
        Transition::Moved {
            from: 3,
            to: 4,
            remote_call: false
        }
    );
    assert_eq!(ctx.mock.submit_count(), submits);
    assert_eq!(wizard.session_id(), Some(session_id.as_str()));
}

#[tokio::test]
async fn test_backward_reproduces_first_result() {
    let ctx = WizardTestContext::new();
    let mut wizard = ctx.mount();

    // S1 -> R1
    wizard.advance().await.unwrap();
    answer_current_step(&mut wizard);
    wizard.advance().await.unwrap();
    let ResultView::Fresh(first_r1) = wizard.result_view() else {
        panic!("R1 should show a fresh result");
    };

    // R1 -> S2 -> R2
    wizard.advance().await.unwrap();
    answer_current_step(&mut wizard);
    wizard.advance().await.unwrap();
    assert_eq!(wizard.step_index(), 4);

    // Back twice from R2
    wizard.retreat().await.unwrap();
    wizard.retreat().await.unwrap();
    assert_eq!(wizard.step_index(), 2);

    assert_eq!(wizard.result_view(), ResultView::Fresh(first_r1));
}

#[tokio::test]
async fn test_sync_failure_then_retry() {
    let ctx = WizardTestContext::new();
    let mut wizard = ctx.mount();
    wizard.advance().await.unwrap();
    answer_current_step(&mut wizard);

    ctx.mock.fail_next(SyncError::http(500, "scoring backend down"));
    let err = wizard.advance().await.unwrap_err();
    assert!(matches!(err, WizardError::Sync(_)));
    assert!(err.is_retryable());
    assert_eq!(wizard.step_index(), 1);
    assert_eq!(ctx.persistence().load().unwrap().step_index, 1);
    assert!(wizard.session_id().is_none());

    wizard.advance().await.unwrap();
    assert_eq!(wizard.step_index(), 2);
    assert_eq!(ctx.persistence().load().unwrap().step_index, 2);
}

#[tokio::test]
async fn test_final_step_failures_stay_on_last_step() {
    let ctx = WizardTestContext::new();
    let mut wizard = ctx.mount();

    while !wizard.current_step().unwrap().is_final() {
        answer_current_step(&mut wizard);
        wizard.advance().await.unwrap();
    }
    answer_current_step(&mut wizard);

    // Submit of the last step fails
    ctx.mock.fail_next(SyncError::invalid_response("truncated body"));
    let err = wizard.advance().await.unwrap_err();
    assert!(matches!(err, WizardError::Sync(SyncError::InvalidResponse { .. })));
    assert_eq!(wizard.step_index(), 23);

    // Submit succeeds, resolve fails
    ctx.mock.fail_next_resolve(SyncError::network("connection reset"));
    let err = wizard.advance().await.unwrap_err();
    assert!(matches!(err, WizardError::Sync(SyncError::NetworkError { .. })));
    assert_eq!(wizard.step_index(), 23);
    assert_eq!(ctx.persistence().load().unwrap().step_index, 23);

    // Retrying only resolves; the last step is already synced
    let submits = ctx.mock.submit_count();
    let transition = wizard.advance().await.unwrap();
    assert!(matches!(transition, Transition::Finished(_)));
    assert_eq!(ctx.mock.submit_count(), submits);
}

#[tokio::test]
async fn test_out_of_range_persisted_step_restarts() {
    let ctx = WizardTestContext::new();
    let mut wizard = ctx.mount();
    wizard.advance().await.unwrap();
    answer_current_step(&mut wizard);
    wizard.advance().await.unwrap();

    let profile = ctx.persistence().load().unwrap().profile;
    ctx.persistence().save(40, &profile).unwrap();

    let restarted = ctx.mount();
    assert_eq!(restarted.step_index(), 0);
    assert!(restarted.session_id().is_none());
    assert!(ctx.persistence().load().is_none());
}

#[tokio::test]
async fn test_concurrent_actions_are_serialized() {
    let ctx = WizardTestContext::with_mock(MockSyncClient::with_latency(Duration::from_millis(20)));
    let mut wizard = ctx.mount();
    wizard.advance().await.unwrap();
    answer_current_step(&mut wizard);

    let (handle, task) = WizardHandle::spawn(wizard);

    // advance, retreat, advance issued back to back from separate tasks
    let mut joins = Vec::new();
    for action in ["advance", "retreat", "advance"] {
        let handle: WizardHandle = handle.clone();
        joins.push(tokio::spawn(async move {
            match action {
                "advance" => handle.advance().await,
                _ => handle.retreat().await,
            }
        }));
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let mut transitions = Vec::new();
    for join in joins {
        transitions.push(join.await.unwrap().unwrap());
    }

    assert_eq!(
        transitions,
        vec![
            Transition::Moved {
                from: 1,
                to: 2,
                remote_call: true
            },
            Transition::Moved {
                from: 2,
                to: 1,
                remote_call: true
            },
            Transition::Moved {
                from: 1,
                to: 2,
                remote_call: false
            },
        ]
    );

    // One create, one recompute on the same session, nothing doubled
    let calls = ctx.mock.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], MockCall::Submit { session_id: None, .. }));
    assert!(matches!(&calls[1], MockCall::Submit { session_id: Some(_), .. }));

    drop(handle);
    let wizard = task.await.unwrap();
    assert_eq!(wizard.step_index(), 2);
    assert_eq!(ctx.persistence().load().unwrap().step_index, 2);
}
