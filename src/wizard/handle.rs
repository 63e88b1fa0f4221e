//! Serialized access to a wizard from any number of callers.
//!
//! The wizard runs inside one tokio task and receives actions through a channel, so
//! actions are applied strictly in the order they were sent. A second action sent while a
//! remote call is outstanding waits in the queue instead of racing the first.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{Transition, Wizard, WizardError, WizardSnapshot};
use crate::profile::{FieldMap, FieldName, FieldValue};

const QUEUE_DEPTH: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, WizardError>>;

enum Command {
    Advance(Reply<Transition>),
    Retreat(Reply<Transition>),
    SetFields {
        fields: FieldMap,
        reply: Reply<()>,
    },
    Snapshot(Reply<WizardSnapshot>),
    Restart(Reply<()>),
}

/// Cloneable handle to a wizard running in its own task
#[derive(Clone)]
pub struct WizardHandle {
    tx: mpsc::Sender<Command>,
    busy: watch::Receiver<bool>,
}

impl WizardHandle {
    /// Move `wizard` into a task. The join handle yields it back once every handle is dropped.
    pub fn spawn(wizard: Wizard) -> (Self, JoinHandle<Wizard>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let (busy_tx, busy_rx) = watch::channel(false);
        let task = tokio::spawn(run(wizard, rx, busy_tx));
        (Self { tx, busy: busy_rx }, task)
    }

    pub async fn advance(&self) -> Result<Transition, WizardError> {
        self.request(Command::Advance).await
    }

    pub async fn retreat(&self) -> Result<Transition, WizardError> {
        self.request(Command::Retreat).await
    }

    pub async fn set_field(&self, field: FieldName, value: FieldValue) -> Result<(), WizardError> {
        self.set_fields(FieldMap::from([(field, value)])).await
    }

    pub async fn set_fields(&self, fields: FieldMap) -> Result<(), WizardError> {
        self.request(|reply| Command::SetFields { fields, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<WizardSnapshot, WizardError> {
        self.request(Command::Snapshot).await
    }

    pub async fn restart(&self) -> Result<(), WizardError> {
        self.request(Command::Restart).await
    }

    /// True while an action is being processed
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    /// Watch the busy flag, e.g. to disable navigation controls
    pub fn busy(&self) -> watch::Receiver<bool> {
        self.busy.clone()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, WizardError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| WizardError::Stopped)?;
        response.await.map_err(|_| WizardError::Stopped)?
    }
}

async fn run(
    mut wizard: Wizard,
    mut rx: mpsc::Receiver<Command>,
    busy: watch::Sender<bool>,
) -> Wizard {
    while let Some(command) = rx.recv().await {
        busy.send_replace(true);
        match command {
            Command::Advance(reply) => {
                let _ = reply.send(wizard.advance().await);
            }
            Command::Retreat(reply) => {
                let _ = reply.send(wizard.retreat().await);
            }
            Command::SetFields { fields, reply } => {
                let _ = reply.send(wizard.set_fields(fields));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(wizard.snapshot());
            }
            Command::Restart(reply) => {
                wizard.restart();
                let _ = reply.send(Ok(()));
            }
        }
        busy.send_replace(false);
    }
    debug!("All wizard handles dropped, stopping");
    wizard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::api::{MockCall, MockSyncClient, SyncClient};
    use crate::config::FinalizeConfig;
    use crate::state::{MemoryStore, PersistenceAdapter};
    use crate::steps::StepRegistry;
    use crate::wizard::{FinalizationHandler, ReturnIntent};

    fn spawn(mock: &MockSyncClient) -> (WizardHandle, JoinHandle<Wizard>) {
        let client: Arc<dyn SyncClient> = Arc::new(mock.clone());
        let finalizer = FinalizationHandler::new(Arc::clone(&client), &FinalizeConfig::default());
        let wizard = Wizard::mount(
            StepRegistry::standard(),
            client,
            PersistenceAdapter::new(Arc::new(MemoryStore::new())),
            finalizer,
            ReturnIntent::new(),
        );
        WizardHandle::spawn(wizard)
    }

    #[tokio::test]
    async fn test_actions_are_queued_in_order() {
        let mock = MockSyncClient::with_latency(Duration::from_millis(30));
        let (handle, task) = spawn(&mock);

        handle.advance().await.unwrap();
        handle
            .set_fields(FieldMap::from([
                (FieldName::Name, FieldValue::Text("Ayu".to_string())),
                (FieldName::Email, FieldValue::Text("a@x.com".to_string())),
            ]))
            .await
            .unwrap();

        // Issue advance and retreat without waiting in between
        let forward = handle.clone();
        let advance = tokio::spawn(async move { forward.advance().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(handle.is_busy());
        let retreat = handle.retreat().await.unwrap();
        let advance = advance.await.unwrap().unwrap();

        assert_eq!(
            advance,
            Transition::Moved {
                from: 1,
                to: 2,
                remote_call: true
            }
        );
        assert_eq!(
            retreat,
            Transition::Moved {
                from: 2,
                to: 1,
                remote_call: true
            }
        );

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], MockCall::Submit { session_id: None, .. }));
        assert!(matches!(
            &calls[1],
            MockCall::Submit { session_id: Some(id), .. } if id == "mock-session-1"
        ));

        drop(handle);
        let wizard = task.await.unwrap();
        assert_eq!(wizard.step_index(), 1);
    }

    #[tokio::test]
    async fn test_stopped_wizard_reports_error() {
        let mock = MockSyncClient::new();
        let (handle, task) = spawn(&mock);
        task.abort();
        let _ = task.await;

        assert!(matches!(handle.advance().await, Err(WizardError::Stopped)));
    }

    #[tokio::test]
    async fn test_snapshot_through_handle() {
        let mock = MockSyncClient::new();
        let (handle, _task) = spawn(&mock);
        handle.advance().await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.step_index(), 1);
        assert!(!handle.is_busy());
    }
}
