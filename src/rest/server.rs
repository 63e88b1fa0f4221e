//! Stub server lifecycle management.
//!
//! Binds the stub API in a background task and hands back the bound address, so a
//! wizard (or a test) can talk to it on an ephemeral port.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::rest::{build_router, ApiState};

/// Handle to a running stub server; dropping it shuts the server down
pub struct StubServer {
    addr: SocketAddr,
    state: ApiState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<JoinHandle<()>>,
}

impl StubServer {
    /// Bind `addr` and start serving in the background
    pub async fn start(state: ApiState, addr: SocketAddr) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind stub API on {}", addr))?;
        let addr = listener
            .local_addr()
            .context("Failed to read stub API address")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let router = build_router(state.clone());

        let handle = tokio::spawn(async move {
            tracing::info!("Stub API listening on http://{}", addr);
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("Stub API failed: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL for [`crate::api::HttpSyncClient`]
    pub fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    pub fn state(&self) -> &ApiState {
        &self.state
    }

    /// Stop the server and wait for in-flight requests to finish
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
        tracing::info!("Stub API stopped");
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
