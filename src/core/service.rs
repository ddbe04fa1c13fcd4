//! Per-run metadata service
//!
//! A lightweight localhost endpoint that converter subprocesses can query
//! for shared per-run metadata (note root, content options, the known
//! filename→id map). It runs on a background thread for the duration of a
//! batch; the orchestrator starts it before spawning workers and stops it
//! only after every worker has been joined, so no background work survives
//! a run.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use axum::{extract::State, response::Json, routing::get, Router};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tokio::sync::oneshot;

/// Shared per-run metadata
#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    /// Note root directory
    pub root: String,
    /// Content options in effect for this run
    pub content_options: Vec<String>,
    /// filename → id for every note currently in the graph
    pub notes: HashMap<String, i64>,
}

/// The metadata service, started per run
pub struct MetadataService;

/// Handle to a running service. `stop` sends the shutdown signal and waits
/// for the thread to terminate; dropping the handle does the same.
pub struct ServiceHandle {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MetadataService {
    /// Bind 127.0.0.1 on an ephemeral port and serve until stopped
    pub fn start(meta: RunMeta) -> Result<ServiceHandle> {
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<SocketAddr, String>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("arbor-meta".to_string())
            .spawn(move || serve(meta, ready_tx, shutdown_rx))
            .into_diagnostic()?;

        let addr = ready_rx
            .recv()
            .into_diagnostic()?
            .map_err(|e| miette::miette!("metadata service failed to start: {}", e))?;

        Ok(ServiceHandle {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }
}

fn serve(
    meta: RunMeta,
    ready_tx: mpsc::Sender<std::result::Result<SocketAddr, String>>,
    shutdown_rx: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::bind(("127.0.0.1", 0)).await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
        };
        let _ = ready_tx.send(Ok(addr));

        let state = Arc::new(meta);
        let app = Router::new()
            .route("/meta", get(meta_handler))
            .route("/notes", get(notes_handler))
            .with_state(state);

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            eprintln!("Warning: metadata service error: {}", e);
        }
    });
}

async fn meta_handler(State(state): State<Arc<RunMeta>>) -> Json<RunMeta> {
    Json((*state).clone())
}

async fn notes_handler(State(state): State<Arc<RunMeta>>) -> Json<HashMap<String, i64>> {
    Json(state.notes.clone())
}

impl ServiceHandle {
    /// Base URL of the running service
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Signal shutdown and wait for the service thread to terminate
    pub fn stop(mut self) {
        self.shut_down();
    }

    fn shut_down(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.shut_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_meta() -> RunMeta {
        let mut notes = HashMap::new();
        notes.insert("a.md".to_string(), 1);
        notes.insert("b.md".to_string(), 2);
        RunMeta {
            root: "/tmp/notes".to_string(),
            content_options: vec!["--mathjax".to_string()],
            notes,
        }
    }

    #[test]
    fn test_service_answers_and_stops() {
        let handle = MetadataService::start(run_meta()).unwrap();
        let url = handle.url().to_string();

        let meta: serde_json::Value = reqwest::blocking::get(format!("{}/meta", url))
            .unwrap()
            .json()
            .unwrap();
        assert_eq!(meta["root"], "/tmp/notes");
        assert_eq!(meta["content_options"][0], "--mathjax");

        let notes: HashMap<String, i64> = reqwest::blocking::get(format!("{}/notes", url))
            .unwrap()
            .json()
            .unwrap();
        assert_eq!(notes.get("a.md"), Some(&1));

        handle.stop();

        // The listener is gone once stop returns.
        assert!(reqwest::blocking::get(format!("{}/meta", url)).is_err());
    }

    #[test]
    fn test_drop_terminates_service() {
        let url = {
            let handle = MetadataService::start(run_meta()).unwrap();
            handle.url().to_string()
        };
        assert!(reqwest::blocking::get(format!("{}/meta", url)).is_err());
    }
}
