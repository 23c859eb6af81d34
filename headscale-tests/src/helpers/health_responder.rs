//! Local `/health` endpoint that fails a configurable number of times

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Clone)]
struct ResponderState {
    failures: u32,
    failure_status: StatusCode,
    hits: Arc<AtomicU32>,
}

async fn health(State(state): State<ResponderState>) -> StatusCode {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    if hit <= state.failures {
        debug!(hit, "health responder failing probe");
        state.failure_status
    } else {
        StatusCode::OK
    }
}

/// HTTP server answering `GET /health`: `failures` times with an error
/// status, then 200
pub struct HealthResponder {
    addr: SocketAddr,
    hits: Arc<AtomicU32>,
    server: JoinHandle<()>,
}

impl HealthResponder {
    pub async fn start(failures: u32) -> std::io::Result<Self> {
        Self::start_with_status(failures, StatusCode::SERVICE_UNAVAILABLE).await
    }

    /// Like [`start`](Self::start), failing with `status` instead of 503.
    pub async fn start_with_status(failures: u32, status: StatusCode) -> std::io::Result<Self> {
        let hits = Arc::new(AtomicU32::new(0));
        let state = ResponderState {
            failures,
            failure_status: status,
            hits: hits.clone(),
        };
        let app = Router::new()
            .route("/health", get(health))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, hits, server })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self) -> String {
        format!("http://{}/health", self.addr)
    }

    /// Number of probes answered so far.
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for HealthResponder {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A local port with nothing listening on it.
pub async fn unused_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}
