//! In-process downstream HTTP endpoint for relay tests

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One request as seen by the downstream endpoint
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone)]
struct DownstreamState {
    status: StatusCode,
    delay: Duration,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

pub struct Downstream {
    pub url: String,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl Downstream {
    /// Endpoint answering every POST with `status`
    pub async fn start(status: u16) -> Self {
        Self::start_with_delay(status, Duration::ZERO).await
    }

    /// Endpoint that waits `delay` before answering
    pub async fn start_with_delay(status: u16, delay: Duration) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = DownstreamState {
            status: StatusCode::from_u16(status).expect("valid status"),
            delay,
            received: received.clone(),
        };

        let app = Router::new().route("/ingest", post(ingest)).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}/ingest", addr),
            received,
        }
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }
}

async fn ingest(
    State(state): State<DownstreamState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    state
        .received
        .lock()
        .unwrap()
        .push(ReceivedRequest { headers, body });

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    (state.status, format!("downstream says {}", state.status.as_u16()))
}

/// URL on which nothing is listening
pub async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/ingest", addr)
}
