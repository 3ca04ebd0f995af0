//! In-process pipeline server for integration tests.
//!
//! Start endpoints answer with whatever the test configured.  Every stream
//! request is handed to the test as a `StreamHandle`, which pushes events
//! down that one connection; dropping the handle closes it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use vibe_client::{ApiBase, ApiClient};

pub struct StreamHandle {
    pub path: String,
    tx: mpsc::UnboundedSender<Event>,
}

impl StreamHandle {
    pub fn progress(&self, payload: Value) {
        self.send(Event::default().event("progress").data(payload.to_string()));
    }

    pub fn progress_raw(&self, data: &str) {
        self.send(Event::default().event("progress").data(data));
    }

    pub fn complete(&self, payload: Value) {
        self.send(Event::default().event("complete").data(payload.to_string()));
    }

    pub fn error(&self, message: &str) {
        self.send(
            Event::default()
                .event("error")
                .data(json!({ "message": message }).to_string()),
        );
    }

    pub fn ping(&self) {
        self.send(Event::default().comment("ping"));
    }

    /// The client has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

#[derive(Default)]
struct Shared {
    start_responses: HashMap<String, (StatusCode, Value)>,
    start_calls: Vec<(String, Option<Value>)>,
    stream_status: HashMap<String, StatusCode>,
    search_delays: HashMap<String, u64>,
    search_results: HashMap<String, Value>,
    authenticated: bool,
}

#[derive(Clone)]
struct AppState {
    shared: Arc<Mutex<Shared>>,
    streams: mpsc::UnboundedSender<StreamHandle>,
}

pub struct MockServer {
    pub base: ApiBase,
    shared: Arc<Mutex<Shared>>,
    streams: mpsc::UnboundedReceiver<StreamHandle>,
}

impl MockServer {
    pub async fn start() -> Self {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let (streams_tx, streams_rx) = mpsc::unbounded_channel();
        let state = AppState {
            shared: shared.clone(),
            streams: streams_tx,
        };

        let app = Router::new()
            .route("/api/sync", post(start_stage))
            .route("/api/sync/liked", post(start_stage))
            .route("/api/download", post(start_stage))
            .route("/api/embed", post(start_stage))
            .route("/api/download/verify", post(verify))
            .route("/api/sync/stream", get(stream))
            .route("/api/download/stream", get(stream))
            .route("/api/embed/stream", get(stream))
            .route("/api/search", post(search))
            .route("/api/auth/status", get(auth_status))
            .route("/api/auth/url", get(auth_url))
            .route("/api/auth/callback", get(auth_callback))
            .route("/api/library", get(library))
            .route("/health", get(health))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: ApiBase::parse(&format!("http://{}", addr)).unwrap(),
            shared,
            streams: streams_rx,
        }
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(self.base.clone(), Some(Duration::from_secs(5))).unwrap()
    }

    pub fn respond_to_start(&self, path: &str, status: StatusCode, body: Value) {
        self.shared
            .lock()
            .unwrap()
            .start_responses
            .insert(path.to_string(), (status, body));
    }

    pub fn start_calls(&self) -> Vec<(String, Option<Value>)> {
        self.shared.lock().unwrap().start_calls.clone()
    }

    pub fn fail_stream(&self, path: &str, status: StatusCode) {
        self.shared
            .lock()
            .unwrap()
            .stream_status
            .insert(path.to_string(), status);
    }

    pub fn search_results(&self, query: &str, results: Value, delay_ms: u64) {
        let mut shared = self.shared.lock().unwrap();
        shared.search_results.insert(query.to_string(), results);
        shared.search_delays.insert(query.to_string(), delay_ms);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.shared.lock().unwrap().authenticated = authenticated;
    }

    /// Next stream connection opened by the client.
    pub async fn next_stream(&mut self) -> StreamHandle {
        tokio::time::timeout(Duration::from_secs(2), self.streams.recv())
            .await
            .expect("no stream connection within 2s")
            .expect("server gone")
    }

    /// True if a stream connection is waiting to be picked up.
    pub fn has_pending_stream(&mut self) -> bool {
        self.streams.try_recv().is_ok()
    }
}

/// Wait until the watched value satisfies `pred`, failing after two seconds.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, mut pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        {
            let current = rx.borrow_and_update();
            if pred(&current) {
                return current.clone();
            }
        }
        tokio::time::timeout_at(deadline, rx.changed())
            .await
            .expect("timed out waiting for state")
            .expect("sender dropped");
    }
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub fn song(id: &str, title: &str, score: f64) -> Value {
    json!({
        "spotify_id": id,
        "title": title,
        "artist": "Artist",
        "album": "Album",
        "album_art_url": "",
        "spotify_link": format!("https://open.spotify.com/track/{}", id),
        "similarity_score": score,
    })
}

async fn start_stage(State(state): State<AppState>, uri: Uri, body: Bytes) -> Response {
    let path = uri.path().to_string();
    let body = serde_json::from_slice::<Value>(&body).ok();
    let mut shared = state.shared.lock().unwrap();
    shared.start_calls.push((path.clone(), body));
    let (status, response) = shared
        .start_responses
        .get(&path)
        .cloned()
        .unwrap_or((StatusCode::OK, json!({ "status": "started", "total": 1 })));
    (status, Json(response)).into_response()
}

async fn stream(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let failure = state.shared.lock().unwrap().stream_status.get(&path).copied();
    if let Some(status) = failure {
        return status.into_response();
    }

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let _ = state.streams.send(StreamHandle { path, tx });
    let events = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });
    Sse::new(events).into_response()
}

async fn search(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let query = body["query"].as_str().unwrap_or_default().to_string();
    let (delay, results) = {
        let shared = state.shared.lock().unwrap();
        (
            shared.search_delays.get(&query).copied().unwrap_or(0),
            shared.search_results.get(&query).cloned(),
        )
    };
    tokio::time::sleep(Duration::from_millis(delay)).await;
    match results {
        Some(results) => Json(json!({ "results": results })).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "collection unavailable" })),
        )
            .into_response(),
    }
}

async fn verify() -> Json<Value> {
    Json(json!({ "status": "ok", "fixed": { "marked_done": 2, "marked_pending": 1 } }))
}

async fn auth_status(State(state): State<AppState>) -> Json<Value> {
    let authenticated = state.shared.lock().unwrap().authenticated;
    Json(json!({ "authenticated": authenticated }))
}

async fn auth_url() -> Json<Value> {
    Json(json!({ "url": "https://accounts.spotify.com/authorize?client_id=test" }))
}

async fn auth_callback(State(state): State<AppState>, uri: Uri) -> Response {
    if uri.query() == Some("code=good") {
        state.shared.lock().unwrap().authenticated = true;
        Json(json!({ "status": "authenticated" })).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Invalid authorization code" })),
        )
            .into_response()
    }
}

async fn library() -> Json<Value> {
    Json(json!({
        "songs": [{
            "spotify_id": "a1",
            "title": "Nightcall",
            "artist": "Kavinsky",
            "album": "OutRun",
            "download_status": "done",
            "embed_status": "stored",
        }],
        "stats": { "total": 1, "downloaded": 1, "embedded": 1 },
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
