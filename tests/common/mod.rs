// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use training_academy::config::Config;
use training_academy::db::{ChangeFeed, DocumentStore, FirestoreDb, MemoryStore, Store};
use training_academy::error::AppError;
use training_academy::middleware::auth::create_jwt;
use training_academy::models::{
    AccessDecision, Conversation, ConversationPatch, Message, SenderRole, UserRecord, UserStatus,
};
use training_academy::routes::create_router;
use training_academy::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project", Duration::from_millis(100))
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Unique suffix for test isolation against a shared emulator.
#[allow(dead_code)]
pub fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

// ─── Test App ────────────────────────────────────────────────

/// Router plus handles to what it was built from.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
}

/// Create a test app backed by a fresh in-memory store.
#[allow(dead_code)]
pub fn create_test_app() -> (TestApp, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (create_test_app_with(Config::test_default(), store.clone()), store)
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config, store: Store) -> TestApp {
    let state = Arc::new(AppState::new(config, store));
    TestApp {
        router: create_router(state.clone()),
        state,
    }
}

impl TestApp {
    /// Session token for `uid`, signed with the app's key.
    #[allow(dead_code)]
    pub fn token(&self, uid: &str) -> String {
        create_jwt(
            uid,
            Some("Test User"),
            Some("test@example.com"),
            &self.state.config.jwt_signing_key,
        )
        .unwrap()
    }

    /// Send a request and decode the JSON body (Null when empty).
    #[allow(dead_code)]
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        uid: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(uid) = uid {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(uid)));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    /// Open a server-sent event stream.
    #[allow(dead_code)]
    pub async fn open_stream(&self, uri: &str, uid: &str) -> (StatusCode, EventReader) {
        let request = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(uid)))
            .body(Body::empty())
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let reader = EventReader {
            body: response.into_body().into_data_stream(),
            buf: String::new(),
        };
        (status, reader)
    }
}

/// Reads named events off a server-sent event body.
#[allow(dead_code)]
pub struct EventReader {
    body: axum::body::BodyDataStream,
    buf: String,
}

#[allow(dead_code)]
impl EventReader {
    /// Next event as `(name, data)`, skipping keep-alive comments.
    /// `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<(String, serde_json::Value)> {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let frame: String = self.buf.drain(..end + 2).collect();
                let mut name = "message".to_string();
                let mut data = String::new();
                for line in frame.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        name = value.trim().to_string();
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data.push_str(value.trim_start());
                    }
                }
                if data.is_empty() {
                    continue;
                }
                let json = serde_json::from_str(&data).unwrap_or(serde_json::Value::String(data));
                return Some((name, json));
            }

            let chunk = self.body.next().await?.ok()?;
            self.buf.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

// ─── Fixtures ────────────────────────────────────────────────

/// Store a user record directly.
#[allow(dead_code)]
pub async fn seed_user(
    store: &dyn DocumentStore,
    uid: &str,
    role: Option<&str>,
    status: UserStatus,
) -> UserRecord {
    let mut user = UserRecord::new_pending(
        uid,
        &format!("User {}", uid),
        &format!("{}@example.com", uid),
        chrono::Utc::now(),
    );
    user.role = role.map(str::to_string);
    user.status = status;
    store.upsert_user(&user).await.unwrap();
    user
}

// ─── Failure Injection ───────────────────────────────────────

/// Memory store whose individual operations can be made to fail.
#[allow(dead_code)]
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_recent_conversations: AtomicBool,
    pub fail_pending_users: AtomicBool,
    pub fail_summary_writes: AtomicBool,
    pub fail_appends: AtomicBool,
    pub fail_user_reads: AtomicBool,
    pub fail_thread_reads: AtomicBool,
    pub fail_reply_reads: AtomicBool,
    /// Injected failures look like a security-rule rejection
    pub as_permission_denied: AtomicBool,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<(), AppError> {
        if !flag.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.as_permission_denied.load(Ordering::SeqCst) {
            Err(AppError::from_store(format!(
                "PERMISSION_DENIED: Missing or insufficient permissions ({})",
                what
            )))
        } else {
            Err(AppError::Database(format!("injected failure: {}", what)))
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>, AppError> {
        self.check(&self.fail_user_reads, "get_user")?;
        self.inner.get_user(uid).await
    }

    async fn upsert_user(&self, user: &UserRecord) -> Result<(), AppError> {
        self.inner.upsert_user(user).await
    }

    async fn delete_user(&self, uid: &str) -> Result<(), AppError> {
        self.inner.delete_user(uid).await
    }

    async fn users_with_status(&self, status: UserStatus) -> Result<Vec<UserRecord>, AppError> {
        self.check(&self.fail_pending_users, "users_with_status")?;
        self.inner.users_with_status(status).await
    }

    async fn set_user_status(&self, uid: &str, status: UserStatus) -> Result<(), AppError> {
        self.inner.set_user_status(uid, status).await
    }

    async fn apply_access_decision(
        &self,
        uid: &str,
        decision: &AccessDecision,
    ) -> Result<(), AppError> {
        self.inner.apply_access_decision(uid, decision).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, AppError> {
        self.inner.get_conversation(id).await
    }

    async fn merge_conversation(
        &self,
        id: &str,
        patch: &ConversationPatch,
    ) -> Result<(), AppError> {
        if patch.last_message.is_some() {
            self.check(&self.fail_summary_writes, "merge_conversation")?;
        }
        self.inner.merge_conversation(id, patch).await
    }

    async fn recent_conversations(&self, limit: u32) -> Result<Vec<Conversation>, AppError> {
        self.check(&self.fail_recent_conversations, "recent_conversations")?;
        self.inner.recent_conversations(limit).await
    }

    async fn append_message(&self, message: &Message) -> Result<(), AppError> {
        self.check(&self.fail_appends, "append_message")?;
        self.inner.append_message(message).await
    }

    async fn thread(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        self.check(&self.fail_thread_reads, "thread")?;
        self.inner.thread(conversation_id).await
    }

    async fn latest_messages_from(
        &self,
        conversation_id: &str,
        sender: SenderRole,
        limit: u32,
    ) -> Result<Vec<Message>, AppError> {
        self.check(&self.fail_reply_reads, "latest_messages_from")?;
        self.inner
            .latest_messages_from(conversation_id, sender, limit)
            .await
    }

    fn change_feed(&self) -> ChangeFeed {
        self.inner.change_feed()
    }
}

// ─── Mock Gemini Endpoint ────────────────────────────────────

/// In-process stand-in for the completion endpoint.
#[allow(dead_code)]
pub struct MockGemini {
    pub base_url: String,
    pub calls: Arc<AtomicUsize>,
    /// Last request body received
    pub last_body: Arc<std::sync::Mutex<Option<serde_json::Value>>>,
}

/// Start a mock endpoint that answers every call with `status` and `body`.
#[allow(dead_code)]
pub async fn start_mock_gemini(status: StatusCode, body: serde_json::Value) -> MockGemini {
    use axum::{extract::State, routing::post, Json, Router};

    #[derive(Clone)]
    struct MockState {
        status: StatusCode,
        body: serde_json::Value,
        calls: Arc<AtomicUsize>,
        last_body: Arc<std::sync::Mutex<Option<serde_json::Value>>>,
    }

    async fn generate(
        State(state): State<MockState>,
        Json(request): Json<serde_json::Value>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        state.calls.fetch_add(1, Ordering::SeqCst);
        *state.last_body.lock().unwrap() = Some(request);
        (state.status, Json(state.body.clone()))
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let last_body = Arc::new(std::sync::Mutex::new(None));
    let state = MockState {
        status,
        body,
        calls: calls.clone(),
        last_body: last_body.clone(),
    };

    // Model path segment contains ':' so match the whole tail.
    let app = Router::new()
        .route("/models/{*rest}", post(generate))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockGemini {
        base_url: format!("http://{}", addr),
        calls,
        last_body,
    }
}

/// A successful completion response carrying `text`.
#[allow(dead_code)]
pub fn gemini_text_response(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [
            { "content": { "role": "model", "parts": [ { "text": text } ] } }
        ]
    })
}

/// Config whose assistant talks to `mock`.
#[allow(dead_code)]
pub fn config_with_gemini(mock: &MockGemini) -> Config {
    Config {
        gemini_api_key: Some("test-key".to_string()),
        gemini_base_url: mock.base_url.clone(),
        ..Config::test_default()
    }
}

/// Await `future` or fail the test after a generous timeout.
#[allow(dead_code)]
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out waiting for live update")
}
