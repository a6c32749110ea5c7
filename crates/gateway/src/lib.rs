//! LINE webhook HTTP server for chatbridge.
//!
//! Routes:
//! - `POST /webhook`: signature check, then one spawned task per event
//! - `GET /health`: liveness plus the number of tracked users
//!
//! Built on Axum.

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use chatbridge_agent::{ChatAgent, ContextAssembler, Reply};
use chatbridge_channels::{LineChannel, LineChannelConfig, SIGNATURE_HEADER};
use chatbridge_core::channel::ReplyChannel;
use chatbridge_core::clock::SystemClock;
use chatbridge_core::persona::Persona;
use chatbridge_memory::WindowedHistory;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<ChatAgent>,
    /// Verifies inbound signatures and parses webhook bodies
    pub line: Arc<LineChannel>,
    /// Delivers replies; the LINE channel unless overridden
    pub replies: Arc<dyn ReplyChannel>,
    pub history: Arc<WindowedHistory>,
    pub body_limit_bytes: usize,
}

impl GatewayState {
    pub fn new(agent: Arc<ChatAgent>, line: Arc<LineChannel>, history: Arc<WindowedHistory>) -> Self {
        Self {
            agent,
            replies: line.clone(),
            line,
            history,
            body_limit_bytes: 1024 * 1024,
        }
    }

    /// Deliver replies somewhere other than the LINE reply endpoint.
    pub fn with_reply_channel(mut self, replies: Arc<dyn ReplyChannel>) -> Self {
        self.replies = replies;
        self
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit_bytes = bytes;
        self
    }
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.body_limit_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Wire up every subsystem from config. Shared by `serve` and `chat`.
pub fn build_agent(
    config: &chatbridge_config::AppConfig,
) -> chatbridge_core::Result<(Arc<ChatAgent>, Arc<WindowedHistory>)> {
    let persona = Persona::load(&config.persona.paths())?;
    info!(summary = %persona.diagnostic_summary(), "Persona loaded");

    let provider = Arc::new(chatbridge_providers::OpenAiCompatProvider::from_config(config)?);

    let window = chrono::TimeDelta::from_std(config.history.retention())
        .map_err(|e| chatbridge_core::Error::Internal(format!("retention window: {e}")))?;
    let mut history = WindowedHistory::new(Arc::new(SystemClock), window);
    if let Some(cap) = config.history.max_entries_per_user {
        history = history.with_max_entries(cap);
    }
    let history = Arc::new(history);

    let agent = Arc::new(ChatAgent::from_config(
        provider,
        history.clone(),
        ContextAssembler::from_persona(&persona),
        config,
    ));
    Ok((agent, history))
}

/// Start the gateway HTTP server.
pub async fn start(config: chatbridge_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let (agent, history) = build_agent(&config)?;
    let line = Arc::new(LineChannel::new(LineChannelConfig::from(&config.line))?);
    if !line.verifies_signatures() {
        warn!("No LINE channel secret configured — webhook signatures are NOT verified");
    }

    if let Some(interval) = config.history.sweep_interval() {
        spawn_sweeper(agent.clone(), history.clone(), interval);
    }

    let state = GatewayState::new(agent, line, history).with_body_limit(config.gateway.body_limit_bytes);
    let app = build_router(Arc::new(state));

    info!(addr = %addr, model = %config.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drop expired turns for users who have gone quiet.
fn spawn_sweeper(agent: Arc<ChatAgent>, history: Arc<WindowedHistory>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = history.purge_expired();
            let locks = agent.prune_locks();
            debug!(purged, locks, users = history.user_count(), "History sweep");
        }
    });
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    users: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        users: state.history.user_count(),
    })
}

/// Per-event outcome reported back to the platform.
fn outcome(reply: &Reply) -> Value {
    if reply.is_fallback() {
        json!({ "status": "fallback" })
    } else {
        json!({ "status": "replied" })
    }
}

async fn webhook_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<Value>>, StatusCode> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    state.line.verify(&body, signature).map_err(|e| {
        warn!(error = %e, "Rejected webhook");
        StatusCode::UNAUTHORIZED
    })?;

    let events = LineChannel::parse_events(&body).map_err(|e| {
        warn!(error = %e, "Malformed webhook body");
        StatusCode::BAD_REQUEST
    })?;

    info!(events = events.len(), "Webhook received");

    let tasks = events.into_iter().map(|event| {
        let state = state.clone();
        tokio::spawn(async move {
            match event {
                Some(event) => state
                    .agent
                    .handle_event(state.replies.as_ref(), &event)
                    .await
                    .map(|reply| outcome(&reply)),
                None => Ok(Value::Null),
            }
        })
    });

    let mut results = Vec::new();
    let mut failed = false;
    for joined in futures::future::join_all(tasks).await {
        match joined {
            Ok(Ok(value)) => results.push(value),
            Ok(Err(e)) => {
                error!(error = %e, "Reply delivery failed");
                failed = true;
            }
            Err(e) => {
                error!(error = %e, "Event task aborted");
                failed = true;
            }
        }
    }

    if failed {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chatbridge_core::error::{ChannelError, ProviderError};
    use chatbridge_core::message::HistoryMessage;
    use chatbridge_core::memory::ConversationHistory;
    use chatbridge_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    /// Echoes the user's text; panics when asked to.
    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            match last.as_str() {
                "panic" => panic!("provider blew up"),
                "fail" => Err(ProviderError::Network("unreachable".into())),
                _ => Ok(ProviderResponse {
                    content: format!("echo: {last}"),
                    model: request.model,
                    usage: None,
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ReplyChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn reply(&self, reply_handle: &str, text: &str) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::DeliveryFailed("HTTP 500".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((reply_handle.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct Harness {
        router: Router,
        history: Arc<WindowedHistory>,
        channel: Arc<RecordingChannel>,
    }

    fn harness_with(channel: RecordingChannel) -> Harness {
        let history = Arc::new(WindowedHistory::with_defaults());
        let agent = Arc::new(ChatAgent::new(
            Arc::new(EchoProvider),
            history.clone(),
            ContextAssembler::new("sys"),
            "test-model",
        ));
        let line = Arc::new(
            LineChannel::new(LineChannelConfig {
                channel_access_token: Some("token".into()),
                channel_secret: Some(SECRET.into()),
                api_url: "http://127.0.0.1:9".into(),
            })
            .unwrap(),
        );
        let channel = Arc::new(channel);
        let state = GatewayState::new(agent, line, history.clone()).with_reply_channel(channel.clone());
        Harness {
            router: build_router(Arc::new(state)),
            history,
            channel,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingChannel::default())
    }

    fn text_event(user: &str, token: &str, text: &str) -> Value {
        json!({
            "type": "message",
            "replyToken": token,
            "source": { "type": "user", "userId": user },
            "message": { "type": "text", "id": "1", "text": text }
        })
    }

    fn signed_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, chatbridge_channels::sign(SECRET, body.as_bytes()))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let h = harness();
        h.history.append("u1", chatbridge_core::message::Role::User, "hi");

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = h.router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["users"], 1);
    }

    #[tokio::test]
    async fn text_event_is_answered_and_recorded() {
        let h = harness();
        let body = json!({ "events": [text_event("u1", "tok-1", "Hello")] }).to_string();

        let response = h.router.oneshot(signed_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!([{ "status": "replied" }]));

        assert_eq!(
            h.channel.sent.lock().unwrap().as_slice(),
            &[("tok-1".to_string(), "echo: Hello".to_string())]
        );
        assert_eq!(
            h.history.history("u1"),
            vec![HistoryMessage::user("Hello"), HistoryMessage::assistant("echo: Hello")]
        );
    }

    #[tokio::test]
    async fn non_text_events_yield_null() {
        let h = harness();
        let follow = json!({ "type": "follow", "replyToken": "t", "source": { "userId": "u1" } });
        let body = json!({ "events": [follow, text_event("u2", "tok-2", "Hi")] }).to_string();

        let response = h.router.oneshot(signed_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!([null, { "status": "replied" }]));
        assert_eq!(h.channel.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn provider_failure_sends_fallback() {
        let h = harness();
        let body = json!({ "events": [text_event("u2", "tok-3", "fail")] }).to_string();

        let response = h.router.oneshot(signed_request(&body)).await.unwrap();
        assert_eq!(json_body(response).await, json!([{ "status": "fallback" }]));
        assert_eq!(
            h.channel.sent.lock().unwrap()[0].1,
            chatbridge_config::DEFAULT_FALLBACK_REPLY
        );
        assert!(h.history.history("u2").is_empty());
    }

    #[tokio::test]
    async fn bad_signature_is_unauthorized() {
        let h = harness();
        let req = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header(SIGNATURE_HEADER, "bm9wZQ==")
            .body(Body::from(r#"{"events":[]}"#))
            .unwrap();

        let response = h.router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_signature_is_unauthorized() {
        let h = harness();
        let req = Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Body::from(r#"{"events":[]}"#))
            .unwrap();

        let response = h.router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let h = harness();
        let response = h.router.oneshot(signed_request("not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn panicking_event_does_not_affect_others() {
        let h = harness();
        let body = json!({
            "events": [text_event("u1", "tok-a", "panic"), text_event("u2", "tok-b", "Hi")]
        })
        .to_string();

        let response = h.router.oneshot(signed_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let sent = h.channel.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![("tok-b".to_string(), "echo: Hi".to_string())]);
        assert_eq!(h.history.history("u2").len(), 2);
    }

    #[tokio::test]
    async fn delivery_failure_is_server_error() {
        let h = harness_with(RecordingChannel {
            fail: true,
            ..Default::default()
        });
        let body = json!({ "events": [text_event("u1", "tok-1", "Hello")] }).to_string();

        let response = h.router.oneshot(signed_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let history = Arc::new(WindowedHistory::with_defaults());
        let agent = Arc::new(ChatAgent::new(
            Arc::new(EchoProvider),
            history.clone(),
            ContextAssembler::new("sys"),
            "test-model",
        ));
        let line = Arc::new(LineChannel::new(LineChannelConfig::from(&chatbridge_config::LineConfig::default())).unwrap());
        let state = GatewayState::new(agent, line, history).with_body_limit(16);
        let router = build_router(Arc::new(state));

        let body = json!({ "events": [text_event("u1", "tok-1", "Hello")] }).to_string();
        let req = Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Body::from(body))
            .unwrap();
        let response = router.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn build_agent_requires_persona_file() {
        let mut config = chatbridge_config::AppConfig::default();
        config.provider.api_key = Some("sk-test".into());
        config.persona.persona_path = "/nonexistent/chatbridge/persona.txt".into();

        assert!(matches!(build_agent(&config), Err(chatbridge_core::Error::Persona(_))));
    }

    #[test]
    fn build_agent_from_override() {
        let mut config = chatbridge_config::AppConfig::default();
        config.provider.api_key = Some("sk-test".into());
        config.persona.system_prompt_override = Some("You are a test bot.".into());
        config.history.max_entries_per_user = Some(10);

        let (agent, history) = build_agent(&config).unwrap();
        assert_eq!(agent.system_prompt(), "You are a test bot.");
        assert_eq!(agent.model(), "gpt-4.1-nano");
        assert_eq!(history.window(), chrono::TimeDelta::hours(3));
    }

    #[test]
    fn build_agent_without_key_fails() {
        let mut config = chatbridge_config::AppConfig::default();
        config.persona.system_prompt_override = Some("sys".into());
        assert!(matches!(build_agent(&config), Err(chatbridge_core::Error::Provider(_))));
    }
}
