use crate::analysis::Analysis;
use crate::analyzer::MealAnalyzer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{ChatOptions, LlmClient, Message, Usage};
use crate::profile::{AgeGroup, DietaryRestriction, Gender, UserProfile};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use validator::{Validate, ValidationError};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    llm: Arc<LlmClient>,
    analyzer: Arc<MealAnalyzer>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let llm = Arc::new(LlmClient::new(config)?);
        let analyzer = Arc::new(MealAnalyzer::new(llm.clone()));
        Ok(Self { llm, analyzer })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1))]
    pub messages: Vec<Message>,
    #[validate(range(min = 1))]
    pub max_tokens: Option<u32>,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeRequest {
    #[validate(custom = "meal_length")]
    pub meal: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub age_group: Option<AgeGroup>,
    #[serde(default)]
    pub restrictions: Vec<DietaryRestriction>,
}

/// Longest accepted meal description, in characters, after trimming.
pub const MAX_MEAL_CHARS: usize = 4000;

fn meal_length(meal: &str) -> std::result::Result<(), ValidationError> {
    let len = meal.trim().chars().count();
    if len == 0 || len > MAX_MEAL_CHARS {
        let mut err = ValidationError::new("length");
        err.message = Some(format!("meal must be 1 to {MAX_MEAL_CHARS} characters").into());
        return Err(err);
    }
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/analyze", post(analyze))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the configured address. Nothing is bound before the config is valid.
pub async fn bind(config: &Config) -> Result<TcpListener> {
    let addr = config.bind_addr();
    TcpListener::bind(addr).await.map_err(|source| Error::Bind {
        addr: addr.to_string(),
        source,
    })
}

pub async fn run(config: Arc<Config>) -> Result<()> {
    let state = AppState::new(config.clone())?;
    let listener = bind(&config).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>> {
    let Json(req) = payload.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    req.validate()
        .map_err(|e| Error::InvalidRequest(e.to_string()))?;

    let defaults = state.llm.default_options();
    let options = ChatOptions {
        max_tokens: req.max_tokens.unwrap_or(defaults.max_tokens),
        temperature: req.temperature.unwrap_or(defaults.temperature),
    };
    let completion = state.llm.chat(&req.messages, options).await?;

    Ok(Json(ChatReply {
        content: completion.content,
        finish_reason: completion.finish_reason,
        usage: completion.usage,
    }))
}

async fn analyze(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<Analysis>> {
    let Json(req) = payload.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    req.validate()
        .map_err(|e| Error::InvalidRequest(e.to_string()))?;

    let profile = UserProfile {
        gender: req.gender,
        age_group: req.age_group,
        restrictions: req.restrictions,
    };
    let analysis = state.analyzer.analyze(&req.meal, &profile).await?;
    Ok(Json(analysis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use httpmock::prelude::*;
    use tower::ServiceExt;

    const PATH: &str = "/openai/deployments/test-deployment/chat/completions";

    fn app_for(endpoint: &str) -> Router {
        let state = AppState::new(Arc::new(test_config(endpoint))).unwrap();
        router(state)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<String>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = send(app_for("http://127.0.0.1:9"), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn chat_relays_completion() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(PATH)
                    .json_body_partial(r#"{"max_tokens":100}"#);
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "Eat more fibre."}, "finish_reason": "stop"}]
                }));
            })
            .await;

        let body = json!({
            "messages": [{"role": "user", "content": "Any tips?"}],
            "max_tokens": 100
        });
        let (status, reply) = send(
            app_for(&server.base_url()),
            "POST",
            "/api/chat",
            Some(body.to_string()),
        )
        .await;

        mock.assert_async().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["content"], "Eat more fibre.");
        assert_eq!(reply["finish_reason"], "stop");
    }

    #[tokio::test]
    async fn upstream_failure_is_bad_gateway_without_key() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(PATH);
                then.status(401).body("Access denied due to invalid subscription key.");
            })
            .await;

        let body = json!({ "messages": [{"role": "user", "content": "hi"}] });
        let (status, reply) = send(
            app_for(&server.base_url()),
            "POST",
            "/api/chat",
            Some(body.to_string()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let error = reply["error"].as_str().unwrap();
        assert!(error.contains("401"));
        assert!(!error.contains("test-secret-key"));
    }

    #[tokio::test]
    async fn invalid_chat_requests_are_rejected() {
        let app = app_for("http://127.0.0.1:9");
        let cases = [
            "not json".to_string(),
            json!({ "messages": [] }).to_string(),
            json!({ "messages": [{"role": "robot", "content": "hi"}] }).to_string(),
            json!({ "messages": [{"role": "user", "content": "hi"}], "temperature": 5.0 }).to_string(),
        ];
        for body in cases {
            let (status, reply) = send(app.clone(), "POST", "/api/chat", Some(body.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert!(reply["error"].is_string());
        }
    }

    #[tokio::test]
    async fn analyze_returns_filtered_analysis() {
        let server = MockServer::start_async().await;
        let content = json!({
            "items": [
                {"name": "Peanut satay", "calories_estimate": 300, "protein_g": 12},
                {"name": "Jasmine rice", "calories_estimate": 200, "protein_g": 4}
            ],
            "totals": {"calories": 500, "protein_g": 16},
            "suggestions": ["Add vegetables"]
        })
        .to_string();
        server
            .mock_async(|when, then| {
                when.method(POST).path(PATH).body_contains("Nut-free");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": content}}],
                    "usage": {"prompt_tokens": 300, "completion_tokens": 120, "total_tokens": 420}
                }));
            })
            .await;

        let body = json!({
            "meal": "Peanut satay with rice",
            "gender": "Female",
            "age_group": "25-34",
            "restrictions": ["Nut-free"]
        });
        let (status, reply) = send(
            app_for(&server.base_url()),
            "POST",
            "/api/analyze",
            Some(body.to_string()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["removed_items"], json!(["Peanut satay"]));
        assert_eq!(reply["parsed"]["items"].as_array().unwrap().len(), 1);
        assert_eq!(reply["parsed"]["totals"]["calories"], 200.0);
        assert_eq!(reply["usage"]["total_tokens"], 420);
        assert!(reply["analyzed_at"].is_string());
    }

    #[tokio::test]
    async fn analyze_rejects_empty_meal_and_unknown_restriction() {
        let app = app_for("http://127.0.0.1:9");
        let (status, _) = send(
            app.clone(),
            "POST",
            "/api/analyze",
            Some(json!({ "meal": "" }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app,
            "POST",
            "/api/analyze",
            Some(json!({ "meal": "soup", "restrictions": ["Paleo"] }).to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn meal_length_is_checked_after_trimming() {
        let request = |meal: String| AnalyzeRequest {
            meal,
            gender: None,
            age_group: None,
            restrictions: vec![],
        };
        let padded = format!("  {}  \n", "a".repeat(MAX_MEAL_CHARS));
        assert!(request(padded).validate().is_ok());

        let too_long = format!("  {}  ", "a".repeat(MAX_MEAL_CHARS + 1));
        assert!(request(too_long).validate().is_err());
        assert!(request(" \t ".to_string()).validate().is_err());
    }

    #[tokio::test]
    async fn chat_accepts_long_histories_and_large_token_limits() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(PATH)
                    .json_body_partial(r#"{"max_tokens":8000}"#);
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "ok"}}]
                }));
            })
            .await;

        let messages: Vec<Value> = (0..100)
            .map(|i| json!({ "role": "user", "content": format!("turn {i}") }))
            .collect();
        let body = json!({ "messages": messages, "max_tokens": 8000 });
        let (status, reply) = send(
            app_for(&server.base_url()),
            "POST",
            "/api/chat",
            Some(body.to_string()),
        )
        .await;

        mock.assert_async().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["content"], "ok");
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn requests_are_traced_at_info() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("tower_http=info"))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (status, _) = send(app_for("http://127.0.0.1:9"), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("finished processing request"), "{output}");
        assert!(output.contains("status=200"), "{output}");
    }

    #[tokio::test]
    async fn binds_the_configured_port() {
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = free.local_addr().unwrap().port();
        drop(free);

        let mut config = test_config("http://127.0.0.1:9");
        config.port = port;
        let listener = bind(&config).await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn occupied_port_is_a_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config("http://127.0.0.1:9");
        config.port = taken.local_addr().unwrap().port();
        let err = bind(&config).await.unwrap_err();
        assert!(matches!(err, Error::Bind { .. }));
    }
}
