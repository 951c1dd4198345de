//! # Ingest Dummy Server
//!
//! A local stand-in for the telemetry ingest endpoint, so the delivery engine
//! and `telemetry-send` can be exercised end-to-end without a backend.
//!
//! ## Key Features:
//! - **Ingest routes**: `POST /telemetry/event`, `/telemetry/screen-view` and
//!   `/telemetry/performance` check the required fields of each record,
//!   log it, and answer `201 Created`.
//! - **Health**: `GET /telemetry/health` reports a timestamp and the number of
//!   records accepted per route.
//! - **Failure injection**: `--fail-rate` answers that share of ingest
//!   requests with `503` so retry and re-queue behaviour can be observed.
//!
//! Records are only logged; nothing is stored or forwarded.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use serde_json::{Value, json};

use lib_telemetry::loggers::setup_logging;
use lib_telemetry::utils::current_datetime_rfc3339;

/// Configuration for the dummy ingest server, from flags and environment.
#[derive(Parser, Debug)]
#[clap(
    version,
    about = "A local telemetry ingest endpoint that logs what it receives."
)]
#[clap(long_about = None)]
struct AppConfig {
    #[clap(long, env = "INGEST_PORT", default_value_t = 3000, help = "HTTP server port")]
    port: u16,

    #[clap(
        long,
        env = "INGEST_FAIL_RATE",
        default_value_t = 0.0,
        help = "Share of ingest requests answered with 503 (0.0 - 1.0)"
    )]
    fail_rate: f64,

    #[clap(long, env = "INGEST_LOG_DIR", default_value = "./logs", help = "Directory for log files")]
    log_dir: PathBuf,

    #[clap(long, env = "INGEST_LOG_LEVEL", default_value = "info", help = "Logging level")]
    log_level: String,
}

/// Shared handler state.
#[derive(Debug, Default)]
struct IngestState {
    fail_rate: f64,
    events: AtomicU64,
    screen_views: AtomicU64,
    performance: AtomicU64,
}

impl IngestState {
    fn new(fail_rate: f64) -> Self {
        Self {
            fail_rate: fail_rate.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    fn should_fail(&self) -> bool {
        self.fail_rate > 0.0 && rand::random::<f64>() < self.fail_rate
    }
}

/// Errors answered to ingest clients.
#[derive(Debug)]
enum AppError {
    /// The record is missing a field or has one of the wrong type.
    InvalidRecord(String),
    /// Failure injected by `--fail-rate`.
    Injected,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidRecord(reason) => {
                log::warn!("Rejected record: {}", reason);
                (StatusCode::BAD_REQUEST, reason.clone())
            }
            AppError::Injected => {
                log::info!("Injected failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "injected failure".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidRecord(reason) => write!(f, "Invalid record: {}", reason),
            AppError::Injected => write!(f, "Injected failure"),
        }
    }
}

impl std::error::Error for AppError {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::parse();
    setup_logging("ingest_dummy", &config.log_dir, &config.log_level)?;

    let state = Arc::new(IngestState::new(config.fail_rate));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    log::info!(
        "Starting ingest dummy on http://{}/telemetry (fail rate {})",
        addr,
        config.fail_rate
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn router(state: Arc<IngestState>) -> Router {
    Router::new()
        .route("/telemetry/event", post(ingest_event))
        .route("/telemetry/screen-view", post(ingest_screen_view))
        .route("/telemetry/performance", post(ingest_performance))
        .route("/telemetry/health", get(health))
        .with_state(state)
}

async fn ingest_event(
    State(state): State<Arc<IngestState>>,
    Json(record): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    accept(&state, "event", &record, &["eventType", "userId", "sessionId"], &[])?;
    state.events.fetch_add(1, Ordering::Relaxed);
    Ok(created())
}

async fn ingest_screen_view(
    State(state): State<Arc<IngestState>>,
    Json(record): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    accept(&state, "screen-view", &record, &["screenName", "userId", "sessionId"], &[])?;
    state.screen_views.fetch_add(1, Ordering::Relaxed);
    Ok(created())
}

async fn ingest_performance(
    State(state): State<Arc<IngestState>>,
    Json(record): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    accept(
        &state,
        "performance",
        &record,
        &["metricName", "userId", "sessionId", "unit"],
        &["value"],
    )?;
    state.performance.fetch_add(1, Ordering::Relaxed);
    Ok(created())
}

async fn health(State(state): State<Arc<IngestState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "ts": current_datetime_rfc3339(),
        "received": {
            "event": state.events.load(Ordering::Relaxed),
            "screenView": state.screen_views.load(Ordering::Relaxed),
            "performance": state.performance.load(Ordering::Relaxed),
        }
    }))
}

/// Injects failures, validates `record`, and logs it.
fn accept(
    state: &IngestState,
    route: &str,
    record: &Value,
    strings: &[&str],
    numbers: &[&str],
) -> Result<(), AppError> {
    if state.should_fail() {
        return Err(AppError::Injected);
    }
    validate(record, strings, numbers)?;
    log::info!("[{}] {}", route, record);
    Ok(())
}

fn validate(record: &Value, strings: &[&str], numbers: &[&str]) -> Result<(), AppError> {
    let Some(object) = record.as_object() else {
        return Err(AppError::InvalidRecord("body must be a JSON object".into()));
    };
    for field in strings {
        if !object.get(*field).is_some_and(Value::is_string) {
            return Err(AppError::InvalidRecord(format!("{} must be a string", field)));
        }
    }
    for field in numbers {
        if !object.get(*field).is_some_and(Value::is_number) {
            return Err(AppError::InvalidRecord(format!("{} must be a number", field)));
        }
    }
    Ok(())
}

fn created() -> impl IntoResponse {
    (StatusCode::CREATED, Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_telemetry::core::transport::{HttpTransport, IngestPath, Transport, TransportError};
    use lib_telemetry::TelemetryConfig;

    async fn spawn(fail_rate: f64) -> (HttpTransport, Arc<IngestState>) {
        let state = Arc::new(IngestState::new(fail_rate));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });

        let config = TelemetryConfig::new(format!("http://127.0.0.1:{}/telemetry", port));
        (HttpTransport::new(&config).unwrap(), state)
    }

    #[tokio::test]
    async fn accepts_each_record_kind() {
        let (transport, state) = spawn(0.0).await;

        transport
            .send(
                IngestPath::Event,
                json!({"eventType": "login", "userId": "u", "sessionId": "s", "timestamp": 1}),
            )
            .await
            .unwrap();
        transport
            .send(
                IngestPath::ScreenView,
                json!({"screenName": "Home", "userId": "u", "sessionId": "s", "duration": 40}),
            )
            .await
            .unwrap();
        transport
            .send(
                IngestPath::Performance,
                json!({"metricName": "boot", "userId": "u", "sessionId": "s", "value": 1.5, "unit": "ms"}),
            )
            .await
            .unwrap();

        assert_eq!(state.events.load(Ordering::Relaxed), 1);
        assert_eq!(state.screen_views.load(Ordering::Relaxed), 1);
        assert_eq!(state.performance.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn incomplete_record_is_a_non_retryable_rejection() {
        let (transport, _state) = spawn(0.0).await;
        let err = transport
            .send(IngestPath::Event, json!({"eventType": "login"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { status: 400, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn injected_failures_are_retryable() {
        let (transport, state) = spawn(1.0).await;
        let err = transport
            .send(
                IngestPath::Event,
                json!({"eventType": "login", "userId": "u", "sessionId": "s"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { status: 503, .. }));
        assert!(err.is_retryable());
        assert_eq!(state.events.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn validation_checks_types() {
        assert!(validate(&json!({"value": "1"}), &[], &["value"]).is_err());
        assert!(validate(&json!({"value": 1}), &[], &["value"]).is_ok());
        assert!(validate(&json!([1]), &[], &[]).is_err());
    }
}
