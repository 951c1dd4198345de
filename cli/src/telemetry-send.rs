use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Method;
use serde_json::Value;

use lib_telemetry::adapters::platform::DEFAULT_APP_VERSION;
use lib_telemetry::loggers::setup_logging;
use lib_telemetry::retrieve::ky_http::ApiClient;
use lib_telemetry::{create_from_settings, Metadata, TelemetryConfig, TelemetrySettings};

/// Tracks events from the command line through the telemetry delivery engine.
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Loads telemetry settings (settings file, TELEMETRY_* environment, flags), initializes the delivery engine over the chosen storage backend, tracks the given events and metrics, and shuts down with a final flush. Events that cannot be delivered stay in storage and go out on the next run."
)]
struct Args {
    #[command(flatten)]
    settings: TelemetrySettings,

    /// Event type to track. Repeat for several events.
    #[arg(short, long = "event")]
    events: Vec<String>,

    /// JSON object attached as metadata to every tracked event.
    #[arg(short, long)]
    metadata: Option<String>,

    /// Track the events on this screen (a screen view wraps them).
    #[arg(short, long)]
    screen: Option<String>,

    /// Performance metric as `name=value` (milliseconds). Repeatable.
    #[arg(long = "metric")]
    metrics: Vec<String>,

    /// Application version reported with each event.
    #[arg(long, default_value = DEFAULT_APP_VERSION)]
    app_version: String,

    /// Flush right after tracking instead of leaving it to shutdown.
    #[arg(long)]
    flush: bool,

    /// Probe `GET <endpoint>/health` before tracking.
    #[arg(long)]
    health_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // 1. Settings: defaults <- file <- environment/flags
    let settings = TelemetrySettings::layered(args.settings.clone())?;

    // 2. Logging
    let log_dir = settings
        .log_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("./logs"));
    let log_level = settings.log_level.as_deref().unwrap_or("info");
    let log_path = setup_logging("telemetry-send", &log_dir, log_level)?;
    log::debug!("Logging to {}", log_path.display());

    // 3. Inputs
    let metadata = args.metadata.as_deref().map(parse_metadata).transpose()?;
    let metrics = args
        .metrics
        .iter()
        .map(|m| parse_metric(m))
        .collect::<Result<Vec<_>>>()?;

    // 4. Engine
    let service = create_from_settings(&settings, &args.app_version).await?;
    if args.health_check {
        health_check(service.config()).await?;
    }
    service.initialize().await;

    // 5. Track
    match &args.screen {
        Some(screen) => {
            let scope = service.enter_screen(screen.as_str(), None).await;
            for event in &args.events {
                scope.track_event(event, metadata.clone()).await;
            }
            scope.leave().await;
        }
        None => {
            for event in &args.events {
                service.track(event, metadata.clone(), None).await;
            }
        }
    }
    for (name, value) in &metrics {
        service.track_performance(name, *value, None, None).await;
    }

    if args.flush {
        let report = service.flush().await;
        log::info!(
            "Flushed: {} delivered, {} re-queued, {} dropped",
            report.delivered,
            report.requeued,
            report.dropped
        );
    }

    // 6. Shutdown
    service.destroy().await;
    let remaining = service.queue_len().await;
    if remaining > 0 {
        log::warn!(
            "{} events are still queued and will be retried on the next run",
            remaining
        );
    }

    Ok(())
}

async fn health_check(config: &TelemetryConfig) -> Result<()> {
    let client = ApiClient::new(&config.api_endpoint, None, config.request_timeout(), 0)?;
    let response = client
        .request::<Value, ()>(Method::GET, "health", None, None)
        .await
        .with_context(|| format!("Ingest endpoint {} is unreachable", client.base_url()))?;

    if !response.success {
        anyhow::bail!(
            "Ingest health check failed with HTTP {}: {}",
            response.status,
            response.error_body.unwrap_or_default()
        );
    }
    log::info!(
        "Ingest endpoint healthy: {}",
        response.data.unwrap_or(Value::Null)
    );
    Ok(())
}

fn parse_metadata(raw: &str) -> Result<Metadata> {
    match serde_json::from_str::<Value>(raw).context("Metadata is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("Metadata must be a JSON object, got {}", other),
    }
}

fn parse_metric(raw: &str) -> Result<(String, f64)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Metric '{}' is not in name=value form", raw))?;
    let value = value
        .trim()
        .parse::<f64>()
        .with_context(|| format!("Metric '{}' has a non-numeric value", raw))?;
    Ok((name.trim().to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_must_be_an_object() {
        let map = parse_metadata(r#"{"plan": "pro", "seats": 3}"#).unwrap();
        assert_eq!(map["seats"], 3);
        assert!(parse_metadata("[1, 2]").is_err());
        assert!(parse_metadata("{oops").is_err());
    }

    #[test]
    fn metrics_are_name_value_pairs() {
        assert_eq!(
            parse_metric("app_start_time=842.5").unwrap(),
            ("app_start_time".to_string(), 842.5)
        );
        assert!(parse_metric("no_value").is_err());
        assert!(parse_metric("bad=fast").is_err());
    }

    #[test]
    fn flags_reach_the_settings() {
        let args = Args::parse_from([
            "telemetry-send",
            "--event",
            "signup",
            "-e",
            "login",
            "--batch-size",
            "4",
            "--storage",
            "memory",
        ]);
        assert_eq!(args.events, vec!["signup", "login"]);
        assert_eq!(args.settings.batch_size, Some(4));
    }
}
