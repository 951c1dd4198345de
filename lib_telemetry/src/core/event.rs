//! # Telemetry Records
//!
//! The three payloads the engine produces. `TelemetryEvent` is the only one
//! that is queued and persisted; `ScreenViewEvent` is derived from a queued
//! `screen_view*` event at send time, and `PerformanceMetric` is sent straight
//! away without queueing.
//!
//! All field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form key/value data attached to an event.
pub type Metadata = Map<String, Value>;

/// Event type emitted when a screen becomes visible.
pub const SCREEN_VIEW: &str = "screen_view";
/// Event type emitted when a screen is left; carries `duration`.
pub const SCREEN_VIEW_END: &str = "screen_view_end";

/// A generic tracked event as queued, persisted and delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    /// Type of the event, e.g. `button_press` or `screen_view`.
    pub event_type: String,
    /// Durable user identifier.
    pub user_id: String,
    /// Identifier of the run that produced the event.
    pub session_id: String,
    /// Screen on which the event happened, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_name: Option<String>,
    /// Additional event data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Platform wire name (`ios`, `web`, `linux`, ...).
    pub platform: String,
    /// Application version.
    pub app_version: String,
}

impl TelemetryEvent {
    /// Whether this event goes to the screen-view ingest path.
    pub fn is_screen_view(&self) -> bool {
        self.event_type.starts_with(SCREEN_VIEW)
    }
}

/// Screen navigation record posted to the screen-view ingest path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenViewEvent {
    /// Name of the screen.
    pub screen_name: String,
    /// Durable user identifier.
    pub user_id: String,
    /// Identifier of the run that produced the event.
    pub session_id: String,
    /// Time spent on the screen in milliseconds (`screen_view_end` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// Screen properties supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Metadata>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// `screen_view` or `screen_view_end`.
    pub event_type: String,
}

impl From<&TelemetryEvent> for ScreenViewEvent {
    fn from(event: &TelemetryEvent) -> Self {
        let duration = event
            .metadata
            .as_ref()
            .and_then(|m| m.get("duration"))
            .and_then(Value::as_i64);
        let screen_name = event
            .screen_name
            .clone()
            .or_else(|| {
                event
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("screenName"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_default();
        let properties = event
            .metadata
            .as_ref()
            .map(|m| {
                m.iter()
                    .filter(|(k, _)| k.as_str() != "screenName" && k.as_str() != "duration")
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Metadata>()
            })
            .filter(|m| !m.is_empty());

        Self {
            screen_name,
            user_id: event.user_id.clone(),
            session_id: event.session_id.clone(),
            duration,
            properties,
            timestamp: event.timestamp,
            event_type: event.event_type.clone(),
        }
    }
}

/// A performance measurement, delivered immediately and never queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    /// Name of the metric, e.g. `app_start_time`.
    pub metric_name: String,
    /// Durable user identifier.
    pub user_id: String,
    /// Identifier of the run that produced the metric.
    pub session_id: String,
    /// Measured value.
    pub value: f64,
    /// Unit of measurement, e.g. `ms` or `bytes`.
    pub unit: String,
    /// Additional context for the metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Metadata>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, metadata: Option<Value>) -> TelemetryEvent {
        TelemetryEvent {
            event_type: event_type.to_string(),
            user_id: "u".into(),
            session_id: "s".into(),
            screen_name: Some("Home".into()),
            metadata: metadata.and_then(|v| v.as_object().cloned()),
            timestamp: 1_700_000_000_000,
            platform: "linux".into(),
            app_version: "1.0.0".into(),
        }
    }

    #[test]
    fn wire_format_is_camel_case_without_empty_options() {
        let mut e = event("button_press", None);
        e.screen_name = None;
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(
            v,
            json!({
                "eventType": "button_press",
                "userId": "u",
                "sessionId": "s",
                "timestamp": 1_700_000_000_000i64,
                "platform": "linux",
                "appVersion": "1.0.0"
            })
        );
    }

    #[test]
    fn screen_view_routing_uses_prefix() {
        assert!(event(SCREEN_VIEW, None).is_screen_view());
        assert!(event(SCREEN_VIEW_END, None).is_screen_view());
        assert!(!event("view_screen", None).is_screen_view());
    }

    #[test]
    fn screen_view_payload_lifts_duration() {
        let e = event(SCREEN_VIEW_END, Some(json!({"screenName": "Home", "duration": 420})));
        let sv = ScreenViewEvent::from(&e);
        assert_eq!(sv.screen_name, "Home");
        assert_eq!(sv.duration, Some(420));
        assert_eq!(sv.event_type, SCREEN_VIEW_END);
        assert_eq!(sv.properties, None);

        let start = ScreenViewEvent::from(&event(SCREEN_VIEW, Some(json!({"screenName": "Home"}))));
        assert_eq!(start.duration, None);
        assert!(serde_json::to_value(&start).unwrap().get("duration").is_none());
    }

    #[test]
    fn screen_view_properties_exclude_lifted_fields() {
        let e = event(
            SCREEN_VIEW,
            Some(json!({"screenName": "Home", "tab": "feed", "duration": 3})),
        );
        let v = serde_json::to_value(ScreenViewEvent::from(&e)).unwrap();
        assert_eq!(v["properties"], json!({"tab": "feed"}));
        assert_eq!(v["screenName"], "Home");
    }
}
