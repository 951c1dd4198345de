//! # Screen Scope
//!
//! Ties tracking calls to one visible screen. `TelemetryService::enter_screen`
//! records the screen view and hands back a `ScreenScope`; every event tracked
//! through the scope carries the screen name, and `leave` emits the matching
//! `screen_view_end` with its duration.
//!
//! There is no async drop, so a scope dropped without `leave` never emits the
//! end event (and the start time stays recorded until the screen is entered
//! again).

use serde_json::Value;

use crate::core::event::Metadata;
use crate::core::service::TelemetryService;

/// Event type recorded by `ScreenScope::track_button_press`.
pub const BUTTON_PRESS: &str = "button_press";
/// Event type recorded by `ScreenScope::track_input_change`.
pub const INPUT_CHANGE: &str = "input_change";

/// Tracking helpers bound to a screen.
#[derive(Clone)]
pub struct ScreenScope {
    service: TelemetryService,
    screen_name: String,
}

impl TelemetryService {
    /// Tracks a screen view and returns a scope for events on that screen.
    pub async fn enter_screen(
        &self,
        screen_name: impl Into<String>,
        properties: Option<Metadata>,
    ) -> ScreenScope {
        let screen_name = screen_name.into();
        self.track_screen_view(&screen_name, properties).await;
        ScreenScope {
            service: self.clone(),
            screen_name,
        }
    }
}

impl ScreenScope {
    /// Name of the screen this scope is bound to.
    pub fn screen_name(&self) -> &str {
        &self.screen_name
    }

    /// Tracks an event on this screen.
    pub async fn track_event(&self, event_type: &str, metadata: Option<Metadata>) {
        self.service
            .track(event_type, metadata, Some(self.screen_name.as_str()))
            .await;
    }

    /// Tracks a `button_press` with `buttonId` merged into the metadata.
    pub async fn track_button_press(&self, button_id: &str, metadata: Option<Metadata>) {
        let mut data = Metadata::new();
        data.insert("buttonId".into(), Value::from(button_id));
        if let Some(extra) = metadata {
            data.extend(extra);
        }
        self.track_event(BUTTON_PRESS, Some(data)).await;
    }

    /// Tracks an `input_change`. Only the kind of the new value is recorded,
    /// never the value itself.
    pub async fn track_input_change(&self, field_id: &str, value: &Value) {
        let mut data = Metadata::new();
        data.insert("fieldId".into(), Value::from(field_id));
        data.insert("valueType".into(), Value::from(value_type(value)));
        self.track_event(INPUT_CHANGE, Some(data)).await;
    }

    /// Emits `screen_view_end` for this screen and consumes the scope.
    pub async fn leave(self) {
        self.service.track_screen_end(&self.screen_name).await;
    }
}

/// Kind name of a JSON value. `null` and arrays count as `object`.
fn value_type(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null | Value::Array(_) | Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_types() {
        assert_eq!(value_type(&json!("secret")), "string");
        assert_eq!(value_type(&json!(4.5)), "number");
        assert_eq!(value_type(&json!(true)), "boolean");
        assert_eq!(value_type(&json!(null)), "object");
        assert_eq!(value_type(&json!([1, 2])), "object");
        assert_eq!(value_type(&json!({"a": 1})), "object");
    }
}
