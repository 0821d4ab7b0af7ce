//! Sanitizer for control values authored in the platform's editor.
//!
//! The editor stores loosely shaped JSON: stale keys from earlier step
//! versions, empty strings for untouched inputs, and free-form URLs. Only the
//! keys the step kind understands are forwarded, empty values are dropped and
//! redirect URLs must be http(s) or relative paths.

use serde_json::{Map, Value};

use notiflow_core::traits::ControlSanitizer;
use notiflow_core::types::StepKind;

#[derive(Debug, Default, Clone, Copy)]
pub struct DashboardSanitizer;

impl DashboardSanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Keys the editor produces for each step kind. `None` keeps everything.
    fn allowed_keys(kind: StepKind) -> Option<&'static [&'static str]> {
        match kind {
            StepKind::InApp => Some(&[
                "subject",
                "body",
                "avatar",
                "primaryAction",
                "secondaryAction",
                "redirect",
                "data",
                "disableOutputSanitization",
            ]),
            StepKind::Email => Some(&["subject", "body", "editorType", "layoutId"]),
            StepKind::Sms | StepKind::Chat => Some(&["body"]),
            StepKind::Push => Some(&["subject", "body"]),
            StepKind::Digest => Some(&["amount", "unit", "digestKey", "cron", "lookBackWindow"]),
            StepKind::Delay => Some(&["type", "amount", "unit"]),
            StepKind::Throttle => Some(&["type", "amount", "unit", "threshold", "throttleKey"]),
            StepKind::Trigger | StepKind::Custom | StepKind::Unknown => None,
        }
    }
}

impl ControlSanitizer for DashboardSanitizer {
    fn sanitize(&self, controls: Value, kind: StepKind) -> Value {
        let Value::Object(map) = controls else {
            return Value::Object(Map::new());
        };

        let allowed = Self::allowed_keys(kind);
        let kept: Map<String, Value> = map
            .into_iter()
            .filter(|(key, _)| allowed.is_none_or(|keys| keys.contains(&key.as_str())))
            .filter_map(|(key, value)| clean_value(value).map(|v| (key, v)))
            .collect();

        neutralize_redirects(Value::Object(kept))
    }
}

/// Drops nulls and empty strings, recursively.
fn clean_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::Object(map) => Some(Value::Object(
            map.into_iter()
                .filter_map(|(k, v)| clean_value(v).map(|v| (k, v)))
                .collect(),
        )),
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(clean_value).collect(),
        )),
        other => Some(other),
    }
}

/// Removes `url` from any `redirect` object whose URL is not safe to follow.
fn neutralize_redirects(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| {
                    let v = neutralize_redirects(v);
                    if key == "redirect" {
                        (key, strip_unsafe_url(v))
                    } else {
                        (key, v)
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(neutralize_redirects).collect()),
        other => other,
    }
}

fn strip_unsafe_url(redirect: Value) -> Value {
    let Value::Object(mut map) = redirect else {
        return redirect;
    };
    let unsafe_url = map
        .get("url")
        .and_then(|u| u.as_str())
        .is_some_and(|url| !is_safe_url(url));
    if unsafe_url {
        tracing::debug!("🧹 Dropping unsafe redirect URL from control values");
        map.remove("url");
    }
    Value::Object(map)
}

fn is_safe_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("https://")
        || lower.starts_with("http://")
        || (lower.starts_with('/') && !lower.starts_with("//"))
        || lower.starts_with("{{")
}
