mod animation;
mod export;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::classification::{Category, ExtractedParams};

pub use animation::{
    handle_animation, AnimationKind, AnimationPlan, BoneTimeline, Keyframe, SpeedAdjustment,
};
pub use export::{handle_export, ExportFile, ExportFileKind, ExportLayout, ExportManifest};

/// Uniform output of every handler. `error` is set exactly when `success`
/// is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    pub success: bool,
    pub message: String,
    pub category: Category,
    #[serde(default)]
    pub extracted_params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Asks the caller to handle the request some other way.
    #[serde(default)]
    pub use_fallback: bool,
}

impl HandlerResult {
    pub fn ok(category: Category, message: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            category,
            extracted_params: params,
            error: None,
            use_fallback: false,
        }
    }

    pub fn failed(
        category: Category,
        message: impl Into<String>,
        error: impl Into<String>,
        params: Map<String, Value>,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            category,
            extracted_params: params,
            error: Some(error.into()),
            use_fallback: false,
        }
    }
}

/// Default branch: nothing here can serve the request.
pub fn handle_unknown(prompt: &str, params: &ExtractedParams) -> HandlerResult {
    let mut echoed = params.clone();
    echoed.insert("userPrompt".to_string(), Value::String(prompt.to_string()));
    let mut result = HandlerResult::failed(
        Category::Unknown,
        "Unknown request category",
        "request could not be routed to a handler",
        echoed,
    );
    result.use_fallback = true;
    result
}

pub fn param_str<'a>(params: &'a ExtractedParams, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Reads a boolean that models sometimes send as a string or a number.
pub fn param_bool(params: &ExtractedParams, key: &str, default: bool) -> bool {
    match params.get(key) {
        Some(Value::Bool(value)) => *value,
        Some(Value::Number(number)) => number.as_f64().map_or(default, |value| value != 0.0),
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "on" => true,
            "false" | "no" | "n" | "0" | "off" => false,
            _ => default,
        },
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> ExtractedParams {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn unknown_handler_echoes_and_requests_fallback() {
        let result = handle_unknown("sing a song", &params(json!({"mood": "happy"})));
        assert!(!result.success);
        assert!(result.use_fallback);
        assert!(result.error.is_some());
        assert_eq!(result.category, Category::Unknown);
        assert_eq!(result.extracted_params["mood"], "happy");
        assert_eq!(result.extracted_params["userPrompt"], "sing a song");
    }

    #[test]
    fn param_bool_accepts_loose_values() {
        let values = params(json!({
            "a": true,
            "b": "false",
            "c": "YES",
            "d": 0,
            "e": "maybe",
            "f": null,
        }));
        assert!(param_bool(&values, "a", false));
        assert!(!param_bool(&values, "b", true));
        assert!(param_bool(&values, "c", false));
        assert!(!param_bool(&values, "d", true));
        assert!(param_bool(&values, "e", true));
        assert!(param_bool(&values, "f", true));
        assert!(!param_bool(&values, "missing", false));
    }

    #[test]
    fn error_is_serialized_only_on_failure() -> anyhow::Result<()> {
        let ok = HandlerResult::ok(Category::Animation, "done", Map::new());
        let encoded = serde_json::to_value(&ok)?;
        assert!(encoded.get("error").is_none());
        assert_eq!(encoded["category"], "animation");

        let failed = HandlerResult::failed(Category::ImageGeneration, "no", "boom", Map::new());
        let encoded = serde_json::to_value(&failed)?;
        assert_eq!(encoded["error"], "boom");
        assert_eq!(encoded["success"], false);
        Ok(())
    }
}
