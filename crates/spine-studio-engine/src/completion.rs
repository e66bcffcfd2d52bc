use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::StudioConfig;
use crate::transport::{build_http_client, response_json_or_error};

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.1,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A text-completion service: system instruction plus user text in,
/// free text out. Callers treat the reply as untrusted.
pub trait TextCompletion: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

pub struct OpenAiChatClient {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http: HttpClient,
}

impl OpenAiChatClient {
    pub fn new(config: &StudioConfig) -> Result<Self> {
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.text_model.clone(),
            http: build_http_client(config.text_timeout())?,
        })
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
        });
        if let (Some(max_tokens), Some(object)) = (request.max_tokens, payload.as_object_mut()) {
            object.insert("max_tokens".to_string(), json!(max_tokens));
        }
        payload
    }
}

impl TextCompletion for OpenAiChatClient {
    fn name(&self) -> &str {
        "openai-chat"
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("OPENAI_API_KEY or OPENAI_API_KEY_BACKUP not set");
        };
        let endpoint = format!("{}/chat/completions", self.api_base);
        debug!(model = %self.model, endpoint = %endpoint, "sending chat completion");

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&self.payload(request))
            .send()
            .with_context(|| format!("chat completion request failed ({endpoint})"))?;
        let parsed = response_json_or_error("chat completion", response)?;
        match extract_chat_text(&parsed) {
            Some(text) => Ok(text),
            None => bail!("chat completion returned no text"),
        }
    }
}

/// First choice's message content, joined when it arrives as parts.
pub fn extract_chat_text(response: &Value) -> Option<String> {
    let content = response
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;
    let text = match content {
        Value::String(text) => text.trim().to_string(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<&str>>()
            .join("\n"),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
