use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{Map, Value};

pub(crate) fn build_http_client(timeout: Duration) -> Result<HttpClient> {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

pub(crate) fn response_json_or_error(service: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("{service} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{service} request failed ({}): {}",
            status.as_u16(),
            truncate_text(&body, 512)
        );
    }
    serde_json::from_str(&body).with_context(|| format!("{service} returned invalid JSON payload"))
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

/// Error chain on one line, repeated causes collapsed.
pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let text = text.trim();
        if text.is_empty() || parts.last().is_some_and(|last| last == text) {
            continue;
        }
        parts.push(text.to_string());
    }
    truncate_text(&parts.join(": "), max_chars)
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub(crate) fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

pub(crate) fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }

    #[test]
    fn error_chain_collapses_repeats() {
        let err = anyhow!("socket closed")
            .context("socket closed")
            .context("chat completion failed");
        assert_eq!(
            error_chain_text(&err, 200),
            "chat completion failed: socket closed"
        );
    }

    #[test]
    fn mime_round_trips_common_extensions() {
        assert_eq!(mime_for_path(Path::new("a/head.PNG")), Some("image/png"));
        assert_eq!(mime_for_path(Path::new("b.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("c.tiff")), None);
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
    }
}
