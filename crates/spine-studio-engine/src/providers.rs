use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgba, RgbaImage};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use spine_studio_contracts::references::{ImageSource, ReferenceImage};
use tracing::{debug, warn};

use crate::config::StudioConfig;
use crate::transport::{
    build_http_client, extension_for_mime, map_object, mime_for_path, response_json_or_error,
    truncate_text,
};

/// The edits endpoint accepts at most this many input images.
pub const MAX_REFERENCE_IMAGES: usize = 10;

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: String,
    pub quality: Option<String>,
    pub model: String,
    /// Empty means plain generation; otherwise an edit seeded by these.
    pub references: Vec<ReferenceImage>,
}

impl ImageRequest {
    pub fn from_config(config: &StudioConfig, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: config.image_size.clone(),
            quality: config.image_quality.clone(),
            model: config.image_model.clone(),
            references: Vec::new(),
        }
    }

    pub fn with_references(mut self, references: Vec<ReferenceImage>) -> Self {
        self.references = references;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ImageResponse {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
    pub revised_prompt: Option<String>,
    pub provider_request: Map<String, Value>,
    pub warnings: Vec<String>,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ImageRequest) -> Result<ImageResponse>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Box<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dryrun always; OpenAI when its HTTP client can be built.
    pub fn from_config(config: &StudioConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(DryrunProvider);
        registry.register(OpenAiImageProvider::new(config)?);
        Ok(registry)
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn take(&mut self, name: &str) -> Option<Box<dyn ImageProvider>> {
        self.providers.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

/// Offline provider: a prompt-colored square centred on a white canvas.
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ImageRequest) -> Result<ImageResponse> {
        let (width, height) = parse_dims(&request.size);
        let bytes = render_dryrun_sprite(width, height, &request.prompt)?;
        Ok(ImageResponse {
            bytes,
            mime_type: Some("image/png".to_string()),
            revised_prompt: None,
            provider_request: map_object(json!({
                "endpoint": "dryrun-native",
                "payload": {
                    "prompt": request.prompt,
                    "size": request.size,
                    "references": request
                        .references
                        .iter()
                        .map(ReferenceImage::summary)
                        .collect::<Vec<Value>>(),
                }
            })),
            warnings: Vec::new(),
        })
    }
}

pub struct OpenAiImageProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

struct ImageBytes {
    bytes: Vec<u8>,
    mime_type: Option<String>,
    revised_prompt: Option<String>,
}

impl OpenAiImageProvider {
    pub fn new(config: &StudioConfig) -> Result<Self> {
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http: build_http_client(config.image_timeout())?,
        })
    }

    fn generations(&self, api_key: &str, request: &ImageRequest) -> Result<ImageResponse> {
        let endpoint = format!("{}/images/generations", self.api_base);
        let mut payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "n": 1,
            "size": normalize_size(&request.size),
        });
        if let (Some(quality), Some(object)) = (request.quality.as_deref(), payload.as_object_mut())
        {
            object.insert("quality".to_string(), json!(quality));
        }
        debug!(endpoint = %endpoint, model = %request.model, "requesting image generation");

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .with_context(|| format!("OpenAI generations request failed ({endpoint})"))?;
        let parsed = response_json_or_error("OpenAI generations", response)?;
        let item = self.first_image(&parsed)?;
        Ok(ImageResponse {
            bytes: item.bytes,
            mime_type: item.mime_type,
            revised_prompt: item.revised_prompt,
            provider_request: map_object(json!({
                "endpoint": endpoint,
                "payload": payload,
            })),
            warnings: Vec::new(),
        })
    }

    fn edits(&self, api_key: &str, request: &ImageRequest) -> Result<ImageResponse> {
        let endpoint = format!("{}/images/edits", self.api_base);
        let mut warnings = Vec::new();
        let mut references = request.references.as_slice();
        if references.len() > MAX_REFERENCE_IMAGES {
            warnings.push(format!(
                "only the first {MAX_REFERENCE_IMAGES} of {} reference images were sent",
                references.len()
            ));
            references = &references[..MAX_REFERENCE_IMAGES];
        }

        let size = normalize_size(&request.size);
        let mut form = MultipartForm::new()
            .text("model", request.model.clone())
            .text("prompt", request.prompt.clone())
            .text("n", "1")
            .text("size", size.clone());
        if let Some(quality) = request.quality.as_deref() {
            form = form.text("quality", quality.to_string());
        }

        let mut files_manifest: Vec<Value> = Vec::new();
        for (index, reference) in references.iter().enumerate() {
            let (bytes, mime) = self
                .reference_bytes(reference)
                .with_context(|| format!("failed loading reference '{}'", reference.name))?;
            let file_name = format!(
                "{}-{:02}.{}",
                sanitize_file_stem(&reference.name),
                index,
                extension_for_mime(&mime)
            );
            let part = MultipartPart::bytes(bytes)
                .file_name(file_name.clone())
                .mime_str(&mime)
                .with_context(|| format!("invalid mime '{mime}' for {}", reference.name))?;
            form = form.part("image[]", part);
            files_manifest.push(json!({
                "field": "image[]",
                "name": reference.name,
                "file_name": file_name,
                "mime": mime,
            }));
        }
        debug!(
            endpoint = %endpoint,
            references = files_manifest.len(),
            "requesting image edit"
        );

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .with_context(|| format!("OpenAI edits request failed ({endpoint})"))?;
        let parsed = response_json_or_error("OpenAI edits", response)?;
        let item = self.first_image(&parsed)?;
        Ok(ImageResponse {
            bytes: item.bytes,
            mime_type: item.mime_type,
            revised_prompt: item.revised_prompt,
            provider_request: map_object(json!({
                "endpoint": endpoint,
                "payload": {
                    "model": request.model,
                    "prompt": request.prompt,
                    "size": size,
                    "quality": request.quality,
                    "files": files_manifest,
                }
            })),
            warnings,
        })
    }

    fn reference_bytes(&self, reference: &ReferenceImage) -> Result<(Vec<u8>, String)> {
        match &reference.source {
            ImageSource::User { payload } => {
                let bytes = BASE64
                    .decode(payload.data.as_bytes())
                    .context("inline reference base64 decode failed")?;
                Ok((bytes, payload.mime.clone()))
            }
            ImageSource::System { path } if is_http_url(path) => {
                let downloaded = self.download_image(path)?;
                let mime = downloaded
                    .mime_type
                    .unwrap_or_else(|| "image/png".to_string());
                Ok((downloaded.bytes, mime))
            }
            ImageSource::System { path } => {
                let path = Path::new(path);
                let bytes =
                    fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
                let mime = mime_for_path(path).unwrap_or("image/png").to_string();
                Ok((bytes, mime))
            }
        }
    }

    fn first_image(&self, response_payload: &Value) -> Result<ImageBytes> {
        let rows = response_payload
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for row in rows {
            let Some(obj) = row.as_object() else {
                continue;
            };
            let revised_prompt = obj
                .get("revised_prompt")
                .and_then(Value::as_str)
                .map(str::to_string);

            if let Some(b64) = obj.get("b64_json").and_then(Value::as_str) {
                let bytes = BASE64
                    .decode(b64.as_bytes())
                    .context("OpenAI image base64 decode failed")?;
                return Ok(ImageBytes {
                    bytes,
                    mime_type: None,
                    revised_prompt,
                });
            }

            if let Some(url) = obj.get("url").and_then(Value::as_str) {
                let mut downloaded = self.download_image(url)?;
                downloaded.revised_prompt = revised_prompt;
                return Ok(downloaded);
            }
        }

        bail!("OpenAI image response returned no images")
    }

    fn download_image(&self, url: &str) -> Result<ImageBytes> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("failed downloading image ({url})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!(
                "image download failed ({code}): {}",
                truncate_text(&body, 512)
            );
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
        let bytes = response
            .bytes()
            .context("failed reading downloaded image bytes")?
            .to_vec();
        Ok(ImageBytes {
            bytes,
            mime_type,
            revised_prompt: None,
        })
    }
}

impl ImageProvider for OpenAiImageProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, request: &ImageRequest) -> Result<ImageResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("OPENAI_API_KEY or OPENAI_API_KEY_BACKUP not set");
        };
        if request.references.is_empty() {
            self.generations(api_key, request)
        } else {
            let response = self.edits(api_key, request)?;
            for warning in &response.warnings {
                warn!(warning = %warning, "image edit request trimmed");
            }
            Ok(response)
        }
    }
}

/// Snaps a requested size to one the image endpoints accept.
pub fn normalize_size(size: &str) -> String {
    let normalized = size.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "1024x1024" | "1536x1024" | "1024x1536" => return normalized,
        "square" => return "1024x1024".to_string(),
        "landscape" | "wide" => return "1536x1024".to_string(),
        "portrait" | "tall" => return "1024x1536".to_string(),
        _ => {}
    }
    let (width, height) = parse_dims(&normalized);
    if width > height {
        "1536x1024".to_string()
    } else if height > width {
        "1024x1536".to_string()
    } else {
        "1024x1024".to_string()
    }
}

fn parse_dims(size: &str) -> (u32, u32) {
    let parsed = size
        .trim()
        .to_ascii_lowercase()
        .split_once('x')
        .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)));
    match parsed {
        Some((width, height)) if width > 0 && height > 0 => (width, height),
        _ => (1024, 1024),
    }
}

fn is_http_url(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

pub(crate) fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('-');
    if cleaned.is_empty() {
        "reference".to_string()
    } else {
        cleaned.to_string()
    }
}

fn render_dryrun_sprite(width: u32, height: u32, prompt: &str) -> Result<Vec<u8>> {
    let (r, g, b) = color_from_prompt(prompt);
    let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    let (x0, x1) = (width / 4, width - width / 4);
    let (y0, y1) = (height / 4, height - height / 4);
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, Rgba([r, g, b, 255]));
        }
    }
    let mut encoded = Cursor::new(Vec::new());
    image
        .write_to(&mut encoded, ImageFormat::Png)
        .context("failed to encode dryrun sprite")?;
    Ok(encoded.into_inner())
}

/// Stable sprite color that stays clear of the white canvas.
fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0] / 2, digest[1] / 2, digest[2] / 2)
}
