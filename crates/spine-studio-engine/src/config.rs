use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use spine_studio_contracts::handlers::ExportLayout;

use crate::transparency::{parse_hex_color, TransparencyOptions, DEFAULT_TOLERANCE, MAX_TOLERANCE};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Settings shared by every request a [`Studio`](crate::Studio) serves.
///
/// Precedence, lowest first: defaults, JSON file, environment, then
/// whatever the caller sets afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub text_model: String,
    pub image_model: String,
    /// `openai` or `dryrun`.
    pub image_provider: String,
    pub image_size: String,
    pub image_quality: Option<String>,
    pub text_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub tolerance: f64,
    pub edge_sampling: bool,
    /// `#rrggbb`; skips background estimation when set.
    pub background_color: Option<String>,
    pub asset_dir: Option<PathBuf>,
    pub export_base_name: Option<String>,
    pub out_dir: PathBuf,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            text_model: "gpt-4o-mini".to_string(),
            image_model: "gpt-image-1".to_string(),
            image_provider: "openai".to_string(),
            image_size: "1024x1024".to_string(),
            image_quality: None,
            text_timeout_secs: 30,
            image_timeout_secs: 120,
            tolerance: DEFAULT_TOLERANCE,
            edge_sampling: true,
            background_color: None,
            asset_dir: None,
            export_base_name: None,
            out_dir: PathBuf::from("studio-output"),
        }
    }
}

impl StudioConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|keys| first_non_empty_env(keys))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading config {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config JSON in {}", path.display()))?;
        config.api_base = normalize_api_base(&config.api_base);
        Ok(config)
    }

    /// `lookup` returns the first non-empty value among the given keys.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&[&str]) -> Option<String>,
    {
        if let Some(key) = lookup(&["OPENAI_API_KEY", "OPENAI_API_KEY_BACKUP"]) {
            self.api_key = Some(key);
        }
        if let Some(base) = lookup(&["OPENAI_API_BASE", "OPENAI_BASE_URL"]) {
            self.api_base = normalize_api_base(&base);
        }
        if let Some(model) = lookup(&["SPINE_STUDIO_TEXT_MODEL"]) {
            self.text_model = model;
        }
        if let Some(model) = lookup(&["SPINE_STUDIO_IMAGE_MODEL"]) {
            self.image_model = model;
        }
        if let Some(provider) = lookup(&["SPINE_STUDIO_IMAGE_PROVIDER"]) {
            self.image_provider = provider.to_ascii_lowercase();
        }
        if let Some(dir) = lookup(&["SPINE_STUDIO_ASSET_DIR"]) {
            self.asset_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup(&["SPINE_STUDIO_OUT_DIR"]) {
            self.out_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(&["SPINE_STUDIO_TOLERANCE"]) {
            self.tolerance = raw
                .parse()
                .with_context(|| format!("SPINE_STUDIO_TOLERANCE is not a number: {raw}"))?;
        }
        Ok(())
    }

    /// Rejects values that would make background removal meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_TOLERANCE).contains(&self.tolerance) {
            bail!(
                "tolerance must be between 0 and {MAX_TOLERANCE}, got {}",
                self.tolerance
            );
        }
        if let Some(raw) = self.background_color.as_deref() {
            if parse_hex_color(raw).is_none() {
                bail!("background_color must look like #rrggbb, got {raw}");
            }
        }
        Ok(())
    }

    pub fn text_timeout(&self) -> Duration {
        Duration::from_secs(self.text_timeout_secs.max(1))
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs.max(1))
    }

    pub fn transparency_options(&self) -> TransparencyOptions {
        TransparencyOptions {
            tolerance: self.tolerance,
            edge_sampling: self.edge_sampling,
            background: self.background_color.as_deref().and_then(parse_hex_color),
        }
    }

    pub fn export_layout(&self) -> ExportLayout {
        match self.export_base_name.as_deref().map(str::trim) {
            Some(base) if !base.is_empty() => ExportLayout::from_base(base),
            _ => ExportLayout::default(),
        }
    }
}

pub fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        env::var(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Trims trailing slashes and appends `/v1` to a bare host.
pub fn normalize_api_base(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_API_BASE.to_string();
    }
    match reqwest::Url::parse(trimmed) {
        Ok(parsed) if parsed.path().trim().is_empty() || parsed.path() == "/" => {
            format!("{trimmed}/v1")
        }
        _ => trimmed.to_string(),
    }
}
