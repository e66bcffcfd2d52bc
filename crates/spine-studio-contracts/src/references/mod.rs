mod selection;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use selection::{
    enforce_single_body_part, score_candidates, select_references, ReferenceSelection,
    ScoredCandidate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    CharacterPart,
    Texture,
    Accessory,
}

impl ImageCategory {
    /// Name-based guess; not authoritative.
    pub fn from_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|needle| name.contains(needle));
        if has(&[
            "head", "torso", "neck", "thigh", "shin", "foot", "arm", "fist", "bracer",
        ]) {
            return Self::CharacterPart;
        }
        if has(&["goggles", "gun", "crosshair", "hoverboard", "portal"]) {
            return Self::Accessory;
        }
        if has(&["muzzle", "glow", "flare", "streak", "eye", "mouth"]) {
            return Self::Texture;
        }
        Self::CharacterPart
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CharacterPart => "character_part",
            Self::Texture => "texture",
            Self::Accessory => "accessory",
        }
    }
}

impl fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `data:<mime>;base64,<data>` payload carried inline with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlinePayload {
    pub mime: String,
    pub data: String,
}

impl InlinePayload {
    pub fn new(mime: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            data: data.into(),
        }
    }

    pub fn parse(locator: &str) -> Option<Self> {
        let rest = locator.trim().strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let mime = header.strip_suffix(";base64")?.trim();
        let data = data.trim();
        if mime.is_empty() || data.is_empty() {
            return None;
        }
        Some(Self::new(mime, data))
    }

    pub fn to_locator(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// A rendered body part shipped with the rig.
    System { path: String },
    /// A style reference uploaded by the user.
    User { payload: InlinePayload },
}

impl ImageSource {
    /// Only a well-formed inline payload counts as a user upload.
    pub fn from_locator(locator: &str) -> Self {
        match InlinePayload::parse(locator) {
            Some(payload) => Self::User { payload },
            None => Self::System {
                path: locator.trim().to_string(),
            },
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System { .. })
    }

    pub fn locator(&self) -> String {
        match self {
            Self::System { path } => path.clone(),
            Self::User { payload } => payload.to_locator(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub name: String,
    pub source: ImageSource,
    pub category: ImageCategory,
}

impl ReferenceImage {
    pub fn system(name: impl Into<String>, path: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            category: ImageCategory::from_name(&name),
            name,
            source: ImageSource::System { path: path.into() },
        }
    }

    /// `index` is zero-based; it only names uploads whose filename has no stem.
    pub fn user(file_name: &str, index: usize, payload: InlinePayload) -> Self {
        Self {
            name: user_image_name(file_name, index),
            source: ImageSource::User { payload },
            category: ImageCategory::Texture,
        }
    }

    /// Builds a reference from a raw locator, deciding the variant once.
    pub fn from_locator(name: &str, locator: &str, index: usize) -> Self {
        match ImageSource::from_locator(locator) {
            ImageSource::User { payload } => Self::user(name, index, payload),
            ImageSource::System { path } => Self::system(name, path),
        }
    }

    pub fn is_user(&self) -> bool {
        self.source.is_user()
    }

    pub fn is_system(&self) -> bool {
        self.source.is_system()
    }

    /// Compact description for logs and results; inline payloads are not echoed.
    pub fn summary(&self) -> Value {
        match &self.source {
            ImageSource::System { path } => json!({
                "name": self.name,
                "kind": "system",
                "category": self.category,
                "path": path,
            }),
            ImageSource::User { payload } => json!({
                "name": self.name,
                "kind": "user",
                "category": self.category,
                "mime": payload.mime,
                "bytes_b64": payload.data.len(),
            }),
        }
    }
}

pub fn user_image_name(file_name: &str, index: usize) -> String {
    let stem = Path::new(file_name.trim())
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("")
        .trim();
    if stem.is_empty() {
        format!("user-uploaded-{}", index + 1)
    } else {
        stem.to_string()
    }
}

pub fn filter_by_category(pool: &[ReferenceImage], category: ImageCategory) -> Vec<ReferenceImage> {
    pool.iter()
        .filter(|image| image.category == category)
        .cloned()
        .collect()
}
