use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{param_bool, param_str, HandlerResult};
use crate::classification::{Category, ExtractedParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFileKind {
    Skeleton,
    Animations,
    Atlas,
    Texture,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFile {
    pub path: String,
    pub kind: ExportFileKind,
}

/// File names of one exported rig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportLayout {
    pub skeleton: String,
    pub animations: String,
    pub atlas: String,
    pub texture: String,
}

impl ExportLayout {
    pub fn from_base(base: &str) -> Self {
        let base = base.trim();
        Self {
            skeleton: format!("{base}.json"),
            animations: format!("{base}-animations.json"),
            atlas: format!("{base}.atlas"),
            texture: format!("{base}.png"),
        }
    }
}

impl Default for ExportLayout {
    fn default() -> Self {
        Self {
            skeleton: "spineboy-ess.json".to_string(),
            animations: "spineboy-animations.json".to_string(),
            atlas: "spineboy.atlas".to_string(),
            texture: "spineboy.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub include_animations: bool,
    pub include_textures: bool,
    pub format: String,
    pub files: Vec<ExportFile>,
}

impl ExportManifest {
    /// The skeleton file is always first; the rest depend on the flags.
    pub fn build(layout: &ExportLayout, include_animations: bool, include_textures: bool) -> Self {
        let mut files = vec![ExportFile {
            path: layout.skeleton.clone(),
            kind: ExportFileKind::Skeleton,
        }];
        if include_animations {
            files.push(ExportFile {
                path: layout.animations.clone(),
                kind: ExportFileKind::Animations,
            });
        }
        if include_textures {
            files.push(ExportFile {
                path: layout.atlas.clone(),
                kind: ExportFileKind::Atlas,
            });
            files.push(ExportFile {
                path: layout.texture.clone(),
                kind: ExportFileKind::Texture,
            });
        }
        Self {
            include_animations,
            include_textures,
            format: "spine-json".to_string(),
            files,
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|file| file.path.as_str()).collect()
    }
}

pub fn handle_export(layout: &ExportLayout, params: &ExtractedParams) -> HandlerResult {
    let include_animations = param_bool(params, "includeAnimations", true);
    let include_textures = param_bool(params, "includeTextures", true);
    let mut manifest = ExportManifest::build(layout, include_animations, include_textures);
    if let Some(format) = param_str(params, "format") {
        manifest.format = format.to_string();
    }

    let mut out = Map::new();
    out.insert("includeAnimations".to_string(), json!(include_animations));
    out.insert("includeTextures".to_string(), json!(include_textures));
    out.insert("format".to_string(), json!(manifest.format));
    out.insert("files".to_string(), json!(manifest.paths()));
    out.insert(
        "manifest".to_string(),
        serde_json::to_value(&manifest).unwrap_or(Value::Null),
    );

    let message = format!("Prepared export package with {} files", manifest.files.len());
    HandlerResult::ok(Category::ExportAssets, message, out)
}
