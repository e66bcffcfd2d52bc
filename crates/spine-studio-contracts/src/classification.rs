use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type ExtractedParams = Map<String, Value>;

pub const HEURISTIC_CONFIDENCE: f64 = 0.5;

pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You are a request categorizer for a Spine2D animation studio. The user edits a 2D skeletal character (spineboy) by typing natural-language requests.

Classify the request into exactly one category:

1. "image_generation" - create or change a visual asset: textures, clothing, accessories, recolored body parts.
   Examples: "give him a red hat", "new shoes for him", "make a sword texture", "turn his jacket blue"
   Useful params: itemType, color, bodyPart

2. "animation" - create or change movement.
   Examples: "make him walk", "run faster", "add a jump", "make him dance slower", "idle breathing"
   Useful params: animationType (walk|run|jump|dance|idle|other), speed (faster|slower|normal), direction

3. "export_assets" - export, download or save the character and its assets.
   Examples: "export the animation", "download everything without textures"
   Useful params: includeAnimations (bool), includeTextures (bool), format

4. "unknown" - anything else, or when the request is unclear.

Respond with only a JSON object of this shape:
{"category": "<one of the categories above>", "confidence": <number between 0 and 1>, "reasoning": "<one short sentence>", "extractedParams": {<optional parameters>}}"#;

/// Request taxonomy the router understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ImageGeneration,
    Animation,
    ExportAssets,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::ImageGeneration,
        Category::Animation,
        Category::ExportAssets,
        Category::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageGeneration => "image_generation",
            Self::Animation => "animation",
            Self::ExportAssets => "export_assets",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a category label, accepting the older per-motion labels
    /// (`walk_animation`, `run_animation`, ...) and `appearance_change`.
    ///
    /// The second element is the motion implied by a legacy label.
    pub fn parse_label(label: &str) -> Option<(Category, Option<&'static str>)> {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let parsed = match normalized.as_str() {
            "image_generation" | "appearance_change" => (Self::ImageGeneration, None),
            "animation" => (Self::Animation, None),
            "export_assets" => (Self::ExportAssets, None),
            "unknown" => (Self::Unknown, None),
            "walk_animation" => (Self::Animation, Some("walk")),
            "run_animation" => (Self::Animation, Some("run")),
            "idle_animation" => (Self::Animation, Some("idle")),
            "jump_animation" => (Self::Animation, Some("jump")),
            "dance_animation" => (Self::Animation, Some("dance")),
            "other_animation" => (Self::Animation, Some("other")),
            _ => return None,
        };
        Some(parsed)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Structured,
    Heuristic,
    Failed,
    TransportError,
    EmptyPrompt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub extracted_params: ExtractedParams,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    pub fn unknown(reasoning: impl Into<String>, source: ClassificationSource) -> Self {
        Self {
            category: Category::Unknown,
            confidence: 0.0,
            reasoning: reasoning.into(),
            extracted_params: ExtractedParams::new(),
            source,
        }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.extracted_params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Result of the two-stage reply parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Structured(ClassificationResult),
    Heuristic(ClassificationResult),
    Failed,
}

impl ParseOutcome {
    pub fn into_result(self) -> ClassificationResult {
        match self {
            Self::Structured(result) | Self::Heuristic(result) => result,
            Self::Failed => ClassificationResult::unknown(
                "Reply was neither valid structured output nor recognizable text",
                ClassificationSource::Failed,
            ),
        }
    }
}

pub fn parse_classification(raw: &str) -> ParseOutcome {
    if let Some(result) = try_structured_parse(raw) {
        return ParseOutcome::Structured(result);
    }
    if let Some(result) = try_text_heuristic(raw) {
        return ParseOutcome::Heuristic(result);
    }
    ParseOutcome::Failed
}

/// Strict schema check over the JSON object found in `raw`.
pub fn try_structured_parse(raw: &str) -> Option<ClassificationResult> {
    let object = extract_json_object(raw)?;

    let (category, implied_motion) = Category::parse_label(object.get("category")?.as_str()?)?;
    let confidence = object.get("confidence")?.as_f64()?;
    if !(0.0..=1.0).contains(&confidence) {
        return None;
    }
    let reasoning = object.get("reasoning")?.as_str()?.to_string();

    let params_value = object
        .get("extractedParams")
        .or_else(|| object.get("extracted_params"));
    let mut extracted_params = match params_value {
        None | Some(Value::Null) => ExtractedParams::new(),
        Some(Value::Object(params)) => params.clone(),
        Some(_) => return None,
    };
    if let Some(motion) = implied_motion {
        extracted_params
            .entry("animationType")
            .or_insert_with(|| Value::String(motion.to_string()));
    }

    Some(ClassificationResult {
        category,
        confidence,
        reasoning,
        extracted_params,
        source: ClassificationSource::Structured,
    })
}

/// Keyword scan over a reply that failed the schema check.
///
/// Checked in fixed order: image words, then motion words, then export words.
pub fn try_text_heuristic(raw: &str) -> Option<ClassificationResult> {
    let lowered = raw.to_ascii_lowercase();
    let table: [(Category, &[&str]); 3] = [
        (
            Category::ImageGeneration,
            &["image", "generate", "texture", "color"],
        ),
        (Category::Animation, &["walk", "run", "jump", "dance"]),
        (Category::ExportAssets, &["export", "download"]),
    ];

    for (category, needles) in table {
        let Some(hit) = needles.iter().find(|needle| lowered.contains(*needle)) else {
            continue;
        };
        let mut extracted_params = ExtractedParams::new();
        if category == Category::Animation {
            extracted_params.insert(
                "animationType".to_string(),
                Value::String((*hit).to_string()),
            );
        }
        return Some(ClassificationResult {
            category,
            confidence: HEURISTIC_CONFIDENCE,
            reasoning: format!(
                "Structured reply could not be parsed; text fallback matched \"{hit}\""
            ),
            extracted_params,
            source: ClassificationSource::Heuristic,
        });
    }
    None
}

/// Removes a surrounding markdown fence, with or without a language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let raw = text.trim();
    let Some(inner) = raw
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return raw;
    };
    let inner = inner.trim_start_matches([' ', '\t']);
    match inner.split_once('\n') {
        Some((tag, body))
            if tag.trim().chars().all(|ch| ch.is_ascii_alphanumeric()) =>
        {
            body.trim()
        }
        _ => inner.trim(),
    }
}

/// The whole reply if it is an object, else the outermost `{...}` slice.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let raw = strip_code_fence(text);
    if raw.is_empty() {
        return None;
    }
    let mut candidates = vec![raw];
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if end > start {
            candidates.push(&raw[start..=end]);
        }
    }
    candidates
        .into_iter()
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(object)) => Some(object),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn structured_reply_parses() {
        let raw = r#"{"category":"image_generation","confidence":0.92,"reasoning":"asks for a hat","extractedParams":{"itemType":"hat","color":"red"}}"#;
        let ParseOutcome::Structured(result) = parse_classification(raw) else {
            panic!("expected structured parse");
        };
        assert_eq!(result.category, Category::ImageGeneration);
        assert_eq!(result.confidence, 0.92);
        assert_eq!(result.param_str("color"), Some("red"));
        assert_eq!(result.source, ClassificationSource::Structured);
    }

    #[test]
    fn fenced_reply_with_commentary_parses() {
        let raw = "```json\n{\"category\": \"export_assets\", \"confidence\": 1, \"reasoning\": \"export\"}\n```";
        let result = try_structured_parse(raw).expect("fenced json");
        assert_eq!(result.category, Category::ExportAssets);
        assert!(result.extracted_params.is_empty());

        let raw = "Sure! Here you go: {\"category\": \"animation\", \"confidence\": 0.7, \"reasoning\": \"motion\", \"extracted_params\": {\"speed\": \"faster\"}} Hope that helps.";
        let result = try_structured_parse(raw).expect("embedded json");
        assert_eq!(result.category, Category::Animation);
        assert_eq!(result.param_str("speed"), Some("faster"));
    }

    #[test]
    fn legacy_labels_map_onto_animation() {
        let raw = r#"{"category":"run_animation","confidence":0.8,"reasoning":"run"}"#;
        let result = try_structured_parse(raw).expect("legacy label");
        assert_eq!(result.category, Category::Animation);
        assert_eq!(result.param_str("animationType"), Some("run"));

        let raw = r#"{"category":"dance_animation","confidence":0.8,"reasoning":"x","extractedParams":{"animationType":"other"}}"#;
        let result = try_structured_parse(raw).expect("legacy label");
        assert_eq!(result.param_str("animationType"), Some("other"));

        assert_eq!(
            Category::parse_label("appearance_change"),
            Some((Category::ImageGeneration, None))
        );
    }

    #[test]
    fn schema_violations_are_rejected() {
        for raw in [
            r#"{"category":"cooking","confidence":0.5,"reasoning":"x"}"#,
            r#"{"category":"animation","confidence":1.5,"reasoning":"x"}"#,
            r#"{"category":"animation","confidence":"high","reasoning":"x"}"#,
            r#"{"category":"animation","reasoning":"x"}"#,
            r#"{"category":"animation","confidence":0.5}"#,
            r#"{"category":"animation","confidence":0.5,"reasoning":"x","extractedParams":[1]}"#,
            r#"["animation"]"#,
            "",
        ] {
            assert!(try_structured_parse(raw).is_none(), "{raw}");
        }
    }

    #[test]
    fn text_fallback_detects_walking() {
        let outcome = parse_classification("I think this is about walking faster");
        let ParseOutcome::Heuristic(result) = outcome else {
            panic!("expected heuristic outcome");
        };
        assert_eq!(result.category, Category::Animation);
        assert_eq!(result.confidence, 0.5);
        assert!(result.reasoning.contains("fallback"));
        assert_eq!(
            result.extracted_params,
            json!({"animationType": "walk"})
                .as_object()
                .cloned()
                .unwrap_or_default()
        );
    }

    #[test]
    fn text_fallback_order_prefers_image_words() {
        let result = try_text_heuristic("generate a running texture").expect("match");
        assert_eq!(result.category, Category::ImageGeneration);
        let result = try_text_heuristic("Please DOWNLOAD it").expect("match");
        assert_eq!(result.category, Category::ExportAssets);
        assert!(try_text_heuristic("no idea, sorry").is_none());
    }

    #[test]
    fn any_reply_classifies_into_taxonomy() {
        for raw in [
            "",
            "{",
            "}{",
            "```",
            "``````",
            "null",
            "{\"category\": null}",
            "\u{0}\u{1}garbage",
            "ünïcödé {\"category\":\"unknown\",\"confidence\":0,\"reasoning\":\"\"}",
        ] {
            let result = parse_classification(raw).into_result();
            assert!(Category::ALL.contains(&result.category), "{raw}");
            assert!((0.0..=1.0).contains(&result.confidence));
        }
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  plain  "), "plain");
    }
}
