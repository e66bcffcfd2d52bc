use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use spine_studio_contracts::classification::{Category, ClassificationResult, ExtractedParams};
use spine_studio_contracts::events::{timestamp_now, EventWriter};
use spine_studio_contracts::handlers::{
    handle_animation, handle_export, handle_unknown, param_str, HandlerResult,
};
use spine_studio_contracts::prompts::{detect_color, detect_item, enhance, EnhanceInput};
use spine_studio_contracts::references::{select_references, ReferenceImage, ReferenceSelection};
use spine_studio_contracts::slots::SlotCatalog;
use tracing::{debug, info, warn};

use crate::classifier::RequestClassifier;
use crate::completion::{OpenAiChatClient, TextCompletion};
use crate::config::StudioConfig;
use crate::providers::{sanitize_file_stem, ImageProvider, ImageProviderRegistry, ImageRequest};
use crate::resolver::{BodyPartResolver, Resolution};
use crate::rewriter::{PromptRewriter, Rewrite};
use crate::transparency::{make_transparent_png, TransparencyReport};
use crate::transport::error_chain_text;

/// Resolved target plus the references chosen for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedRequest {
    pub resolution: Resolution,
    pub selection: ReferenceSelection,
}

impl PreparedRequest {
    pub fn target_slot(&self) -> &str {
        &self.selection.target_slot
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudioResponse {
    pub classification: ClassificationResult,
    pub result: HandlerResult,
    pub timestamp: String,
}

struct RenderedImage {
    path: PathBuf,
    report: TransparencyReport,
    revised_prompt: Option<String>,
    warnings: Vec<String>,
}

/// The request pipeline: prepare, classify, dispatch.
///
/// Everything a `Studio` holds is immutable or internally synchronized,
/// so one instance can serve requests from several threads.
pub struct Studio {
    config: Arc<StudioConfig>,
    catalog: Arc<SlotCatalog>,
    completion: Option<Arc<dyn TextCompletion>>,
    resolver: BodyPartResolver,
    classifier: RequestClassifier,
    rewriter: PromptRewriter,
    provider: Arc<dyn ImageProvider>,
    events: Option<EventWriter>,
}

impl Studio {
    pub fn new(
        config: StudioConfig,
        completion: Option<Arc<dyn TextCompletion>>,
        provider: Arc<dyn ImageProvider>,
    ) -> Self {
        let catalog = SlotCatalog::shared();
        Self {
            config: Arc::new(config),
            resolver: BodyPartResolver::new(catalog.clone(), completion.clone()),
            classifier: RequestClassifier::new(completion.clone()),
            rewriter: PromptRewriter::new(completion.clone()),
            catalog,
            completion,
            provider,
            events: None,
        }
    }

    /// OpenAI chat when a key is configured; the image provider named in
    /// the config.
    pub fn from_config(config: StudioConfig) -> Result<Self> {
        let completion: Option<Arc<dyn TextCompletion>> = if config.api_key.is_some() {
            Some(Arc::new(OpenAiChatClient::new(&config)?))
        } else {
            warn!("no API key configured; text model calls will use local fallbacks");
            None
        };
        let mut registry = ImageProviderRegistry::from_config(&config)?;
        let Some(provider) = registry.take(&config.image_provider) else {
            bail!(
                "unknown image provider '{}' (available: {})",
                config.image_provider,
                registry.names().join(", ")
            );
        };
        Ok(Self::new(config, completion, Arc::from(provider)))
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<SlotCatalog>) -> Self {
        self.resolver = BodyPartResolver::new(catalog.clone(), self.completion.clone());
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SlotCatalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &BodyPartResolver {
        &self.resolver
    }

    /// Resolves the target slot (unless `target` names one) and selects
    /// references for it.
    pub fn prepare(
        &self,
        prompt: &str,
        pool: &[ReferenceImage],
        target: Option<&str>,
    ) -> PreparedRequest {
        let requested = target
            .map(|slot| slot.trim().to_ascii_lowercase())
            .filter(|slot| !slot.is_empty());
        let resolution = match requested {
            Some(slot) if self.catalog.contains(&slot) => Resolution::requested(&slot),
            Some(slot) => {
                warn!(
                    slot = %slot,
                    "requested slot is not in the rig; resolving from the prompt"
                );
                self.resolver.resolve(prompt)
            }
            None => self.resolver.resolve(prompt),
        };
        let selection = select_references(pool, prompt, resolution.primary(), &self.catalog);
        self.emit(
            "references_selected",
            json!({
                "target_slot": selection.target_slot,
                "resolution": resolution,
                "references": selection.summary()["references"],
            }),
        );
        if selection.corrected {
            self.emit(
                "reference_selection_corrected",
                json!({
                    "target_slot": selection.target_slot,
                    "kept": selection.body_part().map(|image| image.name.clone()),
                }),
            );
        }
        PreparedRequest {
            resolution,
            selection,
        }
    }

    pub fn classify(&self, prompt: &str) -> ClassificationResult {
        let classification = self.classifier.classify(prompt);
        self.emit(
            "request_classified",
            json!({
                "category": classification.category,
                "confidence": classification.confidence,
                "source": classification.source,
                "reasoning": classification.reasoning,
            }),
        );
        classification
    }

    pub fn dispatch(
        &self,
        category: Category,
        prompt: &str,
        params: &ExtractedParams,
        prepared: &PreparedRequest,
    ) -> HandlerResult {
        match category {
            Category::ImageGeneration => self.generate_image(prompt, params, prepared),
            Category::Animation => handle_animation(prompt, params),
            Category::ExportAssets => handle_export(&self.config.export_layout(), params),
            Category::Unknown => handle_unknown(prompt, params),
        }
    }

    pub fn handle_request(&self, prompt: &str, pool: &[ReferenceImage]) -> StudioResponse {
        self.emit(
            "request_started",
            json!({
                "prompt": prompt,
                "pool_size": pool.len(),
            }),
        );

        let mut prepared = self.prepare(prompt, pool, None);
        let classification = self.classify(prompt);

        if classification.category == Category::ImageGeneration {
            if let Some(slot) = classification
                .param_str("bodyPart")
                .map(str::to_ascii_lowercase)
                .filter(|slot| self.catalog.contains(slot) && slot != prepared.target_slot())
            {
                debug!(slot = %slot, "classifier named a different body part; reselecting");
                prepared = self.prepare(prompt, pool, Some(slot.as_str()));
            }
        }

        let result = self.dispatch(
            classification.category,
            prompt,
            &classification.extracted_params,
            &prepared,
        );
        info!(
            category = classification.category.as_str(),
            success = result.success,
            "request handled"
        );
        self.emit(
            "request_finished",
            json!({
                "category": classification.category,
                "success": result.success,
                "error": result.error,
            }),
        );

        StudioResponse {
            classification,
            result,
            timestamp: timestamp_now(),
        }
    }

    fn generate_image(
        &self,
        prompt: &str,
        params: &ExtractedParams,
        prepared: &PreparedRequest,
    ) -> HandlerResult {
        let Rewrite { text: rewritten, .. } = self.rewriter.rewrite(prompt);
        let orientation: Vec<String> = param_str(params, "orientation")
            .map(|value| vec![value.to_string()])
            .unwrap_or_default();
        let enhanced = enhance(&EnhanceInput {
            short_prompt: &rewritten,
            category: Category::ImageGeneration,
            item_type: param_str(params, "itemType").or_else(|| detect_item(prompt)),
            color: param_str(params, "color").or_else(|| detect_color(prompt)),
            target_slots: &prepared.resolution.slots,
            references: &prepared.selection.references,
            orientation_constraints: &orientation,
        });

        let mut out = params.clone();
        out.insert("rewrittenPrompt".to_string(), json!(rewritten));
        out.insert("enhancedPrompt".to_string(), json!(enhanced));
        out.insert(
            "references".to_string(),
            prepared.selection.summary()["references"].clone(),
        );
        out.insert("targetSlots".to_string(), json!(prepared.resolution.slots));
        out.insert("imageLocator".to_string(), Value::Null);

        match self.render(&enhanced, prepared) {
            Ok(rendered) => {
                let locator = rendered.path.to_string_lossy().to_string();
                let attachments: Vec<Value> = prepared
                    .resolution
                    .slots
                    .iter()
                    .map(|slot| json!({"slot": slot, "imageLocator": locator}))
                    .collect();
                out.insert("imageLocator".to_string(), json!(locator));
                out.insert("attachments".to_string(), Value::Array(attachments));
                out.insert("transparency".to_string(), json!(rendered.report));
                if let Some(revised) = rendered.revised_prompt.as_ref() {
                    out.insert("revisedPrompt".to_string(), json!(revised));
                }
                if !rendered.warnings.is_empty() {
                    out.insert("warnings".to_string(), json!(rendered.warnings));
                }
                self.emit(
                    "image_generated",
                    json!({
                        "provider": self.provider.name(),
                        "image_locator": locator,
                        "target_slots": prepared.resolution.slots,
                        "cleared_pixels": rendered.report.cleared,
                    }),
                );
                HandlerResult::ok(
                    Category::ImageGeneration,
                    format!("Generated a sprite for {}", prepared.target_slot()),
                    out,
                )
            }
            Err(err) => {
                let detail = error_chain_text(&err, 500);
                warn!(error = %detail, "image generation failed");
                self.emit(
                    "image_generation_failed",
                    json!({
                        "provider": self.provider.name(),
                        "error": detail,
                    }),
                );
                HandlerResult::failed(
                    Category::ImageGeneration,
                    "Image generation failed",
                    detail,
                    out,
                )
            }
        }
    }

    fn render(&self, enhanced: &str, prepared: &PreparedRequest) -> Result<RenderedImage> {
        let request = ImageRequest::from_config(&self.config, enhanced)
            .with_references(prepared.selection.references.clone());
        let response = self
            .provider
            .generate(&request)
            .with_context(|| format!("{} image request failed", self.provider.name()))?;
        let (png, report) =
            make_transparent_png(&response.bytes, &self.config.transparency_options())?;

        fs::create_dir_all(&self.config.out_dir)
            .with_context(|| format!("failed to create {}", self.config.out_dir.display()))?;
        let path = self.config.out_dir.join(format!(
            "{}-{}.png",
            sanitize_file_stem(prepared.target_slot()),
            uuid::Uuid::new_v4()
        ));
        fs::write(&path, png).with_context(|| format!("failed to write {}", path.display()))?;
        debug!(path = %path.display(), cleared = report.cleared, "wrote transparent sprite");

        Ok(RenderedImage {
            path,
            report,
            revised_prompt: response.revised_prompt,
            warnings: response.warnings,
        })
    }

    fn emit(&self, event_type: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit_value(event_type, payload) {
            warn!(
                event = event_type,
                error = %error_chain_text(&err, 300),
                "failed to record event"
            );
        }
    }
}
