use std::sync::Arc;

use serde::Serialize;
use spine_studio_contracts::slots::{SlotCatalog, DEFAULT_SLOT};
use tracing::{debug, warn};

use crate::completion::{CompletionRequest, TextCompletion};
use crate::transport::error_chain_text;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionSource {
    /// A phrase table row matched; `label` names the row.
    Keyword { label: String },
    /// The text model named the slots.
    Model,
    /// Nothing matched and the model was unavailable or unhelpful.
    Default,
    /// The caller named the slot up front.
    Requested,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub slots: Vec<String>,
    pub source: ResolutionSource,
}

impl Resolution {
    pub fn requested(slot: &str) -> Self {
        Self {
            slots: vec![slot.trim().to_ascii_lowercase()],
            source: ResolutionSource::Requested,
        }
    }

    fn default_slot() -> Self {
        Self {
            slots: vec![DEFAULT_SLOT.to_string()],
            source: ResolutionSource::Default,
        }
    }

    /// Never fails: a resolution always names at least one slot.
    pub fn primary(&self) -> &str {
        self.slots
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_SLOT)
    }
}

/// Maps a free-text request to the rig slots it is about.
pub struct BodyPartResolver {
    catalog: Arc<SlotCatalog>,
    completion: Option<Arc<dyn TextCompletion>>,
}

impl BodyPartResolver {
    pub fn new(catalog: Arc<SlotCatalog>, completion: Option<Arc<dyn TextCompletion>>) -> Self {
        Self {
            catalog,
            completion,
        }
    }

    pub fn resolve(&self, prompt: &str) -> Resolution {
        if prompt.trim().is_empty() {
            return Resolution::default_slot();
        }

        if let Some(rule) = self.catalog.match_rule(prompt) {
            debug!(rule = %rule.label, slots = ?rule.slots, "resolved body part from keywords");
            return Resolution {
                slots: rule.slots.clone(),
                source: ResolutionSource::Keyword {
                    label: rule.label.clone(),
                },
            };
        }

        let Some(completion) = self.completion.as_ref() else {
            return Resolution::default_slot();
        };
        let request = CompletionRequest::new(self.instruction(), prompt.trim())
            .with_temperature(0.0)
            .with_max_tokens(64);
        match completion.complete(&request) {
            Ok(reply) => {
                let slots = self.catalog.parse_slot_list(&reply);
                if slots.is_empty() {
                    debug!(reply = %reply, "model named no known slot; using default");
                    Resolution::default_slot()
                } else {
                    debug!(slots = ?slots, "resolved body part from model");
                    Resolution {
                        slots,
                        source: ResolutionSource::Model,
                    }
                }
            }
            Err(err) => {
                warn!(
                    error = %error_chain_text(&err, 300),
                    "body part lookup failed; using default"
                );
                Resolution::default_slot()
            }
        }
    }

    /// Lists every slot with the phrases that lead to it.
    pub fn instruction(&self) -> String {
        let mut text = String::from(
            "You map requests about a 2D side-view character to the rig slots they affect.\n\
             The character faces right, so its left limbs are the front-* slots \
             and its right limbs are the rear-* slots.\n\
             Reply with a comma-separated list of slot names and nothing else.\n\nSlots:\n",
        );
        for spec in self.catalog.slots() {
            let examples: Vec<&str> = self
                .catalog
                .rules()
                .iter()
                .filter(|rule| rule.slots.iter().any(|slot| slot == &spec.name))
                .flat_map(|rule| rule.phrases.iter().map(String::as_str))
                .take(6)
                .collect();
            if examples.is_empty() {
                text.push_str(&format!("- {}\n", spec.name));
            } else {
                text.push_str(&format!("- {} (e.g. {})\n", spec.name, examples.join(", ")));
            }
        }
        text.push_str(&format!(
            "\nIf nothing fits, reply with \"{DEFAULT_SLOT}\"."
        ));
        text
    }
}
