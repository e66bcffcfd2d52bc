use std::sync::Arc;

use serde::Serialize;
use spine_studio_contracts::prompts::{fallback_rewrite, normalize_rewrite, REWRITE_SYSTEM_PROMPT};
use tracing::{debug, warn};

use crate::completion::{CompletionRequest, TextCompletion};
use crate::transport::error_chain_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rewrite {
    pub text: String,
    pub source: RewriteSource,
}

/// Compresses a chatty request into `Generate an image of <item>`.
pub struct PromptRewriter {
    completion: Option<Arc<dyn TextCompletion>>,
}

impl PromptRewriter {
    pub fn new(completion: Option<Arc<dyn TextCompletion>>) -> Self {
        Self { completion }
    }

    pub fn rewrite(&self, original: &str) -> Rewrite {
        let fallback = || Rewrite {
            text: fallback_rewrite(original),
            source: RewriteSource::Fallback,
        };
        if original.trim().is_empty() {
            return fallback();
        }
        let Some(completion) = self.completion.as_ref() else {
            return fallback();
        };

        let request = CompletionRequest::new(REWRITE_SYSTEM_PROMPT, original.trim())
            .with_temperature(0.2)
            .with_max_tokens(80);
        match completion.complete(&request) {
            Ok(reply) => match normalize_rewrite(&reply) {
                Some(text) => {
                    debug!(rewritten = %text, "rewrote image prompt");
                    Rewrite {
                        text,
                        source: RewriteSource::Model,
                    }
                }
                None => {
                    debug!("rewrite reply was empty; using fallback");
                    fallback()
                }
            },
            Err(err) => {
                warn!(
                    error = %error_chain_text(&err, 300),
                    "prompt rewrite failed; using fallback"
                );
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedCompletion;

    fn rewriter(model: Arc<ScriptedCompletion>) -> PromptRewriter {
        PromptRewriter::new(Some(model as Arc<dyn TextCompletion>))
    }

    #[test]
    fn model_reply_is_forced_into_template() {
        let rewrite = rewriter(ScriptedCompletion::replying("\"a shiny red baseball cap.\""))
            .rewrite("give him a shiny red baseball cap");
        assert_eq!(rewrite.text, "Generate an image of a shiny red baseball cap");
        assert_eq!(rewrite.source, RewriteSource::Model);

        let templated = rewriter(ScriptedCompletion::replying("generate an image of a blue scarf"))
            .rewrite("blue scarf for him");
        assert_eq!(templated.text, "Generate an image of a blue scarf");
    }

    #[test]
    fn failures_use_the_item_table() {
        let rewrite =
            rewriter(ScriptedCompletion::failing("timeout")).rewrite("give him a red hat");
        assert_eq!(rewrite.text, "Generate an image of a red hat");
        assert_eq!(rewrite.source, RewriteSource::Fallback);

        let empty = rewriter(ScriptedCompletion::replying("   ")).rewrite("new boots");
        assert_eq!(empty.text, "Generate an image of a pair of boots");
        assert_eq!(empty.source, RewriteSource::Fallback);
    }

    #[test]
    fn unmatched_text_is_wrapped_verbatim() {
        let rewrite = PromptRewriter::new(None).rewrite("a glowing tattoo");
        assert_eq!(rewrite.text, "Generate an image of a glowing tattoo");
    }
}
