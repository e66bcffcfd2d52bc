use std::sync::Arc;

use spine_studio_contracts::classification::{
    parse_classification, ClassificationResult, ClassificationSource, ParseOutcome,
    CLASSIFIER_SYSTEM_PROMPT,
};
use tracing::{debug, warn};

use crate::completion::{CompletionRequest, TextCompletion};
use crate::transport::error_chain_text;

const CLASSIFIER_TEMPERATURE: f64 = 0.1;
const CLASSIFIER_MAX_TOKENS: u32 = 400;

/// Routes a request to one category. Total: every failure becomes
/// `unknown` with confidence 0.
pub struct RequestClassifier {
    completion: Option<Arc<dyn TextCompletion>>,
}

impl RequestClassifier {
    pub fn new(completion: Option<Arc<dyn TextCompletion>>) -> Self {
        Self { completion }
    }

    pub fn classify(&self, prompt: &str) -> ClassificationResult {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return ClassificationResult::unknown(
                "Empty request",
                ClassificationSource::EmptyPrompt,
            );
        }
        let Some(completion) = self.completion.as_ref() else {
            return ClassificationResult::unknown(
                "Classification failed: no text model configured",
                ClassificationSource::TransportError,
            );
        };

        let request = CompletionRequest::new(CLASSIFIER_SYSTEM_PROMPT, prompt)
            .with_temperature(CLASSIFIER_TEMPERATURE)
            .with_max_tokens(CLASSIFIER_MAX_TOKENS);
        let reply = match completion.complete(&request) {
            Ok(reply) => reply,
            Err(err) => {
                let detail = error_chain_text(&err, 300);
                warn!(error = %detail, "classification call failed");
                return ClassificationResult::unknown(
                    format!("Classification failed: {detail}"),
                    ClassificationSource::TransportError,
                );
            }
        };

        match parse_classification(&reply) {
            ParseOutcome::Failed => {
                warn!(reply = %reply, "classification reply was not understood");
                ParseOutcome::Failed.into_result()
            }
            outcome => {
                let result = outcome.into_result();
                debug!(
                    category = result.category.as_str(),
                    confidence = result.confidence,
                    source = ?result.source,
                    "classified request"
                );
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use spine_studio_contracts::classification::{Category, HEURISTIC_CONFIDENCE};

    use super::*;
    use crate::test_support::ScriptedCompletion;

    fn classifier(model: &Arc<ScriptedCompletion>) -> RequestClassifier {
        RequestClassifier::new(Some(model.clone() as Arc<dyn TextCompletion>))
    }

    #[test]
    fn structured_reply_is_used_as_is() {
        let model = ScriptedCompletion::replying(
            "```json\n{\"category\": \"animation\", \"confidence\": 0.92, \"reasoning\": \"motion\", \"extractedParams\": {\"animationType\": \"run\", \"speed\": \"faster\"}}\n```",
        );
        let result = classifier(&model).classify("make him run faster");
        assert_eq!(result.category, Category::Animation);
        assert_eq!(result.confidence, 0.92);
        assert_eq!(result.param_str("animationType"), Some("run"));
        assert_eq!(result.source, ClassificationSource::Structured);

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].temperature, 0.1);
        assert_eq!(calls[0].user, "make him run faster");
        assert!(calls[0].system.contains("image_generation"));
    }

    #[test]
    fn prose_reply_goes_through_the_heuristic() {
        let model = ScriptedCompletion::replying("I think this is about walking faster");
        let result = classifier(&model).classify("walk quicker please");
        assert_eq!(result.category, Category::Animation);
        assert_eq!(result.confidence, HEURISTIC_CONFIDENCE);
        assert_eq!(result.source, ClassificationSource::Heuristic);
        assert!(result.reasoning.to_ascii_lowercase().contains("fallback"));
    }

    #[test]
    fn unreadable_reply_is_unknown() {
        let model = ScriptedCompletion::replying("¯\\_(ツ)_/¯");
        let result = classifier(&model).classify("hmm");
        assert_eq!(result.category, Category::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.source, ClassificationSource::Failed);
    }

    #[test]
    fn transport_errors_are_unknown_with_reason() {
        let model = ScriptedCompletion::failing("connection timed out");
        let result = classifier(&model).classify("give him a red hat");
        assert_eq!(result.category, Category::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.source, ClassificationSource::TransportError);
        assert!(result.reasoning.contains("connection timed out"));

        let offline = RequestClassifier::new(None).classify("give him a red hat");
        assert_eq!(offline.category, Category::Unknown);
    }

    #[test]
    fn blank_prompt_short_circuits() {
        let model = ScriptedCompletion::replying("{}");
        let result = classifier(&model).classify("  \n ");
        assert_eq!(result.source, ClassificationSource::EmptyPrompt);
        assert_eq!(model.call_count(), 0);
    }

    #[test]
    fn every_reply_shape_yields_a_valid_result() {
        let replies = [
            "",
            "{",
            "{\"category\": \"dance\", \"confidence\": 0.9, \"reasoning\": \"x\"}",
            "{\"category\": \"animation\", \"confidence\": 7, \"reasoning\": \"x\"}",
            "export please",
            "null",
        ];
        for reply in replies {
            let model = ScriptedCompletion::replying(reply);
            let result = classifier(&model).classify("anything");
            assert!(Category::ALL.contains(&result.category), "{reply}");
            assert!((0.0..=1.0).contains(&result.confidence), "{reply}");
        }
    }
}
