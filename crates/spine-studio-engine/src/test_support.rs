use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::completion::{CompletionRequest, TextCompletion};
use crate::providers::{DryrunProvider, ImageProvider, ImageRequest, ImageResponse};

/// Replays queued replies in order, repeating the last one once drained.
pub(crate) struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, String>>>,
    last: Mutex<Option<Result<String, String>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub(crate) fn replying(reply: &str) -> Arc<Self> {
        Self::script(vec![Ok(reply.to_string())])
    }

    pub(crate) fn failing(message: &str) -> Arc<Self> {
        Self::script(vec![Err(message.to_string())])
    }

    pub(crate) fn script(replies: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls().len()
    }
}

impl TextCompletion for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| anyhow!("scripted replies poisoned"))?;
        let mut last = self
            .last
            .lock()
            .map_err(|_| anyhow!("scripted replies poisoned"))?;
        let reply = match replies.pop_front() {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err("no scripted reply".to_string())),
        };
        reply.map_err(|message| anyhow!(message))
    }
}

/// Dryrun output plus a record of every request it saw.
#[derive(Default)]
pub(crate) struct RecordingProvider {
    requests: Mutex<Vec<ImageRequest>>,
    fail_with: Option<String>,
    bytes: Option<Vec<u8>>,
}

impl RecordingProvider {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        })
    }

    pub(crate) fn returning(bytes: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            bytes: Some(bytes.to_vec()),
            ..Self::default()
        })
    }

    pub(crate) fn requests(&self) -> Vec<ImageRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl ImageProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    fn generate(&self, request: &ImageRequest) -> Result<ImageResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(message) = self.fail_with.as_ref() {
            return Err(anyhow!(message.clone()));
        }
        let mut response = DryrunProvider.generate(request)?;
        if let Some(bytes) = self.bytes.as_ref() {
            response.bytes = bytes.clone();
        }
        response.revised_prompt = Some(format!("revised: {}", request.prompt));
        Ok(response)
    }
}
