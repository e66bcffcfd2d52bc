use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Request trail written as `events.jsonl`.
///
/// Every line is one compact object with `type`, `session_id` and `ts`
/// filled in first; the payload is merged over them. Clones share the same
/// file and lock, so one writer can be handed to every request.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.shared.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(timestamp_now()));
        event.extend(payload);

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        if let Some(parent) = self.shared.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let _guard = self
            .shared
            .lock
            .lock()
            .map_err(|_| anyhow!("event writer lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.shared.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .with_context(|| format!("appending to {}", self.shared.path.display()))?;

        Ok(Value::Object(event))
    }

    /// Like [`emit`](Self::emit) for callers holding a `json!` object.
    /// Non-object values are stored under `data`.
    pub fn emit_value(&self, event_type: &str, payload: Value) -> Result<Value> {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        self.emit(event_type, payload)
    }
}

pub fn read_events(path: &Path) -> Result<Vec<Value>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).context("parsing event line"))
        .collect()
}

pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
