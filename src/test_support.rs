use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{CompletionParams, CompletionProvider, ProviderError};
use crate::model::Segment;
use crate::pacing::Sleeper;

pub fn segment(n: u32) -> Segment {
    let mut content = Map::new();
    content.insert("narration".into(), Value::String(format!("segment {n}")));
    Segment {
        segment_number: n,
        characters_present: Vec::new(),
        content,
    }
}

/// A provider response with `count` segments and, when `title` is given,
/// first-set metadata.
pub fn set_response(count: u32, title: Option<&str>) -> String {
    let segments: Vec<Value> = (1..=count)
        .map(|i| json!({"segment_number": i, "narration": format!("local {i}")}))
        .collect();
    let mut body = json!({ "segments": segments });
    if let Some(title) = title {
        body["title"] = json!(title);
        body["summary"] = json!("summary");
        body["hashtags"] = json!(["#test"]);
    }
    format!("```json\n{}\n```", body)
}

/// Replays a fixed list of replies, one per call.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str, _params: &CompletionParams) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Transport("script exhausted".into())))
    }
}

/// Records requested delays instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}
