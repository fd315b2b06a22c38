//! One provider call per set: submit, clean up, parse, renumber.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::api::{CompletionParams, CompletionProvider, ProviderError};
use crate::model::{Character, Segment, SetOutcome, SetPlan, StoryMetadata};

const EXCERPT_CHARS: usize = 200;

/// Why a set produced no usable segments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetFailure {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("parse error: {detail} (response starts: {excerpt})")]
    Parse { detail: String, excerpt: String },
}

impl SetFailure {
    fn parse(detail: impl Into<String>, text: &str) -> Self {
        SetFailure::Parse {
            detail: detail.into(),
            excerpt: excerpt(text),
        }
    }
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        out.push('…');
    }
    out
}

/// Wraps the completion provider for set generation. Holds the provider by
/// `Arc` so the same client is shared between generation and retry.
#[derive(Clone)]
pub struct SetClient {
    provider: Arc<dyn CompletionProvider>,
    params: CompletionParams,
}

impl SetClient {
    pub fn new(provider: Arc<dyn CompletionProvider>, params: CompletionParams) -> Self {
        Self { provider, params }
    }

    /// Generates one set. Never fails: provider and parse problems come back
    /// as a failed [`SetOutcome`].
    pub async fn generate(&self, prompt: &str, plan: &SetPlan) -> SetOutcome {
        match self.try_generate(prompt, plan).await {
            Ok((segments, metadata)) => SetOutcome::success(plan.set_number, segments, metadata),
            Err(failure) => {
                warn!(set_number = plan.set_number, error = %failure, "Set generation failed");
                SetOutcome::failed(plan.set_number, failure.to_string())
            }
        }
    }

    async fn try_generate(
        &self,
        prompt: &str,
        plan: &SetPlan,
    ) -> Result<(Vec<Segment>, Option<StoryMetadata>), SetFailure> {
        let text = self.provider.complete(prompt, &self.params).await?;
        let (raw_segments, metadata) = parse_set_payload(&text)?;
        if raw_segments.is_empty() {
            return Err(SetFailure::parse("no segments in response", &text));
        }
        Ok((renumber(raw_segments, plan), metadata))
    }
}

fn fence_regex() -> Result<&'static Regex> {
    static FENCE_RE: OnceCell<Regex> = OnceCell::new();
    FENCE_RE.get_or_try_init(|| {
        Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```$")
            .context("failed to compile code fence regex")
    })
}

/// Strips surrounding whitespace and markdown code fences. If prose is left
/// around the payload, narrows to the outermost JSON object or array.
pub fn clean_response_text(text: &str) -> String {
    let trimmed = text.trim();

    let unfenced = match fence_regex() {
        Ok(re) => re
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .unwrap_or(trimmed),
        Err(_) => trimmed,
    };

    if unfenced.starts_with('{') || unfenced.starts_with('[') {
        return unfenced.to_string();
    }

    let open = unfenced.find(['{', '[']);
    let close = unfenced.rfind(['}', ']']);
    match (open, close) {
        (Some(start), Some(end)) if end > start => unfenced[start..=end].to_string(),
        _ => unfenced.to_string(),
    }
}

type RawSegments = Vec<Map<String, Value>>;

/// Parses provider text into raw segment objects plus any metadata fields.
pub fn parse_set_payload(text: &str) -> Result<(RawSegments, Option<StoryMetadata>), SetFailure> {
    let cleaned = clean_response_text(text);
    let root: Value = serde_json::from_str(&cleaned)
        .map_err(|e| SetFailure::parse(e.to_string(), text))?;

    let (list, metadata) = match root {
        Value::Array(items) => (items, None),
        Value::Object(mut obj) => {
            let list = match obj.remove("segments").or_else(|| obj.remove("scenes")) {
                Some(Value::Array(items)) => items,
                Some(_) => return Err(SetFailure::parse("`segments` is not a list", text)),
                None => return Err(SetFailure::parse("missing `segments` list", text)),
            };
            (list, metadata_from(&obj))
        }
        _ => return Err(SetFailure::parse("expected a JSON object or array", text)),
    };

    let mut segments = Vec::with_capacity(list.len());
    for (idx, item) in list.into_iter().enumerate() {
        match item {
            Value::Object(obj) => segments.push(obj),
            _ => {
                return Err(SetFailure::parse(
                    format!("segment {} is not an object", idx + 1),
                    text,
                ));
            }
        }
    }

    Ok((segments, metadata))
}

fn metadata_from(obj: &Map<String, Value>) -> Option<StoryMetadata> {
    let text_field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let hashtags = obj
        .get("hashtags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let characters = obj
        .get("characters")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|c| match c {
                    Value::String(name) => Some(Character {
                        name: name.clone(),
                        description: None,
                        role: None,
                    }),
                    other => serde_json::from_value::<Character>(other.clone()).ok(),
                })
                .collect()
        })
        .unwrap_or_default();

    let meta = StoryMetadata {
        title: text_field("title"),
        summary: text_field("summary"),
        hashtags,
        characters,
    };

    if meta.is_empty() { None } else { Some(meta) }
}

/// Assigns global segment numbers in order of appearance. Provider numbering
/// is discarded; anything past the end of the set is dropped.
pub fn renumber(raw: RawSegments, plan: &SetPlan) -> Vec<Segment> {
    if raw.len() as u32 > plan.segment_count {
        warn!(
            set_number = plan.set_number,
            returned = raw.len(),
            expected = plan.segment_count,
            "Provider returned extra segments; dropping the overflow"
        );
    }

    raw.into_iter()
        .take(plan.segment_count as usize)
        .enumerate()
        .map(|(idx, mut content)| {
            content.remove("segment_number");
            content.remove("scene_number");
            let characters_present = match content.remove("characters_present") {
                Some(Value::Array(names)) => names
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            };
            Segment {
                segment_number: plan.start_segment + idx as u32,
                characters_present,
                content,
            }
        })
        .collect()
}
