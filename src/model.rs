use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::GenError;

pub const DEFAULT_SEGMENTS_PER_SET: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStyle {
    #[default]
    Story,
    Movie,
    Meme,
    Anime,
}

impl ContentStyle {
    pub fn segment_noun(self) -> &'static str {
        match self {
            ContentStyle::Story => "story segment",
            ContentStyle::Movie => "movie scene",
            ContentStyle::Meme => "meme panel",
            ContentStyle::Anime => "anime scene",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentRating {
    #[default]
    #[serde(rename = "U")]
    Universal,
    #[serde(rename = "U/A", alias = "UA")]
    ParentalGuidance,
    #[serde(rename = "A")]
    Adult,
}

impl ContentRating {
    pub fn label(self) -> &'static str {
        match self {
            ContentRating::Universal => "U",
            ContentRating::ParentalGuidance => "U/A",
            ContentRating::Adult => "A",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

fn default_segments_per_set() -> u32 {
    DEFAULT_SEGMENTS_PER_SET
}

fn default_true() -> bool {
    true
}

/// A request to generate long-form content in sets of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub idea: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub style: ContentStyle,
    pub total_segments: u32,
    #[serde(default = "default_segments_per_set")]
    pub segments_per_set: u32,
    #[serde(default, rename = "custom_character_roster", alias = "characters")]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub no_narration: bool,
    #[serde(default)]
    pub narration_only_first: bool,
    #[serde(default = "default_true")]
    pub allow_dialogue: bool,
    #[serde(default)]
    pub content_rating: ContentRating,
}

impl GenerationRequest {
    pub fn new(idea: impl Into<String>, total_segments: u32, segments_per_set: u32) -> Self {
        Self {
            idea: idea.into(),
            title: None,
            style: ContentStyle::default(),
            total_segments,
            segments_per_set,
            characters: Vec::new(),
            no_narration: false,
            narration_only_first: false,
            allow_dialogue: true,
            content_rating: ContentRating::default(),
        }
    }

    pub fn validate(&self) -> Result<(), GenError> {
        if self.idea.trim().is_empty() {
            return Err(GenError::InvalidInput("idea must not be empty".to_string()));
        }
        if self.total_segments == 0 {
            return Err(GenError::InvalidInput(
                "total_segments must be at least 1".to_string(),
            ));
        }
        if self.segments_per_set == 0 {
            return Err(GenError::InvalidInput(
                "segments_per_set must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Title used when neither the caller nor the provider named the content.
    pub fn fallback_title(&self) -> String {
        let words: Vec<&str> = self.idea.split_whitespace().take(6).collect();
        format!("Untitled: {}", words.join(" "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPlan {
    pub set_number: u32,
    pub start_segment: u32,
    pub end_segment: u32,
    pub segment_count: u32,
}

impl SetPlan {
    pub fn contains(&self, segment_number: u32) -> bool {
        segment_number >= self.start_segment && segment_number <= self.end_segment
    }
}

/// One unit of generated content. Everything the provider sent besides the
/// character list is kept verbatim in `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_number: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub characters_present: Vec<String>,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub characters: Vec<Character>,
}

impl StoryMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.summary.is_none()
            && self.hashtags.is_empty()
            && self.characters.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOutcome {
    pub set_number: u32,
    pub status: SetStatus,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<StoryMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SetOutcome {
    pub fn success(set_number: u32, segments: Vec<Segment>, metadata: Option<StoryMetadata>) -> Self {
        Self {
            set_number,
            status: SetStatus::Success,
            segments,
            metadata,
            error: None,
        }
    }

    pub fn failed(set_number: u32, error: impl Into<String>) -> Self {
        Self {
            set_number,
            status: SetStatus::Failed,
            segments: Vec::new(),
            metadata: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SetStatus::Success
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub total_segments_requested: u32,
    pub total_segments_generated: u32,
    pub total_sets: u32,
    pub successful_sets: u32,
    pub failed_sets: u32,
    pub failed_set_numbers: Vec<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set_errors: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryAttempt {
    pub set_number: u32,
    pub attempt: u32,
    pub status: SetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryInfo {
    pub total_retry_attempts: u32,
    pub successful_retries: u32,
    pub retry_results: Vec<RetryAttempt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub title: String,
    #[serde(default)]
    pub metadata: StoryMetadata,
    pub request: GenerationRequest,
    pub generation_summary: GenerationSummary,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_info: Option<RetryInfo>,
    pub generated_at: DateTime<Utc>,
}

impl GenerationResult {
    /// Builds a complete snapshot from per-set outcomes. `plans` fixes the
    /// expected set numbers; an outcome missing for a planned set counts as
    /// a failure.
    pub fn assemble(
        title: String,
        request: GenerationRequest,
        metadata: StoryMetadata,
        plans: &[SetPlan],
        outcomes: &[SetOutcome],
    ) -> Self {
        let mut segments: Vec<Segment> = Vec::new();
        let mut failed_set_numbers = Vec::new();
        let mut set_errors = BTreeMap::new();
        let mut successful_sets = 0u32;

        for plan in plans {
            match outcomes.iter().find(|o| o.set_number == plan.set_number) {
                Some(outcome) if outcome.is_success() => {
                    successful_sets += 1;
                    segments.extend(
                        outcome
                            .segments
                            .iter()
                            .filter(|s| plan.contains(s.segment_number))
                            .cloned(),
                    );
                }
                Some(outcome) => {
                    failed_set_numbers.push(plan.set_number);
                    if let Some(err) = &outcome.error {
                        set_errors.insert(plan.set_number, err.clone());
                    }
                }
                None => {
                    failed_set_numbers.push(plan.set_number);
                    set_errors.insert(plan.set_number, "missing set artifact".to_string());
                }
            }
        }

        segments.sort_by_key(|s| s.segment_number);
        segments.dedup_by_key(|s| s.segment_number);

        let summary = GenerationSummary {
            total_segments_requested: request.total_segments,
            total_segments_generated: segments.len() as u32,
            total_sets: plans.len() as u32,
            successful_sets,
            failed_sets: failed_set_numbers.len() as u32,
            failed_set_numbers,
            set_errors,
        };

        Self {
            title,
            metadata,
            request,
            generation_summary: summary,
            segments,
            retry_info: None,
            generated_at: Utc::now(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.generation_summary.failed_set_numbers.is_empty()
    }

    /// Segments belonging to one planned set, in order.
    pub fn segments_in(&self, plan: &SetPlan) -> Vec<Segment> {
        self.segments
            .iter()
            .filter(|s| plan.contains(s.segment_number))
            .cloned()
            .collect()
    }
}
