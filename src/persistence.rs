//! Job persistence keyed by content title.
//!
//! A job is stored as one document in `jobs` plus one document per set in
//! `sets`. Set documents are written as each set finishes, so a job that dies
//! halfway can still be inspected with [`Persistence::status`] and resumed
//! by retrying its missing sets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use crate::error::StoreError;
use crate::generator::{JobHeader, SetSink};
use crate::model::{
    GenerationRequest, GenerationResult, RetryInfo, SetOutcome, SetStatus, StoryMetadata,
};
use crate::planner;
use crate::store::{DocumentStore, Filter};

pub const JOBS_COLLECTION: &str = "jobs";
pub const SETS_COLLECTION: &str = "sets";

const TITLE_SLUG_MAX: usize = 60;
const TITLE_DIGEST_CHARS: usize = 12;

/// Caller-facing identity of a title: trimmed, lowercased, inner whitespace
/// collapsed.
fn title_identity(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Document key for a title: a readable ASCII slug plus a short SHA-256
/// digest of the title identity, so titles that slug alike stay distinct.
pub fn title_key(title: &str) -> String {
    let identity = title_identity(title);
    let mut slug = String::new();
    for ch in identity.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= TITLE_SLUG_MAX {
            break;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }

    let digest = format!("{:x}", Sha256::digest(identity.as_bytes()));
    format!("{}-{}", slug, &digest[..TITLE_DIGEST_CHARS])
}

fn set_prefix(key: &str) -> String {
    format!("{}--set-", key)
}

fn set_doc_id(key: &str, set_number: u32) -> String {
    format!("{}{:03}", set_prefix(key), set_number)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub title: String,
    pub request: GenerationRequest,
    pub total_sets: u32,
    #[serde(default)]
    pub metadata: StoryMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_info: Option<RetryInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub title: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sets_expected: Option<u32>,
    pub existing_sets: Vec<u32>,
    pub failed_sets: Vec<u32>,
    pub missing_sets: Vec<u32>,
    pub is_complete: bool,
}

impl JobStatus {
    fn absent(title: &str) -> Self {
        Self {
            title: title.to_string(),
            exists: false,
            total_sets_expected: None,
            existing_sets: Vec::new(),
            failed_sets: Vec::new(),
            missing_sets: Vec::new(),
            is_complete: false,
        }
    }
}

#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn DocumentStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The job document, or `None` when it is absent or unreadable.
    pub async fn job(&self, title: &str) -> Result<Option<JobRecord>, StoreError> {
        let key = title_key(title);
        let doc = match self.store.find_by_id(JOBS_COLLECTION, &key).await {
            Ok(doc) => doc,
            Err(StoreError::Encoding(e)) => {
                warn!(title, error = %e, "Job document is corrupt; treating as absent");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(doc.and_then(|doc| match serde_json::from_value::<JobRecord>(doc) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(title, error = %e, "Job document has unexpected shape; treating as absent");
                None
            }
        }))
    }

    async fn set_outcomes(&self, title: &str, total_sets: u32) -> Result<Vec<SetOutcome>, StoreError> {
        let key = title_key(title);
        let docs = self
            .store
            .find_by_filter(SETS_COLLECTION, &Filter::id_prefix(set_prefix(&key)))
            .await?;

        let mut outcomes: Vec<SetOutcome> = docs
            .into_iter()
            .filter_map(|(id, doc)| match serde_json::from_value::<SetOutcome>(doc) {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping unreadable set document");
                    None
                }
            })
            .filter(|o| o.set_number >= 1 && o.set_number <= total_sets)
            .collect();
        outcomes.sort_by_key(|o| o.set_number);
        Ok(outcomes)
    }

    async fn write_job(
        &self,
        title: &str,
        request: &GenerationRequest,
        total_sets: u32,
        metadata: &StoryMetadata,
        retry_info: Option<Option<RetryInfo>>,
        existing: Option<JobRecord>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let record = JobRecord {
            title: title.to_string(),
            request: request.clone(),
            total_sets,
            metadata: match &existing {
                Some(job) if metadata.is_empty() => job.metadata.clone(),
                _ => metadata.clone(),
            },
            retry_info: match retry_info {
                Some(info) => info,
                None => existing.as_ref().and_then(|job| job.retry_info.clone()),
            },
            created_at: existing.as_ref().map(|job| job.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.store
            .upsert(JOBS_COLLECTION, &title_key(title), &serde_json::to_value(&record)?)
            .await
    }

    /// Removes every set document stored under the title.
    async fn clear_sets(&self, title: &str) -> Result<(), StoreError> {
        let key = title_key(title);
        let sets = self
            .store
            .find_by_filter(SETS_COLLECTION, &Filter::id_prefix(set_prefix(&key)))
            .await?;
        for (id, _) in sets {
            self.store.delete(SETS_COLLECTION, &id).await?;
        }
        Ok(())
    }

    /// The stored job if it belongs to the same request. A job stored for a
    /// different request is superseded: its sets are cleared and `None` is
    /// returned so the caller writes a fresh record.
    async fn current_job(
        &self,
        title: &str,
        request: &GenerationRequest,
        total_sets: u32,
    ) -> Result<Option<JobRecord>, StoreError> {
        match self.job(title).await? {
            Some(job) if job.request == *request && job.total_sets == total_sets => Ok(Some(job)),
            Some(_) => {
                warn!(title, "Stored job was made for a different request; replacing it");
                self.clear_sets(title).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn write_set(&self, title: &str, outcome: &SetOutcome) -> Result<(), StoreError> {
        self.store
            .upsert(
                SETS_COLLECTION,
                &set_doc_id(&title_key(title), outcome.set_number),
                &serde_json::to_value(outcome)?,
            )
            .await
    }

    /// Stores a complete snapshot, replacing every set document of the title.
    pub async fn save(&self, result: &GenerationResult) -> Result<(), StoreError> {
        let plans = planner::plan(result.request.total_segments, result.request.segments_per_set)
            .map_err(|e| StoreError::Unavailable(format!("cannot plan stored request: {}", e)))?;
        let total_sets = plans.len() as u32;

        let existing = self.current_job(&result.title, &result.request, total_sets).await?;
        self.write_job(
            &result.title,
            &result.request,
            total_sets,
            &result.metadata,
            Some(result.retry_info.clone()),
            existing,
        )
        .await?;

        let failed: BTreeSet<u32> = result
            .generation_summary
            .failed_set_numbers
            .iter()
            .copied()
            .collect();
        for plan in &plans {
            let outcome = if failed.contains(&plan.set_number) {
                let error = result
                    .generation_summary
                    .set_errors
                    .get(&plan.set_number)
                    .cloned()
                    .unwrap_or_else(|| "generation failed".to_string());
                SetOutcome::failed(plan.set_number, error)
            } else {
                SetOutcome::success(plan.set_number, result.segments_in(plan), None)
            };
            self.write_set(&result.title, &outcome).await?;
        }

        // a previous, larger plan under the same title leaves stale sets behind
        let key = title_key(&result.title);
        let stale = self
            .store
            .find_by_filter(SETS_COLLECTION, &Filter::id_prefix(set_prefix(&key)))
            .await?;
        for (id, doc) in stale {
            let set_number = doc.get("set_number").and_then(|v| v.as_u64()).unwrap_or(0);
            if set_number == 0 || set_number > u64::from(total_sets) {
                self.store.delete(SETS_COLLECTION, &id).await?;
            }
        }

        Ok(())
    }

    /// Which sets of a title are stored, failed, or missing. Never errors on
    /// an unknown title; `exists` is false instead.
    pub async fn status(&self, title: &str) -> Result<JobStatus, StoreError> {
        let Some(job) = self.job(title).await? else {
            return Ok(JobStatus::absent(title));
        };

        let outcomes = self.set_outcomes(title, job.total_sets).await?;
        let mut existing_sets = Vec::new();
        let mut failed_sets = Vec::new();
        for outcome in &outcomes {
            match outcome.status {
                SetStatus::Success => existing_sets.push(outcome.set_number),
                SetStatus::Failed => failed_sets.push(outcome.set_number),
            }
        }
        let missing_sets: Vec<u32> = (1..=job.total_sets)
            .filter(|n| !existing_sets.contains(n) && !failed_sets.contains(n))
            .collect();
        let is_complete = existing_sets.len() as u32 == job.total_sets;

        Ok(JobStatus {
            title: job.title,
            exists: true,
            total_sets_expected: Some(job.total_sets),
            existing_sets,
            failed_sets,
            missing_sets,
            is_complete,
        })
    }

    /// Rebuilds the stored result. Missing set documents count as failed sets.
    pub async fn load(&self, title: &str) -> Result<Option<GenerationResult>, StoreError> {
        let Some(job) = self.job(title).await? else {
            return Ok(None);
        };
        let plans = match planner::plan(job.request.total_segments, job.request.segments_per_set) {
            Ok(plans) => plans,
            Err(e) => {
                warn!(title, error = %e, "Stored request cannot be planned; treating as absent");
                return Ok(None);
            }
        };

        let outcomes = self.set_outcomes(title, job.total_sets).await?;
        let mut result =
            GenerationResult::assemble(job.title, job.request, job.metadata, &plans, &outcomes);
        result.retry_info = job.retry_info;
        result.generated_at = job.updated_at;
        Ok(Some(result))
    }

    pub async fn delete(&self, title: &str) -> Result<bool, StoreError> {
        self.clear_sets(title).await?;
        self.store.delete(JOBS_COLLECTION, &title_key(title)).await
    }
}

#[async_trait]
impl SetSink for Persistence {
    async fn begin_job(&self, job: &JobHeader<'_>) -> Result<(), StoreError> {
        self.clear_sets(job.title).await?;
        self.write_job(job.title, job.request, job.total_sets, job.metadata, Some(None), None)
            .await
    }

    async fn record_set(&self, job: &JobHeader<'_>, outcome: &SetOutcome) -> Result<(), StoreError> {
        let existing = self.current_job(job.title, job.request, job.total_sets).await?;
        self.write_job(job.title, job.request, job.total_sets, job.metadata, None, existing)
            .await?;
        self.write_set(job.title, outcome).await
    }
}
