use async_trait::async_trait;
use std::sync::Arc;

use crate::adapter::SetClient;
use crate::error::{GenError, StoreError};
use crate::model::{GenerationRequest, GenerationResult, SetOutcome, StoryMetadata};
use crate::pacing::{Pacing, Sleeper};
use crate::planner;
use crate::prompt::build_set_prompt;
use crate::{logi, logok, logw};

/// Identity of a job while it is being generated or retried.
#[derive(Debug, Clone, Copy)]
pub struct JobHeader<'a> {
    pub title: &'a str,
    pub request: &'a GenerationRequest,
    pub total_sets: u32,
    pub metadata: &'a StoryMetadata,
}

/// Receives each finished set so partial progress survives a crash.
#[async_trait]
pub trait SetSink: Send + Sync {
    /// Called once per generation run, before its first set is recorded.
    /// Anything previously stored under the title belongs to another run.
    async fn begin_job(&self, _job: &JobHeader<'_>) -> Result<(), StoreError> {
        Ok(())
    }

    async fn record_set(&self, job: &JobHeader<'_>, outcome: &SetOutcome) -> Result<(), StoreError>;
}

/// Discards everything.
pub struct NoopSink;

#[async_trait]
impl SetSink for NoopSink {
    async fn record_set(&self, _job: &JobHeader<'_>, _outcome: &SetOutcome) -> Result<(), StoreError> {
        Ok(())
    }
}

async fn begin_or_warn(sink: &dyn SetSink, job: &JobHeader<'_>) {
    if let Err(err) = sink.begin_job(job).await {
        logw(format!(
            "Could not reset stored sets of \"{}\": {} (continuing)",
            job.title, err
        ));
    }
}

pub(crate) async fn record_or_warn(sink: &dyn SetSink, job: &JobHeader<'_>, outcome: &SetOutcome) {
    if let Err(err) = sink.record_set(job, outcome).await {
        logw(format!(
            "Could not persist set {} of \"{}\": {} (continuing)",
            outcome.set_number, job.title, err
        ));
    }
}

/// Runs a generation request set by set, in order, one provider call each.
#[derive(Clone)]
pub struct SetGenerator {
    client: SetClient,
    sleeper: Arc<dyn Sleeper>,
    pacing: Pacing,
}

impl SetGenerator {
    pub fn new(client: SetClient, sleeper: Arc<dyn Sleeper>, pacing: Pacing) -> Self {
        Self {
            client,
            sleeper,
            pacing,
        }
    }

    pub async fn run(&self, request: GenerationRequest) -> Result<GenerationResult, GenError> {
        self.run_with_sink(request, &NoopSink).await
    }

    /// Generates every planned set. Set failures are recorded, not raised;
    /// only an invalid request returns `Err`, and it does so before any
    /// provider call.
    pub async fn run_with_sink(
        &self,
        request: GenerationRequest,
        sink: &dyn SetSink,
    ) -> Result<GenerationResult, GenError> {
        request.validate()?;
        let plans = planner::plan(request.total_segments, request.segments_per_set)?;
        let total_sets = plans.len() as u32;

        logi(format!(
            "Generating {} segments in {} sets of up to {}",
            request.total_segments, total_sets, request.segments_per_set
        ));

        let mut title: Option<String> = request
            .title
            .as_ref()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let mut metadata: Option<StoryMetadata> = None;
        let mut outcomes: Vec<SetOutcome> = Vec::with_capacity(plans.len());
        let mut flushed = 0usize;

        for (idx, plan) in plans.iter().enumerate() {
            logi(format!(
                "Set {}/{}: segments {}-{}",
                plan.set_number, total_sets, plan.start_segment, plan.end_segment
            ));

            let prompt = build_set_prompt(&request, plan, total_sets, metadata.as_ref());
            let outcome = self.client.generate(&prompt, plan).await;

            if outcome.is_success() {
                logok(format!(
                    "Set {} OK: {} segments",
                    plan.set_number,
                    outcome.segments.len()
                ));
                if metadata.is_none() {
                    let captured = outcome.metadata.clone().unwrap_or_default();
                    if title.is_none() {
                        title = Some(
                            captured
                                .title
                                .clone()
                                .unwrap_or_else(|| request.fallback_title()),
                        );
                    }
                    metadata = Some(captured);
                }
            } else {
                logw(format!(
                    "Set {} FAILED: {}",
                    plan.set_number,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ));
            }
            outcomes.push(outcome);

            if let Some(title) = &title {
                let empty = StoryMetadata::default();
                let job = JobHeader {
                    title,
                    request: &request,
                    total_sets,
                    metadata: metadata.as_ref().unwrap_or(&empty),
                };
                if flushed == 0 {
                    begin_or_warn(sink, &job).await;
                }
                for pending in &outcomes[flushed..] {
                    record_or_warn(sink, &job, pending).await;
                }
                flushed = outcomes.len();
            }

            if idx + 1 < plans.len() {
                self.sleeper.sleep(self.pacing.inter_set_delay).await;
            }
        }

        let title = title.unwrap_or_else(|| request.fallback_title());
        let metadata = metadata.unwrap_or_default();
        if flushed < outcomes.len() {
            let job = JobHeader {
                title: &title,
                request: &request,
                total_sets,
                metadata: &metadata,
            };
            if flushed == 0 {
                begin_or_warn(sink, &job).await;
            }
            for pending in &outcomes[flushed..] {
                record_or_warn(sink, &job, pending).await;
            }
        }

        let result = GenerationResult::assemble(title, request, metadata, &plans, &outcomes);
        let summary = &result.generation_summary;
        if summary.failed_sets == 0 {
            logok(format!(
                "\"{}\" complete: {} segments in {} sets",
                result.title, summary.total_segments_generated, summary.total_sets
            ));
        } else {
            logw(format!(
                "\"{}\" partial: {}/{} sets ok, failed sets {:?}",
                result.title, summary.successful_sets, summary.total_sets, summary.failed_set_numbers
            ));
        }

        Ok(result)
    }
}
