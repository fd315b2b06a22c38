//! Re-runs failed sets of an earlier result and merges what comes back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adapter::SetClient;
use crate::error::GenError;
use crate::generator::{JobHeader, NoopSink, SetSink, record_or_warn};
use crate::model::{GenerationResult, RetryAttempt, SetOutcome, SetPlan};
use crate::pacing::{Pacing, Sleeper};
use crate::planner;
use crate::prompt::build_set_prompt;
use crate::{logi, logok, logw};

pub const MIN_RETRIES: u32 = 1;
pub const MAX_RETRIES: u32 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryReport {
    /// True when no failed sets remain.
    pub all_completed: bool,
    pub result: GenerationResult,
}

pub fn validate_max_retries(max_retries: u32) -> Result<(), GenError> {
    if (MIN_RETRIES..=MAX_RETRIES).contains(&max_retries) {
        Ok(())
    } else {
        Err(GenError::InvalidInput(format!(
            "max_retries must be between {} and {}, got {}",
            MIN_RETRIES, MAX_RETRIES, max_retries
        )))
    }
}

#[derive(Clone)]
pub struct RetryEngine {
    client: SetClient,
    sleeper: Arc<dyn Sleeper>,
    pacing: Pacing,
}

impl RetryEngine {
    pub fn new(client: SetClient, sleeper: Arc<dyn Sleeper>, pacing: Pacing) -> Self {
        Self {
            client,
            sleeper,
            pacing,
        }
    }

    pub async fn retry(
        &self,
        previous: GenerationResult,
        max_retries: u32,
    ) -> Result<RetryReport, GenError> {
        self.retry_with_sink(previous, max_retries, &NoopSink).await
    }

    /// Retries each failed set of `previous` up to `max_retries` times with
    /// exponential backoff. Sets that still fail stay in the failed list;
    /// recovered segments are merged in by segment number.
    pub async fn retry_with_sink(
        &self,
        mut previous: GenerationResult,
        max_retries: u32,
        sink: &dyn SetSink,
    ) -> Result<RetryReport, GenError> {
        validate_max_retries(max_retries)?;
        previous.request.validate()?;
        let plans = planner::plan(previous.request.total_segments, previous.request.segments_per_set)?;
        let total_sets = plans.len() as u32;

        let mut failed = previous.generation_summary.failed_set_numbers.clone();
        failed.sort_unstable();
        failed.dedup();

        let targets: Vec<SetPlan> = failed
            .iter()
            .map(|n| {
                plans
                    .iter()
                    .find(|p| p.set_number == *n)
                    .copied()
                    .ok_or_else(|| {
                        GenError::InvalidInput(format!(
                            "failed set {} is outside the plan of {} sets",
                            n, total_sets
                        ))
                    })
            })
            .collect::<Result<_, _>>()?;

        // a failed set holds no segments
        if let Some(stray) = previous
            .segments
            .iter()
            .find(|s| targets.iter().any(|p| p.contains(s.segment_number)))
        {
            return Err(GenError::InvalidInput(format!(
                "segment {} lies inside failed set {:?}; a failed set must not hold segments",
                stray.segment_number, failed
            )));
        }

        if targets.is_empty() {
            logi(format!("\"{}\": nothing to retry", previous.title));
            return Ok(RetryReport {
                all_completed: true,
                result: previous,
            });
        }

        logi(format!(
            "Retrying {} failed sets of \"{}\" (up to {} attempts each): {:?}",
            targets.len(),
            previous.title,
            max_retries,
            failed
        ));

        let mut info = previous.retry_info.take().unwrap_or_default();
        let mut still_failed: BTreeMap<u32, String> = BTreeMap::new();

        for (pos, plan) in targets.iter().enumerate() {
            let mut recovered: Option<SetOutcome> = None;
            let mut last_error = String::new();

            for attempt in 1..=max_retries {
                let delay = self.pacing.backoff_before(attempt);
                if !delay.is_zero() {
                    logi(format!(
                        "Set {} attempt {}/{} in {:.1}s",
                        plan.set_number,
                        attempt,
                        max_retries,
                        delay.as_secs_f64()
                    ));
                    self.sleeper.sleep(delay).await;
                }

                let carried = (!previous.metadata.is_empty()).then_some(&previous.metadata);
                let prompt = build_set_prompt(&previous.request, plan, total_sets, carried);
                let outcome = self.client.generate(&prompt, plan).await;

                info.total_retry_attempts += 1;
                info.retry_results.push(RetryAttempt {
                    set_number: plan.set_number,
                    attempt,
                    status: outcome.status,
                    error: outcome.error.clone(),
                });

                if outcome.is_success() {
                    recovered = Some(outcome);
                    break;
                }
                last_error = outcome.error.unwrap_or_else(|| "unknown error".to_string());
            }

            match recovered {
                Some(outcome) => {
                    logok(format!(
                        "Set {} recovered: {} segments",
                        plan.set_number,
                        outcome.segments.len()
                    ));
                    info.successful_retries += 1;
                    merge_set(&mut previous, plan, &outcome);
                    let job = JobHeader {
                        title: &previous.title,
                        request: &previous.request,
                        total_sets,
                        metadata: &previous.metadata,
                    };
                    record_or_warn(sink, &job, &outcome).await;
                }
                None => {
                    logw(format!(
                        "Set {} still failing after {} attempts: {}",
                        plan.set_number, max_retries, last_error
                    ));
                    let job = JobHeader {
                        title: &previous.title,
                        request: &previous.request,
                        total_sets,
                        metadata: &previous.metadata,
                    };
                    record_or_warn(sink, &job, &SetOutcome::failed(plan.set_number, last_error.clone()))
                        .await;
                    still_failed.insert(plan.set_number, last_error);
                }
            }

            if pos + 1 < targets.len() {
                self.sleeper.sleep(self.pacing.inter_set_delay).await;
            }
        }

        recompute_summary(&mut previous, &plans, still_failed);
        previous.retry_info = Some(info);

        let all_completed = !previous.has_failures();
        Ok(RetryReport {
            all_completed,
            result: previous,
        })
    }
}

/// Puts a recovered set's segments into place. Anything already numbered
/// inside the set's range is replaced, so numbers stay unique.
fn merge_set(result: &mut GenerationResult, plan: &SetPlan, outcome: &SetOutcome) {
    result.segments.retain(|s| !plan.contains(s.segment_number));
    result.segments.extend(
        outcome
            .segments
            .iter()
            .filter(|s| plan.contains(s.segment_number))
            .cloned(),
    );
    result.segments.sort_by_key(|s| s.segment_number);

    if result.metadata.is_empty() {
        if let Some(meta) = &outcome.metadata {
            result.metadata = meta.clone();
        }
    }
}

fn recompute_summary(
    result: &mut GenerationResult,
    plans: &[SetPlan],
    still_failed: BTreeMap<u32, String>,
) {
    let summary = &mut result.generation_summary;
    summary.total_sets = plans.len() as u32;
    summary.failed_set_numbers = still_failed.keys().copied().collect();
    summary.failed_sets = still_failed.len() as u32;
    summary.successful_sets = summary.total_sets - summary.failed_sets;
    summary.set_errors = still_failed;
    summary.total_segments_requested = result.request.total_segments;
    summary.total_segments_generated = result.segments.len() as u32;
}
