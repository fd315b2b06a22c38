use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::adapter::SetClient;
use crate::api::CompletionParams;
use crate::api::openai::OpenAiProvider;
use crate::config::Config;
use crate::error::{GenError, StoreError};
use crate::generator::SetGenerator;
use crate::model::{GenerationRequest, GenerationResult};
use crate::pacing::{Pacing, Sleeper, TokioSleeper};
use crate::persistence::{JobStatus, Persistence, title_key};
use crate::retry::{RetryEngine, RetryReport, validate_max_retries};
use crate::store::DocumentStore;
use crate::{logi, logw};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Gen(#[from] GenError),

    /// Generation finished but the result could not be stored.
    #[error("result not saved: {source}")]
    Unsaved {
        source: StoreError,
        result: Box<GenerationResult>,
    },
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::Gen(GenError::Persistence(err))
    }
}

/// Generation, retry and lookup over one provider and one store.
pub struct ContentService {
    generator: SetGenerator,
    retry: RetryEngine,
    persistence: Persistence,
    retrying: Mutex<HashSet<String>>,
}

/// Releases a title's retry slot when dropped.
struct RetrySlot<'a> {
    retrying: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for RetrySlot<'_> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.retrying.lock() {
            guard.remove(&self.key);
        }
    }
}

impl ContentService {
    pub fn new(client: SetClient, sleeper: Arc<dyn Sleeper>, pacing: Pacing, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            generator: SetGenerator::new(client.clone(), Arc::clone(&sleeper), pacing),
            retry: RetryEngine::new(client, sleeper, pacing),
            persistence: Persistence::new(store),
            retrying: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(cfg: &Config, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let provider = OpenAiProvider::from_config(cfg)?;
        logi(format!("Using model {} at {}", provider.model(), cfg.openai_base_url));
        let params = CompletionParams {
            temperature: Some(cfg.temperature),
            max_tokens: Some(cfg.max_tokens),
        };
        let client = SetClient::new(Arc::new(provider), params);
        Ok(Self::new(client, Arc::new(TokioSleeper), cfg.pacing(), store))
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    fn claim_retry(&self, title: &str) -> Result<RetrySlot<'_>, ServiceError> {
        let key = title_key(title);
        let mut guard = self
            .retrying
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !guard.insert(key.clone()) {
            return Err(GenError::Conflict(format!("a retry for \"{}\" is already running", title)).into());
        }
        Ok(RetrySlot {
            retrying: &self.retrying,
            key,
        })
    }

    async fn save_or_attach(&self, result: GenerationResult) -> Result<GenerationResult, ServiceError> {
        match self.persistence.save(&result).await {
            Ok(()) => Ok(result),
            Err(source) => {
                logw(format!("Failed to save \"{}\": {}", result.title, source));
                Err(ServiceError::Unsaved {
                    source,
                    result: Box::new(result),
                })
            }
        }
    }

    /// Runs a full generation, persisting sets as they finish and the final
    /// snapshot at the end.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult, ServiceError> {
        let result = self
            .generator
            .run_with_sink(request, &self.persistence)
            .await?;
        self.save_or_attach(result).await
    }

    /// Retries the failed sets of a stored result. A title without failures
    /// comes back as `all_completed` without touching the provider.
    pub async fn retry_by_title(&self, title: &str, max_retries: u32) -> Result<RetryReport, ServiceError> {
        validate_max_retries(max_retries)?;
        let _slot = self.claim_retry(title)?;

        let previous = self
            .persistence
            .load(title)
            .await?
            .ok_or_else(|| GenError::NotFound(format!("generation \"{}\"", title)))?;

        self.retry_result(previous, max_retries).await
    }

    pub async fn retry_with_result(
        &self,
        previous: GenerationResult,
        max_retries: u32,
    ) -> Result<RetryReport, ServiceError> {
        validate_max_retries(max_retries)?;
        let _slot = self.claim_retry(&previous.title)?;
        self.retry_result(previous, max_retries).await
    }

    async fn retry_result(&self, previous: GenerationResult, max_retries: u32) -> Result<RetryReport, ServiceError> {
        if !previous.has_failures() {
            logi(format!("\"{}\" has no failed sets", previous.title));
            return Ok(RetryReport {
                all_completed: true,
                result: previous,
            });
        }

        let report = self
            .retry
            .retry_with_sink(previous, max_retries, &self.persistence)
            .await?;
        let result = self.save_or_attach(report.result).await?;
        Ok(RetryReport {
            all_completed: report.all_completed,
            result,
        })
    }

    pub async fn status(&self, title: &str) -> Result<JobStatus, ServiceError> {
        Ok(self.persistence.status(title).await?)
    }

    pub async fn load(&self, title: &str) -> Result<GenerationResult, ServiceError> {
        self.persistence
            .load(title)
            .await?
            .ok_or_else(|| GenError::NotFound(format!("generation \"{}\"", title)).into())
    }

    pub async fn delete(&self, title: &str) -> Result<bool, ServiceError> {
        Ok(self.persistence.delete(title).await?)
    }
}
