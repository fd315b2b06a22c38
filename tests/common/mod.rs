#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, header::CONTENT_TYPE};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use ai_story_sets::adapter::SetClient;
use ai_story_sets::api::{CompletionParams, CompletionProvider, ProviderError};
use ai_story_sets::error::StoreError;
use ai_story_sets::pacing::{Pacing, TokioSleeper};
use ai_story_sets::server::{self, AppState};
use ai_story_sets::service::ContentService;
use ai_story_sets::store::{DocumentStore, Filter, MemoryStore};

/// Answers each call with the next scripted reply; an exhausted script
/// answers with a timeout.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, _prompt: &str, _params: &CompletionParams) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Timeout("script exhausted".into())))
    }
}

/// A store whose writes always fail.
pub struct FailingStore;

#[async_trait]
impl DocumentStore for FailingStore {
    async fn upsert(&self, _collection: &str, _id: &str, _doc: &Value) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }

    async fn find_by_id(&self, _collection: &str, _id: &str) -> Result<Option<Value>, StoreError> {
        Ok(None)
    }

    async fn find_by_filter(
        &self,
        _collection: &str,
        _filter: &Filter,
    ) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(Vec::new())
    }

    async fn delete(&self, _collection: &str, _id: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
}

/// Provider reply carrying `count` segments and optional first-set metadata.
pub fn set_response(count: u32, title: Option<&str>) -> String {
    let segments: Vec<Value> = (1..=count)
        .map(|i| json!({"segment_number": i, "narration": format!("beat {i}"), "characters_present": ["Ava"]}))
        .collect();
    let mut body = json!({ "segments": segments });
    if let Some(title) = title {
        body["title"] = json!(title);
        body["summary"] = json!("A short summary");
        body["hashtags"] = json!(["#story"]);
    }
    format!("Here you go:\n```json\n{}\n```", body)
}

pub fn build_app_with_store(provider: Arc<ScriptedProvider>, store: Arc<dyn DocumentStore>) -> Router {
    let service = ContentService::new(
        SetClient::new(provider, CompletionParams::default()),
        Arc::new(TokioSleeper),
        Pacing::immediate(),
        store,
    );
    server::router(AppState {
        service: Arc::new(service),
    })
}

/// Router over an in-memory store with no pacing delays.
pub fn build_test_app(provider: Arc<ScriptedProvider>) -> Router {
    build_app_with_store(provider, Arc::new(MemoryStore::new()))
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
