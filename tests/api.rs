//! Integration tests for the generation HTTP API.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use std::sync::Arc;

use ai_story_sets::api::ProviderError;
use common::{
    FailingStore, ScriptedProvider, body_json, build_app_with_store, build_test_app, get, post_json,
    send, set_response,
};

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_ok() {
    let app = build_test_app(ScriptedProvider::new(vec![]));
    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_returns_full_result_and_persists_it() {
    let provider = ScriptedProvider::new(vec![
        Ok(set_response(10, Some("Seven Seas"))),
        Ok(set_response(10, None)),
        Ok(set_response(3, None)),
    ]);
    let app = build_test_app(provider.clone());

    let response = post_json(
        &app,
        "/api/v1/generations",
        json!({"idea": "pirates who hate water", "total_segments": 23, "style": "movie"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let data = body_json(response).await["data"].clone();
    assert_eq!(data["title"], "Seven Seas");
    assert_eq!(data["generation_summary"]["total_sets"], 3);
    assert_eq!(data["generation_summary"]["total_segments_generated"], 23);
    assert_eq!(data["segments"][22]["segment_number"], 23);
    assert_eq!(data["segments"][0]["characters_present"][0], "Ava");
    assert_eq!(provider.calls(), 3);

    let response = get(&app, "/api/v1/generations/Seven%20Seas/status").await;
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await["data"].clone();
    assert_eq!(status["success"], true);
    assert_eq!(status["total_sets"], 3);
    assert_eq!(status["successful_sets"], 3);
    assert_eq!(status["failed_count"], 0);
    assert_eq!(status["is_complete"], true);

    let response = get(&app, "/api/v1/generations/seven%20SEAS").await;
    assert_eq!(response.status(), StatusCode::OK);
    let stored = body_json(response).await["data"].clone();
    assert_eq!(stored["segments"].as_array().unwrap().len(), 23);
}

#[tokio::test]
async fn invalid_request_is_rejected_without_provider_calls() {
    let provider = ScriptedProvider::new(vec![]);
    let app = build_test_app(provider.clone());

    let response = post_json(
        &app,
        "/api/v1/generations",
        json!({"idea": "x", "total_segments": 0}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let response = post_json(&app, "/api/v1/generations", json!({"total_segments": 5})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn total_failure_is_a_normal_response() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::RateLimited("429".into())),
        Ok("not json at all".into()),
    ]);
    let app = build_test_app(provider);

    let response = post_json(
        &app,
        "/api/v1/generations",
        json!({"idea": "a quiet village", "total_segments": 4, "segments_per_set": 2}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["generation_summary"]["successful_sets"], 0);
    assert_eq!(data["generation_summary"]["failed_set_numbers"], json!([1, 2]));
    assert_eq!(data["segments"], json!([]));
    assert!(
        data["generation_summary"]["set_errors"]["2"]
            .as_str()
            .unwrap()
            .starts_with("parse error")
    );
}

#[tokio::test]
async fn persistence_failure_returns_503_with_result() {
    let provider = ScriptedProvider::new(vec![Ok(set_response(3, Some("Unsaved")))]);
    let app = build_app_with_store(provider, Arc::new(FailingStore));

    let response = post_json(
        &app,
        "/api/v1/generations",
        json!({"idea": "idea", "total_segments": 3}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "PERSISTENCE_ERROR");
    assert_eq!(body["result"]["title"], "Unsaved");
    assert_eq!(body["result"]["generation_summary"]["total_segments_generated"], 3);
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_by_title_recovers_failed_set() {
    let provider = ScriptedProvider::new(vec![
        Ok(set_response(5, Some("Twenty Beats"))),
        Ok(set_response(5, None)),
        Err(ProviderError::Timeout("deadline".into())),
        Ok(set_response(5, None)),
        // retry of set 3: attempt 1 fails, attempt 2 succeeds
        Err(ProviderError::Timeout("deadline".into())),
        Ok(set_response(5, None)),
    ]);
    let app = build_test_app(provider.clone());

    let response = post_json(
        &app,
        "/api/v1/generations",
        json!({"idea": "a robot bakes bread", "total_segments": 20, "segments_per_set": 5}),
    )
    .await;
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["generation_summary"]["failed_set_numbers"], json!([3]));

    let status = body_json(get(&app, "/api/v1/generations/Twenty%20Beats/status").await).await["data"].clone();
    assert_eq!(status["failed_sets"], json!([3]));
    assert_eq!(status["failed_count"], 1);

    let response = post_json(
        &app,
        "/api/v1/generations/retry",
        json!({"title": "Twenty Beats", "max_retries": 3}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await["data"].clone();
    assert_eq!(report["all_completed"], true);
    let result = &report["result"];
    assert_eq!(result["generation_summary"]["total_segments_generated"], 20);
    assert_eq!(result["generation_summary"]["failed_set_numbers"], json!([]));
    assert_eq!(result["retry_info"]["total_retry_attempts"], 2);
    assert_eq!(result["retry_info"]["successful_retries"], 1);
    let numbers: Vec<u64> = result["segments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["segment_number"].as_u64().unwrap())
        .collect();
    assert_eq!(numbers, (1..=20).collect::<Vec<_>>());
    assert_eq!(provider.calls(), 6);

    let status = body_json(get(&app, "/api/v1/generations/Twenty%20Beats/status").await).await["data"].clone();
    assert_eq!(status["is_complete"], true);
}

#[tokio::test]
async fn retry_of_complete_title_makes_no_calls() {
    let provider = ScriptedProvider::new(vec![Ok(set_response(4, Some("Done Already")))]);
    let app = build_test_app(provider.clone());
    post_json(
        &app,
        "/api/v1/generations",
        json!({"idea": "idea", "total_segments": 4}),
    )
    .await;

    let response = post_json(&app, "/api/v1/generations/retry", json!({"title": "Done Already"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["all_completed"], true);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn retry_with_result_merges_into_supplied_result() {
    let provider = ScriptedProvider::new(vec![
        Ok(set_response(2, Some("Supplied"))),
        Err(ProviderError::Auth("bad key".into())),
        Ok(set_response(2, None)),
    ]);
    let app = build_test_app(provider.clone());

    let previous = body_json(
        post_json(
            &app,
            "/api/v1/generations",
            json!({"idea": "idea", "total_segments": 4, "segments_per_set": 2}),
        )
        .await,
    )
    .await["data"]
        .clone();
    assert_eq!(previous["generation_summary"]["failed_set_numbers"], json!([2]));

    let response = post_json(
        &app,
        "/api/v1/generations/retry-result",
        json!({"previous_result": previous, "max_retries": 1}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await["data"].clone();
    assert_eq!(report["all_completed"], true);
    assert_eq!(report["result"]["segments"].as_array().unwrap().len(), 4);
    assert_eq!(report["result"]["metadata"]["title"], "Supplied");
}

#[tokio::test]
async fn retry_result_with_segments_in_failed_set_is_rejected() {
    let provider = ScriptedProvider::new(vec![
        Ok(set_response(5, Some("Inconsistent"))),
        Ok(set_response(5, None)),
    ]);
    let app = build_test_app(provider.clone());

    let mut previous = body_json(
        post_json(
            &app,
            "/api/v1/generations",
            json!({"idea": "idea", "total_segments": 10, "segments_per_set": 5}),
        )
        .await,
    )
    .await["data"]
        .clone();
    previous["generation_summary"]["failed_set_numbers"] = json!([2]);

    let response = post_json(
        &app,
        "/api/v1/generations/retry-result",
        json!({"previous_result": previous}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn retry_validates_max_retries() {
    let app = build_test_app(ScriptedProvider::new(vec![]));
    for bad in [0, 11] {
        let response = post_json(
            &app,
            "/api/v1/generations/retry",
            json!({"title": "Anything", "max_retries": bad}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn retry_of_unknown_title_is_404() {
    let app = build_test_app(ScriptedProvider::new(vec![]));
    let response = post_json(&app, "/api/v1/generations/retry", json!({"title": "Ghost"})).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Lookup and delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_of_unknown_title_is_404() {
    let app = build_test_app(ScriptedProvider::new(vec![]));
    let response = get(&app, "/api/v1/generations/Nothing%20Here/status").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn delete_removes_stored_generation() {
    let provider = ScriptedProvider::new(vec![Ok(set_response(2, Some("Short Lived")))]);
    let app = build_test_app(provider);
    post_json(
        &app,
        "/api/v1/generations",
        json!({"idea": "idea", "total_segments": 2}),
    )
    .await;

    let response = send(&app, Method::DELETE, "/api/v1/generations/Short%20Lived", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["deleted"], true);

    let response = get(&app, "/api/v1/generations/Short%20Lived").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, Method::DELETE, "/api/v1/generations/Short%20Lived", None).await;
    assert_eq!(body_json(response).await["data"]["deleted"], false);
}
