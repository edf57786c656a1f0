//! Integration tests for the `/api/v1/*` HTTP surface, exercised without
//! any backend subprocess: endpoints that never need an `Acquire` (health,
//! models listing, the Ollama version/tags stubs) and the request
//! validation that runs before one (`BadRequest`/`ModelNotFound` on the
//! catalog and label checks in §4.7).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use lemonade_server::{router, AppState, Config};

fn test_state() -> Arc<AppState> {
    let dir = std::env::temp_dir().join(format!("lemonade-api-test-{}", uuid::Uuid::new_v4()));
    let mut config = Config::default();
    config.cache.cache_dir = Some(dir.clone());
    config.cache.hf_cache_dir = Some(dir.join("hf"));
    AppState::new(Arc::new(config))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok_and_capacities() {
    let app = router::http_router(test_state());

    let response = app
        .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["max_models"]["llamacpp"].is_number());
    assert_eq!(body["models_loaded"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn stats_with_no_requests_served_yet_is_empty() {
    let app = router::http_router(test_state());

    let response = app
        .oneshot(Request::builder().uri("/api/v1/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.as_object().unwrap().is_empty());
}

#[tokio::test]
async fn models_list_includes_built_in_catalog_entries() {
    let app = router::http_router(test_state());

    let response = app
        .oneshot(Request::builder().uri("/api/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let ids: Vec<String> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&"Qwen3-4B-GGUF".to_string()));
    assert!(ids.contains(&"SD-Turbo".to_string()));
}

#[tokio::test]
async fn embeddings_on_a_non_embeddings_model_is_bad_request() {
    let app = router::http_router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/embeddings")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({"model": "Qwen3-4B-GGUF", "input": "hello"}).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_completions_on_unknown_model_is_model_not_found() {
    let app = router::http_router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "model": "does-not-exist",
                "messages": [{"role": "user", "content": "hi"}],
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn images_generations_without_prompt_is_bad_request() {
    let app = router::http_router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/images/generations")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({"model": "SD-Turbo", "size": "256x256"}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ollama_version_matches_the_fixed_stub() {
    let app = router::http_router(test_state());

    let response = app
        .oneshot(Request::builder().uri("/api/version").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["version"], "0.0.0");
}

#[tokio::test]
async fn ollama_tags_lists_the_same_catalog_as_models() {
    let app = router::http_router(test_state());

    let response = app
        .oneshot(Request::builder().uri("/api/tags").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(!body["models"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ollama_create_is_not_implemented() {
    let app = router::http_router(test_state());

    let request = Request::builder()
        .method("POST")
        .uri("/api/create")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn audio_transcriptions_without_a_file_is_bad_request() {
    let app = router::http_router(test_state());

    let boundary = "XBOUNDARY";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"model\"\r\n\r\nWhisper-Tiny\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/audio/transcriptions")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
