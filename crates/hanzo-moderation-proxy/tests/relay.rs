//! StatusTranslator against mock backends on ephemeral ports

use axum::{
    body::{Body, Bytes},
    extract::DefaultBodyLimit,
    http::{header, HeaderMap, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hanzo_moderation::envelope::{parse_event_stream, EVENT_STREAM_CONTENT_TYPE};
use hanzo_moderation_proxy::{RelayConfig, StatusTranslator};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

const BLOCK_TEXT: &str = "⚠️ BLOCKED: Your message mentions duckies or bunnies.";

async fn spawn_backend(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn blocking_backend() -> Router {
    Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": {
                    "message": BLOCK_TEXT,
                    "type": "policy_violation",
                    "code": "content_policy_violation"
                }})),
            )
        }),
    )
}

fn relay(backend_url: &str) -> Router {
    StatusTranslator::new(RelayConfig::new(backend_url))
        .unwrap()
        .router()
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_non_streaming_block_becomes_completion() {
    let backend = spawn_backend(blocking_backend()).await;

    let response = relay(&backend)
        .oneshot(chat_request(json!({
            "model": "llama3-2-3b",
            "messages": [{"role": "user", "content": "tell me about duckies"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "llama3-2-3b");
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(body["choices"].as_array().unwrap().len(), 1);
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], BLOCK_TEXT);
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], 0);
}

#[tokio::test]
async fn test_streaming_block_becomes_event_stream() {
    let backend = spawn_backend(blocking_backend()).await;

    let response = relay(&backend)
        .oneshot(chat_request(json!({
            "model": "llama3-2-3b",
            "stream": true,
            "messages": [{"role": "user", "content": "tell me about duckies"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        EVENT_STREAM_CONTENT_TYPE
    );

    let body = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    let stream = parse_event_stream(&body).unwrap();

    assert!(stream.done);
    assert_eq!(stream.chunks.len(), 2);
    assert_eq!(stream.content(), BLOCK_TEXT);
    assert_eq!(stream.chunks[0].id, stream.chunks[1].id);
    assert_eq!(stream.chunks[0].created, stream.chunks[1].created);
    for chunk in &stream.chunks {
        assert_eq!(chunk.model, "llama3-2-3b");
        assert_eq!(chunk.object, "chat.completion.chunk");
    }
    assert_eq!(stream.chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
    assert_eq!(stream.chunks[0].choices[0].finish_reason, None);
    assert_eq!(stream.chunks[1].choices[0].delta.content, None);
    assert_eq!(stream.chunks[1].choices[0].finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_block_without_message_uses_default() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::BAD_REQUEST, Json(json!({"error": {"type": "x"}}))) }),
    );
    let backend = spawn_backend(app).await;

    let response = relay(&backend)
        .oneshot(chat_request(json!({"messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["model"], "unknown");
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "Request blocked by content policy"
    );
}

#[tokio::test]
async fn test_configured_block_status() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::FORBIDDEN, Json(json!({"detail": "forbidden topic"}))) }),
    );
    let backend = spawn_backend(app).await;
    let relay = StatusTranslator::new(
        RelayConfig::new(backend.as_str()).with_block_status(StatusCode::FORBIDDEN),
    )
    .unwrap()
    .router();

    let response = relay
        .oneshot(chat_request(json!({"model": "m", "messages": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "forbidden topic");
}

#[tokio::test]
async fn test_other_errors_pass_through_unchanged() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                [("x-upstream", "gateway")],
                Json(json!({"error": {"message": "bad role", "type": "invalid_request_error"}})),
            )
        }),
    );
    let backend = spawn_backend(app).await;

    let response = relay(&backend)
        .oneshot(chat_request(json!({"model": "m", "messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.headers()["x-upstream"], "gateway");
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["error"]["message"], "bad role");
}

#[tokio::test]
async fn test_large_body_relayed_to_backend() {
    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(|body: Bytes| async move { Json(json!({"received": body.len()})) }),
        )
        .layer(DefaultBodyLimit::disable());
    let backend = spawn_backend(app).await;

    let image = format!("data:image/png;base64,{}", "A".repeat(3 * 1024 * 1024));
    let payload = json!({
        "model": "m",
        "messages": [{"role": "user", "content": [
            {"type": "text", "text": "what is in this picture?"},
            {"type": "image_url", "image_url": {"url": image}}
        ]}]
    });
    let sent = payload.to_string().len();

    let response = relay(&backend).oneshot(chat_request(payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["received"], sent);
}

#[tokio::test]
async fn test_streaming_success_relayed_incrementally() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            let frames = vec![
                Ok::<_, std::io::Error>(Bytes::from_static(b"data: {\"part\":1}\n\n")),
                Ok(Bytes::from_static(b"data: {\"part\":2}\n\n")),
                Ok(Bytes::from_static(b"data: [DONE]\n\n")),
            ];
            (
                [(header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE)],
                Body::from_stream(futures::stream::iter(frames)),
            )
                .into_response()
        }),
    );
    let backend = spawn_backend(app).await;

    let response = relay(&backend)
        .oneshot(chat_request(json!({"model": "m", "stream": true, "messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        EVENT_STREAM_CONTENT_TYPE
    );
    assert_eq!(
        body_bytes(response).await,
        Bytes::from_static(b"data: {\"part\":1}\n\ndata: {\"part\":2}\n\ndata: [DONE]\n\n")
    );
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let response = relay(&format!("http://127.0.0.1:{}", port))
        .oneshot(chat_request(json!({"model": "m", "messages": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Proxy error: "));
    assert_eq!(body["error"]["type"], "proxy_error");
    assert_eq!(body["error"]["code"], "upstream_unreachable");
}

#[tokio::test]
async fn test_slow_backend_times_out_as_bad_gateway() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }),
    );
    let backend = spawn_backend(app).await;
    let relay = StatusTranslator::new(
        RelayConfig::new(backend.as_str()).with_timeout(Duration::from_millis(200)),
    )
    .unwrap()
    .router();

    let response = relay
        .oneshot(chat_request(json!({"model": "m", "messages": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_method_path_query_and_headers_forwarded() {
    let app = Router::new().route(
        "/v1/models",
        get(|uri: Uri, headers: HeaderMap| async move {
            Json(json!({
                "query": uri.query(),
                "authorization": headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok()),
                "host": headers.get(header::HOST).and_then(|v| v.to_str().ok()),
            }))
        }),
    );
    let backend = spawn_backend(app).await;

    let request = Request::builder()
        .method("GET")
        .uri("/v1/models?limit=5")
        .header(header::HOST, "relay.example:8000")
        .header(header::AUTHORIZATION, "Bearer sk-test")
        .body(Body::empty())
        .unwrap();
    let response = relay(&backend).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["query"], "limit=5");
    assert_eq!(body["authorization"], "Bearer sk-test");
    assert_ne!(body["host"], "relay.example:8000");
}

#[tokio::test]
async fn test_health_answered_locally() {
    let response = relay("http://127.0.0.1:9")
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body, json!({"status": "ok", "service": "hanzo-moderation-relay"}));
}
