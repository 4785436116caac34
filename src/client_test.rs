use super::*;
use crate::session::SessionState;
use crate::sse::ProtocolMessage;
use crate::types::ChatMessage;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, RawQuery};
use axum::http::{HeaderMap, StatusCode as HttpStatus, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Duration, timeout};

const STREAM_ROUTE: &str = "/api/v1/llm-providers/{provider_id}/invoke/stream";

async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server failed");
    });
    format!("http://{addr}/api/v1")
}

fn client_for(base_url: &str) -> PromptClient {
    let config = ClientConfig::default().with_base_url(base_url).expect("valid base url");
    PromptClient::new(&config).expect("client builds")
}

fn event_stream(chunks: Vec<Vec<u8>>) -> Response {
    let body = Body::from_stream(futures::stream::iter(chunks.into_iter().map(Ok::<_, Infallible>)));
    ([(header::CONTENT_TYPE, EVENT_STREAM)], body).into_response()
}

fn text_chunks(chunks: &[&str]) -> Vec<Vec<u8>> {
    chunks.iter().map(|c| c.as_bytes().to_vec()).collect()
}

fn hello_request() -> InvocationRequest {
    InvocationRequest::new(7, vec![ChatMessage::user("hello")])
}

async fn drain(session: &mut StreamSession) -> (Vec<ProtocolMessage>, Option<ClientError>) {
    let mut messages = Vec::new();
    while let Some(item) = timeout(Duration::from_secs(5), session.next()).await.expect("pull timed out") {
        match item {
            Ok(message) => messages.push(message),
            Err(err) => return (messages, Some(err)),
        }
    }
    (messages, None)
}

// =============================================================================
// STREAMING
// =============================================================================

#[tokio::test]
async fn streams_messages_across_chunk_boundaries() {
    let app = Router::new().route(
        STREAM_ROUTE,
        post(|| async {
            let wire = "event: delta\ndata: 你好\n\ndata: he".as_bytes();
            // Split inside the multi-byte character and inside the terminator.
            event_stream(vec![wire[..20].to_vec(), wire[20..].to_vec(), b"llo\n".to_vec(), b"\ndata: tail".to_vec()])
        }),
    );
    let base = spawn_server(app).await;

    let mut session = client_for(&base).stream_invocation(hello_request(), CancellationToken::new());
    let (messages, err) = drain(&mut session).await;
    assert!(err.is_none(), "unexpected error: {err:?}");
    assert_eq!(
        messages,
        vec![
            ProtocolMessage::named("delta", "你好"),
            ProtocolMessage::data("hello"),
            ProtocolMessage::data("tail"),
        ]
    );
    assert_eq!(session.state(), SessionState::Completed);
}

#[tokio::test]
async fn posts_serialized_request_with_event_stream_accept() {
    let app = Router::new().route(
        STREAM_ROUTE,
        post(|Path(provider_id): Path<i64>, headers: HeaderMap, axum::Json(body): axum::Json<Value>| async move {
            let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
            let meta = json!({ "provider_id": provider_id, "accept": accept });
            event_stream(vec![
                format!("event: body\ndata: {body}\n\n").into_bytes(),
                format!("event: meta\ndata: {meta}\n\n").into_bytes(),
            ])
        }),
    );
    let base = spawn_server(app).await;

    let request = hello_request()
        .with_model("gpt-4o")
        .with_temperature(0.2)
        .with_parameter("max_tokens", json!(32))
        .with_prompt(5, Some(6));
    let mut session = client_for(&base).stream_invocation(request, CancellationToken::new());
    let (messages, err) = drain(&mut session).await;
    assert!(err.is_none());
    assert_eq!(messages.len(), 2);

    let body: Value = serde_json::from_str(&messages[0].data).unwrap();
    assert_eq!(body["messages"], json!([{ "role": "user", "content": "hello" }]));
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["temperature"], 0.2);
    assert_eq!(body["parameters"], json!({ "max_tokens": 32 }));
    assert_eq!(body["prompt_id"], 5);
    assert_eq!(body["prompt_version_id"], 6);

    let meta: Value = serde_json::from_str(&messages[1].data).unwrap();
    assert_eq!(meta["provider_id"], 7);
    assert_eq!(meta["accept"], EVENT_STREAM);
}

#[tokio::test]
async fn nothing_is_sent_before_first_pull() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        STREAM_ROUTE,
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                event_stream(text_chunks(&["data: x\n\n"]))
            }
        }),
    );
    let base = spawn_server(app).await;

    let mut session = client_for(&base).stream_invocation(hello_request(), CancellationToken::new());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(session.state(), SessionState::Idle);

    drain(&mut session).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// =============================================================================
// CONNECTION FAILURES
// =============================================================================

#[tokio::test]
async fn server_error_with_json_body_is_connection_error() {
    let app = Router::new().route(
        STREAM_ROUTE,
        post(|| async { (HttpStatus::INTERNAL_SERVER_ERROR, axum::Json(json!({ "detail": "boom" }))) }),
    );
    let base = spawn_server(app).await;

    let mut session = client_for(&base).stream_invocation(hello_request(), CancellationToken::new());
    let (messages, err) = drain(&mut session).await;
    assert!(messages.is_empty());
    match err {
        Some(ClientError::Connection { status, payload }) => {
            assert_eq!(status, 500);
            assert_eq!(payload, json!({ "detail": "boom" }));
        }
        other => panic!("expected connection error, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn server_error_with_text_body_carries_raw_text() {
    let app = Router::new().route(STREAM_ROUTE, post(|| async { (HttpStatus::BAD_GATEWAY, "upstream down") }));
    let base = spawn_server(app).await;

    let mut session = client_for(&base).stream_invocation(hello_request(), CancellationToken::new());
    let (_, err) = drain(&mut session).await;
    match err {
        Some(ClientError::Connection { status, payload }) => {
            assert_eq!(status, 502);
            assert_eq!(payload, Value::String("upstream down".into()));
        }
        other => panic!("expected connection error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_with_empty_body_carries_null() {
    let app = Router::new().route(STREAM_ROUTE, post(|| async { HttpStatus::NOT_FOUND }));
    let base = spawn_server(app).await;

    let mut session = client_for(&base).stream_invocation(hello_request(), CancellationToken::new());
    let (_, err) = drain(&mut session).await;
    assert!(matches!(err, Some(ClientError::Connection { status: 404, payload: Value::Null })));
}

#[tokio::test]
async fn no_content_is_stream_unavailable() {
    let app = Router::new().route(STREAM_ROUTE, post(|| async { HttpStatus::NO_CONTENT }));
    let base = spawn_server(app).await;

    let mut session = client_for(&base).stream_invocation(hello_request(), CancellationToken::new());
    let (messages, err) = drain(&mut session).await;
    assert!(messages.is_empty());
    assert!(matches!(err, Some(ClientError::StreamUnavailable)));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn refused_connection_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut session =
        client_for(&format!("http://{addr}/api/v1")).stream_invocation(hello_request(), CancellationToken::new());
    let (_, err) = drain(&mut session).await;
    assert!(matches!(err, Some(ClientError::Transport(_))), "got {err:?}");
}

#[tokio::test]
async fn invalid_request_never_reaches_the_server() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        STREAM_ROUTE,
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                HttpStatus::OK
            }
        }),
    );
    let base = spawn_server(app).await;

    let request = hello_request().with_temperature(3.0);
    let mut session = client_for(&base).stream_invocation(request, CancellationToken::new());
    let (_, err) = drain(&mut session).await;
    assert!(matches!(err, Some(ClientError::InvalidRequest(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

// =============================================================================
// MID-STREAM
// =============================================================================

#[tokio::test]
async fn aborted_body_is_transport_error_after_prior_messages() {
    let app = Router::new().route(
        STREAM_ROUTE,
        post(|| async {
            // The reset arrives after the first frame has been flushed.
            let items = futures::stream::unfold(0_u8, |step| async move {
                match step {
                    0 => Some((Ok(b"data: one\n\n".to_vec()), 1)),
                    1 => {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Some((Err(std::io::Error::other("upstream reset")), 2))
                    }
                    _ => None,
                }
            });
            ([(header::CONTENT_TYPE, EVENT_STREAM)], Body::from_stream(items)).into_response()
        }),
    );
    let base = spawn_server(app).await;

    let mut session = client_for(&base).stream_invocation(hello_request(), CancellationToken::new());
    let (messages, err) = drain(&mut session).await;
    assert_eq!(messages, vec![ProtocolMessage::data("one")]);
    assert!(matches!(err, Some(ClientError::Transport(_))), "got {err:?}");
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn cancel_after_first_message_ends_cleanly() {
    let app = Router::new().route(
        STREAM_ROUTE,
        post(|| async {
            let first = futures::stream::iter(vec![Ok::<_, Infallible>(b"data: first\n\n".to_vec())]);
            let body = Body::from_stream(futures::StreamExt::chain(first, futures::stream::pending()));
            ([(header::CONTENT_TYPE, EVENT_STREAM)], body).into_response()
        }),
    );
    let base = spawn_server(app).await;

    let mut session = client_for(&base).stream_invocation(hello_request(), CancellationToken::new());
    let first = timeout(Duration::from_secs(5), session.next()).await.unwrap();
    assert_eq!(first.unwrap().unwrap(), ProtocolMessage::data("first"));

    let token = session.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
    });

    let next = timeout(Duration::from_secs(5), session.next()).await.expect("cancel should wake the read");
    assert!(next.is_none());
    assert_eq!(session.state(), SessionState::Cancelled);
    assert_eq!(session.messages_yielded(), 1);
}

// =============================================================================
// PLAIN API CALLS
// =============================================================================

#[tokio::test]
async fn fetch_history_passes_paging_and_parses_items() {
    let app = Router::new().route(
        "/api/v1/llm-providers/quick-test/history",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            let limit = params.get("limit").cloned().unwrap_or_default();
            let offset = params.get("offset").cloned().unwrap_or_default();
            axum::Json(json!([{
                "id": 1,
                "provider_id": 2,
                "provider_name": "OpenAI",
                "provider_logo_emoji": null,
                "provider_logo_url": null,
                "model_id": null,
                "model_name": format!("limit={limit};offset={offset}"),
                "response_text": "hi",
                "messages": [{ "role": "user", "content": "hello" }],
                "temperature": 0.7,
                "latency_ms": 12,
                "prompt_tokens": 3,
                "completion_tokens": 1,
                "total_tokens": 4,
                "prompt_id": null,
                "prompt_version_id": null,
                "created_at": "2025-01-01T00:00:00Z"
            }]))
        }),
    );
    let base = spawn_server(app).await;
    let client = client_for(&base);

    let items = client.fetch_history(HistoryQuery { limit: Some(5), offset: Some(10) }).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].model_name, "limit=5;offset=10");
    assert_eq!(items[0].messages[0].role, "user");

    let items = client.fetch_history(HistoryQuery::default()).await.unwrap();
    assert_eq!(items[0].model_name, "limit=;offset=");
}

#[tokio::test]
async fn fetch_history_query_string_is_encoded_by_request_builder() {
    let app = Router::new().route(
        "/api/v1/llm-providers/quick-test/history",
        get(|RawQuery(raw): RawQuery| async move {
            let echoed = raw.unwrap_or_else(|| "<none>".to_owned());
            axum::Json(json!([{ "id": 0, "model_name": echoed, "created_at": "" }]))
        }),
    );
    let base = spawn_server(app).await;
    let client = client_for(&base);

    let items = client.fetch_history(HistoryQuery { limit: Some(20), offset: None }).await.unwrap();
    assert_eq!(items[0].model_name, "limit=20");

    let items = client.fetch_history(HistoryQuery { limit: Some(5), offset: Some(10) }).await.unwrap();
    assert_eq!(items[0].model_name, "limit=5&offset=10");

    let items = client.fetch_history(HistoryQuery::default()).await.unwrap();
    assert_eq!(items[0].model_name, "<none>");
}

#[tokio::test]
async fn request_json_maps_status_and_body() {
    let app = Router::new().route(
        "/api/v1/prompts/{id}",
        get(|Path(id): Path<i64>| async move {
            if id == 1 {
                axum::Json(json!({ "id": 1, "name": "greeting" })).into_response()
            } else {
                (HttpStatus::NOT_FOUND, "no such prompt").into_response()
            }
        })
        .delete(|| async { HttpStatus::NO_CONTENT }),
    );
    let base = spawn_server(app).await;
    let client = client_for(&base);

    let found: Value = client.request_json(Method::GET, "prompts/1", None).await.unwrap();
    assert_eq!(found["name"], "greeting");

    let err = client.request_json::<Value>(Method::GET, "/prompts/2", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Connection { status: 404, ref payload } if payload == "no such prompt"));

    let () = client.request_json(Method::DELETE, "/prompts/1", None).await.unwrap();

    let err = client.request_json::<Vec<i64>>(Method::GET, "/prompts/1", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Parse(_)));
}

#[test]
fn url_joins_with_single_slash() {
    let client = client_for("http://127.0.0.1:1/api/v1/");
    assert_eq!(client.base_url(), "http://127.0.0.1:1/api/v1");
    assert_eq!(client.url("/prompts"), "http://127.0.0.1:1/api/v1/prompts");
    assert_eq!(client.url("prompts"), "http://127.0.0.1:1/api/v1/prompts");
}
