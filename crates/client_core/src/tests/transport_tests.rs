use super::*;
use axum::{
    extract::{Multipart, Path},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;

async fn spawn_backend(label: &'static str) -> anyhow::Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let app = Router::new()
        .route(
            "/health",
            get(move || async move { Json(json!({"status": "healthy", "timestamp": label})) }),
        )
        .route(
            "/boom",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": "Processing exploded"})),
                )
            }),
        )
        .route("/plain", get(|| async { "definitely not json" }))
        .route("/empty", delete(|| async { StatusCode::NO_CONTENT }))
        .route("/echo", post(|Json(body): Json<Value>| async move { Json(body) }))
        .route(
            "/download/:id",
            get(|Path(id): Path<String>| async move { format!("bytes-of-{id}").into_bytes() }),
        )
        .route("/upload", post(echo_upload))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({"status": "healthy"}))
            }),
        );

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn echo_upload(mut multipart: Multipart) -> Result<Json<Value>, StatusCode> {
    let field = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
        .ok_or(StatusCode::BAD_REQUEST)?;
    let name = field.name().map(str::to_string);
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok(Json(json!({
        "field": name,
        "filename": file_name,
        "content_type": content_type,
        "size": bytes.len()
    })))
}

fn transport_for(base_url: &str) -> HttpTransport {
    HttpTransport::new(EndpointHandle::new(base_url)).expect("client")
}

#[tokio::test]
async fn json_get_decodes_body() {
    let base = spawn_backend("first").await.expect("spawn server");
    let transport = transport_for(&base);

    let response = transport
        .send(TransportRequest::get("/health"))
        .await
        .expect("health");

    assert_eq!(response.status, 200);
    assert_eq!(
        response.body,
        ResponseBody::Json(json!({"status": "healthy", "timestamp": "first"}))
    );
}

#[tokio::test]
async fn endpoint_change_applies_to_next_request() {
    let first = spawn_backend("first").await.expect("spawn server");
    let second = spawn_backend("second").await.expect("spawn server");
    let endpoint = EndpointHandle::new(first);
    let transport = HttpTransport::new(endpoint.clone()).expect("client");

    let before: Value = transport
        .send(TransportRequest::get("/health"))
        .await
        .expect("first")
        .decode()
        .expect("decode");
    assert_eq!(before["timestamp"], "first");

    endpoint.set(second);

    let after: Value = transport
        .send(TransportRequest::get("/health"))
        .await
        .expect("second")
        .decode()
        .expect("decode");
    assert_eq!(after["timestamp"], "second");
}

#[tokio::test]
async fn server_error_carries_detail_message() {
    let base = spawn_backend("first").await.expect("spawn server");
    let err = transport_for(&base)
        .send(TransportRequest::get("/boom"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransportError::Rejected {
            status: 500,
            server_message: Some("Processing exploded".into()),
        }
    );
    assert_eq!(err.user_message("Upload failed"), "Processing exploded");
}

#[tokio::test]
async fn unknown_route_is_rejected_without_message() {
    let base = spawn_backend("first").await.expect("spawn server");
    let err = transport_for(&base)
        .send(TransportRequest::get("/does/not/exist"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(
        err.user_message("Delete failed"),
        "Request failed with status code 404"
    );
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = transport_for(&format!("http://{addr}"))
        .send(TransportRequest::get("/health"))
        .await
        .unwrap_err();

    assert!(err.is_unreachable());
    assert_eq!(err.user_message("Login failed"), "Connection Failed");
}

#[tokio::test]
async fn slow_response_times_out_as_unreachable() {
    let base = spawn_backend("first").await.expect("spawn server");
    let transport = HttpTransport::with_timeout(
        EndpointHandle::new(base),
        Duration::from_millis(100),
    )
    .expect("client");

    let err = transport
        .send(TransportRequest::get("/slow"))
        .await
        .unwrap_err();

    assert!(err.is_unreachable());
    assert_eq!(
        err,
        TransportError::Unreachable {
            reason: "timeout of 100ms exceeded".into()
        }
    );
    assert_eq!(err.user_message("Login failed"), "Connection Failed");
}

#[tokio::test]
async fn non_json_success_body_is_malformed() {
    let base = spawn_backend("first").await.expect("spawn server");
    let err = transport_for(&base)
        .send(TransportRequest::get("/plain"))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Malformed(_)));
    assert_eq!(err.user_message("Delete failed"), "Delete failed");
}

#[tokio::test]
async fn empty_success_body_decodes_as_empty_object() {
    let base = spawn_backend("first").await.expect("spawn server");
    let response = transport_for(&base)
        .send(TransportRequest::delete("/empty"))
        .await
        .expect("delete");

    assert_eq!(response.status, 204);
    let decoded: shared::protocol::SuccessResponse = response.decode().expect("decode");
    assert_eq!(decoded.success, None);
    assert!(!decoded.refused());
}

#[tokio::test]
async fn json_body_is_sent_as_json() {
    let base = spawn_backend("first").await.expect("spawn server");
    let response = transport_for(&base)
        .send(TransportRequest::post("/echo").json(json!({"filename": "a.jpg"})))
        .await
        .expect("echo");

    assert_eq!(response.body, ResponseBody::Json(json!({"filename": "a.jpg"})));
}

#[tokio::test]
async fn file_body_is_sent_as_multipart_file_field() {
    let base = spawn_backend("first").await.expect("spawn server");
    let part = FilePart {
        file_name: "photo.png".into(),
        mime_type: "image/png".into(),
        bytes: vec![7; 64],
    };

    let echoed: Value = transport_for(&base)
        .send(TransportRequest::post("/upload").file(part))
        .await
        .expect("upload")
        .decode()
        .expect("decode");

    assert_eq!(
        echoed,
        json!({
            "field": "file",
            "filename": "photo.png",
            "content_type": "image/png",
            "size": 64
        })
    );
}

#[tokio::test]
async fn binary_response_is_returned_raw() {
    let base = spawn_backend("first").await.expect("spawn server");
    let bytes = transport_for(&base)
        .send(TransportRequest::get("/download/a.jpg").binary())
        .await
        .expect("download")
        .into_bytes();

    assert_eq!(bytes, b"bytes-of-a.jpg".to_vec());
}

#[test]
fn resolve_url_joins_and_encodes_segments() {
    assert_eq!(
        resolve_url("http://localhost:8000", "/health")
            .expect("url")
            .as_str(),
        "http://localhost:8000/health"
    );
    assert_eq!(
        resolve_url("http://localhost:8000/", "/download/a b.jpg")
            .expect("url")
            .as_str(),
        "http://localhost:8000/download/a%20b.jpg"
    );
    assert_eq!(
        resolve_url("https://gateway.example/api", "/images/x#1.jpg")
            .expect("url")
            .as_str(),
        "https://gateway.example/api/images/x%231.jpg"
    );
    assert!(resolve_url("not a url", "/health")
        .unwrap_err()
        .is_unreachable());
}

#[test]
fn endpoint_handle_is_shared_between_clones() {
    let handle = EndpointHandle::new("http://a.test");
    let clone = handle.clone();
    clone.set("http://b.test");
    assert_eq!(handle.get(), "http://b.test");
}
