//! HTTP surface for chatlink.
//!
//! Exposes the session's health, linking code and group list, plus the
//! send and logout operations, as a small JSON API.

mod routes;
mod state;

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

pub use routes::{ApiError, ErrorBody, LOGOUT_RESET_NOTE};
pub use state::AppState;

/// Build the router with all routes and CORS applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/groups", get(routes::groups))
        .route("/qr", get(routes::qr))
        .route("/send", post(routes::send))
        .route("/logout", post(routes::logout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Handle to a running HTTP server.
#[derive(Default)]
pub struct HttpServerHandle {
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HttpServerHandle {
    /// Check if the server is running.
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop the server gracefully, waiting for in-flight requests.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Bind `host:port` and serve on the current runtime.
///
/// Binding happens before this returns, so address errors surface here.
pub async fn start(state: AppState, host: &str, port: u16) -> Result<HttpServerHandle, String> {
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port))
        .await
        .map_err(|e| format!("Failed to bind HTTP server to {}:{}: {}", host, port, e))?;
    let addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to read bound address: {}", e))?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let app = router(state);

    log::info!("HTTP server listening on http://{}", addr);

    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
                log::info!("HTTP server shutting down");
            })
            .await;
        if let Err(e) = result {
            log::error!("HTTP server error: {}", e);
        }
    });

    Ok(HttpServerHandle {
        local_addr: Some(addr),
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chatlink_core::testing::{eventually, Call, Operation, RecordingClient};
    use chatlink_core::{ChatSummary, EventBus, LifecycleEvent, SessionController, SessionState};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Harness {
        client: Arc<RecordingClient>,
        session: Arc<SessionController>,
        app: Router,
    }

    impl Harness {
        fn new() -> Self {
            let client = Arc::new(RecordingClient::new());
            let (session, _task) =
                SessionController::start(client.clone(), Arc::new(EventBus::new()));
            let app = router(AppState::new(Arc::clone(&session), client.clone()));
            Self {
                client,
                session,
                app,
            }
        }

        async fn ready() -> Self {
            let harness = Self::new();
            harness.client.emit(LifecycleEvent::Ready);
            let session = Arc::clone(&harness.session);
            eventually(move || session.is_ready_for_traffic()).await;
            harness
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            self.call(request).await
        }

        async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.post_raw(uri, body.to_string()).await
        }

        async fn post_raw(&self, uri: &str, body: String) -> (StatusCode, Value) {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap();
            self.call(request).await
        }

        async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }

    mod health {
        use super::*;

        #[tokio::test]
        async fn reports_not_ready_initially() {
            let h = Harness::new();
            let (status, body) = h.get("/health").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"status": "online", "whatsapp_ready": false}));
        }

        #[tokio::test]
        async fn reports_ready() {
            let h = Harness::ready().await;
            let (_, body) = h.get("/health").await;
            assert_eq!(body["whatsapp_ready"], true);
        }
    }

    mod qr {
        use super::*;

        #[tokio::test]
        async fn initializing_without_code() {
            let h = Harness::new();
            let (status, body) = h.get("/qr").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"status": "initializing", "qr": null}));
        }

        #[tokio::test]
        async fn scanning_exposes_code() {
            let h = Harness::new();
            h.client.emit(LifecycleEvent::LinkingCode("ABC".into()));
            let session = Arc::clone(&h.session);
            eventually(move || session.current_linking_code().is_some()).await;

            let (_, body) = h.get("/qr").await;
            assert_eq!(body, json!({"status": "scanning", "qr": "ABC"}));
        }

        #[tokio::test]
        async fn connected_clears_code() {
            let h = Harness::new();
            h.client.emit(LifecycleEvent::LinkingCode("ABC".into()));
            h.client.emit(LifecycleEvent::Ready);
            let session = Arc::clone(&h.session);
            eventually(move || session.is_ready_for_traffic()).await;

            let (_, body) = h.get("/qr").await;
            assert_eq!(body, json!({"status": "connected", "qr": null}));
        }
    }

    mod groups {
        use super::*;

        #[tokio::test]
        async fn not_ready_is_503() {
            let h = Harness::new();
            let (status, body) = h.get("/groups").await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body["kind"], "not_ready");
            assert_eq!(h.client.count(Operation::ListConversations), 0);
        }

        #[tokio::test]
        async fn returns_only_groups() {
            let h = Harness::ready().await;
            h.client.set_conversations(vec![
                ChatSummary {
                    name: "Team".into(),
                    id: "1@g.us".into(),
                    is_group: true,
                },
                ChatSummary {
                    name: "Bob".into(),
                    id: "2@c.us".into(),
                    is_group: false,
                },
            ]);

            let (status, body) = h.get("/groups").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!([{"name": "Team", "id": "1@g.us"}]));
        }

        #[tokio::test]
        async fn client_failure_is_500() {
            let h = Harness::ready().await;
            h.client.fail(Operation::ListConversations, "browser crashed");

            let (status, body) = h.get("/groups").await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["kind"], "list_error");
            assert_eq!(body["details"], "browser crashed");
        }
    }

    mod send {
        use super::*;
        use std::io::Write;

        #[tokio::test]
        async fn not_ready_is_503_without_send() {
            let h = Harness::new();
            let (status, body) = h
                .post_json("/send", json!({"number": "123", "message": "hi"}))
                .await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body["kind"], "not_ready");
            assert_eq!(h.client.send_count(), 0);
        }

        #[tokio::test]
        async fn sends_text_to_private_chat() {
            let h = Harness::ready().await;

            let (status, body) = h
                .post_json("/send", json!({"number": "1234567890", "message": "hi"}))
                .await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"success": true, "status": "Sent"}));
            assert_eq!(
                h.client.calls().last(),
                Some(&Call::SendText {
                    chat_id: "1234567890@c.us".into(),
                    body: "hi".into()
                })
            );
        }

        #[tokio::test]
        async fn missing_fields_is_400() {
            let h = Harness::ready().await;
            let (status, body) = h.post_json("/send", json!({"number": "123"})).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["kind"], "invalid_request");
            assert_eq!(body["error"], "Missing number or message");
            assert_eq!(h.client.send_count(), 0);
        }

        #[tokio::test]
        async fn malformed_json_is_400() {
            let h = Harness::ready().await;
            let (status, body) = h.post_raw("/send", "{not json".to_string()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["kind"], "invalid_request");
        }

        #[tokio::test]
        async fn missing_media_is_400() {
            let h = Harness::ready().await;
            let (status, body) = h
                .post_json(
                    "/send",
                    json!({"number": "123", "message": "hi", "image_path": "/nonexistent/a.png"}),
                )
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["kind"], "media_load_error");
            assert!(body["details"].is_string());
            assert_eq!(h.client.send_count(), 0);
        }

        #[tokio::test]
        async fn sends_media_with_caption() {
            let h = Harness::ready().await;
            let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
            file.write_all(&[0x89, b'P', b'N', b'G']).unwrap();
            let path = file.path().to_string_lossy().into_owned();

            let (status, _) = h
                .post_json(
                    "/send",
                    json!({"number": "team@g.us", "message": "chart", "image_path": path}),
                )
                .await;

            assert_eq!(status, StatusCode::OK);
            match h.client.calls().last() {
                Some(Call::SendMedia {
                    chat_id,
                    caption,
                    media,
                }) => {
                    assert_eq!(chat_id, "team@g.us");
                    assert_eq!(caption, "chart");
                    assert_eq!(media.mimetype, "image/png");
                }
                other => panic!("expected media send, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn client_failure_is_500() {
            let h = Harness::ready().await;
            h.client.fail(Operation::SendText, "chat not found");

            let (status, body) = h
                .post_json("/send", json!({"number": "123", "message": "hi"}))
                .await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["kind"], "dispatch_error");
            assert_eq!(body["details"], "chat not found");
        }
    }

    mod logout {
        use super::*;

        #[tokio::test]
        async fn success() {
            let h = Harness::ready().await;
            let (status, body) = h.post_json("/logout", json!({})).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], true);
            assert!(body["message"].is_string());
            assert_eq!(h.client.count(Operation::Logout), 1);
        }

        #[tokio::test]
        async fn failure_forces_reset() {
            let h = Harness::ready().await;
            h.client.fail(Operation::Logout, "page closed");

            let (status, body) = h.post_json("/logout", json!({})).await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["kind"], "logout_error");
            assert_eq!(body["details"], "page closed");
            assert_eq!(body["note"], LOGOUT_RESET_NOTE);
            assert!(!h.session.is_ready_for_traffic());

            let client = Arc::clone(&h.client);
            eventually(move || client.count(Operation::Initialize) == 1).await;
            assert!(matches!(
                h.session.current_state(),
                SessionState::Disconnected { .. }
            ));
        }
    }

    mod server {
        use super::*;

        #[test]
        fn handle_default() {
            let handle = HttpServerHandle::default();
            assert!(!handle.is_running());
            assert!(handle.local_addr().is_none());
        }

        #[tokio::test]
        async fn starts_and_stops() {
            let h = Harness::new();
            let state = AppState::new(Arc::clone(&h.session), h.client.clone());

            let mut handle = start(state, "127.0.0.1", 0).await.unwrap();
            assert!(handle.is_running());
            assert_ne!(handle.local_addr().unwrap().port(), 0);

            handle.stop().await;
            assert!(!handle.is_running());
        }
    }
}
