//! Ticket gateway HTTP service.
//!
//! | Route | Method | Body |
//! |-------|--------|------|
//! | `/task/` | POST | form: `KeyFingerprint`, `EncryptedKey`, `Encrypted`, `IV` |
//! | `/health` | GET | none |
//!
//! `/task/` always answers 200. The body is either the encrypted Answer or,
//! when no key could be recovered, a plaintext JSON error record.

use crate::domain::error::GatewayError;
use crate::handler::{EnvelopeRequest, GatewayResponse, RequestHandler};
use crate::keys::KeyRegistry;
use axum::{
    extract::{rejection::FormRejection, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    handler: Arc<RequestHandler>,
    keys: Arc<KeyRegistry>,
}

/// HTTP front end of the gateway.
pub struct GatewayService {
    addr: SocketAddr,
    state: AppState,
}

impl GatewayService {
    /// Create a service that will listen on `addr`.
    pub fn new(addr: SocketAddr, handler: Arc<RequestHandler>, keys: Arc<KeyRegistry>) -> Self {
        Self {
            addr,
            state: AppState { handler, keys },
        }
    }

    /// The HTTP router, with tracing.
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state.handler), Arc::clone(&self.state.keys))
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!(addr = %listener.local_addr()?, "Ticket gateway listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Ticket gateway stopped");
        Ok(())
    }
}

/// Build the router over a request handler and the key registry.
pub fn build_router(handler: Arc<RequestHandler>, keys: Arc<KeyRegistry>) -> Router {
    Router::new()
        .route("/task/", post(submit_task))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { handler, keys })
}

/// Handle a ticket submission
async fn submit_task(
    State(state): State<AppState>,
    form: Result<Form<EnvelopeRequest>, FormRejection>,
) -> Response {
    let response = match form {
        Ok(Form(request)) => state.handler.handle(&request).await,
        Err(rejection) => {
            warn!(error = %rejection, "Unreadable submission");
            let error = GatewayError::MalformedRequest(rejection.body_text());
            GatewayResponse::Plain(serde_json::to_vec(&error.to_record()).unwrap_or_default())
        }
    };
    into_http(response)
}

fn into_http(response: GatewayResponse) -> Response {
    let content_type = response.content_type();
    let body = match response {
        GatewayResponse::Encrypted(body) | GatewayResponse::Plain(body) => body,
    };
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// Liveness and key inventory
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "decryption_keys": state.keys.decryption_key_count(),
        "verification_keys": state.keys.verification_key_count(),
    }))
}
