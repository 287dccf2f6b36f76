//! HTTP server component.
//!
//! # Responsibilities
//! - Create Axum Router with the status handlers
//! - Wire up middleware (tracing, request timeout)
//! - Bind to the configured address when started
//! - Shut down gracefully when the start scope is cancelled or stop is called

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::HttpConfig;
use crate::error::ComponentError;
use crate::lifecycle::{AppInfo, Component, Scope};
use crate::servers::{describe, RunState};

/// State injected into handlers.
#[derive(Clone)]
struct HttpState {
    app: Option<Arc<dyn AppInfo>>,
}

/// HTTP status server.
pub struct HttpServer {
    config: HttpConfig,
    state: RunState,
}

impl HttpServer {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            state: RunState::new(),
        }
    }

    /// Address the server is listening on, while it runs.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.local_addr()
    }

    /// Wait until the listener is bound.
    pub async fn bound(&self) -> SocketAddr {
        self.state.bound().await
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(&self, app: Option<Arc<dyn AppInfo>>) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/info", get(info))
            .with_state(HttpState { app })
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }
}

#[async_trait]
impl Component for HttpServer {
    fn id(&self) -> &str {
        &self.config.name
    }

    async fn start(&self, scope: Scope) -> Result<(), ComponentError> {
        let running = self.state.begin(&scope);

        let listener = TcpListener::bind(self.config.bind_address.as_str()).await?;
        let addr = listener.local_addr()?;
        self.state.set_addr(addr);
        tracing::info!(component = %self.config.name, address = %addr, "HTTP server starting");

        let router = self.build_router(scope.app_info());
        let token = running.token().clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        tracing::info!(component = %self.config.name, "HTTP server stopped");
        Ok(())
    }

    async fn stop(&self, scope: Scope) -> Result<(), ComponentError> {
        self.state.request_shutdown();
        self.state.wait_stopped(&scope).await
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn info(State(state): State<HttpState>) -> impl IntoResponse {
    match state.app {
        Some(app) => (StatusCode::OK, Json(describe(app.as_ref()))).into_response(),
        None => (StatusCode::NOT_FOUND, "app info not found").into_response(),
    }
}
