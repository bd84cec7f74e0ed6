//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use se_core::{LocalStore, RemoteDirectoryClient};
use se_sync::{MetricsCollector, Reconciler};

use crate::routes::routes;

const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Bearer key required on `/api` routes; `None` leaves them open
    pub api_key: Option<String>,
    /// Sample size used when a sync request does not name one
    pub default_sample_size: usize,
    pub reconciler: Arc<Reconciler>,
    pub collector: Arc<MetricsCollector>,
    pub store: Arc<dyn LocalStore>,
    pub directory: Arc<dyn RemoteDirectoryClient>,
}

/// Router with CORS and request tracing applied
pub fn app(state: AppState, allowed_origins: Option<&[String]>) -> Router {
    Router::new()
        .merge(routes(&state))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let origins: Vec<HeaderValue> = match allowed_origins {
        Some(list) => list
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect(),
        None => DEFAULT_ORIGINS
            .into_iter()
            .map(HeaderValue::from_static)
            .collect(),
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Serve until `shutdown` resolves
pub async fn start_server(
    port: u16,
    state: AppState,
    allowed_origins: Option<Vec<String>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    if state.api_key.is_none() {
        warn!("No API key configured; /api routes are open");
    }

    let app = app(state, allowed_origins.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
