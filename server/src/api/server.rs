use std::any::Any;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::middleware::{Next, from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, any};
use axum::{Json, Router};
use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::handler::{health, likes, visit_counter};
use crate::api::middleware::cors::{CorsPolicy, cors_gate};
use crate::api::path::{HEALTH_ROUTE, LIKES_PREFIX, VISIT_COUNTER_PREFIX};
use crate::db::{Binding, Bindings};
use crate::util::github::{IdentityErr, IdentityVerifier};
use crate::util::telemetry::Metrics;

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

pub const COUNTER_METHODS: [Method; 2] = [Method::GET, Method::POST];
pub const COUNTER_ALLOW: &str = "GET, POST, OPTIONS";
pub const HEALTH_ALLOW: &str = "GET, OPTIONS";

/// Everything a handler can reach. All of it is either immutable or a cheap handle onto an external
/// collaborator; no request state survives between requests.
#[derive(Debug)]
pub struct AppState {
    pub bindings: Bindings,
    pub identity: Arc<dyn IdentityVerifier>,
    pub metrics: Metrics,
    pub allowed_origins: Vec<String>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        bindings: Bindings,
        identity: Arc<dyn IdentityVerifier>,
        metrics: Metrics,
        allowed_origins: Vec<String>,
    ) -> Self {
        Self {
            bindings,
            identity,
            metrics,
            allowed_origins,
            started_at: Instant::now(),
        }
    }

    /// Whether the configuration the endpoints depend on is all present
    pub fn env_ready(&self) -> bool {
        self.bindings.all_bound() && !self.allowed_origins.is_empty()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Builds one route family: `prefix` itself, `prefix/` (both the site root), and every path below
/// it, behind its own CORS policy and panic guard.
fn resource_routes(
    prefix: &str,
    endpoint: Endpoint,
    handler: MethodRouter<Arc<AppState>>,
    cors: CorsPolicy,
) -> Router<Arc<AppState>> {
    Router::new()
        .route(prefix, handler.clone())
        // a catch-all never matches an empty tail
        .route(&format!("{prefix}/"), handler.clone())
        .route(&format!("{prefix}/{{*path}}"), handler)
        .layer(CatchPanicLayer::custom(
            move |_: Box<dyn Any + Send + 'static>| endpoint.panic_response(),
        ))
        .layer(from_fn_with_state(cors, cors_gate))
}

pub fn router(state: Arc<AppState>) -> Router {
    let counter_cors = CorsPolicy::new(&state.allowed_origins, &COUNTER_METHODS);
    let health_cors = CorsPolicy::new(&state.allowed_origins, &[Method::GET]);

    let visit_routes = resource_routes(
        VISIT_COUNTER_PREFIX,
        Endpoint::VisitCounter,
        any(visit_counter),
        counter_cors.clone(),
    );
    let like_routes = resource_routes(LIKES_PREFIX, Endpoint::Likes, any(likes), counter_cors);

    let health_routes = Router::new()
        .route(HEALTH_ROUTE, any(health))
        .layer(CatchPanicLayer::custom(
            |_: Box<dyn Any + Send + 'static>| Endpoint::Health.panic_response(),
        ))
        .layer(from_fn_with_state(health_cors, cors_gate));

    Router::new()
        .merge(visit_routes)
        .merge(like_routes)
        .merge(health_routes)
        .fallback(not_found)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .with_state(state)
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" }))).into_response()
}

/// Logs any `RouteError` that a handler stashed in its response's extensions.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, status = %res.status(), "error occurred inside route handler");
    }

    res
}

#[instrument(skip(state))]
pub async fn start_server(port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    let listener = TcpListener::bind(socket_addr).await?;

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{}", socket_addr.port()),
        visit_counts_bound = state.bindings.visit_counts.is_some(),
        likes_bound = state.bindings.likes.is_some(),
        "server ready"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("received ctrl+c, shutting down"),
            Err(e) => {
                tracing::error!(error = ?e, "unable to listen for ctrl+c");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = ?e, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Which endpoint an error belongs to, which decides the default payload its body carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    VisitCounter,
    Likes,
    Health,
}

impl Endpoint {
    /// Error body in the endpoint's normal response shape, so a client reading `total` or
    /// `count`/`users` never has to special-case failures
    pub fn error_body(&self, message: &str) -> Value {
        match self {
            Endpoint::VisitCounter => json!({ "error": message, "total": 0 }),
            Endpoint::Likes => json!({ "error": message, "count": 0, "users": [] }),
            Endpoint::Health => json!({ "error": message, "status": "unhealthy" }),
        }
    }

    pub fn panic_response(&self) -> Response {
        tracing::error!(endpoint = ?self, "handler panicked");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(self.error_body(INTERNAL_MESSAGE)),
        )
            .into_response()
    }
}

pub const UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable";
pub const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("{binding} store binding is not configured")]
    Unbound { endpoint: Endpoint, binding: Binding },

    #[error("invalid API path '{path}'")]
    InvalidPath { endpoint: Endpoint, path: String },

    #[error("method {method} not allowed")]
    MethodNotAllowed {
        endpoint: Endpoint,
        method: Method,
        allow: &'static str,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] IdentityErr),
}

impl RouteError {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            RouteError::Unbound { endpoint, .. }
            | RouteError::InvalidPath { endpoint, .. }
            | RouteError::MethodNotAllowed { endpoint, .. } => *endpoint,
            RouteError::Unauthorized(_) => Endpoint::Likes,
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let endpoint = self.endpoint();

        // the third member decides whether the error is worth an `error`-level log; client
        // mistakes aren't
        let (status, message, log) = match &self {
            RouteError::Unbound { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_MESSAGE, true)
            }
            RouteError::InvalidPath { .. } => (StatusCode::BAD_REQUEST, "Invalid API path", false),
            RouteError::MethodNotAllowed { .. } => {
                (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed", false)
            }
            RouteError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized", false),
        };

        let mut response = (status, Json(endpoint.error_body(message))).into_response();
        if let RouteError::MethodNotAllowed { allow, .. } = &self {
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static(*allow));
        }

        if log {
            response.extensions_mut().insert(Arc::new(self));
        } else {
            tracing::debug!(error = %self, %status, "rejected request");
        }

        response
    }
}
