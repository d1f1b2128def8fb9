use std::sync::Arc;

use axum::Json;
use axum::extract::{OriginalUri, State};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use chrono::{SecondsFormat, Utc};
use http::header::CACHE_CONTROL;
use http::{HeaderValue, Method, StatusCode};
use serde::Serialize;
use tracing::instrument;

use crate::api::path::{LIKES_PREFIX, ResourcePath, VISIT_COUNTER_PREFIX};
use crate::api::server::{AppState, COUNTER_ALLOW, Endpoint, HEALTH_ALLOW, JsonResult, RouteError};
use crate::db::prelude::{
    Binding, KvStore, LikeAggregate, LikeRepository, VisitCount, VisitRepository,
};
use crate::util::github::IdentityErr;

pub const CREDENTIAL_COOKIE: &str = "gh_token";
pub const HEALTH_PROBE_KEY: &str = "health-check";

/// Resolves the store and resource path shared by both counter-style endpoints
fn resolve<'a>(
    state: &'a AppState,
    endpoint: Endpoint,
    binding: Binding,
    prefix: &str,
    uri: &OriginalUri,
) -> Result<(&'a Arc<dyn KvStore>, ResourcePath), RouteError> {
    let store = state
        .bindings
        .get(binding)
        .ok_or(RouteError::Unbound { endpoint, binding })?;

    let path = ResourcePath::from_uri(prefix, &uri.0).ok_or_else(|| RouteError::InvalidPath {
        endpoint,
        path: uri.0.path().to_owned(),
    })?;

    Ok((store, path))
}

#[instrument(skip(state))]
pub async fn visit_counter(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: OriginalUri,
) -> JsonResult<VisitCount> {
    if method != Method::GET && method != Method::POST {
        return Err(RouteError::MethodNotAllowed {
            endpoint: Endpoint::VisitCounter,
            method,
            allow: COUNTER_ALLOW,
        });
    }

    let (store, path) = resolve(
        &state,
        Endpoint::VisitCounter,
        Binding::VisitCounts,
        VISIT_COUNTER_PREFIX,
        &uri,
    )?;
    let repo = VisitRepository::new(store.clone(), state.metrics.clone());

    let count = if method == Method::POST {
        repo.record(path.as_str()).await
    } else {
        repo.read(path.as_str()).await
    };

    Ok(Json(count))
}

#[instrument(skip(state, jar))]
pub async fn likes(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: OriginalUri,
    jar: CookieJar,
) -> JsonResult<LikeAggregate> {
    if method != Method::GET && method != Method::POST {
        return Err(RouteError::MethodNotAllowed {
            endpoint: Endpoint::Likes,
            method,
            allow: COUNTER_ALLOW,
        });
    }

    let (store, path) = resolve(&state, Endpoint::Likes, Binding::Likes, LIKES_PREFIX, &uri)?;
    let repo = LikeRepository::new(store.clone(), state.metrics.clone());

    if method == Method::GET {
        return Ok(Json(repo.read(path.as_str()).await));
    }

    let token = jar
        .get(CREDENTIAL_COOKIE)
        .map(|cookie| cookie.value().trim())
        .filter(|token| !token.is_empty())
        .ok_or(IdentityErr::MissingCredential);

    let user = match token {
        Ok(token) => state.identity.verify(token).await,
        Err(e) => Err(e),
    };

    match user {
        Ok(user) => Ok(Json(repo.toggle(path.as_str(), user).await)),
        Err(e) => {
            state.metrics.auth_failure();
            Err(e.into())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthServices {
    pub kv: bool,
    pub env: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: String,
    pub version: &'static str,
    pub uptime: u64,
    pub services: HealthServices,
}

/// Only the visit-count binding is probed; a missing value under the probe key still counts as a
/// working store.
async fn probe_store(state: &AppState) -> bool {
    let Some(store) = state.bindings.get(Binding::VisitCounts) else {
        return false;
    };

    match store.get(HEALTH_PROBE_KEY).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = ?e, "health probe read failed");
            false
        }
    }
}

#[instrument(skip(state))]
pub async fn health(
    State(state): State<Arc<AppState>>,
    method: Method,
) -> Result<Response, RouteError> {
    if method != Method::GET {
        return Err(RouteError::MethodNotAllowed {
            endpoint: Endpoint::Health,
            method,
            allow: HEALTH_ALLOW,
        });
    }

    let services = HealthServices {
        kv: probe_store(&state).await,
        env: state.env_ready(),
    };

    let (status, code) = if services.kv && services.env {
        (HealthStatus::Healthy, StatusCode::OK)
    } else {
        (HealthStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE)
    };

    let report = HealthReport {
        status,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.uptime().as_secs(),
        services,
    };

    if status == HealthStatus::Unhealthy {
        tracing::warn!(?report, "health check failed");
    }

    let mut res = (code, Json(report)).into_response();
    res.headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    Ok(res)
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_health_report_shape() {
        let report = HealthReport {
            status: HealthStatus::Unhealthy,
            timestamp: String::from("2024-01-01T00:00:00.000Z"),
            version: "1.0.0",
            uptime: 12,
            services: HealthServices {
                kv: true,
                env: false,
            },
        };

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "status": "unhealthy",
                "timestamp": "2024-01-01T00:00:00.000Z",
                "version": "1.0.0",
                "uptime": 12,
                "services": { "kv": true, "env": false },
            })
        );
    }
}
