use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ORIGIN, VARY,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};

pub const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

/// Cross-origin policy for one route family.
///
/// Unlike `tower_http::cors::CorsLayer`, an origin outside the allow-list isn't left without an
/// `Access-Control-Allow-Origin` header: it gets the first (primary) allowed origin instead, which
/// the browser then refuses. The wildcard origin is never sent.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed: Vec<HeaderValue>,
    methods: HeaderValue,
}

impl CorsPolicy {
    /// `methods` are the ones the route family actually serves; `OPTIONS` is always appended.
    pub fn new(allowed_origins: &[String], methods: &[Method]) -> Self {
        let allowed = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin, "ignoring allowed origin that isn't a valid header value");
                    None
                }
            })
            .collect();

        let methods = methods
            .iter()
            .chain(std::iter::once(&Method::OPTIONS))
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            allowed,
            methods: HeaderValue::from_str(&methods).unwrap_or(HeaderValue::from_static("OPTIONS")),
        }
    }

    /// Value for `Access-Control-Allow-Origin` given the request's `Origin`, if any origin is
    /// allowed at all
    pub fn allow_origin(&self, origin: Option<&HeaderValue>) -> Option<&HeaderValue> {
        origin
            .and_then(|origin| self.allowed.iter().find(|allowed| *allowed == origin))
            .or_else(|| self.allowed.first())
    }

    pub fn headers(&self, origin: Option<&HeaderValue>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(allow_origin) = self.allow_origin(origin) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin.clone());
        }
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        );
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(PREFLIGHT_MAX_AGE_SECS));
        headers.insert(VARY, HeaderValue::from_static("Origin"));

        headers
    }
}

/// Attaches the policy's headers to every response in the route family, answering `OPTIONS`
/// itself with an empty `204` before the request reaches a handler.
pub async fn cors_gate(State(policy): State<CorsPolicy>, req: Request, next: Next) -> Response {
    let headers = policy.headers(req.headers().get(ORIGIN));

    let mut res = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    res.headers_mut().extend(headers);
    res
}
