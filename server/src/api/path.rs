use core::fmt;

use http::Uri;

pub const VISIT_COUNTER_PREFIX: &str = "/api/visit-counter";
pub const LIKES_PREFIX: &str = "/api/likes";
pub const HEALTH_ROUTE: &str = "/api/health";

/// The page a counter or like-set belongs to: whatever follows a route prefix in the request path,
/// always starting with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Strips `prefix` off the request path. An empty remainder is the site root; anything that
    /// isn't under `prefix` as a path segment has no resource path.
    pub fn from_uri(prefix: &str, uri: &Uri) -> Option<Self> {
        let rest = uri.path().strip_prefix(prefix)?;

        if rest.is_empty() {
            return Some(Self(String::from("/")));
        }

        rest.starts_with('/').then(|| Self(rest.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
