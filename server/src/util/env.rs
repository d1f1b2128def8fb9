//! Process configuration.
//!
//! Variables are read from the environment (after an optional `.env` file has been loaded by
//! [`dotenvy`]) and deserialized with [`envy`]. Field names map onto their `SCREAMING_SNAKE_CASE`
//! variable names, so `visit_counts_url` is read from `VISIT_COUNTS_URL`.
//!
//! The loaded [`Env`] is built once in `main` and handed down by reference; nothing in the crate
//! reads the environment after startup.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "https://blog.radaideh.info",
    "https://blog-radaideh-info.pages.dev",
    "http://localhost:4321",
];

#[inline]
const fn default_port() -> u16 {
    3000
}

#[inline]
const fn default_identity_timeout_ms() -> u64 {
    5000
}

#[inline]
fn default_allowed_origins() -> Vec<String> {
    DEFAULT_ALLOWED_ORIGINS
        .iter()
        .map(|origin| origin.to_string())
        .collect()
}

#[inline]
fn default_github_api_url() -> String {
    String::from("https://api.github.com")
}

#[inline]
fn default_log_filter() -> String {
    String::from("blog_counter_server=debug,tower_http=debug,axum=debug,info")
}

#[inline]
fn default_service_name() -> String {
    String::from("blog-counter-api")
}

#[derive(Debug, Clone, Deserialize)]
pub struct Env {
    #[serde(default = "default_port")]
    pub server_api_port: u16,

    /// `redis://` URL (or `memory://`) backing the `VISIT_COUNTS` binding
    pub visit_counts_url: Option<String>,
    /// `redis://` URL (or `memory://`) backing the `LIKES` binding
    pub likes_url: Option<String>,

    #[serde(default = "default_allowed_origins")]
    pub cors_allow_origins: Vec<String>,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
    #[serde(default = "default_identity_timeout_ms")]
    pub identity_timeout_ms: u64,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub api_service_name: String,
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        if let Err(e) = dotenvy::dotenv() {
            // a missing `.env` is the normal case outside of local development
            if !e.not_found() {
                return Err(EnvErr::Dotenvy(e));
            }
        }

        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<Iter>(vars: Iter) -> EnvResult<Self>
    where
        Iter: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter::<_, Env>(vars)?)
    }

    /// Allow-list with surrounding whitespace and empty entries removed, in configured order.
    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_allow_origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error("env deserialization error: {0}")]
    Deserialization(#[from] envy::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let env = Env::from_vars(Vec::new()).unwrap();

        assert_eq!(env.server_api_port, 3000);
        assert!(env.visit_counts_url.is_none());
        assert!(env.likes_url.is_none());
        assert_eq!(env.allowed_origins(), DEFAULT_ALLOWED_ORIGINS.to_vec());
        assert_eq!(env.github_api_url, "https://api.github.com");
        assert_eq!(env.identity_timeout(), Duration::from_secs(5));
        assert!(env.otel_exporter_otlp_endpoint.is_none());
    }

    #[test]
    fn test_reads_screaming_snake_vars() {
        let env = Env::from_vars(vars(&[
            ("SERVER_API_PORT", "8787"),
            ("VISIT_COUNTS_URL", "redis://127.0.0.1:6379"),
            ("LIKES_URL", "memory://"),
            ("IDENTITY_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(env.server_api_port, 8787);
        assert_eq!(env.visit_counts_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(env.likes_url.as_deref(), Some("memory://"));
        assert_eq!(env.identity_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_origin_list_is_split_and_trimmed() {
        let env = Env::from_vars(vars(&[(
            "CORS_ALLOW_ORIGINS",
            "https://a.example, https://b.example,,",
        )]))
        .unwrap();

        assert_eq!(
            env.allowed_origins(),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_unrelated_vars_are_ignored() {
        let env = Env::from_vars(vars(&[("PATH", "/usr/bin"), ("LIKES_URL", "memory://")])).unwrap();

        assert_eq!(env.likes_url.as_deref(), Some("memory://"));
        assert_eq!(env.server_api_port, 3000);
    }

    #[test]
    fn test_bad_port_is_an_error() {
        let res = Env::from_vars(vars(&[("SERVER_API_PORT", "not-a-port")]));
        assert!(matches!(res, Err(EnvErr::Deserialization(_))));
    }
}
