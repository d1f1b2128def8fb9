use core::fmt;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use http::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::db::models::like::LikedBy;

pub const GITHUB_URN_USER: &str = "user";
pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";
pub const SERVICE_USER_AGENT: &str = concat!("blog-counter-server/", env!("CARGO_PKG_VERSION"));

/// Resolves a bearer credential into the identity a like is recorded under
#[async_trait]
pub trait IdentityVerifier: Send + Sync + fmt::Debug {
    async fn verify(&self, token: &str) -> IdentityResult<LikedBy>;
}

/// Verifies GitHub OAuth tokens against the `GET /user` endpoint.
#[derive(Debug, Clone)]
pub struct GithubVerifier {
    client: reqwest::Client,
    api_base: String,
}

impl GithubVerifier {
    /// Every request made through the verifier is bounded by `timeout`; an expired request counts
    /// as a rejected credential.
    pub fn new(api_base: &str, timeout: Duration) -> IdentityResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(SERVICE_USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_owned(),
        })
    }

    fn user_uri(&self) -> String {
        format!("{}/{}", self.api_base, GITHUB_URN_USER)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GithubUser {
    login: String,
    #[serde(default)]
    avatar_url: String,
}

impl From<GithubUser> for LikedBy {
    fn from(user: GithubUser) -> Self {
        LikedBy {
            login: user.login,
            avatar_url: user.avatar_url,
        }
    }
}

#[async_trait]
impl IdentityVerifier for GithubVerifier {
    #[instrument(skip(self, token))]
    async fn verify(&self, token: &str) -> IdentityResult<LikedBy> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IdentityErr::MissingCredential);
        }

        let res = self
            .client
            .get(self.user_uri())
            .header(AUTHORIZATION, format!("token {token}"))
            .header(ACCEPT, GITHUB_ACCEPT)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            tracing::warn!(code = %status, "github rejected credential");
            return Err(IdentityErr::Rejected(status));
        }

        let user = res.json::<GithubUser>().await?;
        if user.login.is_empty() {
            return Err(IdentityErr::EmptyLogin);
        }

        tracing::debug!(login = user.login, "verified github identity");
        Ok(user.into())
    }
}

pub type IdentityResult<T> = core::result::Result<T, IdentityErr>;

#[derive(Debug, Error)]
pub enum IdentityErr {
    #[error("no credential supplied")]
    MissingCredential,

    #[error("identity provider rejected the credential ({0})")]
    Rejected(StatusCode),

    #[error("identity provider returned an empty login")]
    EmptyLogin,

    #[error("identity request timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("reqwest error: {0}")]
    ReqwestError(reqwest::Error),
}

impl From<reqwest::Error> for IdentityErr {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            IdentityErr::Timeout(e)
        } else {
            IdentityErr::ReqwestError(e)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn github() -> MockServer {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "token good-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "login": "alice",
                "id": 1,
                "avatar_url": "https://avatars.githubusercontent.com/u/1",
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "token slow-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "login": "slow", "avatar_url": "" }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "message": "Bad credentials",
            })))
            .mount(&server)
            .await;

        server
    }

    #[tokio::test]
    async fn test_valid_token_resolves_identity() {
        let server = github().await;
        let verifier = GithubVerifier::new(&server.uri(), Duration::from_secs(1)).unwrap();

        let user = verifier.verify("good-token").await.unwrap();
        assert_eq!(user.login, "alice");
        assert_eq!(user.avatar_url, "https://avatars.githubusercontent.com/u/1");
    }

    #[tokio::test]
    async fn test_bad_token_is_rejected() {
        let server = github().await;
        let verifier = GithubVerifier::new(&server.uri(), Duration::from_secs(1)).unwrap();

        let err = verifier.verify("bad-token").await.unwrap_err();
        assert!(matches!(err, IdentityErr::Rejected(status) if status == StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_empty_token_skips_request() {
        let verifier = GithubVerifier::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();

        let err = verifier.verify("   ").await.unwrap_err();
        assert!(matches!(err, IdentityErr::MissingCredential));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let server = github().await;
        let verifier = GithubVerifier::new(&server.uri(), Duration::from_millis(100)).unwrap();

        let err = verifier.verify("slow-token").await.unwrap_err();
        assert!(matches!(err, IdentityErr::Timeout(_)));
    }

    #[test]
    fn test_trailing_slash_on_base() {
        let verifier =
            GithubVerifier::new("https://api.github.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(verifier.user_uri(), "https://api.github.com/user");
    }
}
