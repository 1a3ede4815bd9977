use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rate_limit::TokenBucket;

/// Narrow tagged error set the Sync Engine's classifier maps into `ErrorClass`.
#[derive(Debug, Error, Clone)]
pub enum GiteaError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct RepoOptions {
    pub description: Option<String>,
    pub private: bool,
}

#[derive(Serialize)]
struct CreateRepoBody<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
}

#[derive(Deserialize)]
struct WhoAmIResp {
    login: String,
}

/// Narrow typed view of the downstream Gitea API: existence and creation only.
pub struct GiteaClient {
    client: reqwest::Client,
    base_url: String,
    limiter: TokenBucket,
}

impl GiteaClient {
    pub fn new(base_url: String, token: &str) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(&format!("token {token}")) {
            headers.insert(header::AUTHORIZATION, val);
        }
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static("gitmir/0.1.0"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: TokenBucket::new(30, 5),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn gate(&self) -> Result<(), GiteaError> {
        if self.limiter.try_acquire() {
            Ok(())
        } else {
            Err(GiteaError::RateLimited {
                retry_after_secs: self.limiter.retry_after().as_secs(),
            })
        }
    }

    pub async fn who_am_i(&self) -> Result<String, GiteaError> {
        self.gate()?;
        let resp = self
            .client
            .get(self.url("/user"))
            .send()
            .await
            .map_err(|e| GiteaError::Transport(e.to_string()))?;
        let resp = classify_status(resp)?;
        let who: WhoAmIResp = resp
            .json()
            .await
            .map_err(|e| GiteaError::Transport(format!("parse error: {e}")))?;
        Ok(who.login)
    }

    pub async fn repo_exists(&self, owner: &str, name: &str) -> Result<bool, GiteaError> {
        self.gate()?;
        let resp = self
            .client
            .get(self.url(&format!("/repos/{owner}/{name}")))
            .send()
            .await
            .map_err(|e| GiteaError::Transport(e.to_string()))?;

        if resp.status().as_u16() == 404 {
            return Ok(false);
        }
        classify_status(resp)?;
        Ok(true)
    }

    pub async fn create_user_repo(&self, name: &str, opts: &RepoOptions) -> Result<(), GiteaError> {
        self.gate()?;
        let body = CreateRepoBody {
            name,
            description: opts.description.as_deref().unwrap_or(""),
            private: opts.private,
        };
        let resp = self
            .client
            .post(self.url("/user/repos"))
            .json(&body)
            .send()
            .await
            .map_err(|e| GiteaError::Transport(e.to_string()))?;
        self.accept_create(resp).await
    }

    /// The engine MUST route org-owned mirrors through this method, not
    /// `create_user_repo` — Gitea rejects "push to create" for org namespaces.
    pub async fn create_org_repo(&self, org: &str, name: &str, opts: &RepoOptions) -> Result<(), GiteaError> {
        self.gate()?;
        let body = CreateRepoBody {
            name,
            description: opts.description.as_deref().unwrap_or(""),
            private: opts.private,
        };
        let resp = self
            .client
            .post(self.url(&format!("/orgs/{org}/repos")))
            .json(&body)
            .send()
            .await
            .map_err(|e| GiteaError::Transport(e.to_string()))?;
        self.accept_create(resp).await
    }

    async fn accept_create(&self, resp: reqwest::Response) -> Result<(), GiteaError> {
        if resp.status().as_u16() == 409 {
            // Already exists: idempotent success.
            return Ok(());
        }
        classify_status(resp)?;
        Ok(())
    }

    pub async fn delete_repo(&self, owner: &str, name: &str) -> Result<(), GiteaError> {
        self.gate()?;
        let resp = self
            .client
            .delete(self.url(&format!("/repos/{owner}/{name}")))
            .send()
            .await
            .map_err(|e| GiteaError::Transport(e.to_string()))?;
        classify_status(resp)?;
        Ok(())
    }
}

fn classify_status(resp: reqwest::Response) -> Result<reqwest::Response, GiteaError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(match status.as_u16() {
        401 => GiteaError::Unauthorized(status.to_string()),
        403 => GiteaError::Forbidden(status.to_string()),
        404 => GiteaError::NotFound(status.to_string()),
        409 => GiteaError::Conflict(status.to_string()),
        429 => GiteaError::RateLimited { retry_after_secs: 60 },
        _ => GiteaError::Transport(format!("unexpected status {status}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_who_am_i() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"login": "mirror-bot"})))
            .mount(&server)
            .await;

        let client = GiteaClient::new(server.uri(), "tok");
        let login = client.who_am_i().await.unwrap();
        assert_eq!(login, "mirror-bot");
    }

    #[tokio::test]
    async fn test_repo_exists_false_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/acme/widgets"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GiteaClient::new(server.uri(), "tok");
        assert!(!client.repo_exists("acme", "widgets").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_org_repo_conflict_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/orgs/acme/repos"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let client = GiteaClient::new(server.uri(), "tok");
        client
            .create_org_repo("acme", "widgets", &RepoOptions::default())
            .await
            .expect("409 should be treated as idempotent success");
    }

    #[tokio::test]
    async fn test_create_org_repo_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/orgs/acme/repos"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = GiteaClient::new(server.uri(), "tok");
        let err = client
            .create_org_repo("acme", "widgets", &RepoOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GiteaError::Forbidden(_)));
    }
}
