//! Session ids that point at a remotely hosted bundle.
//!
//! `GET <base_url>/<payload>` must answer with the `creds.json` document.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::domain::{CredentialError, CredentialFetcher, SessionId};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpCredentialFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCredentialFetcher {
    /// # Errors
    ///
    /// `CredentialError::Fetch` when `base_url` is not an absolute URL or the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, CredentialError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CredentialError::Fetch(format!("invalid base url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CredentialError::Fetch(format!(
                "invalid base url '{base_url}'"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| CredentialError::Fetch(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn bundle_url(&self, payload: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            // percent-encodes '#', '/' and friends inside the payload
            segments.pop_if_empty().push(payload);
        }
        url
    }
}

#[async_trait]
impl CredentialFetcher for HttpCredentialFetcher {
    async fn fetch(&self, session_id: &SessionId) -> Result<Vec<u8>, CredentialError> {
        let url = self.bundle_url(session_id.payload());
        tracing::debug!("Fetching credential bundle from {}", self.base_url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CredentialError::Fetch(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Fetch(format!(
                "credential host answered {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CredentialError::Fetch(e.without_url().to_string()))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_object::DEFAULT_SESSION_PREFIX;
    use axum::{Router, extract::Path, http::StatusCode, routing::get};

    async fn serve_bundles() -> String {
        let app = Router::new().route(
            "/bundles/{id}",
            get(|Path(id): Path<String>| async move {
                if id == "abc#key" {
                    Ok("{\"me\":{\"id\":\"1\"}}")
                } else {
                    Err(StatusCode::NOT_FOUND)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/bundles")
    }

    #[tokio::test]
    async fn test_fetch_success() {
        // テスト項目: リモートの認証情報を取得できる（# はエンコードされる）
        // given (前提条件):
        let base_url = serve_bundles().await;
        let fetcher = HttpCredentialFetcher::new(&base_url).unwrap();
        let session_id = SessionId::parse("CLOUD-AI~abc#key", DEFAULT_SESSION_PREFIX).unwrap();

        // when (操作):
        let bundle = fetcher.fetch(&session_id).await;

        // then (期待する結果):
        assert_eq!(bundle.unwrap(), b"{\"me\":{\"id\":\"1\"}}");
    }

    #[tokio::test]
    async fn test_fetch_not_found_fails() {
        // テスト項目: 存在しない認証情報は Fetch エラーになる
        let base_url = serve_bundles().await;
        let fetcher = HttpCredentialFetcher::new(&base_url).unwrap();
        let session_id = SessionId::parse("CLOUD-AI~missing", DEFAULT_SESSION_PREFIX).unwrap();

        let result = fetcher.fetch(&session_id).await;

        assert!(matches!(result, Err(CredentialError::Fetch(_))));
    }

    #[test]
    fn test_new_rejects_relative_url() {
        // テスト項目: 相対 URL は設定エラーになる
        assert!(HttpCredentialFetcher::new("bundles").is_err());
    }
}
