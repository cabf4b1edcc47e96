//! HTTP access to the board backend.
//!
//! [`ApiClient`] holds the base URL and one shared `reqwest` client. Every
//! resource operation lives in a submodule as an `impl ApiClient` block and
//! funnels its request through [`ApiClient::send`] or
//! [`ApiClient::send_empty`], which turn any failure into a [`QueryError`]
//! carrying a single display-ready message.

pub mod chat;
pub mod comments;
pub mod models;
pub mod posts;

use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{error, trace, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::query::QueryError;

#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: Url,
    lang: String,
    client: Client,
}

/// Error payload the backend attaches to rejected requests.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = sanitize_base_url(base_url.into())?;
        let client = Client::builder()
            .build()
            .map_err(|err| ConfigError::Invalid(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            base_url,
            lang: "ko".to_string(),
            client,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.base_url.clone())?.with_lang(config.lang.clone()))
    }

    #[must_use]
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// Builds `base/segment/segment...`, escaping every segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, segments: &[&str]) -> RequestBuilder {
        self.client.get(self.url(segments))
    }

    fn post(&self, segments: &[&str]) -> RequestBuilder {
        self.client.post(self.url(segments))
    }

    fn patch(&self, segments: &[&str]) -> RequestBuilder {
        self.client.patch(self.url(segments))
    }

    fn delete(&self, segments: &[&str]) -> RequestBuilder {
        self.client.delete(self.url(segments))
    }

    /// Sends `request` and decodes a JSON body of type `T`.
    async fn send<T>(&self, request: RequestBuilder, fallback: &str) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let response = dispatch(request, fallback).await?;
        let body = response.bytes().await.map_err(|err| {
            error!(error = %err, "response body could not be read");
            QueryError::network()
        })?;
        serde_json::from_slice(&body).map_err(|err| {
            warn!(error = %err, "response body did not decode");
            QueryError::DecodeError(fallback.to_owned())
        })
    }

    /// Sends `request` and ignores whatever body comes back.
    async fn send_empty(&self, request: RequestBuilder, fallback: &str) -> Result<(), QueryError> {
        dispatch(request, fallback).await.map(drop)
    }
}

async fn dispatch(request: RequestBuilder, fallback: &str) -> Result<Response, QueryError> {
    let response = request.send().await.map_err(|err| {
        error!(error = %err, "request failed without a response");
        QueryError::network()
    })?;
    let status = response.status();
    trace!(%status, url = %response.url(), "received response");
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let err = rejection(status.as_u16(), &body, fallback);
    warn!(status = status.as_u16(), message = %err, "server rejected request");
    Err(err)
}

/// Normalises a non-success response: the server's own message when it sent
/// a non-empty one, the operation's fallback otherwise.
fn rejection(status: u16, body: &[u8], fallback: &str) -> QueryError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| fallback.to_owned());
    QueryError::ServerError { status, message }
}

fn sanitize_base_url(mut base: String) -> Result<Url, ConfigError> {
    base = base.trim().to_string();
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("http://{base}");
    }
    while base.ends_with('/') {
        base.pop();
    }
    let url = Url::parse(&base)
        .map_err(|err| ConfigError::Invalid(format!("invalid base URL {base:?}: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid(format!("invalid base URL {base:?}")));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_adds_scheme_and_strips_slash() {
        let client = ApiClient::new("192.168.0.11:8080/").expect("valid");
        assert_eq!(client.base_url(), "http://192.168.0.11:8080");
        assert_eq!(client.lang(), "ko");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ApiClient::new("http://").is_err());
    }

    #[test]
    fn test_url_escapes_segments() {
        let client = ApiClient::new("http://localhost:8080").expect("valid");
        let url = client.url(&["api", "posts", "a b/c"]);
        assert_eq!(url.as_str(), "http://localhost:8080/api/posts/a%20b%2Fc");
    }

    #[test]
    fn test_url_keeps_base_path() {
        let client = ApiClient::new("https://example.com/board/").expect("valid");
        let url = client.url(&["comments", "post", "P1"]);
        assert_eq!(url.as_str(), "https://example.com/board/comments/post/P1");
    }

    #[test]
    fn test_rejection_prefers_server_message() {
        let err = rejection(
            400,
            r#"{"message":"제목을 입력해주세요."}"#.as_bytes(),
            "fallback",
        );
        assert_eq!(
            err,
            QueryError::ServerError {
                status: 400,
                message: "제목을 입력해주세요.".into()
            }
        );
    }

    #[test]
    fn test_rejection_keeps_blank_server_message() {
        let err = rejection(409, br#"{"message":" "}"#, "fallback");
        assert_eq!(err.message(), " ");
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn test_rejection_falls_back() {
        for body in [&b""[..], b"not json", br#"{"message":""}"#, br#"{"error":"x"}"#] {
            let err = rejection(500, body, "게시글 조회 중 오류가 발생했습니다.");
            assert_eq!(err.message(), "게시글 조회 중 오류가 발생했습니다.");
            assert_eq!(err.status(), Some(500));
        }
    }

    #[test]
    fn test_from_config() {
        let config = ClientConfig {
            lang: "en".into(),
            ..ClientConfig::default()
        };
        let client = ApiClient::from_config(&config).expect("valid");
        assert_eq!(client.lang(), "en");
        assert_eq!(client.base_url(), "http://192.168.0.11:8080");
    }
}
