use std::time::Duration;

use log::{debug, warn};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::retry::{classify_response, is_transient_error, ResponseClass, RetryPolicy};
use crate::auth::Token;
use crate::error::{PrLensError, Result};

const GITHUB_API_VERSION: &str = "2022-11-28";

/// A response whose body was read in full while the request could still be retried.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct GitHubClient {
    client: Client,
    api_url: Url,
    token: Token,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: Token, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("PRLens/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| PrLensError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut api_url = Url::parse(base_url)
            .map_err(|e| PrLensError::Config(format!("Invalid API base URL: {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(PrLensError::Config(format!(
                "Invalid API base URL: {base_url}"
            )));
        }
        // GitHub Enterprise serves the API under a path prefix; keep it when joining.
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        Ok(Self {
            client,
            api_url,
            token,
            retry,
        })
    }

    /// Helper to build authenticated requests
    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(self.token.as_str())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    /// Construct `{api}/repos/{owner}/{repo}/{segments..}` with each segment escaped
    pub fn repo_url(&self, owner: &str, repo: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| PrLensError::Config("API base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["repos", owner, repo])
            .extend(segments);
        Ok(url)
    }

    /// GET with bounded retries for transient failures.
    ///
    /// The body is read inside the retried unit, so a connection that drops or
    /// stalls mid-body is retried like one that failed to connect. Non-success
    /// statuses that are not transient are returned as-is so the caller can
    /// map them to a domain error.
    pub async fn get(&self, url: Url) -> Result<ApiResponse> {
        let mut last_failure = String::new();

        for attempt in 1..=self.retry.max_attempts {
            debug!("GET {url} (attempt {attempt}/{})", self.retry.max_attempts);

            let request = self.auth_request(self.client.get(url.clone()));
            let retry_after = match request.send().await {
                Ok(response) => match classify_response(response.status(), response.headers()) {
                    ResponseClass::Deliver => {
                        let status = response.status();
                        let headers = response.headers().clone();
                        match response.bytes().await {
                            Ok(body) => {
                                return Ok(ApiResponse {
                                    status,
                                    headers,
                                    body: body.to_vec(),
                                });
                            }
                            // JSON decoding happens later, so any error here is transport.
                            Err(e) => {
                                last_failure = format!("reading response body: {e}");
                                None
                            }
                        }
                    }
                    ResponseClass::RateLimited { reset_at } => {
                        return Err(PrLensError::RateLimitExceeded { reset_at });
                    }
                    ResponseClass::Transient {
                        reason,
                        retry_after,
                    } => {
                        last_failure = reason;
                        retry_after
                    }
                },
                Err(e) if is_transient_error(&e) => {
                    last_failure = e.to_string();
                    None
                }
                Err(e) => return Err(e.into()),
            };

            if attempt < self.retry.max_attempts {
                let delay = self.retry.delay_for_attempt(attempt, retry_after);
                warn!(
                    "Request to {url} failed ({last_failure}); retrying in {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(PrLensError::TransientFetch {
            url: url.to_string(),
            attempts: self.retry.max_attempts,
            reason: last_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    const EMPTY_LIST_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
        content-type: application/json\r\n\
        content-length: 2\r\n\
        connection: close\r\n\r\n[]";

    fn client(base_url: &str) -> GitHubClient {
        client_with_timeout(base_url, Duration::from_secs(5))
    }

    fn client_with_timeout(base_url: &str, timeout: Duration) -> GitHubClient {
        GitHubClient::new(
            base_url,
            Token::try_from("ghp_test").unwrap(),
            timeout,
            RetryPolicy::with_base_delay(Duration::from_millis(1)),
        )
        .unwrap()
    }

    #[derive(Clone, Copy)]
    enum FirstConnection {
        Dropped,
        StalledBody,
    }

    async fn read_request_head(stream: &mut TcpStream) {
        let mut head = Vec::new();
        let mut buf = [0_u8; 1024];
        while !head.windows(4).any(|window| window == b"\r\n\r\n") {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(read) => head.extend_from_slice(&buf[..read]),
            }
        }
    }

    /// Plain TCP server that misbehaves on its first connection and answers
    /// `[]` on every later one. Returns the base URL and a connection counter.
    async fn flaky_server(first: FirstConnection) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let index = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    read_request_head(&mut stream).await;
                    if index > 0 {
                        let _ = stream.write_all(EMPTY_LIST_RESPONSE).await;
                        let _ = stream.shutdown().await;
                        return;
                    }
                    match first {
                        FirstConnection::Dropped => drop(stream),
                        FirstConnection::StalledBody => {
                            let _ = stream
                                .write_all(
                                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 2\r\n\r\n",
                                )
                                .await;
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                });
            }
        });

        (base_url, connections)
    }

    #[test]
    fn test_repo_url_on_public_api() {
        let url = client("https://api.github.com")
            .repo_url("octo", "hello-world", &["pulls"])
            .unwrap();

        assert_eq!(url.as_str(), "https://api.github.com/repos/octo/hello-world/pulls");
    }

    #[test]
    fn test_repo_url_keeps_enterprise_prefix() {
        let url = client("https://ghe.example.com/api/v3")
            .repo_url("octo", "hello-world", &[])
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/octo/hello-world"
        );
    }

    #[test]
    fn test_repo_url_escapes_segments() {
        let url = client("https://api.github.com")
            .repo_url("octo", "a b", &["pulls", "7"])
            .unwrap();

        assert_eq!(url.as_str(), "https://api.github.com/repos/octo/a%20b/pulls/7");
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let result = GitHubClient::new(
            "not a url",
            Token::try_from("ghp_test").unwrap(),
            Duration::from_secs(5),
            RetryPolicy::default(),
        );

        assert!(matches!(result, Err(PrLensError::Config(_))));
    }

    #[tokio::test]
    async fn test_get_retries_server_errors_then_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/repos/octo/app")
            .with_status(502)
            .expect(1)
            .create_async()
            .await;
        let healthy = server
            .mock("GET", "/repos/octo/app")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url());
        let url = client.repo_url("octo", "app", &[]).unwrap();
        let response = client.get(url).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        failing.assert_async().await;
        healthy.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_gives_up_after_retry_budget() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/repos/octo/app")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = client(&server.url());
        let url = client.repo_url("octo", "app", &[]).unwrap();
        let err = client.get(url).await.unwrap_err();

        assert!(matches!(err, PrLensError::TransientFetch { attempts: 3, .. }));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_fails_fast_on_exhausted_quota() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("GET", "/repos/octo/app")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset", "1700000000")
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url());
        let url = client.repo_url("octo", "app", &[]).unwrap();
        let err = client.get(url).await.unwrap_err();

        match err {
            PrLensError::RateLimitExceeded { reset_at } => {
                assert_eq!(reset_at, "2023-11-14T22:13:20Z");
            }
            other => panic!("expected rate limit error, got {other:?}"),
        }
        limited.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let authed = server
            .mock("GET", "/repos/octo/app")
            .match_header("authorization", "Bearer ghp_test")
            .match_header("accept", "application/vnd.github+json")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client(&server.url());
        let url = client.repo_url("octo", "app", &[]).unwrap();
        client.get(url).await.unwrap();

        authed.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_retries_dropped_connection() {
        let (base_url, connections) = flaky_server(FirstConnection::Dropped).await;

        let client = client(&base_url);
        let url = client.repo_url("octo", "app", &["pulls"]).unwrap();
        let response = client.get(url).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.json::<Vec<serde_json::Value>>().unwrap().is_empty());
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_retries_stalled_body() {
        let (base_url, connections) = flaky_server(FirstConnection::StalledBody).await;

        let client = client_with_timeout(&base_url, Duration::from_millis(300));
        let url = client.repo_url("octo", "app", &["pulls"]).unwrap();
        let response = client.get(url).await.unwrap();

        assert_eq!(response.body, b"[]");
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }
}
