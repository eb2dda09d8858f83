use crate::feed::parser::{parse_feed, FeedItem};
use futures::StreamExt;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Default cap on a feed body
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default timeout for one fetch, covering connect, headers and body
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: usize = 3;

/// Errors that can occur while retrieving a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a status other than 2xx or 304
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Body could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Received fewer bytes than Content-Length announced
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Bounds applied to every fetch
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    pub timeout: Duration,
    pub max_size: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_size: DEFAULT_MAX_FEED_SIZE,
        }
    }
}

/// What a conditional fetch produced
#[derive(Debug)]
pub enum FetchOutcome {
    /// Server answered 304, or sent the ETag already on record
    NotModified,
    /// Fresh content; `etag` is the validator to remember for next time
    Fetched {
        etag: Option<String>,
        items: Vec<FeedItem>,
    },
}

/// Build the HTTP client used for feed retrieval.
///
/// Follows at most three redirects and refuses redirect loops.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(redirect_policy())
        .pool_idle_timeout(Duration::from_secs(30))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Fetch and parse a feed, using `stored_etag` as a cache validator.
///
/// Sends `If-None-Match` when an ETag is on record. A 304 answer, or a
/// response carrying the same ETag, yields [`FetchOutcome::NotModified`]
/// without reading the body. Items come back in document order.
///
/// # Errors
///
/// - [`FetchError::Timeout`] when the whole exchange exceeds `limits.timeout`
/// - [`FetchError::Network`] for transport failures
/// - [`FetchError::HttpStatus`] for any other non-2xx status
/// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`] for bad bodies
/// - [`FetchError::Parse`] when the body is not a feed
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    stored_etag: Option<&str>,
    limits: &FetchLimits,
) -> Result<FetchOutcome, FetchError> {
    tokio::time::timeout(limits.timeout, fetch_inner(client, url, stored_etag, limits))
        .await
        .map_err(|_| FetchError::Timeout)?
}

async fn fetch_inner(
    client: &reqwest::Client,
    url: &str,
    stored_etag: Option<&str>,
    limits: &FetchLimits,
) -> Result<FetchOutcome, FetchError> {
    let stored_etag = stored_etag.map(str::trim).filter(|e| !e.is_empty());

    let mut request = client.get(url);
    if let Some(etag) = stored_etag {
        request = request.header(IF_NONE_MATCH, etag);
    }

    let response = request.send().await.map_err(map_reqwest_error)?;
    let status = response.status();

    if status == StatusCode::NOT_MODIFIED {
        tracing::debug!(feed = %url, "Feed not modified (304)");
        return Ok(FetchOutcome::NotModified);
    }
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    if etag.is_some() && etag.as_deref() == stored_etag {
        tracing::debug!(feed = %url, "Feed ETag unchanged");
        return Ok(FetchOutcome::NotModified);
    }

    let bytes = read_limited_bytes(response, limits.max_size).await?;
    let items = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    tracing::debug!(feed = %url, items = items.len(), bytes = bytes.len(), "Feed fetched");
    Ok(FetchOutcome::Fetched { etag, items })
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: Content-Length already over the limit
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>First</title></item>
    <item><guid>2</guid><title>Second</title></item>
</channel></rss>"#;

    fn client() -> reqwest::Client {
        build_client("feedimport-test", DEFAULT_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_returns_items_and_etag() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/rss+xml")
                    .insert_header("ETag", "\"v1\""),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let outcome = fetch_feed(&client(), &url, None, &FetchLimits::default())
            .await
            .unwrap();

        match outcome {
            FetchOutcome::Fetched { etag, items } => {
                assert_eq!(etag.as_deref(), Some("\"v1\""));
                let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
                assert_eq!(ids, vec!["1", "2"]);
            }
            other => panic!("Expected Fetched, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sends_if_none_match_and_handles_304() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let outcome = fetch_feed(&client(), &url, Some("\"v1\""), &FetchLimits::default())
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::NotModified));
    }

    #[tokio::test]
    async fn test_same_etag_on_200_is_not_modified() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("ETag", "\"v1\""),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let outcome = fetch_feed(&client(), &url, Some(" \"v1\" "), &FetchLimits::default())
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::NotModified));
    }

    #[tokio::test]
    async fn test_changed_etag_fetches() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("ETag", "\"v2\""),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let outcome = fetch_feed(&client(), &url, Some("\"v1\""), &FetchLimits::default())
            .await
            .unwrap();
        match outcome {
            FetchOutcome::Fetched { etag, items } => {
                assert_eq!(etag.as_deref(), Some("\"v2\""));
                assert_eq!(items.len(), 2);
            }
            other => panic!("Expected Fetched, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_404_error_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        match fetch_feed(&client(), &url, None, &FetchLimits::default()).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_500_error_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        match fetch_feed(&client(), &url, None, &FetchLimits::default()).await {
            Err(FetchError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_feed_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        match fetch_feed(&client(), &url, None, &FetchLimits::default()).await {
            Err(FetchError::Parse(_)) => {}
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let limits = FetchLimits {
            max_size: 16,
            ..FetchLimits::default()
        };
        match fetch_feed(&client(), &url, None, &limits).await {
            Err(FetchError::ResponseTooLarge) => {}
            other => panic!("Expected ResponseTooLarge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let limits = FetchLimits {
            timeout: Duration::from_millis(200),
            ..FetchLimits::default()
        };
        match fetch_feed(&client(), &url, None, &limits).await {
            Err(FetchError::Timeout) => {}
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop a listener so the port is closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{addr}/feed");
        match fetch_feed(&client(), &url, None, &FetchLimits::default()).await {
            Err(FetchError::Network(_)) => {}
            other => panic!("Expected Network error, got {:?}", other),
        }
    }
}
