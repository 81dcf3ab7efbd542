use futures::StreamExt;
use thiserror::Error;

use crate::feed::parser::{parse_document, ParseError, RssDocument};
use crate::util::CancelToken;

/// Identifying client tag sent with every request
pub const USER_AGENT: &str = "gleaner";

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching one feed document.
///
/// Every variant ends the current cycle for that feed; none is retried
/// before the next tick.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, body read)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Body arrived but is not a readable RSS document
    #[error("Malformed feed document: {0}")]
    Malformed(#[from] ParseError),
    /// The cancel token fired before the fetch finished
    #[error("Fetch cancelled")]
    Cancelled,
}

/// Build the shared HTTP client.
///
/// No request timeout is configured: a fetch lasts until it completes or
/// the caller's [`CancelToken`] fires.
pub fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}

/// GET `url` and decode the body as an RSS document.
///
/// Cancellation drops the in-flight request and returns
/// [`FetchError::Cancelled`] without waiting for the server.
///
/// # Errors
///
/// - [`FetchError::Network`] - connection, TLS or body read failure
/// - [`FetchError::HttpStatus`] - non-2xx response
/// - [`FetchError::ResponseTooLarge`] - body over 10MB
/// - [`FetchError::Malformed`] - body is not well-formed RSS
/// - [`FetchError::Cancelled`] - `cancel` fired
pub async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
    cancel: &CancelToken,
) -> Result<RssDocument, FetchError> {
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    let bytes = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        result = download(client, url) => result?,
    };

    Ok(parse_document(&bytes)?)
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, MAX_FEED_SIZE).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::cancel_pair;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test</title>
    <item><title>One</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let doc = fetch_document(
            &client,
            &format!("{}/feed", mock_server.uri()),
            &CancelToken::never(),
        )
        .await
        .unwrap();

        assert_eq!(doc.title, "Test");
        assert_eq!(doc.items.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_404_is_http_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let err = fetch_document(&client, &mock_server.uri(), &CancelToken::never())
            .await
            .unwrap_err();
        match err {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let err = fetch_document(&client, &mock_server.uri(), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let err = fetch_document(&client, &mock_server.uri(), &CancelToken::never())
            .await
            .unwrap_err();
        match err {
            FetchError::Malformed(_) => {}
            e => panic!("Expected Malformed, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_network_error() {
        // Bind then drop a listener so the port is closed
        let uri = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}/feed", listener.local_addr().unwrap())
        };

        let client = build_client().unwrap();
        let err = fetch_document(&client, &uri, &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_aborts_on_cancel() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let (handle, token) = cancel_pair();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            fetch_document(&client, &mock_server.uri(), &token),
        )
        .await
        .expect("cancel should abort promptly");
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }

    #[tokio::test]
    async fn test_fetch_with_cancelled_token_never_sends() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let (handle, token) = cancel_pair();
        handle.cancel();

        let result = fetch_document(&client, &mock_server.uri(), &token).await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }
}
