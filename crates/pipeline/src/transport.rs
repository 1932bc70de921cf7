//! Batch transport: the abstract send operation and its HTTP
//! implementation.
//!
//! The dispatcher treats "send a batch" as `bytes in, status code out`.
//! Non-2xx responses are statuses, not errors; [`TransportError`] is
//! reserved for attempts that never produced a response.

use std::time::Duration;

use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// A delivery attempt that produced no response from the collector.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The attempt exceeded the request timeout.
    #[error("request timed out")]
    Timeout,

    /// The request could not be performed (DNS, refused connection, TLS).
    #[error("connection failed: {0}")]
    Connection(String),
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Abstract delivery channel for serialized batches.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one serialized batch body.
    ///
    /// `gzip` indicates the body has already been gzip-compressed and the
    /// receiver should be told so.
    async fn send(&self, body: Vec<u8>, gzip: bool) -> Result<u16, TransportError>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// HTTP POST transport delivering batches to a collector endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Build a transport with a pre-configured HTTP client.
    ///
    /// `timeout` is a safety net at the client level; the dispatcher also
    /// enforces its own per-attempt timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, body: Vec<u8>, gzip: bool) -> Result<u16, TransportError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if gzip {
            request = request.header(reqwest::header::CONTENT_ENCODING, "gzip");
        }

        match request.send().await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) if e.is_timeout() => Err(TransportError::Timeout),
            Err(e) => Err(TransportError::Connection(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
