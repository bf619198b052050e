//! The browser driver is an external collaborator (§6): a headless Chromium
//! instance with a persistent profile, ad-blocker and cookie-consent
//! extensions pre-installed, stealth measures against automation
//! fingerprinting, and debugging-protocol access for MHTML export and
//! full-page screenshots. None of that is implemented here — only the
//! capability interface the worker depends on, plus a deterministic
//! in-memory fake for tests.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("navigation to {0} timed out")]
    Timeout(String),
    #[error("navigation to {0} failed: {1}")]
    Navigation(String, String),
    #[error("driver error: {0}")]
    Driver(String),
}

/// Everything a single page load yields: the raw response body plus the
/// three derived artifacts the worker archives alongside it on change.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Final navigation HTTP status. The worker's HTTP gate (§4.3 step 3)
    /// treats anything outside 200..=299 as a graceful terminal failure.
    pub http_status: u16,
    /// Raw response body as received, before any normalization.
    pub source_html: Bytes,
    /// Single-file web archive produced by the browser's debugging protocol.
    pub mhtml: Bytes,
    /// Full-page screenshot.
    pub screenshot: Bytes,
}

/// The capability interface §6 specifies: persistent profile, headless
/// operation, pre-installed extensions, and stealth measures are properties
/// of the concrete implementation, not of this trait — callers only ever
/// see `capture`.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn capture(&self, url: &Url) -> Result<Capture, BrowserError>;
}

/// A deterministic in-memory fake keyed by URL, for worker/scheduler tests
/// that need a `BrowserDriver` without a real Chromium instance.
pub struct FakeBrowserDriver {
    responses: std::collections::HashMap<String, Result<Capture, BrowserError>>,
}

impl FakeBrowserDriver {
    pub fn new() -> Self {
        Self {
            responses: std::collections::HashMap::new(),
        }
    }

    /// Queue a successful 200 response with the given raw HTML body.
    pub fn with_html(mut self, url: &str, html: &'static [u8]) -> Self {
        self.responses.insert(
            url.to_string(),
            Ok(Capture {
                http_status: 200,
                source_html: Bytes::from_static(html),
                mhtml: Bytes::from_static(b"mhtml-placeholder"),
                screenshot: Bytes::from_static(b"png-placeholder"),
            }),
        );
        self
    }

    /// Queue a non-2xx response (the HTTP gate's graceful-failure path).
    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(
            url.to_string(),
            Ok(Capture {
                http_status: status,
                source_html: Bytes::new(),
                mhtml: Bytes::new(),
                screenshot: Bytes::new(),
            }),
        );
        self
    }

    /// Queue a navigation error (the browser "raised" case from the gate).
    pub fn with_error(mut self, url: &str, err: BrowserError) -> Self {
        self.responses.insert(url.to_string(), Err(err));
        self
    }
}

impl Default for FakeBrowserDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowserDriver {
    async fn capture(&self, url: &Url) -> Result<Capture, BrowserError> {
        match self.responses.get(url.as_str()) {
            Some(Ok(capture)) => Ok(capture.clone()),
            Some(Err(e)) => Err(clone_error(e)),
            None => Err(BrowserError::Driver(format!("no fake response for {url}"))),
        }
    }
}

fn clone_error(err: &BrowserError) -> BrowserError {
    match err {
        BrowserError::Timeout(u) => BrowserError::Timeout(u.clone()),
        BrowserError::Navigation(u, m) => BrowserError::Navigation(u.clone(), m.clone()),
        BrowserError::Driver(m) => BrowserError::Driver(m.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_returns_queued_html() {
        let driver = FakeBrowserDriver::new().with_html(
            "https://example.com/a",
            b"<html><body>Hello</body></html>",
        );
        let capture = driver
            .capture(&Url::parse("https://example.com/a").unwrap())
            .await
            .unwrap();
        assert_eq!(capture.http_status, 200);
        assert_eq!(&capture.source_html[..], b"<html><body>Hello</body></html>");
    }

    #[tokio::test]
    async fn fake_returns_queued_failure_status() {
        let driver = FakeBrowserDriver::new().with_status("https://example.com/a", 503);
        let capture = driver
            .capture(&Url::parse("https://example.com/a").unwrap())
            .await
            .unwrap();
        assert_eq!(capture.http_status, 503);
    }

    #[tokio::test]
    async fn unregistered_url_is_a_driver_error() {
        let driver = FakeBrowserDriver::new();
        let err = driver
            .capture(&Url::parse("https://example.com/missing").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::Driver(_)));
    }
}
