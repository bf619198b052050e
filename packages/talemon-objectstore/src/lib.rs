//! Object storage: an append-only blob repository keyed by content-addressed
//! path. Wraps the `object_store` crate behind a small surface so the
//! concrete backend (local filesystem for dev/tests, S3-compatible for
//! production) is swappable without touching worker/extractor code.

mod config;

pub use config::{ObjectStoreBackend, ObjectStoreConfig};

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::path::Path as ObjectPath;
use object_store::{local::LocalFileSystem, ObjectStore as _};

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object store error: {0}")]
    Backend(#[from] object_store::Error),
    #[error("invalid object store path {0:?}: {1}")]
    InvalidPath(String, object_store::path::Error),
}

/// The four artifacts captured for a single change event.
#[derive(Debug, Clone)]
pub struct CaptureArtifacts {
    /// Cleaned DOM as used for fingerprinting.
    pub dom_html: Bytes,
    /// Raw response body, byte-for-byte.
    pub source_html: Bytes,
    /// Single-file web archive produced by the browser's debugging protocol.
    pub mhtml: Bytes,
    /// Full-page screenshot.
    pub screenshot: Bytes,
}

const DOM_FILE: &str = "dom.html";
const SOURCE_FILE: &str = "source.html";
const MHTML_FILE: &str = "page.mhtml";
const SCREENSHOT_FILE: &str = "screenshot.png";

/// A content-addressed blob repository. All writes are appends — nothing in
/// this crate ever overwrites or deletes an existing key.
#[derive(Clone)]
pub struct ObjectStore {
    inner: Arc<dyn object_store::ObjectStore>,
    key_prefix: String,
}

impl ObjectStore {
    pub fn new(inner: Arc<dyn object_store::ObjectStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            inner,
            key_prefix: key_prefix.into(),
        }
    }

    /// Build the configured backend from `ObjectStoreConfig`.
    pub fn from_config(config: &ObjectStoreConfig) -> Result<Self, ObjectStoreError> {
        let inner: Arc<dyn object_store::ObjectStore> = match &config.backend {
            ObjectStoreBackend::Local { root } => {
                std::fs::create_dir_all(root).ok();
                Arc::new(LocalFileSystem::new_with_prefix(root)?)
            }
            ObjectStoreBackend::S3 {
                bucket,
                region,
                endpoint,
            } => {
                let mut builder = object_store::aws::AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_region(region);
                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                Arc::new(builder.build()?)
            }
        };
        Ok(Self::new(inner, "data"))
    }

    /// `{key_prefix}/{url_hash}/{YYMMDD.HHMMSS}/` — the directory a single
    /// capture's four blobs are written under. `url_hash` is expected to
    /// already be `sha1(url)` as lowercase hex.
    pub fn capture_dir(&self, url_hash: &str, captured_at: DateTime<Utc>) -> String {
        format!(
            "{}/{url_hash}/{}",
            self.key_prefix,
            captured_at.format("%y%m%d.%H%M%S")
        )
    }

    /// Write all four artifacts under `dir`, in a fixed order, before
    /// returning. The caller must not reference `dir` in the state store
    /// until this has returned `Ok` — object-store writes are externally
    /// ordered before the state-store transaction that records them.
    pub async fn put_capture(
        &self,
        dir: &str,
        artifacts: &CaptureArtifacts,
    ) -> Result<(), ObjectStoreError> {
        tracing::debug!(dir, "writing capture artifacts");
        self.put(&format!("{dir}/{DOM_FILE}"), artifacts.dom_html.clone())
            .await?;
        self.put(&format!("{dir}/{SOURCE_FILE}"), artifacts.source_html.clone())
            .await?;
        self.put(&format!("{dir}/{MHTML_FILE}"), artifacts.mhtml.clone())
            .await?;
        self.put(
            &format!("{dir}/{SCREENSHOT_FILE}"),
            artifacts.screenshot.clone(),
        )
        .await?;
        Ok(())
    }

    pub async fn put(&self, key: &str, bytes: Bytes) -> Result<(), ObjectStoreError> {
        let path = parse_path(key)?;
        self.inner.put(&path, bytes.into()).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = parse_path(key)?;
        let result = self.inner.get(&path).await?;
        Ok(result.bytes().await?)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let path = parse_path(key)?;
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_capture(&self, dir: &str) -> Result<CaptureArtifacts, ObjectStoreError> {
        Ok(CaptureArtifacts {
            dom_html: self.get(&format!("{dir}/{DOM_FILE}")).await?,
            source_html: self.get(&format!("{dir}/{SOURCE_FILE}")).await?,
            mhtml: self.get(&format!("{dir}/{MHTML_FILE}")).await?,
            screenshot: self.get(&format!("{dir}/{SCREENSHOT_FILE}")).await?,
        })
    }
}

fn parse_path(key: &str) -> Result<ObjectPath, ObjectStoreError> {
    ObjectPath::parse(key).map_err(|e| ObjectStoreError::InvalidPath(key.to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_dir_matches_path_convention() {
        let store = ObjectStore::new(Arc::new(object_store::memory::InMemory::new()), "data");
        let ts = DateTime::parse_from_rfc3339("2026-07-28T13:05:09Z")
            .unwrap()
            .with_timezone(&Utc);
        let dir = store.capture_dir("abc123", ts);
        assert_eq!(dir, "data/abc123/260728.130509");
    }

    #[tokio::test]
    async fn put_then_get_capture_round_trips() {
        let store = ObjectStore::new(Arc::new(object_store::memory::InMemory::new()), "data");
        let artifacts = CaptureArtifacts {
            dom_html: Bytes::from_static(b"<html></html>"),
            source_html: Bytes::from_static(b"<html>raw</html>"),
            mhtml: Bytes::from_static(b"mhtml-bytes"),
            screenshot: Bytes::from_static(b"png-bytes"),
        };
        store.put_capture("data/abc123/260728.130509", &artifacts).await.unwrap();

        let fetched = store.get_capture("data/abc123/260728.130509").await.unwrap();
        assert_eq!(fetched.dom_html, artifacts.dom_html);
        assert_eq!(fetched.screenshot, artifacts.screenshot);
    }
}
