//! A poll-driven loop independent of the scheduler and worker (§4.4): finds
//! `PageSnapshot` rows with no `PageInfo` row for the current extractor
//! version, runs the (external) extraction function over each, and stores
//! the result exactly once per `(snapshot_id, extractor_version)`.
//!
//! The concrete DOM-to-structured-data logic is an external collaborator
//! per the Non-goals — this crate only specifies the [`Extractor`] trait
//! the loop drives, plus a passthrough implementation for tests.

use std::time::Duration;

use async_trait::async_trait;
use talemon_core::ExtractorConfig;
use talemon_objectstore::ObjectStore;
use talemon_store::{PageInfo, PageSnapshot, PgPool};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum ExtractorError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] talemon_objectstore::ObjectStoreError),
    #[error("extraction failed: {0}")]
    Extraction(String),
}

/// The external extraction function's interface: artifacts for one snapshot
/// in, a structured JSON document out. Implementations are free to call out
/// to an LLM, a rules engine, or anything else — this crate does not care.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// A stable identifier for this extractor's output shape. Stored on
    /// every `PageInfo` row it writes and used to select its unextracted
    /// backlog.
    fn version(&self) -> &str;

    async fn extract(
        &self,
        snapshot: &PageSnapshot,
        artifacts: &talemon_objectstore::CaptureArtifacts,
    ) -> Result<serde_json::Value, ExtractorError>;
}

/// An `Extractor` that stores the raw byte lengths of each artifact. Useful
/// as a smoke-test implementation and as a literal fake in integration
/// tests — no I/O beyond what the loop already does.
pub struct PassthroughExtractor {
    version: String,
}

impl PassthroughExtractor {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

#[async_trait]
impl Extractor for PassthroughExtractor {
    fn version(&self) -> &str {
        &self.version
    }

    async fn extract(
        &self,
        _snapshot: &PageSnapshot,
        artifacts: &talemon_objectstore::CaptureArtifacts,
    ) -> Result<serde_json::Value, ExtractorError> {
        Ok(serde_json::json!({
            "dom_bytes": artifacts.dom_html.len(),
            "source_bytes": artifacts.source_html.len(),
            "mhtml_bytes": artifacts.mhtml.len(),
            "screenshot_bytes": artifacts.screenshot.len(),
        }))
    }
}

/// Drives one `Extractor` over the unextracted backlog for its version.
pub struct ExtractorLoop<E: Extractor> {
    pool: PgPool,
    objectstore: ObjectStore,
    extractor: E,
    config: ExtractorConfig,
}

impl<E: Extractor> ExtractorLoop<E> {
    pub fn new(pool: PgPool, objectstore: ObjectStore, extractor: E, config: ExtractorConfig) -> Self {
        Self {
            pool,
            objectstore,
            extractor,
            config,
        }
    }

    /// One tick: claim a bounded batch of unextracted snapshots, extract
    /// and insert each. Returns the number of snapshots it attempted.
    /// At-least-once — a crash mid-batch just re-polls the same backlog
    /// next tick, and the unique constraint on `(snapshot_id, version)`
    /// makes re-extraction idempotent.
    pub async fn tick(&self) -> anyhow::Result<usize> {
        let snapshots =
            PageSnapshot::batch_unextracted(self.extractor.version(), self.config.batch_size, &self.pool)
                .await?;

        for snapshot in &snapshots {
            if let Err(e) = self.extract_one(snapshot).await {
                tracing::error!(
                    snapshot_id = snapshot.id,
                    error = %e,
                    "extraction failed; will retry on a later tick"
                );
            }
        }

        Ok(snapshots.len())
    }

    async fn extract_one(&self, snapshot: &PageSnapshot) -> anyhow::Result<()> {
        let artifacts = self.objectstore.get_capture(&snapshot.oss_path).await?;
        let data = self.extractor.extract(snapshot, &artifacts).await?;

        match PageInfo::insert_once(snapshot.id, self.extractor.version(), &data, &self.pool).await? {
            Some(_) => tracing::debug!(snapshot_id = snapshot.id, "extracted"),
            None => tracing::debug!(
                snapshot_id = snapshot.id,
                "lost the insert race to a concurrent extractor run"
            ),
        }
        Ok(())
    }

    /// Poll forever, sleeping `poll_interval_secs` whenever a tick claims
    /// nothing, honoring `shutdown`.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            version = self.extractor.version(),
            batch_size = self.config.batch_size,
            "extractor starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.tick().await {
                Ok(0) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)) => {}
                    }
                }
                Ok(n) => tracing::debug!(count = n, "extractor tick processed backlog"),
                Err(e) => {
                    tracing::error!(error = %e, "extractor tick failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        tracing::info!("extractor stopped");
        Ok(())
    }
}
