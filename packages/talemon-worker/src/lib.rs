//! The capture protocol (§4.3): given a leased `Page` row, fetch it through
//! the browser collaborator, fingerprint the response, decide whether to
//! persist a new snapshot, and release the lease — atomically from the
//! state store's point of view.
//!
//! A worker process performs its own candidate selection (it independently
//! runs [`talemon_scheduler::Scheduler::claim_ready`], the "workers may
//! independently perform steps 2-4" allowance in §4.2), then runs the
//! protocol below per claimed page, concurrently, with a heartbeat task per
//! job that writes conditionally on `status = PROCESSING` so a lease
//! already reclaimed cannot be resurrected.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use talemon_browser::BrowserDriver;
use talemon_core::WorkerConfig;
use talemon_fingerprint::{clean_dom_html, fingerprint, HasherConfig};
use talemon_objectstore::{CaptureArtifacts, ObjectStore};
use talemon_scheduler::Scheduler;
use talemon_store::{capture, Page, PgPool};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Owns the collaborators a capture attempt needs: the state store, object
/// store, browser driver, and the claim logic shared with the scheduler
/// crate. One instance is a single worker process.
pub struct Worker {
    pool: PgPool,
    objectstore: ObjectStore,
    browser: Arc<dyn BrowserDriver>,
    scheduler: Scheduler,
    config: WorkerConfig,
    hasher_config: HasherConfig,
}

impl Worker {
    pub fn new(
        pool: PgPool,
        objectstore: ObjectStore,
        browser: Arc<dyn BrowserDriver>,
        scheduler: Scheduler,
        config: WorkerConfig,
        hasher_config: HasherConfig,
    ) -> Self {
        Self {
            pool,
            objectstore,
            browser,
            scheduler,
            config,
            hasher_config,
        }
    }

    /// Claim-and-process loop, honoring `shutdown`. Claimed pages within a
    /// batch are processed concurrently; each carries its own heartbeat
    /// task and commits independently.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            worker_id = %self.config.worker_id,
            heartbeat_interval_secs = self.config.heartbeat_interval_secs,
            "worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let claimed = match self.scheduler.claim_ready().await {
                Ok(pages) => pages,
                Err(e) => {
                    tracing::error!(error = %e, "failed to claim pages");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if claimed.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
                continue;
            }

            tracing::debug!(count = claimed.len(), "claimed pages");

            let handles: Vec<_> = claimed
                .into_iter()
                .map(|page| {
                    let worker = Arc::clone(&self);
                    tokio::spawn(async move { worker.process_page(page).await })
                })
                .collect();
            futures::future::join_all(handles).await;
        }

        tracing::info!(worker_id = %self.config.worker_id, "worker stopped");
        Ok(())
    }

    /// Run the capture protocol for one leased page, wrapped with a
    /// concurrent heartbeat that keeps the lease alive while it executes.
    async fn process_page(&self, page: Page) {
        let page_id = page.id;
        let heartbeat_cancel = CancellationToken::new();
        let heartbeat_handle = {
            let pool = self.pool.clone();
            let token = heartbeat_cancel.clone();
            let interval = Duration::from_secs(self.config.heartbeat_interval_secs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // skip the immediate first tick
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(e) = Page::heartbeat(page_id, &pool).await {
                                tracing::warn!(page_id, error = %e, "heartbeat failed");
                            }
                        }
                    }
                }
            })
        };

        let result = self.capture_and_commit(&page).await;

        heartbeat_cancel.cancel();
        let _ = heartbeat_handle.await;

        if let Err(e) = result {
            tracing::error!(
                page_id,
                url = %page.url,
                error = %e,
                "worker attempt failed before commit; lease left in place for zombie reclamation"
            );
        }
    }

    /// Steps 2-6 of the capture protocol. Any `Err` here means the attempt
    /// failed before the lease-releasing transaction, by design (§4.3
    /// failure semantics) — the caller does not retry, the lease simply
    /// expires.
    async fn capture_and_commit(&self, page: &Page) -> anyhow::Result<()> {
        let url = Url::parse(&page.url)?;
        let page_timeout = Duration::from_secs(self.config.page_timeout_secs);

        let capture = match tokio::time::timeout(page_timeout, self.browser.capture(&url)).await {
            Ok(Ok(capture)) => capture,
            Ok(Err(e)) => {
                return self.gate_failure(page, None, Some(e.to_string())).await;
            }
            Err(_) => {
                // Transient (§7): a bounded navigation timeout is not a
                // graceful HTTP-gate outcome — leave the lease in place and
                // let it expire via heartbeat timeout so SC reclaims it.
                anyhow::bail!("page load timed out after {page_timeout:?}");
            }
        };

        if !(200..300).contains(&capture.http_status) {
            return self
                .gate_failure(page, Some(capture.http_status as i32), None)
                .await;
        }

        let fp = match fingerprint(&capture.source_html, &self.hasher_config) {
            Ok(fp) => fp,
            Err(e) => return self.gate_failure(page, None, Some(e.to_string())).await,
        };
        let hasher_version = self.hasher_config.version();

        if page.last_clean_hash.as_deref() == Some(fp.clean_hash.as_str()) {
            capture::record_unchanged(
                &self.pool,
                page.id,
                page.check_interval.clone(),
                &fp.content_hash,
                &fp.clean_hash,
                &hasher_version,
            )
            .await?;
            return Ok(());
        }

        let snapshot_timestamp = Utc::now();
        let dir = self.objectstore.capture_dir(&page.hash, snapshot_timestamp);
        let dom_html = clean_dom_html(&capture.source_html, &self.hasher_config)?;
        let artifacts = CaptureArtifacts {
            dom_html: Bytes::from(dom_html),
            source_html: capture.source_html,
            mhtml: capture.mhtml,
            screenshot: capture.screenshot,
        };
        self.objectstore.put_capture(&dir, &artifacts).await?;

        capture::record_change(
            &self.pool,
            page.id,
            page.check_interval.clone(),
            snapshot_timestamp,
            &dir,
            &fp.content_hash,
            &fp.clean_hash,
            &hasher_version,
        )
        .await?;

        Ok(())
    }

    /// Step 3's graceful terminal path, also reused for fingerprint
    /// failures (§7 treats those as equivalent: audit row, normal release).
    async fn gate_failure(
        &self,
        page: &Page,
        http_status: Option<i32>,
        error_message: Option<String>,
    ) -> anyhow::Result<()> {
        capture::record_http_gate_failure(
            &self.pool,
            page.id,
            page.check_interval.clone(),
            http_status,
            error_message.as_deref(),
        )
        .await?;
        Ok(())
    }
}
