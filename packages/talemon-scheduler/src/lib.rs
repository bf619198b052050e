//! Turns the `pages` table into a steady, fairness- and rate-limit-
//! respecting stream of ready jobs, and reclaims jobs abandoned by crashed
//! workers (§4.2).
//!
//! Candidate selection, domain admission, and dispatch (steps 2-4) are
//! exposed as [`Scheduler::claim_ready`] so a caller in a separate address
//! space — a `worker` process — can perform them itself, exactly as the
//! "workers may independently perform steps 2-4" allowance in §4.2
//! describes. The `scheduler` binary built on this crate instead runs only
//! the reclamation tick continuously: with claiming duplicated into every
//! worker process, a single always-on reclaimer is the one piece of step 1
//! that must not itself be duplicated per worker to stay easy to reason
//! about, though `reclaim_zombies` remains idempotent if it ever is.

mod limiter;

pub use limiter::DomainLimiter;

use std::time::Duration;

use talemon_core::{RateLimitConfig, SchedulerConfig};
use talemon_store::{Page, PgPool};
use tokio_util::sync::CancellationToken;

/// Selects due pages, enforces per-domain rate limits, reclaims zombies.
/// One instance is process-local: its [`DomainLimiter`] holds no state
/// shared across processes (§9's multi-scheduler open question).
pub struct Scheduler {
    pool: PgPool,
    config: SchedulerConfig,
    limiter: DomainLimiter,
}

impl Scheduler {
    pub fn new(pool: PgPool, config: SchedulerConfig, rate_limit: RateLimitConfig) -> Self {
        Self {
            pool,
            config,
            limiter: DomainLimiter::new(&rate_limit),
        }
    }

    /// Step 1 — zombie reclamation. Set-based and idempotent; safe to call
    /// from multiple processes concurrently.
    pub async fn reclaim_zombies(&self) -> talemon_store::Result<u64> {
        Page::reclaim_zombies(self.config.zombie_timeout_secs as i64, &self.pool).await
    }

    /// Steps 2-4 — candidate selection, domain admission, and dispatch,
    /// performed as one atomic batch claim. Rows admitted here are already
    /// `PROCESSING` with a fresh heartbeat when this returns.
    pub async fn claim_ready(&self) -> talemon_store::Result<Vec<Page>> {
        Page::claim_batch(&self.pool, self.config.batch_size, |page| {
            self.limiter.admit(&page.domain)
        })
        .await
    }

    /// Run the reclamation tick forever, honoring `shutdown`. This is the
    /// `scheduler` CLI subcommand's whole job: claiming is left to worker
    /// processes (see module docs).
    pub async fn run_reclaimer(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            zombie_timeout_secs = self.config.zombie_timeout_secs,
            tick_interval_secs = self.config.tick_interval_secs,
            "scheduler starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.reclaim_zombies().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(reclaimed = n, "reclaimed zombie leases"),
                Err(e) => tracing::error!(error = %e, "zombie reclamation failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(self.config.tick_interval_secs)) => {}
            }
        }

        tracing::info!("scheduler stopped");
        Ok(())
    }
}
