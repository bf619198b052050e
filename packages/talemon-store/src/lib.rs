//! The authoritative state store: pages, snapshots, extracted info, and the
//! per-attempt audit trail, plus the atomic operations scheduler/worker/
//! extractor rely on (zombie reclamation, lease-respecting batch claim, the
//! worker's commit transactions).

pub mod capture;
mod error;
mod info;
mod monitor;
mod page;
mod seed_source;
mod snapshot;

pub use capture::{record_change, record_http_gate_failure, record_unchanged};
pub use error::{Result, StoreError};
pub use info::PageInfo;
pub use monitor::PageMonitor;
pub use page::{url_hash, Page, PageStatus};
pub use seed_source::{SeedOrigin, SeedSource};
pub use snapshot::PageSnapshot;

pub use sqlx::postgres::PgPool;

/// Apply embedded SQL migrations from the workspace-root `migrations/`
/// directory. Used by `talemon migrate` and by integration tests that spin
/// up a disposable Postgres via `testcontainers`.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}
