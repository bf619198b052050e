//! The worker's commit path: the transactional operations that close out a
//! capture attempt. Each function here is the single transaction described
//! in §4.3 of the pipeline design — audit row and Page release always
//! commit together, so a crash between them is impossible by construction.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;
use crate::snapshot::PageSnapshot;

/// Release a page's lease after the HTTP gate rejected the response (non-2xx
/// status, or the browser raised before a status was known). Graceful
/// terminal path, not a retry-now failure: the page stays on its normal
/// schedule.
pub async fn record_http_gate_failure(
    pool: &PgPool,
    page_id: i64,
    check_interval_from_row: sqlx::postgres::types::PgInterval,
    http_status: Option<i32>,
    error_message: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO page_monitors (page_id, monitor_timestamp, change_detected, http_status, error_message)
        VALUES ($1, $2, FALSE, $3, $4)
        "#,
    )
    .bind(page_id)
    .bind(now)
    .bind(http_status)
    .bind(error_message)
    .execute(&mut *tx)
    .await?;

    release_page(&mut tx, page_id, now, check_interval_from_row, None).await?;

    tx.commit().await?;
    Ok(())
}

/// Case A — unchanged: record the audit row and release the lease. Object
/// storage is never touched on this path.
pub async fn record_unchanged(
    pool: &PgPool,
    page_id: i64,
    check_interval_from_row: sqlx::postgres::types::PgInterval,
    content_hash: &str,
    clean_hash: &str,
    hasher_version: &str,
) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO page_monitors
            (page_id, monitor_timestamp, content_hash, clean_hash, change_detected, hasher_version)
        VALUES ($1, $2, $3, $4, FALSE, $5)
        "#,
    )
    .bind(page_id)
    .bind(now)
    .bind(content_hash)
    .bind(clean_hash)
    .bind(hasher_version)
    .execute(&mut *tx)
    .await?;

    release_page(&mut tx, page_id, now, check_interval_from_row, Some(clean_hash)).await?;

    tx.commit().await?;
    Ok(())
}

/// Case B — changed or first capture. Caller must have already finished all
/// object-store writes: OS blobs are externally ordered before this
/// transaction, so `{oss_path in PageSnapshot} subset-of {paths in OS}` holds
/// at every instant. The snapshot upsert and the audit row land in one
/// transaction with the page release.
#[allow(clippy::too_many_arguments)]
pub async fn record_change(
    pool: &PgPool,
    page_id: i64,
    check_interval_from_row: sqlx::postgres::types::PgInterval,
    snapshot_timestamp: DateTime<Utc>,
    oss_path: &str,
    content_hash: &str,
    clean_hash: &str,
    hasher_version: &str,
) -> Result<PageSnapshot> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    // ON CONFLICT DO UPDATE with a no-op assignment is used instead of DO
    // NOTHING so RETURNING always yields the row — the row that already
    // existed under clock-skew double dispatch, or the one just inserted.
    // The constraint still collapses both insert attempts to one row.
    let snapshot = sqlx::query_as::<_, PageSnapshot>(
        r#"
        INSERT INTO page_snapshots
            (page_id, snapshot_timestamp, oss_path, content_hash, clean_hash)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (page_id, clean_hash)
        DO UPDATE SET clean_hash = EXCLUDED.clean_hash
        RETURNING *
        "#,
    )
    .bind(page_id)
    .bind(snapshot_timestamp)
    .bind(oss_path)
    .bind(content_hash)
    .bind(clean_hash)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO page_monitors
            (page_id, monitor_timestamp, content_hash, clean_hash, change_detected, hasher_version)
        VALUES ($1, $2, $3, $4, TRUE, $5)
        "#,
    )
    .bind(page_id)
    .bind(now)
    .bind(content_hash)
    .bind(clean_hash)
    .bind(hasher_version)
    .execute(&mut *tx)
    .await?;

    release_page(&mut tx, page_id, now, check_interval_from_row, Some(clean_hash)).await?;

    tx.commit().await?;
    Ok(snapshot)
}

async fn release_page(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    page_id: i64,
    now: DateTime<Utc>,
    check_interval: sqlx::postgres::types::PgInterval,
    last_clean_hash: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pages
        SET status = 'pending',
            heartbeat_at = NULL,
            last_check_at = $2,
            last_clean_hash = COALESCE($3, last_clean_hash),
            next_schedule_at = $2 + $4,
            updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(page_id)
    .bind(now)
    .bind(last_clean_hash)
    .bind(check_interval)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
