use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sqlx::PgPool;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "page_status", rename_all = "lowercase")]
pub enum PageStatus {
    Pending,
    Processing,
    Paused,
}

/// A monitored URL and its scheduling state.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub url: String,
    pub hash: String,
    pub domain: String,
    pub status: PageStatus,
    pub last_clean_hash: Option<String>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub next_schedule_at: DateTime<Utc>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub check_interval: sqlx::postgres::types::PgInterval,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `sha1(url)` as a 40-character lowercase hex string — the stable identity
/// used both as the Page's alternate key and as the object-store path prefix.
pub fn url_hash(url: &str) -> String {
    hex::encode(Sha1::digest(url.as_bytes()))
}

fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.domain().map(|d| d.to_string()))
        .unwrap_or_else(|| url.to_string())
}

impl Page {
    /// Seed a new monitored page. Called by the external seed loader (the
    /// `add-url` CLI command), never by the scheduler/worker/extractor.
    pub async fn seed(
        url: &str,
        check_interval_seconds: i64,
        pool: &PgPool,
    ) -> Result<Self> {
        let hash = url_hash(url);
        let domain = domain_of(url);
        let page = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO pages (url, hash, domain, check_interval)
            VALUES ($1, $2, $3, make_interval(secs => $4))
            ON CONFLICT (url) DO UPDATE SET updated_at = pages.updated_at
            RETURNING *
            "#,
        )
        .bind(url)
        .bind(&hash)
        .bind(&domain)
        .bind(check_interval_seconds as f64)
        .fetch_one(pool)
        .await?;
        Ok(page)
    }

    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        let page = sqlx::query_as::<_, Self>("SELECT * FROM pages WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(page)
    }

    pub async fn find_by_url(url: &str, pool: &PgPool) -> Result<Option<Self>> {
        let page = sqlx::query_as::<_, Self>("SELECT * FROM pages WHERE url = $1")
            .bind(url)
            .fetch_optional(pool)
            .await?;
        Ok(page)
    }

    /// Pause a page: it stops being selected by candidate selection regardless
    /// of its current status.
    pub async fn pause(id: i64, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE pages SET status = 'paused', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Resume a paused page; it becomes immediately eligible for scheduling.
    pub async fn resume(id: i64, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pages
            SET status = 'pending', next_schedule_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'paused'
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Zombie reclamation: every `processing` row whose heartbeat is older
    /// than `zombie_timeout` is returned to `pending` with its lease cleared.
    /// Set-based and idempotent — safe to run repeatedly and concurrently.
    pub async fn reclaim_zombies(
        zombie_timeout_secs: i64,
        pool: &PgPool,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pages
            SET status = 'pending', heartbeat_at = NULL, updated_at = NOW()
            WHERE status = 'processing'
              AND heartbeat_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(zombie_timeout_secs as f64)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Select up to `limit` due, pending candidates (random order, rows
    /// locked non-blocking) and hand each to `admit` for a synchronous,
    /// process-local rate-limit decision. Admitted rows are transitioned to
    /// `processing` with a fresh heartbeat in the same transaction; rejected
    /// rows are left untouched and their lock releases on commit. This is
    /// the candidate-selection + domain-admission + dispatch sequence in one
    /// atomic unit, so a crash mid-tick can never leave a row half-claimed.
    pub async fn claim_batch(
        pool: &PgPool,
        limit: i64,
        mut admit: impl FnMut(&Page) -> bool,
    ) -> Result<Vec<Self>> {
        let mut tx = pool.begin().await?;

        let candidates = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM pages
            WHERE status = 'pending' AND next_schedule_at <= NOW()
            ORDER BY random()
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        let mut admitted = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            if !admit(&candidate) {
                continue;
            }
            let heartbeat = Utc::now();
            sqlx::query(
                r#"
                UPDATE pages
                SET status = 'processing', heartbeat_at = $2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(candidate.id)
            .bind(heartbeat)
            .execute(&mut *tx)
            .await?;
            candidate.status = PageStatus::Processing;
            candidate.heartbeat_at = Some(heartbeat);
            admitted.push(candidate);
        }

        tx.commit().await?;
        Ok(admitted)
    }

    /// Conditional heartbeat write: only takes effect while this page is
    /// still `processing`, so a worker whose lease was already reclaimed
    /// cannot resurrect it.
    pub async fn heartbeat(id: i64, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pages
            SET heartbeat_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
