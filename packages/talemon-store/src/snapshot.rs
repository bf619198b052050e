use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::Result;

/// A persisted capture, written only when content change is detected.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub id: i64,
    pub page_id: i64,
    pub snapshot_timestamp: DateTime<Utc>,
    pub oss_path: String,
    pub content_hash: String,
    pub clean_hash: String,
    pub created_at: DateTime<Utc>,
}

impl PageSnapshot {
    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        let snapshot = sqlx::query_as::<_, Self>("SELECT * FROM page_snapshots WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(snapshot)
    }

    pub async fn list_for_page(page_id: i64, pool: &PgPool) -> Result<Vec<Self>> {
        let snapshots = sqlx::query_as::<_, Self>(
            "SELECT * FROM page_snapshots WHERE page_id = $1 ORDER BY snapshot_timestamp DESC",
        )
        .bind(page_id)
        .fetch_all(pool)
        .await?;
        Ok(snapshots)
    }

    /// Snapshots with no `PageInfo` row for `extractor_version` yet — the
    /// extractor's anti-join batch query. Ordered oldest-first so a backlog
    /// drains in capture order.
    pub async fn batch_unextracted(
        extractor_version: &str,
        limit: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let snapshots = sqlx::query_as::<_, Self>(
            r#"
            SELECT s.*
            FROM page_snapshots s
            LEFT JOIN page_infos i
                ON i.snapshot_id = s.id AND i.extractor_version = $1
            WHERE i.id IS NULL
            ORDER BY s.snapshot_timestamp ASC
            LIMIT $2
            "#,
        )
        .bind(extractor_version)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(snapshots)
    }
}
