use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::Result;

/// An extractor's structured output for a single snapshot.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PageInfo {
    pub id: i64,
    pub snapshot_id: i64,
    pub extractor_version: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PageInfo {
    /// Insert exactly-once per `(snapshot_id, extractor_version)`. Returns
    /// `None` when a concurrent extractor run already won the race — the
    /// unique constraint makes this safe to call redundantly.
    pub async fn insert_once(
        snapshot_id: i64,
        extractor_version: &str,
        data: &serde_json::Value,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        let info = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO page_infos (snapshot_id, extractor_version, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (snapshot_id, extractor_version) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(snapshot_id)
        .bind(extractor_version)
        .bind(data)
        .fetch_optional(pool)
        .await?;
        Ok(info)
    }

    pub async fn list_for_snapshot(snapshot_id: i64, pool: &PgPool) -> Result<Vec<Self>> {
        let infos = sqlx::query_as::<_, Self>(
            "SELECT * FROM page_infos WHERE snapshot_id = $1 ORDER BY created_at",
        )
        .bind(snapshot_id)
        .fetch_all(pool)
        .await?;
        Ok(infos)
    }
}
