use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::Result;

/// Per-attempt audit record, written on every worker attempt whether or not
/// a snapshot was taken. This is the user-visible failure surface: a
/// completed attempt always leaves one of these rows.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PageMonitor {
    pub id: i64,
    pub page_id: i64,
    pub monitor_timestamp: DateTime<Utc>,
    pub content_hash: Option<String>,
    pub clean_hash: Option<String>,
    pub change_detected: bool,
    pub http_status: Option<i32>,
    pub error_message: Option<String>,
    pub hasher_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PageMonitor {
    pub async fn list_for_page(page_id: i64, pool: &PgPool) -> Result<Vec<Self>> {
        let monitors = sqlx::query_as::<_, Self>(
            "SELECT * FROM page_monitors WHERE page_id = $1 ORDER BY monitor_timestamp DESC",
        )
        .bind(page_id)
        .fetch_all(pool)
        .await?;
        Ok(monitors)
    }
}
