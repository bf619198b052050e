use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::Result;

/// Provenance of how a page entered the system. The core performs no
/// discovery of its own — this only records the origin of a page seeded by
/// an external path (manual entry, an import file, or an API call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "seed_origin", rename_all = "lowercase")]
pub enum SeedOrigin {
    Manual,
    Import,
    Api,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SeedSource {
    pub id: i64,
    pub page_id: i64,
    pub origin: SeedOrigin,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SeedSource {
    pub async fn record(
        page_id: i64,
        origin: SeedOrigin,
        note: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        let source = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO seed_sources (page_id, origin, note)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(page_id)
        .bind(origin)
        .bind(note)
        .fetch_one(pool)
        .await?;
        Ok(source)
    }

    pub async fn list_for_page(page_id: i64, pool: &PgPool) -> Result<Vec<Self>> {
        let sources = sqlx::query_as::<_, Self>(
            "SELECT * FROM seed_sources WHERE page_id = $1 ORDER BY created_at",
        )
        .bind(page_id)
        .fetch_all(pool)
        .await?;
        Ok(sources)
    }
}
