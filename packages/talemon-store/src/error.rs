#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("page {0} not found")]
    PageNotFound(i64),
}

pub type Result<T> = std::result::Result<T, StoreError>;
