pub mod catalog;
pub mod migrate;
pub mod repo;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

pub use catalog::SqliteCatalog;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DbError> for vodpack_core::PersistenceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Sqlx(e) => Self::Database(e.to_string()),
            DbError::Json(e) => Self::Serialization(e),
        }
    }
}

/// Create a SQLite connection pool with WAL mode enabled.
///
/// `db_path` is a filesystem path or a `sqlite:` URL.
pub async fn connect(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    let file = db_path
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if let Some(parent) = Path::new(file).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let opts = SqliteConnectOptions::from_str(db_path)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    Ok(pool)
}

/// Connect and bring the schema up to date.
pub async fn open(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = connect(db_path).await?;
    migrate::run(&pool).await?;
    Ok(pool)
}
