use sqlx::SqlitePool;
use tracing::info;
use vodpack_core::ports::CatalogStore;
use vodpack_core::{CatalogRecord, PersistenceError};

use crate::repo::videos;

/// [`CatalogStore`] over the `video` tables.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl CatalogStore for SqliteCatalog {
    async fn save(&self, record: &CatalogRecord) -> Result<String, PersistenceError> {
        let id = videos::insert_video(&self.pool, record).await?;
        info!(video_id = %id, title = %record.title, "catalog record saved");
        Ok(id)
    }
}
