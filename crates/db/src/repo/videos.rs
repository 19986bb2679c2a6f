use sqlx::SqlitePool;
use vodpack_core::{CatalogRecord, FrameSize, Locator, RenditionSummary, TechnicalMetadata};

use crate::DbError;

/// A catalog record as stored, with its id and creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRow {
    pub id: String,
    pub created_ts: i64,
    pub record: CatalogRecord,
}

type VideoTuple = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

const VIDEO_COLUMNS: &str = "id, title, manifest_key, manifest_url, source_key, source_url, \
     thumbnail_key, thumbnail_url, metadata_json, created_ts";

/// Insert a record and its renditions in one transaction. Returns the new id.
pub async fn insert_video(pool: &SqlitePool, record: &CatalogRecord) -> Result<String, DbError> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();
    let metadata_json = record
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO video (id, title, manifest_key, manifest_url, source_key, source_url, \
         thumbnail_key, thumbnail_url, metadata_json, created_ts) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&record.title)
    .bind(&record.manifest.key)
    .bind(&record.manifest.url)
    .bind(record.source.as_ref().map(|l| l.key.as_str()))
    .bind(record.source.as_ref().map(|l| l.url.as_str()))
    .bind(record.thumbnail.as_ref().map(|l| l.key.as_str()))
    .bind(record.thumbnail.as_ref().map(|l| l.url.as_str()))
    .bind(metadata_json)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for (position, r) in record.renditions.iter().enumerate() {
        sqlx::query(
            "INSERT INTO video_rendition (video_id, position, label, bandwidth, width, height) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(position as i64)
        .bind(&r.label)
        .bind(r.bandwidth as i64)
        .bind(r.frame_size.width as i64)
        .bind(r.frame_size.height as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(id)
}

pub async fn get_video(pool: &SqlitePool, id: &str) -> Result<Option<VideoRow>, DbError> {
    let row: Option<VideoTuple> =
        sqlx::query_as(&format!("SELECT {VIDEO_COLUMNS} FROM video WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    match row {
        Some(r) => {
            let renditions = renditions_for(pool, &r.0).await?;
            Ok(Some(row_to_video(r, renditions)?))
        }
        None => Ok(None),
    }
}

/// All videos, newest first.
pub async fn list_videos(pool: &SqlitePool) -> Result<Vec<VideoRow>, DbError> {
    let rows: Vec<VideoTuple> = sqlx::query_as(&format!(
        "SELECT {VIDEO_COLUMNS} FROM video ORDER BY created_ts DESC, rowid DESC"
    ))
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        let renditions = renditions_for(pool, &r.0).await?;
        out.push(row_to_video(r, renditions)?);
    }
    Ok(out)
}

/// Id of the video whose master playlist is stored under `manifest_key`.
pub async fn find_by_manifest_key(
    pool: &SqlitePool,
    manifest_key: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM video WHERE manifest_key = ?")
        .bind(manifest_key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(id,)| id))
}

async fn renditions_for(
    pool: &SqlitePool,
    video_id: &str,
) -> Result<Vec<RenditionSummary>, sqlx::Error> {
    let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
        "SELECT label, bandwidth, width, height FROM video_rendition \
         WHERE video_id = ? ORDER BY position",
    )
    .bind(video_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(label, bandwidth, width, height)| RenditionSummary {
            label,
            bandwidth: bandwidth as u64,
            frame_size: FrameSize::new(width as u32, height as u32),
        })
        .collect())
}

fn locator(key: Option<String>, url: Option<String>) -> Option<Locator> {
    match (key, url) {
        (Some(key), Some(url)) => Some(Locator { key, url }),
        _ => None,
    }
}

fn row_to_video(r: VideoTuple, renditions: Vec<RenditionSummary>) -> Result<VideoRow, DbError> {
    let metadata: Option<TechnicalMetadata> =
        r.8.as_deref().map(serde_json::from_str).transpose()?;

    Ok(VideoRow {
        id: r.0,
        created_ts: r.9,
        record: CatalogRecord {
            title: r.1,
            manifest: Locator { key: r.2, url: r.3 },
            source: locator(r.4, r.5),
            thumbnail: locator(r.6, r.7),
            renditions,
            metadata,
        },
    })
}
