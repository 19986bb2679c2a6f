use vodpack_core::ports::CatalogStore;
use vodpack_core::{CatalogRecord, FrameSize, Locator, RenditionSummary, TechnicalMetadata};
use vodpack_db::SqliteCatalog;
use vodpack_db::repo::{jobs, videos};

/// Fresh migrated database in a temp directory.
async fn test_db() -> (tempfile::TempDir, sqlx::SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    let pool = vodpack_db::open(path.to_str().unwrap()).await.unwrap();
    (dir, pool)
}

fn loc(key: &str) -> Locator {
    Locator {
        key: key.to_string(),
        url: format!("http://cdn.test/{key}"),
    }
}

fn record(title: &str) -> CatalogRecord {
    CatalogRecord {
        title: title.to_string(),
        source: Some(loc("sources/j1/clip.mp4")),
        thumbnail: None,
        manifest: loc("hls/j1/master.m3u8"),
        renditions: vec![
            RenditionSummary {
                label: "240p".into(),
                bandwidth: 400_000,
                frame_size: FrameSize::new(426, 240),
            },
            RenditionSummary {
                label: "720p".into(),
                bandwidth: 2_500_000,
                frame_size: FrameSize::new(1280, 720),
            },
        ],
        metadata: Some(TechnicalMetadata {
            duration_secs: Some(12.5),
            width: Some(1920),
            height: Some(1080),
            frame_rate: Some(29.97),
            video_codec: Some("h264".into()),
            ..Default::default()
        }),
    }
}

#[tokio::test]
async fn saved_record_reads_back_intact() {
    let (_dir, pool) = test_db().await;
    let catalog = SqliteCatalog::new(pool.clone());

    let rec = record("clip");
    let id = catalog.save(&rec).await.unwrap();

    let row = videos::get_video(&pool, &id).await.unwrap().unwrap();
    assert_eq!(row.id, id);
    assert_eq!(row.record, rec);
    assert!(row.record.thumbnail.is_none());
}

#[tokio::test]
async fn record_without_metadata_round_trips_as_absent() {
    let (_dir, pool) = test_db().await;
    let mut rec = record("no-probe");
    rec.metadata = None;
    let id = videos::insert_video(&pool, &rec).await.unwrap();

    let row = videos::get_video(&pool, &id).await.unwrap().unwrap();
    assert_eq!(row.record.metadata, None);
}

#[tokio::test]
async fn list_is_newest_first() {
    let (_dir, pool) = test_db().await;
    let first = videos::insert_video(&pool, &record("first")).await.unwrap();
    let second = videos::insert_video(&pool, &record("second")).await.unwrap();

    let titles: Vec<_> = videos::list_videos(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.record.title)
        .collect();
    assert_eq!(titles, ["second", "first"]);
    assert!(videos::get_video(&pool, &first).await.unwrap().is_some());
    assert!(videos::get_video(&pool, &second).await.unwrap().is_some());
}

#[tokio::test]
async fn video_is_found_by_its_manifest_key() {
    let (_dir, pool) = test_db().await;
    let id = videos::insert_video(&pool, &record("published")).await.unwrap();

    assert_eq!(
        videos::find_by_manifest_key(&pool, "hls/j1/master.m3u8")
            .await
            .unwrap(),
        Some(id)
    );
    assert_eq!(
        videos::find_by_manifest_key(&pool, "hls/other/master.m3u8")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn job_lifecycle_is_recorded() {
    let (_dir, pool) = test_db().await;
    jobs::create_job(&pool, "20260101000000-abc", "clip.mp4")
        .await
        .unwrap();
    assert!(
        jobs::update_job_stage(&pool, "20260101000000-abc", "encoding")
            .await
            .unwrap()
    );
    assert!(
        jobs::finish_job(
            &pool,
            "20260101000000-abc",
            "failed",
            None,
            Some("no_renditions"),
            Some("no quality tier produced a rendition"),
            Some("[]"),
        )
        .await
        .unwrap()
    );

    let job = jobs::get_job(&pool, "20260101000000-abc")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.stage, "failed");
    assert_eq!(job.error_code.as_deref(), Some("no_renditions"));
    assert_eq!(job.source_name, "clip.mp4");
    assert_eq!(jobs::list_jobs(&pool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn interrupted_jobs_are_failed_on_startup() {
    let (_dir, pool) = test_db().await;
    jobs::create_job(&pool, "a", "a.mp4").await.unwrap();
    jobs::create_job(&pool, "b", "b.mp4").await.unwrap();
    jobs::finish_job(&pool, "b", "done", None, None, None, None)
        .await
        .unwrap();

    let interrupted = jobs::fail_interrupted_jobs(&pool).await.unwrap();
    assert_eq!(interrupted.len(), 1);
    assert_eq!(interrupted[0].id, "a");
    assert_eq!(interrupted[0].source_name, "a.mp4");
    let a = jobs::get_job(&pool, "a").await.unwrap().unwrap();
    assert_eq!(a.stage, "failed");
    assert_eq!(a.error_code.as_deref(), Some("interrupted"));
    let b = jobs::get_job(&pool, "b").await.unwrap().unwrap();
    assert_eq!(b.stage, "done");
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (_dir, pool) = test_db().await;
    vodpack_db::migrate::run(&pool).await.unwrap();
    let (applied,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(applied, 2);
}
