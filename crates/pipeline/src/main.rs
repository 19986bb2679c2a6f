use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::Semaphore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vodpack_db::SqliteCatalog;
use vodpack_pipeline::config::max_jobs_from_lookup;
use vodpack_pipeline::recovery::recover_interrupted;
use vodpack_pipeline::workspace::{stage_uploads, staging_dir};
use vodpack_pipeline::{IngestRequest, Pipeline, PipelineConfig};
use vodpack_storage::FsBlobStore;
use vodpack_transcoder::ffmpeg::Ffmpeg;

#[derive(Parser)]
#[command(name = "vodpack")]
#[command(about = "Package uploaded videos as adaptive HLS streams")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcode, package and publish one or more video files
    Ingest {
        /// Video files to ingest. Each is copied into the work directory
        /// first; the originals are left untouched.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Catalog title (defaults to each file's name without extension)
        #[arg(long)]
        title: Option<String>,
    },
    /// Print catalog records, newest first
    List,
    /// Print recorded jobs, newest first
    Jobs,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("VODPACK_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let db_path = std::env::var("VODPACK_DB").unwrap_or_else(|_| "vodpack.db".to_string());
    info!(db_path = %db_path, "connecting to database");
    let pool = vodpack_db::connect(&db_path)
        .await
        .context("failed to connect to database")?;
    vodpack_db::migrate::run(&pool)
        .await
        .context("failed to run migrations")?;

    match cli.command {
        Command::Ingest { files, title } => {
            let all_ok = ingest(pool, files, title).await?;
            if !all_ok {
                std::process::exit(1);
            }
        }
        Command::List => {
            let videos = vodpack_db::repo::videos::list_videos(&pool)
                .await
                .context("failed to list videos")?;
            let out: Vec<_> = videos
                .into_iter()
                .map(|v| {
                    serde_json::json!({
                        "id": v.id,
                        "created_ts": v.created_ts,
                        "record": v.record,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Jobs => {
            let rows = vodpack_db::repo::jobs::list_jobs(&pool)
                .await
                .context("failed to list jobs")?;
            let out: Vec<_> = rows
                .into_iter()
                .map(|j| {
                    serde_json::json!({
                        "id": j.id,
                        "source_name": j.source_name,
                        "stage": j.stage,
                        "error_code": j.error_code,
                        "error": j.error,
                        "video_id": j.video_id,
                        "created_ts": j.created_ts,
                        "updated_ts": j.updated_ts,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

/// Run one job per file, at most `VODPACK_MAX_JOBS` at a time. Returns
/// whether every job finished.
async fn ingest(
    pool: sqlx::SqlitePool,
    files: Vec<PathBuf>,
    title: Option<String>,
) -> anyhow::Result<bool> {
    let config = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    let max_jobs =
        max_jobs_from_lookup(|k| std::env::var(k).ok()).context("invalid pipeline configuration")?;

    let blob_dir = std::env::var("VODPACK_BLOB_DIR").unwrap_or_else(|_| "vodpack-blobs".to_string());
    let public_url = std::env::var("VODPACK_PUBLIC_URL")
        .unwrap_or_else(|_| "http://localhost:8080/media".to_string());
    let store = Arc::new(FsBlobStore::new(blob_dir, public_url));

    let recovered = recover_interrupted(&pool, store.as_ref(), &config.work_root)
        .await
        .context("failed to recover interrupted jobs")?;
    if !recovered.failed_jobs.is_empty() || !recovered.completed_jobs.is_empty() {
        info!(
            rolled_back = recovered.failed_jobs.len(),
            completed = recovered.completed_jobs.len(),
            deleted_keys = recovered.deleted_keys,
            leftovers = recovered.leftovers,
            "recovered interrupted jobs"
        );
    }

    let uploads_dir = staging_dir(&config.work_root);
    tokio::fs::create_dir_all(&uploads_dir)
        .await
        .context("failed to create upload staging dir")?;

    // Every input is staged before the first job starts, so a bad path
    // stops the run while nothing is in flight.
    let staged = stage_uploads(&files, &uploads_dir).await.map_err(|(file, e)| {
        anyhow::Error::new(e).context(format!("failed to stage {}", file.display()))
    })?;
    let requests: Vec<IngestRequest> = files
        .iter()
        .zip(staged)
        .map(|(file, staged)| {
            let original_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let request = IngestRequest::new(staged, original_name);
            match &title {
                Some(t) => request.with_title(t.clone()),
                None => request,
            }
        })
        .collect();

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(Ffmpeg::new(config.transcoder.clone())),
        store,
        Arc::new(SqliteCatalog::new(pool.clone())),
        config,
    ));
    let recorder = tokio::spawn(vodpack_pipeline::recorder::record_events(
        pool,
        pipeline.subscribe(),
    ));

    let permits = Arc::new(Semaphore::new(max_jobs));
    let tasks = requests.into_iter().map(|request| {
        let pipeline = pipeline.clone();
        let permits = permits.clone();
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            pipeline.run(request).await
        })
    });
    // Collected in full before anything below can return early.
    let results: Vec<_> = futures::future::join_all(tasks).await;

    // Dropping the last sender ends the recorder once it has drained.
    drop(pipeline);
    let _ = recorder.await;

    let mut all_ok = true;
    for result in results {
        match result {
            Ok(Ok(report)) => println!("{}", serde_json::to_string(&report)?),
            Ok(Err(failure)) => {
                all_ok = false;
                println!("{}", serde_json::to_string(&failure.envelope())?);
            }
            Err(e) => {
                all_ok = false;
                error!(error = %e, "ingest task panicked");
            }
        }
    }
    Ok(all_ok)
}
