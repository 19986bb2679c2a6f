use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub source_name: String,
    pub stage: String,
    pub error_code: Option<String>,
    pub error: Option<String>,
    pub warnings_json: Option<String>,
    pub video_id: Option<String>,
    pub created_ts: i64,
    pub updated_ts: i64,
}

type JobTuple = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
    i64,
);

pub async fn create_job(
    pool: &SqlitePool,
    id: &str,
    source_name: &str,
) -> Result<JobRow, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO job (id, source_name, stage, created_ts, updated_ts) \
         VALUES (?, ?, 'received', ?, ?)",
    )
    .bind(id)
    .bind(source_name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(JobRow {
        id: id.to_string(),
        source_name: source_name.to_string(),
        stage: "received".to_string(),
        error_code: None,
        error: None,
        warnings_json: None,
        video_id: None,
        created_ts: now,
        updated_ts: now,
    })
}

pub async fn list_jobs(pool: &SqlitePool) -> Result<Vec<JobRow>, sqlx::Error> {
    let rows: Vec<JobTuple> = sqlx::query_as(
        "SELECT id, source_name, stage, error_code, error, warnings_json, video_id, \
         created_ts, updated_ts FROM job ORDER BY created_ts DESC, rowid DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_job).collect())
}

pub async fn get_job(pool: &SqlitePool, job_id: &str) -> Result<Option<JobRow>, sqlx::Error> {
    let row: Option<JobTuple> = sqlx::query_as(
        "SELECT id, source_name, stage, error_code, error, warnings_json, video_id, \
         created_ts, updated_ts FROM job WHERE id = ?",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_job))
}

pub async fn update_job_stage(
    pool: &SqlitePool,
    job_id: &str,
    stage: &str,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query("UPDATE job SET stage = ?, updated_ts = ? WHERE id = ?")
        .bind(stage)
        .bind(now)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Record the terminal outcome of a job.
pub async fn finish_job(
    pool: &SqlitePool,
    job_id: &str,
    stage: &str,
    video_id: Option<&str>,
    error_code: Option<&str>,
    error: Option<&str>,
    warnings_json: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE job SET stage = ?, video_id = ?, error_code = ?, error = ?, \
         warnings_json = ?, updated_ts = ? WHERE id = ?",
    )
    .bind(stage)
    .bind(video_id)
    .bind(error_code)
    .bind(error)
    .bind(warnings_json)
    .bind(now)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Mark jobs left mid-flight by a previous process as failed and return them.
pub async fn fail_interrupted_jobs(pool: &SqlitePool) -> Result<Vec<JobRow>, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    let rows: Vec<JobTuple> = sqlx::query_as(
        "SELECT id, source_name, stage, error_code, error, warnings_json, video_id, \
         created_ts, updated_ts FROM job WHERE stage NOT IN ('done', 'failed') \
         ORDER BY created_ts, rowid",
    )
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE job SET stage = 'failed', error_code = 'interrupted', \
         error = 'process exited before the job finished', updated_ts = ? \
         WHERE stage NOT IN ('done', 'failed')",
    )
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(rows
        .into_iter()
        .map(|r| JobRow {
            stage: "failed".to_string(),
            error_code: Some("interrupted".to_string()),
            error: Some("process exited before the job finished".to_string()),
            updated_ts: now,
            ..row_to_job(r)
        })
        .collect())
}

fn row_to_job(r: JobTuple) -> JobRow {
    JobRow {
        id: r.0,
        source_name: r.1,
        stage: r.2,
        error_code: r.3,
        error: r.4,
        warnings_json: r.5,
        video_id: r.6,
        created_ts: r.7,
        updated_ts: r.8,
    }
}
