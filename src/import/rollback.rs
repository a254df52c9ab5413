use super::error::ImportError;
use super::job::{load_job, ImportJob, JobStatus};
use crate::db;
use rusqlite::Connection;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub job: ImportJob,
    pub deleted_rows: usize,
}

/// Undo a finished job: delete every row tagged with its id, then mark it
/// `rolled_back`. Runs in one transaction, so a failed delete leaves the job
/// and its rows untouched.
pub fn rollback(
    conn: &Connection,
    job_id: &str,
    actor: Option<&str>,
) -> Result<RollbackOutcome, ImportError> {
    let job = load_job(conn, job_id)?.ok_or_else(|| ImportError::JobNotFound(job_id.to_string()))?;
    job.status.check_transition(JobStatus::RolledBack)?;

    let tx = conn.unchecked_transaction()?;
    let deleted_rows = tx.execute(
        &format!(
            "DELETE FROM {} WHERE import_job_id = ?",
            job.import_type.table()
        ),
        [job_id],
    )?;
    let now = db::now_ts();
    let changed = tx.execute(
        "UPDATE import_jobs SET status = ?, rolled_back_at = ? WHERE id = ? AND status = ?",
        (
            JobStatus::RolledBack.as_str(),
            &now,
            job_id,
            job.status.as_str(),
        ),
    )?;
    if changed != 1 {
        return Err(ImportError::InvalidStatusTransition {
            from: job.status,
            to: JobStatus::RolledBack,
        });
    }
    db::audit(
        &tx,
        "import.rollback",
        "import_job",
        job_id,
        actor,
        &json!({
            "importType": job.import_type.as_str(),
            "fileName": job.file_name,
            "previousStatus": job.status.as_str(),
            "deletedRows": deleted_rows
        }),
    )?;
    tx.commit()?;

    tracing::info!(
        job_id,
        import_type = job.import_type.as_str(),
        deleted = deleted_rows,
        "import job rolled back"
    );

    let job = load_job(conn, job_id)?.ok_or_else(|| ImportError::JobNotFound(job_id.to_string()))?;
    Ok(RollbackOutcome { job, deleted_rows })
}
