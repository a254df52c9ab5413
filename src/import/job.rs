use super::error::ImportError;
use super::registry::ImportType;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Importing,
    Completed,
    CompletedWithErrors,
    Failed,
    RolledBack,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Importing => "importing",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "importing" => Some(Self::Importing),
            "completed" => Some(Self::Completed),
            "completed_with_errors" => Some(Self::CompletedWithErrors),
            "failed" => Some(Self::Failed),
            "rolled_back" => Some(Self::RolledBack),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Importing)
                | (Importing, Completed)
                | (Importing, CompletedWithErrors)
                | (Importing, Failed)
                | (Completed, RolledBack)
                | (CompletedWithErrors, RolledBack)
        )
    }

    pub fn check_transition(self, next: JobStatus) -> Result<(), ImportError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ImportError::InvalidStatusTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn can_rollback(self) -> bool {
        self.can_transition_to(JobStatus::RolledBack)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    pub row_number: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportJob {
    pub id: String,
    pub import_type: ImportType,
    pub file_name: String,
    pub file_sha256: Option<String>,
    pub status: JobStatus,
    pub total_rows: usize,
    pub imported_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub errors: Vec<RowFailure>,
    pub metadata: Value,
    pub created_by: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub rolled_back_at: Option<String>,
}

impl ImportJob {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "importType": self.import_type.as_str(),
            "fileName": self.file_name,
            "fileSha256": self.file_sha256,
            "status": self.status.as_str(),
            "totalRows": self.total_rows,
            "importedCount": self.imported_count,
            "skippedCount": self.skipped_count,
            "errorCount": self.error_count,
            "errors": self.errors,
            "metadata": self.metadata,
            "createdBy": self.created_by,
            "createdAt": self.created_at,
            "completedAt": self.completed_at,
            "rolledBackAt": self.rolled_back_at,
            "canRollback": self.status.can_rollback()
        })
    }
}

fn bad_column(idx: usize, what: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, what.into())
}

const JOB_COLUMNS: &str = "id, import_type, file_name, file_sha256, status, total_rows,
    imported_count, skipped_count, error_count, errors_json, metadata_json, created_by,
    created_at, completed_at, rolled_back_at";

fn job_from_row(r: &Row<'_>) -> rusqlite::Result<ImportJob> {
    let import_type: String = r.get(1)?;
    let status: String = r.get(4)?;
    let errors_json: String = r.get(9)?;
    let metadata_json: String = r.get(10)?;
    Ok(ImportJob {
        id: r.get(0)?,
        import_type: ImportType::parse(&import_type)
            .ok_or_else(|| bad_column(1, format!("unknown import type {}", import_type)))?,
        file_name: r.get(2)?,
        file_sha256: r.get(3)?,
        status: JobStatus::parse(&status)
            .ok_or_else(|| bad_column(4, format!("unknown job status {}", status)))?,
        total_rows: r.get::<_, i64>(5)? as usize,
        imported_count: r.get::<_, i64>(6)? as usize,
        skipped_count: r.get::<_, i64>(7)? as usize,
        error_count: r.get::<_, i64>(8)? as usize,
        errors: serde_json::from_str(&errors_json).map_err(|e| bad_column(9, e.to_string()))?,
        metadata: serde_json::from_str(&metadata_json)
            .map_err(|e| bad_column(10, e.to_string()))?,
        created_by: r.get(11)?,
        created_at: r.get(12)?,
        completed_at: r.get(13)?,
        rolled_back_at: r.get(14)?,
    })
}

pub fn insert_job(conn: &Connection, job: &ImportJob) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO import_jobs(id, import_type, file_name, file_sha256, status, total_rows,
            imported_count, skipped_count, error_count, errors_json, metadata_json, created_by,
            created_at, completed_at, rolled_back_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            job.id,
            job.import_type.as_str(),
            job.file_name,
            job.file_sha256,
            job.status.as_str(),
            job.total_rows as i64,
            job.imported_count as i64,
            job.skipped_count as i64,
            job.error_count as i64,
            serde_json::to_string(&job.errors).unwrap_or_else(|_| "[]".to_string()),
            job.metadata.to_string(),
            job.created_by,
            job.created_at,
            job.completed_at,
            job.rolled_back_at,
        ],
    )?;
    Ok(())
}

/// Move `job` to `next`, guarded on the status currently stored.
pub fn advance_job(conn: &Connection, job: &mut ImportJob, next: JobStatus) -> Result<(), ImportError> {
    job.status.check_transition(next)?;
    let changed = conn.execute(
        "UPDATE import_jobs
         SET status = ?, imported_count = ?, skipped_count = ?, error_count = ?,
             errors_json = ?, completed_at = ?, rolled_back_at = ?
         WHERE id = ? AND status = ?",
        rusqlite::params![
            next.as_str(),
            job.imported_count as i64,
            job.skipped_count as i64,
            job.error_count as i64,
            serde_json::to_string(&job.errors).unwrap_or_else(|_| "[]".to_string()),
            job.completed_at,
            job.rolled_back_at,
            job.id,
            job.status.as_str(),
        ],
    )?;
    if changed != 1 {
        // Someone else moved the job first; report what is stored now.
        let stored = load_job(conn, &job.id)?
            .map(|j| j.status)
            .unwrap_or(job.status);
        return Err(ImportError::InvalidStatusTransition {
            from: stored,
            to: next,
        });
    }
    job.status = next;
    Ok(())
}

pub fn load_job(conn: &Connection, id: &str) -> rusqlite::Result<Option<ImportJob>> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM import_jobs WHERE id = ?"),
        [id],
        job_from_row,
    )
    .optional()
}

/// Most recent first.
pub fn list_jobs(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<ImportJob>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM import_jobs ORDER BY created_at DESC, rowid DESC LIMIT ?"
    ))?;
    let rows = stmt
        .query_map([limit as i64], job_from_row)?
        .collect::<Result<Vec<_>, _>>();
    rows
}

/// Jobs that imported the same file content and have not been undone.
pub fn find_jobs_by_checksum(conn: &Connection, sha256: &str) -> rusqlite::Result<Vec<ImportJob>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM import_jobs
         WHERE file_sha256 = ? AND status IN ('completed', 'completed_with_errors')
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt
        .query_map([sha256], job_from_row)?
        .collect::<Result<Vec<_>, _>>();
    rows
}
