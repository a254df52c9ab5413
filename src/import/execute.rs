use super::error::ImportError;
use super::job::{advance_job, insert_job, ImportJob, JobStatus, RowFailure};
use super::reference::{Lookup, ReferenceData};
use super::registry::ImportType;
use super::suggest::ColumnMapping;
use super::validate::ValidatedRow;
use super::values::CellValue;
use crate::db;
use rusqlite::{params, Connection};
use serde_json::{json, Value};
use uuid::Uuid;

pub struct ExecuteRequest<'a> {
    pub import_type: ImportType,
    pub file_name: &'a str,
    pub file_sha256: Option<&'a str>,
    pub mapping: &'a ColumnMapping,
    pub rows: &'a [ValidatedRow],
    pub metadata: Value,
    pub skip_duplicates: bool,
    pub actor: Option<&'a str>,
}

#[derive(Debug, thiserror::Error)]
enum RowWriteError {
    #[error("{0}")]
    Reference(String),

    #[error("database rejected row: {0}")]
    Db(#[from] rusqlite::Error),
}

/// Writes the importable rows one at a time. A row that fails is recorded on
/// the job and the loop moves on; nothing here aborts because of one row.
pub fn execute(conn: &Connection, req: ExecuteRequest<'_>) -> Result<ImportJob, ImportError> {
    let mut metadata = match req.metadata {
        Value::Object(m) => Value::Object(m),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    metadata["columnMapping"] = serde_json::to_value(req.mapping).unwrap_or(Value::Null);
    metadata["skipDuplicates"] = Value::Bool(req.skip_duplicates);

    let mut job = ImportJob {
        id: Uuid::new_v4().to_string(),
        import_type: req.import_type,
        file_name: req.file_name.to_string(),
        file_sha256: req.file_sha256.map(|s| s.to_string()),
        status: JobStatus::Pending,
        total_rows: req.rows.len(),
        imported_count: 0,
        skipped_count: 0,
        error_count: 0,
        errors: Vec::new(),
        metadata,
        created_by: req.actor.map(|s| s.to_string()),
        created_at: db::now_ts(),
        completed_at: None,
        rolled_back_at: None,
    };
    // References are resolved again here: the workspace may have changed since validation.
    let refs = ReferenceData::load(conn, req.import_type)?;

    insert_job(conn, &job)?;
    advance_job(conn, &mut job, JobStatus::Importing)?;

    for row in req.rows {
        if !row.is_valid || (row.is_duplicate && req.skip_duplicates) {
            job.skipped_count += 1;
            continue;
        }
        match insert_row(conn, req.import_type, &job.id, row, &refs) {
            Ok(()) => job.imported_count += 1,
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    row = row.row_number,
                    error = %e,
                    "import row failed"
                );
                job.error_count += 1;
                job.errors.push(RowFailure {
                    row_number: row.row_number,
                    message: e.to_string(),
                });
            }
        }
    }

    let final_status = if job.error_count == 0 {
        JobStatus::Completed
    } else if job.imported_count > 0 {
        JobStatus::CompletedWithErrors
    } else {
        JobStatus::Failed
    };
    job.completed_at = Some(db::now_ts());
    advance_job(conn, &mut job, final_status)?;

    db::audit(
        conn,
        "import.execute",
        "import_job",
        &job.id,
        req.actor,
        &json!({
            "importType": job.import_type.as_str(),
            "fileName": job.file_name,
            "status": job.status.as_str(),
            "importedCount": job.imported_count,
            "skippedCount": job.skipped_count,
            "errorCount": job.error_count
        }),
    )?;
    tracing::info!(
        job_id = %job.id,
        import_type = job.import_type.as_str(),
        status = job.status.as_str(),
        imported = job.imported_count,
        skipped = job.skipped_count,
        errors = job.error_count,
        "import job finished"
    );
    Ok(job)
}

fn required(row: &ValidatedRow, key: &str) -> Result<String, RowWriteError> {
    row.text(key)
        .ok_or_else(|| RowWriteError::Reference(format!("missing value for {}", key)))
}

fn flag(row: &ValidatedRow, key: &str) -> i64 {
    match row.mapped_data.get(key) {
        Some(CellValue::Bool(true)) => 1,
        _ => 0,
    }
}

fn integer(row: &ValidatedRow, key: &str) -> Option<i64> {
    match row.mapped_data.get(key) {
        Some(CellValue::Integer(n)) => Some(*n),
        _ => None,
    }
}

fn student_id(row: &ValidatedRow, refs: &ReferenceData) -> Result<String, RowWriteError> {
    let first = required(row, "student_first_name")?;
    let last = required(row, "student_last_name")?;
    match refs.resolve_student(&first, &last) {
        Lookup::Found(id) => Ok(id),
        Lookup::Missing => Err(RowWriteError::Reference(format!(
            "student {} {} no longer exists",
            first, last
        ))),
        Lookup::Ambiguous(n) => Err(RowWriteError::Reference(format!(
            "{} students are now named {} {}",
            n, first, last
        ))),
    }
}

fn class_id(row: &ValidatedRow, refs: &ReferenceData) -> Result<Option<String>, RowWriteError> {
    let Some(name) = row.text("class_name") else {
        return Ok(None);
    };
    match refs.resolve_class(&name) {
        Lookup::Found(id) => Ok(Some(id)),
        Lookup::Missing => Err(RowWriteError::Reference(format!(
            "class '{}' no longer exists",
            name
        ))),
        Lookup::Ambiguous(n) => Err(RowWriteError::Reference(format!(
            "{} classes are now named '{}'",
            n, name
        ))),
    }
}

fn insert_row(
    conn: &Connection,
    import_type: ImportType,
    job_id: &str,
    row: &ValidatedRow,
    refs: &ReferenceData,
) -> Result<(), RowWriteError> {
    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    match import_type {
        ImportType::Students => {
            let class_id = class_id(row, refs)?;
            conn.execute(
                "INSERT INTO students(id, first_name, last_name, preferred_name, date_of_birth,
                    gender, enrollment_status, class_id, enrollment_date, notes, import_job_id,
                    created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    required(row, "first_name")?,
                    required(row, "last_name")?,
                    row.text("preferred_name"),
                    row.text("date_of_birth"),
                    row.text("gender"),
                    row.text("enrollment_status").unwrap_or_else(|| "active".to_string()),
                    class_id,
                    row.text("enrollment_date"),
                    row.text("notes"),
                    job_id,
                    now,
                ],
            )?;
        }
        ImportType::Guardians => {
            conn.execute(
                "INSERT INTO guardians(id, student_id, first_name, last_name, relationship, email,
                    phone, is_primary, pickup_authorized, import_job_id, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    student_id(row, refs)?,
                    required(row, "first_name")?,
                    required(row, "last_name")?,
                    required(row, "relationship")?,
                    row.text("email"),
                    row.text("phone"),
                    flag(row, "is_primary"),
                    flag(row, "pickup_authorized"),
                    job_id,
                    now,
                ],
            )?;
        }
        ImportType::EmergencyContacts => {
            conn.execute(
                "INSERT INTO emergency_contacts(id, student_id, name, relationship, phone_primary,
                    phone_secondary, priority_order, import_job_id, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    student_id(row, refs)?,
                    required(row, "name")?,
                    required(row, "relationship")?,
                    required(row, "phone_primary")?,
                    row.text("phone_secondary"),
                    integer(row, "priority_order").unwrap_or(1),
                    job_id,
                    now,
                ],
            )?;
        }
        ImportType::MedicalConditions => {
            conn.execute(
                "INSERT INTO medical_conditions(id, student_id, condition_type, condition_name,
                    severity, description, action_plan, requires_medication, medication_name,
                    import_job_id, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    student_id(row, refs)?,
                    required(row, "condition_type")?,
                    required(row, "condition_name")?,
                    required(row, "severity")?,
                    row.text("description"),
                    row.text("action_plan"),
                    flag(row, "requires_medication"),
                    row.text("medication_name"),
                    job_id,
                    now,
                ],
            )?;
        }
        ImportType::Staff => {
            conn.execute(
                "INSERT INTO staff(id, first_name, last_name, email, phone, role, start_date,
                    import_job_id, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    required(row, "first_name")?,
                    required(row, "last_name")?,
                    required(row, "email")?,
                    row.text("phone"),
                    required(row, "role")?,
                    row.text("start_date"),
                    job_id,
                    now,
                ],
            )?;
        }
        ImportType::Attendance => {
            conn.execute(
                "INSERT INTO attendance_records(id, student_id, date, status, check_in_time,
                    check_out_time, notes, import_job_id, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    student_id(row, refs)?,
                    required(row, "date")?,
                    required(row, "status")?,
                    row.text("check_in_time"),
                    row.text("check_out_time"),
                    row.text("notes"),
                    job_id,
                    now,
                ],
            )?;
        }
    }
    Ok(())
}
