use super::job::JobStatus;

/// Structural failures of the uploaded file. Any of these aborts the parse stage.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("file is empty")]
    Empty,

    #[error("file is not valid UTF-8 text (byte offset {offset})")]
    Encoding { offset: usize },

    #[error("header row is empty or contains a blank column name")]
    EmptyHeader,

    #[error("duplicate column header: {0}")]
    DuplicateHeader(String),

    #[error("line {line} has {found} columns, expected {expected}")]
    InconsistentColumns {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("file has a header row but no data rows")]
    NoDataRows,

    #[error("malformed delimited text: {0}")]
    Malformed(String),
}

/// Stage-level failures. Row-level problems are reported as data instead.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("caller lacks the {capability} capability")]
    Unauthorized { capability: &'static str },

    #[error("file is {size} bytes, maximum is {max}")]
    FileTooLarge { size: u64, max: u64 },

    #[error("unsupported file type: {file_name} (expected .csv, .tsv or .txt)")]
    UnsupportedFile { file_name: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("required fields are not mapped: {}", missing.join(", "))]
    MappingIncomplete { missing: Vec<String> },

    #[error("unknown import type: {0}")]
    UnknownImportType(String),

    #[error("import job not found: {0}")]
    JobNotFound(String),

    #[error("cannot move import job from {from} to {to}")]
    InvalidStatusTransition { from: JobStatus, to: JobStatus },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// Stable IPC error code.
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::Unauthorized { .. } => "unauthorized",
            ImportError::FileTooLarge { .. } => "file_too_large",
            ImportError::UnsupportedFile { .. } => "unsupported_file",
            ImportError::Parse(_) => "parse_failed",
            ImportError::MappingIncomplete { .. } => "mapping_incomplete",
            ImportError::UnknownImportType(_) => "bad_params",
            ImportError::JobNotFound(_) => "not_found",
            ImportError::InvalidStatusTransition { .. } => "invalid_status_transition",
            ImportError::Db(_) | ImportError::Other(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ImportError::FileTooLarge { size, max } => {
                Some(serde_json::json!({ "size": size, "maxBytes": max }))
            }
            ImportError::Parse(ParseError::InconsistentColumns {
                line,
                expected,
                found,
            }) => Some(serde_json::json!({
                "line": line,
                "expected": expected,
                "found": found
            })),
            ImportError::MappingIncomplete { missing } => {
                Some(serde_json::json!({ "missingRequired": missing }))
            }
            ImportError::InvalidStatusTransition { from, to } => Some(serde_json::json!({
                "from": from.as_str(),
                "to": to.as_str()
            })),
            _ => None,
        }
    }
}
