use std::collections::HashSet;
use std::path::PathBuf;

use crate::import::{ColumnMapping, ImportType, MappingSuggestion, ParsedTable, ValidationReport};
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Caller identity as asserted by the host application.
#[derive(Debug, Default)]
pub struct Session {
    pub user_id: Option<String>,
    pub capabilities: HashSet<String>,
}

impl Session {
    pub fn has(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// One in-progress upload, carried between `import.parse` and `import.execute`.
pub struct ImportWizard {
    pub import_type: ImportType,
    pub file_name: String,
    pub file_sha256: String,
    pub table: ParsedTable,
    pub suggestions: Vec<MappingSuggestion>,
    pub mapping: ColumnMapping,
    /// Cleared whenever the mapping changes.
    pub validation: Option<ValidationReport>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Session,
    pub wizard: Option<ImportWizard>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            session: Session::default(),
            wizard: None,
        }
    }
}
