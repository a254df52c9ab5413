//! CSV data-import pipeline: parse, suggest a mapping, validate, execute, roll back.

pub mod error;
pub mod execute;
pub mod job;
pub mod parser;
pub mod reference;
pub mod registry;
pub mod rollback;
pub mod suggest;
pub mod validate;
pub mod values;

pub use error::ImportError;
pub use execute::{execute, ExecuteRequest};
pub use parser::{check_upload, decode_upload, parse_table, Delimiter, ParsedTable};
pub use reference::ReferenceData;
pub use registry::{FieldType, ImportType, ALL_IMPORT_TYPES};
pub use rollback::rollback;
pub use suggest::{auto_mapping, missing_required, suggest_mappings, ColumnMapping, MappingSuggestion};
pub use validate::{validate, ValidationReport};

/// Capability the host application must grant before any import stage runs.
pub const MANAGE_DATA_IMPORT: &str = "manage_data_import";

pub fn file_sha256(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(bytes))
}
