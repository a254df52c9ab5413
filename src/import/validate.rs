use super::error::ImportError;
use super::parser::ParsedTable;
use super::reference::{natural_key, Lookup, ReferenceData};
use super::registry::{match_enum_option, EnumOption, FieldDescriptor, FieldType, ImportType};
use super::suggest::{missing_required, ColumnMapping};
use super::values::{is_valid_email, normalize_phone, parse_bool, parse_date, parse_time, CellValue};
use chrono::{Months, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const MAX_STUDENT_AGE_YEARS: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    pub field: String,
    pub message: String,
}

impl RowIssue {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedRow {
    /// 1-based position among the file's data rows.
    pub row_number: usize,
    pub mapped_data: BTreeMap<String, CellValue>,
    pub is_valid: bool,
    pub is_duplicate: bool,
    pub errors: Vec<RowIssue>,
    pub warnings: Vec<RowIssue>,
}

impl ValidatedRow {
    pub fn text(&self, key: &str) -> Option<String> {
        self.mapped_data.get(key).map(|v| v.to_db_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub error_rows: usize,
    pub duplicate_rows: usize,
}

impl ValidationSummary {
    pub fn from_rows(rows: &[ValidatedRow]) -> Self {
        let valid_rows = rows.iter().filter(|r| r.is_valid).count();
        Self {
            total_rows: rows.len(),
            valid_rows,
            error_rows: rows.len() - valid_rows,
            duplicate_rows: rows.iter().filter(|r| r.is_valid && r.is_duplicate).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub summary: ValidationSummary,
    pub rows: Vec<ValidatedRow>,
}

/// Checks every row against the registry for `import_type`. Only an
/// incomplete mapping stops the pass; row problems are collected.
pub fn validate(
    table: &ParsedTable,
    mapping: &ColumnMapping,
    import_type: ImportType,
    refs: &ReferenceData,
    today: NaiveDate,
) -> Result<ValidationReport, ImportError> {
    let fields = import_type.fields();
    let missing = missing_required(mapping, fields);
    if !missing.is_empty() {
        return Err(ImportError::MappingIncomplete { missing });
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut rows = Vec::with_capacity(table.rows.len());

    for idx in 0..table.rows.len() {
        let mut row = ValidatedRow {
            row_number: table.row_number(idx),
            mapped_data: BTreeMap::new(),
            is_valid: false,
            is_duplicate: false,
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        for field in fields {
            let raw = mapping
                .header_for(field.key)
                .and_then(|h| table.cell(idx, h))
                .map(|s| s.trim())
                .unwrap_or("");
            if raw.is_empty() {
                if field.required {
                    row.errors
                        .push(RowIssue::new(field.key, format!("{} is required", field.label)));
                }
                continue;
            }
            match coerce(field, raw, refs) {
                Ok(v) => {
                    row.mapped_data.insert(field.key.to_string(), v);
                }
                Err(msg) => row.errors.push(RowIssue::new(field.key, msg)),
            }
        }

        if import_type.references_student() {
            check_student_reference(&mut row, refs);
        }
        apply_row_rules(import_type, &mut row, today);

        row.is_valid = row.errors.is_empty();
        if row.is_valid {
            let key = natural_key_for(import_type, &row);
            if let Some(first) = seen.get(&key) {
                row.is_duplicate = true;
                row.warnings.push(RowIssue::new(
                    "",
                    format!("duplicate of row {} in this file", first),
                ));
            } else {
                if refs.has_existing(&key) {
                    row.is_duplicate = true;
                    row.warnings.push(RowIssue::new(
                        "",
                        format!("a matching {} record already exists", import_type.as_str()),
                    ));
                }
                seen.insert(key, row.row_number);
            }
        }
        rows.push(row);
    }

    let summary = ValidationSummary::from_rows(&rows);
    tracing::debug!(
        import_type = import_type.as_str(),
        total = summary.total_rows,
        valid = summary.valid_rows,
        errors = summary.error_rows,
        duplicates = summary.duplicate_rows,
        "validation pass finished"
    );
    Ok(ValidationReport { summary, rows })
}

pub fn natural_key_for(import_type: ImportType, row: &ValidatedRow) -> String {
    let parts = import_type
        .natural_key_fields()
        .iter()
        .map(|k| row.text(k).unwrap_or_default())
        .collect::<Vec<_>>();
    natural_key(parts.iter().map(|s| s.as_str()))
}

fn enum_options_hint(options: &[EnumOption]) -> String {
    options.iter().map(|o| o.value).collect::<Vec<_>>().join(", ")
}

fn coerce(field: &FieldDescriptor, raw: &str, refs: &ReferenceData) -> Result<CellValue, String> {
    match field.field_type {
        FieldType::Text => Ok(CellValue::Text(raw.to_string())),
        FieldType::Date => parse_date(raw)
            .map(CellValue::Date)
            .ok_or_else(|| format!("'{}' is not a valid date (use YYYY-MM-DD or DD/MM/YYYY)", raw)),
        FieldType::Time => parse_time(raw)
            .map(CellValue::Time)
            .ok_or_else(|| format!("'{}' is not a valid time (use HH:MM)", raw)),
        FieldType::Email => {
            if is_valid_email(raw) {
                Ok(CellValue::Text(raw.to_lowercase()))
            } else {
                Err(format!("'{}' is not a valid email address", raw))
            }
        }
        FieldType::Phone => normalize_phone(raw)
            .map(CellValue::Text)
            .ok_or_else(|| format!("'{}' is not a valid phone number", raw)),
        FieldType::Boolean => parse_bool(raw)
            .map(CellValue::Bool)
            .ok_or_else(|| format!("'{}' is not yes/no", raw)),
        FieldType::Integer { min, max } => match raw.parse::<i64>() {
            Ok(n) if (min..=max).contains(&n) => Ok(CellValue::Integer(n)),
            Ok(_) => Err(format!("{} must be between {} and {}", field.label, min, max)),
            Err(_) => Err(format!("'{}' is not a whole number", raw)),
        },
        FieldType::Enum(options) => match_enum_option(options, raw)
            .map(|v| CellValue::Text(v.to_string()))
            .ok_or_else(|| {
                format!(
                    "'{}' is not a valid {} (expected one of: {})",
                    raw,
                    field.label,
                    enum_options_hint(options)
                )
            }),
        FieldType::ClassRef => match refs.resolve_class(raw) {
            Lookup::Found(_) => Ok(CellValue::Text(raw.to_string())),
            Lookup::Missing => Err(format!("class '{}' does not exist", raw)),
            Lookup::Ambiguous(n) => Err(format!("{} classes are named '{}'", n, raw)),
        },
    }
}

fn check_student_reference(row: &mut ValidatedRow, refs: &ReferenceData) {
    let (Some(first), Some(last)) = (row.text("student_first_name"), row.text("student_last_name"))
    else {
        return;
    };
    match refs.resolve_student(&first, &last) {
        Lookup::Found(_) => {}
        Lookup::Missing => row.errors.push(RowIssue::new(
            "student_last_name",
            format!("no student named {} {}", first, last),
        )),
        Lookup::Ambiguous(n) => row.errors.push(RowIssue::new(
            "student_last_name",
            format!("{} students are named {} {}", n, first, last),
        )),
    }
}

fn date_of(row: &ValidatedRow, key: &str) -> Option<NaiveDate> {
    match row.mapped_data.get(key) {
        Some(CellValue::Date(d)) => Some(*d),
        _ => None,
    }
}

fn apply_row_rules(import_type: ImportType, row: &mut ValidatedRow, today: NaiveDate) {
    match import_type {
        ImportType::Students => {
            if let Some(dob) = date_of(row, "date_of_birth") {
                if dob > today {
                    row.errors
                        .push(RowIssue::new("date_of_birth", "Date of Birth is in the future"));
                } else if today
                    .checked_sub_months(Months::new(12 * MAX_STUDENT_AGE_YEARS))
                    .map(|limit| dob < limit)
                    .unwrap_or(false)
                {
                    row.warnings.push(RowIssue::new(
                        "date_of_birth",
                        format!("student would be older than {} years", MAX_STUDENT_AGE_YEARS),
                    ));
                }
                if let Some(enrolled) = date_of(row, "enrollment_date") {
                    if enrolled < dob {
                        row.errors.push(RowIssue::new(
                            "enrollment_date",
                            "Enrollment Date is before Date of Birth",
                        ));
                    }
                }
            }
        }
        ImportType::Guardians => {
            if !row.mapped_data.contains_key("email") && !row.mapped_data.contains_key("phone") {
                row.warnings.push(RowIssue::new(
                    "email",
                    "guardian has neither email nor phone",
                ));
            }
        }
        ImportType::EmergencyContacts => {
            if row.text("phone_secondary").is_some()
                && row.text("phone_secondary") == row.text("phone_primary")
            {
                row.warnings.push(RowIssue::new(
                    "phone_secondary",
                    "Secondary Phone repeats Primary Phone",
                ));
            }
        }
        ImportType::MedicalConditions => {
            let needs = matches!(
                row.mapped_data.get("requires_medication"),
                Some(CellValue::Bool(true))
            );
            if needs && !row.mapped_data.contains_key("medication_name") {
                row.warnings.push(RowIssue::new(
                    "medication_name",
                    "medication required but no Medication Name given",
                ));
            }
        }
        ImportType::Staff => {}
        ImportType::Attendance => {
            if let Some(d) = date_of(row, "date") {
                if d > today {
                    row.warnings.push(RowIssue::new("date", "attendance date is in the future"));
                }
            }
            let check_in = row.mapped_data.get("check_in_time");
            let check_out = row.mapped_data.get("check_out_time");
            if let (Some(CellValue::Time(i)), Some(CellValue::Time(o))) = (check_in, check_out) {
                if o < i {
                    row.errors.push(RowIssue::new(
                        "check_out_time",
                        "Check Out Time is before Check In Time",
                    ));
                }
            }
        }
    }
}
