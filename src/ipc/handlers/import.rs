use crate::import::job::{find_jobs_by_checksum, list_jobs};
use crate::import::registry::{template_csv, template_file_name, FieldDescriptor};
use crate::import::{
    auto_mapping, check_upload, decode_upload, execute, file_sha256, missing_required,
    parse_table, rollback, suggest_mappings, ColumnMapping, Delimiter, ExecuteRequest, FieldType,
    ImportError, ImportType, ReferenceData, ALL_IMPORT_TYPES, MANAGE_DATA_IMPORT,
};
use crate::ipc::error::{err, import_err, ok};
use crate::ipc::handlers::setup::ImportSettings;
use crate::ipc::types::{AppState, ImportWizard, Request};
use serde_json::{json, Map, Value};

const MAX_HISTORY_LIMIT: u64 = 200;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }

    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }
}

impl From<ImportError> for HandlerErr {
    fn from(e: ImportError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

fn require_capability(state: &AppState) -> Result<(), HandlerErr> {
    if state.session.has(MANAGE_DATA_IMPORT) {
        Ok(())
    } else {
        Err(ImportError::Unauthorized {
            capability: MANAGE_DATA_IMPORT,
        }
        .into())
    }
}

fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

fn get_import_type(params: &Value) -> Result<ImportType, HandlerErr> {
    let raw = get_required_str(params, "importType")?;
    ImportType::parse(&raw).ok_or_else(|| ImportError::UnknownImportType(raw).into())
}

fn no_session() -> HandlerErr {
    HandlerErr::new("no_session", "no import in progress; call import.parse first")
}

fn delimiter_name(b: u8) -> &'static str {
    match b {
        b'\t' => "tab",
        b';' => "semicolon",
        _ => "comma",
    }
}

fn field_json(f: &FieldDescriptor) -> Value {
    let mut out = json!({
        "key": f.key,
        "label": f.label,
        "required": f.required,
        "type": f.field_type.as_str(),
        "example": f.example,
        "synonyms": f.synonyms,
    });
    match f.field_type {
        FieldType::Enum(options) => {
            out["options"] = options.iter().map(|o| o.value).collect::<Vec<_>>().into();
        }
        FieldType::Integer { min, max } => {
            out["min"] = min.into();
            out["max"] = max.into();
        }
        _ => {}
    }
    out
}

fn mapping_json(wizard: &ImportWizard) -> Value {
    json!({
        "mapping": wizard.mapping,
        "missingRequired": missing_required(&wizard.mapping, wizard.import_type.fields())
    })
}

fn handle_types(_state: &mut AppState, req: &Request) -> Value {
    let types = ALL_IMPORT_TYPES
        .iter()
        .map(|t| {
            json!({
                "importType": t.as_str(),
                "label": t.label(),
                "fields": t.fields().iter().map(field_json).collect::<Vec<_>>()
            })
        })
        .collect::<Vec<_>>();
    ok(&req.id, json!({ "types": types }))
}

fn handle_template(_state: &mut AppState, req: &Request) -> Value {
    let import_type = match get_import_type(&req.params) {
        Ok(t) => t,
        Err(e) => return e.response(&req.id),
    };
    ok(
        &req.id,
        json!({
            "importType": import_type.as_str(),
            "fileName": template_file_name(import_type),
            "content": template_csv(import_type)
        }),
    )
}

/// Reads the upload body from `text` or from a file at `inPath`. The size gate
/// runs on file metadata so an oversized file is never read into memory.
fn load_upload(params: &Value, file_name: &str, max_bytes: u64) -> Result<Vec<u8>, HandlerErr> {
    if let Some(text) = params.get("text").and_then(|v| v.as_str()) {
        check_upload(file_name, text.len() as u64, max_bytes)?;
        return Ok(text.as_bytes().to_vec());
    }
    let Some(in_path) = params.get("inPath").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::new("bad_params", "provide text or inPath"));
    };
    let io_err = |e: std::io::Error| HandlerErr {
        code: "parse_failed",
        message: e.to_string(),
        details: Some(json!({ "path": in_path })),
    };
    let size = std::fs::metadata(in_path).map_err(io_err)?.len();
    check_upload(file_name, size, max_bytes)?;
    std::fs::read(in_path).map_err(io_err)
}

fn parse_upload(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    require_capability(state)?;
    // A new upload replaces the session even when it is rejected.
    if state.wizard.take().is_some() {
        tracing::debug!("previous import session discarded by new upload");
    }
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let import_type = get_import_type(&req.params)?;
    let file_name = get_required_str(&req.params, "fileName")?;
    let delimiter = match req.params.get("delimiter").and_then(|v| v.as_str()) {
        Some(raw) => Delimiter::parse(raw)
            .ok_or_else(|| HandlerErr::new("bad_params", format!("unknown delimiter: {}", raw)))?,
        None => Delimiter::for_file_name(&file_name),
    };
    let settings = ImportSettings::load(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    let bytes = load_upload(&req.params, &file_name, settings.max_file_bytes)?;
    let sha = file_sha256(&bytes);
    let text = decode_upload(&bytes).map_err(ImportError::from)?;
    let table = parse_table(text, delimiter).map_err(ImportError::from)?;

    let fields = import_type.fields();
    let suggestions = suggest_mappings(&table.headers, fields, settings.hint_threshold);
    let mapping = auto_mapping(&suggestions, settings.auto_apply_threshold);
    let previous = find_jobs_by_checksum(conn, &sha)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    tracing::info!(
        import_type = import_type.as_str(),
        file = %file_name,
        rows = table.rows.len(),
        columns = table.headers.len(),
        auto_mapped = mapping.len(),
        "import file parsed"
    );

    let suggestions_json = suggestions
        .iter()
        .map(|s| {
            json!({
                "sourceHeader": s.source_header,
                "targetFieldKey": s.target_field_key,
                "confidence": s.confidence,
                "kind": if s.is_auto(settings.auto_apply_threshold) { "auto" } else { "hint" },
                "autoApplied": mapping.field_for(&s.source_header) == Some(s.target_field_key.as_str())
            })
        })
        .collect::<Vec<_>>();
    let wizard = ImportWizard {
        import_type,
        file_name,
        file_sha256: sha,
        table,
        suggestions,
        mapping,
        validation: None,
    };
    let mut result = json!({
        "importType": import_type.as_str(),
        "fileName": wizard.file_name,
        "fileSha256": wizard.file_sha256,
        "headers": wizard.table.headers,
        "rowCount": wizard.table.rows.len(),
        "blankRowsSkipped": wizard.table.raw_row_count - wizard.table.rows.len(),
        "delimiter": delimiter_name(wizard.table.delimiter),
        "preview": wizard.table.rows.iter().take(settings.preview_rows).collect::<Vec<_>>(),
        "suggestions": suggestions_json,
        "previousJobs": previous.iter().map(|j| j.to_json()).collect::<Vec<_>>()
    });
    if let (Value::Object(out), Value::Object(m)) = (&mut result, mapping_json(&wizard)) {
        out.extend(m);
    }
    state.wizard = Some(wizard);
    Ok(result)
}

fn set_mapping(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    require_capability(state)?;
    let Some(wizard) = state.wizard.as_mut() else {
        return Err(no_session());
    };
    let header = req
        .params
        .get("sourceHeader")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::new("bad_params", "missing sourceHeader"))?;
    if !wizard.table.headers.iter().any(|h| h == header) {
        return Err(HandlerErr::new(
            "bad_params",
            format!("unknown source header: {}", header),
        ));
    }
    let field_key = match req.params.get("fieldKey") {
        None | Some(Value::Null) => None,
        Some(Value::String(k)) => {
            if wizard.import_type.field(k).is_none() {
                return Err(HandlerErr::new(
                    "bad_params",
                    format!("unknown field for {}: {}", wizard.import_type.as_str(), k),
                ));
            }
            Some(k.as_str())
        }
        Some(_) => return Err(HandlerErr::new("bad_params", "fieldKey must be a string or null")),
    };

    let displaced = wizard.mapping.assign(header, field_key);
    wizard.validation = None;
    let mut result = mapping_json(wizard);
    result["displacedHeader"] = displaced.into();
    result["suggestions"] = json!(wizard.suggestions);
    Ok(result)
}

fn mapping_from_params(wizard: &ImportWizard, raw: &Map<String, Value>) -> Result<ColumnMapping, HandlerErr> {
    let mut pairs = Vec::new();
    for (header, key) in raw {
        if !wizard.table.headers.iter().any(|h| h == header) {
            return Err(HandlerErr::new(
                "bad_params",
                format!("unknown source header: {}", header),
            ));
        }
        match key {
            Value::Null => continue,
            Value::String(k) if wizard.import_type.field(k).is_some() => {
                pairs.push((header.clone(), k.clone()))
            }
            _ => {
                return Err(HandlerErr::new(
                    "bad_params",
                    format!("invalid field for header {}", header),
                ))
            }
        }
    }
    ColumnMapping::try_from_pairs(pairs).map_err(|key| HandlerErr {
        code: "bad_params",
        message: format!("field {} is mapped by more than one column", key),
        details: Some(json!({ "fieldKey": key })),
    })
}

fn run_validation(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    require_capability(state)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let Some(wizard) = state.wizard.as_mut() else {
        return Err(no_session());
    };
    if let Some(raw) = req.params.get("mapping").filter(|v| !v.is_null()) {
        let Some(obj) = raw.as_object() else {
            return Err(HandlerErr::new("bad_params", "mapping must be an object"));
        };
        wizard.mapping = mapping_from_params(wizard, obj)?;
        wizard.validation = None;
    }

    let refs = ReferenceData::load(conn, wizard.import_type)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let today = chrono::Local::now().date_naive();
    let report = crate::import::validate(
        &wizard.table,
        &wizard.mapping,
        wizard.import_type,
        &refs,
        today,
    )?;
    tracing::info!(
        import_type = wizard.import_type.as_str(),
        total = report.summary.total_rows,
        valid = report.summary.valid_rows,
        errors = report.summary.error_rows,
        duplicates = report.summary.duplicate_rows,
        "import file validated"
    );
    let result = json!({
        "summary": report.summary,
        "rows": report.rows,
        "mapping": wizard.mapping
    });
    wizard.validation = Some(report);
    Ok(result)
}

fn run_execute(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    require_capability(state)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let Some(wizard) = state.wizard.as_ref() else {
        return Err(no_session());
    };
    let Some(report) = wizard.validation.as_ref() else {
        return Err(HandlerErr::new(
            "not_validated",
            "validate the current mapping before importing",
        ));
    };
    let skip_duplicates = match req.params.get("skipDuplicates") {
        None | Some(Value::Null) => ImportSettings::load(conn)
            .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?
            .skip_duplicates_by_default,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::new("bad_params", "skipDuplicates must be boolean"))?,
    };
    let metadata = req.params.get("metadata").cloned().unwrap_or(Value::Null);

    let job = execute(
        conn,
        ExecuteRequest {
            import_type: wizard.import_type,
            file_name: &wizard.file_name,
            file_sha256: Some(wizard.file_sha256.as_str()),
            mapping: &wizard.mapping,
            rows: &report.rows,
            metadata,
            skip_duplicates,
            actor: state.session.user_id.as_deref(),
        },
    )
    .map_err(|e| match e {
        ImportError::Db(e) => HandlerErr::new("db_insert_failed", e.to_string()),
        other => other.into(),
    })?;

    state.wizard = None;
    Ok(json!({ "job": job.to_json() }))
}

fn run_rollback(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    require_capability(state)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let job_id = get_required_str(&req.params, "jobId")?;
    let outcome = rollback(conn, &job_id, state.session.user_id.as_deref()).map_err(|e| match e {
        ImportError::Db(e) => HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: Some(json!({ "jobId": job_id })),
        },
        other => other.into(),
    })?;
    Ok(json!({
        "job": outcome.job.to_json(),
        "deletedRows": outcome.deleted_rows
    }))
}

fn handle_jobs_list(state: &mut AppState, req: &Request) -> Value {
    if let Err(e) = require_capability(state) {
        return e.response(&req.id);
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let limit = match req.params.get("limit") {
        None | Some(Value::Null) => match ImportSettings::load(conn) {
            Ok(s) => s.history_limit,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Some(v) => match v.as_u64().filter(|n| (1..=MAX_HISTORY_LIMIT).contains(n)) {
            Some(n) => n as usize,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("limit must be an integer in 1..={}", MAX_HISTORY_LIMIT),
                    None,
                )
            }
        },
    };
    match list_jobs(conn, limit) {
        Ok(jobs) => ok(
            &req.id,
            json!({ "jobs": jobs.iter().map(|j| j.to_json()).collect::<Vec<_>>() }),
        ),
        Err(e) => import_err(&req.id, &ImportError::Db(e)),
    }
}

fn handle_reset(state: &mut AppState, req: &Request) -> Value {
    if let Err(e) = require_capability(state) {
        return e.response(&req.id);
    }
    let discarded = state.wizard.take().is_some();
    ok(&req.id, json!({ "discarded": discarded }))
}

fn respond(req: &Request, r: Result<Value, HandlerErr>) -> Value {
    match r {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "import.types" => Some(handle_types(state, req)),
        "import.template" => Some(handle_template(state, req)),
        "import.parse" => Some(respond(req, parse_upload(state, req))),
        "import.mapping.set" => Some(respond(req, set_mapping(state, req))),
        "import.validate" => Some(respond(req, run_validation(state, req))),
        "import.execute" => Some(respond(req, run_execute(state, req))),
        "import.rollback" => Some(respond(req, run_rollback(state, req))),
        "import.jobs.list" => Some(handle_jobs_list(state, req)),
        "import.reset" => Some(handle_reset(state, req)),
        _ => None,
    }
}
