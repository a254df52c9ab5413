use crate::db;
use crate::import::parser::DEFAULT_MAX_FILE_BYTES;
use crate::import::suggest::{DEFAULT_AUTO_APPLY_THRESHOLD, DEFAULT_HINT_THRESHOLD};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

const MIN_FILE_BYTES: i64 = 1024;
const MAX_FILE_BYTES_CEILING: i64 = 50 * 1024 * 1024;

#[derive(Clone, Copy)]
enum SetupSection {
    Import,
    Mapping,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(Self::Import),
            "mapping" => Some(Self::Mapping),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Import => "setup.import",
            Self::Mapping => "setup.mapping",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Import => json!({
            "maxFileBytes": DEFAULT_MAX_FILE_BYTES,
            "previewRows": 10,
            "historyLimit": 20,
            "skipDuplicatesByDefault": true
        }),
        SetupSection::Mapping => json!({
            "autoApplyThreshold": DEFAULT_AUTO_APPLY_THRESHOLD,
            "hintThreshold": DEFAULT_HINT_THRESHOLD
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_unit_interval(v: &Value, key: &str) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(0.0..=1.0).contains(&n) {
        return Err(format!("{} must be in 0..=1", key));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Import => match k.as_str() {
                "maxFileBytes" => {
                    let n = parse_i64_range(v, k, MIN_FILE_BYTES, MAX_FILE_BYTES_CEILING)?;
                    obj.insert(k.clone(), Value::from(n));
                }
                "previewRows" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 100)?));
                }
                "historyLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 200)?));
                }
                "skipDuplicatesByDefault" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown import field: {}", k)),
            },
            SetupSection::Mapping => match k.as_str() {
                "autoApplyThreshold" | "hintThreshold" => {
                    obj.insert(k.clone(), Value::from(parse_unit_interval(v, k)?));
                }
                _ => return Err(format!("unknown mapping field: {}", k)),
            },
        }
    }
    if let SetupSection::Mapping = section {
        let auto = obj.get("autoApplyThreshold").and_then(|v| v.as_f64());
        let hint = obj.get("hintThreshold").and_then(|v| v.as_f64());
        if let (Some(auto), Some(hint)) = (auto, hint) {
            if hint > auto {
                return Err("hintThreshold must not exceed autoApplyThreshold".into());
            }
        }
    }
    Ok(())
}

fn load_section(
    conn: &rusqlite::Connection,
    section: SetupSection,
) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a bad stored value falls back to the default.
            let mut merged = current.clone();
            if merge_section_patch(section, &mut merged, saved_obj).is_ok() {
                current = merged;
            } else {
                tracing::warn!(key = section.key(), "ignoring invalid stored settings");
            }
        }
    }
    Ok(current)
}

/// Effective import settings for a workspace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportSettings {
    pub max_file_bytes: u64,
    pub preview_rows: usize,
    pub history_limit: usize,
    pub skip_duplicates_by_default: bool,
    pub auto_apply_threshold: f64,
    pub hint_threshold: f64,
}

impl ImportSettings {
    pub fn load(conn: &rusqlite::Connection) -> anyhow::Result<Self> {
        let import = load_section(conn, SetupSection::Import)?;
        let mapping = load_section(conn, SetupSection::Mapping)?;
        Ok(Self {
            max_file_bytes: import["maxFileBytes"]
                .as_u64()
                .unwrap_or(DEFAULT_MAX_FILE_BYTES),
            preview_rows: import["previewRows"].as_u64().unwrap_or(10) as usize,
            history_limit: import["historyLimit"].as_u64().unwrap_or(20) as usize,
            skip_duplicates_by_default: import["skipDuplicatesByDefault"]
                .as_bool()
                .unwrap_or(true),
            auto_apply_threshold: mapping["autoApplyThreshold"]
                .as_f64()
                .unwrap_or(DEFAULT_AUTO_APPLY_THRESHOLD),
            hint_threshold: mapping["hintThreshold"]
                .as_f64()
                .unwrap_or(DEFAULT_HINT_THRESHOLD),
        })
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let import = match load_section(conn, SetupSection::Import) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mapping = match load_section(conn, SetupSection::Mapping) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "import": import, "mapping": mapping }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true, "section": section_raw, "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
