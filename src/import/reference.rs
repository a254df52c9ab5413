//! Workspace data the validator checks rows against: existing classes,
//! existing students, and natural keys of records already on file.

use super::registry::ImportType;
use anyhow::Context;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(String),
    Missing,
    Ambiguous(usize),
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    classes: HashMap<String, Vec<String>>,
    students: HashMap<String, Vec<String>>,
    existing_keys: HashSet<String>,
}

pub fn normalize_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn natural_key<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .map(normalize_key)
        .collect::<Vec<_>>()
        .join("|")
}

fn student_name_key(first: &str, last: &str) -> String {
    natural_key([last, first])
}

fn pick(ids: Option<&Vec<String>>) -> Lookup {
    match ids.map(|v| v.as_slice()) {
        None | Some([]) => Lookup::Missing,
        Some([only]) => Lookup::Found(only.clone()),
        Some(many) => Lookup::Ambiguous(many.len()),
    }
}

impl ReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, id: &str, name: &str) {
        self.classes
            .entry(normalize_key(name))
            .or_default()
            .push(id.to_string());
    }

    pub fn add_student(&mut self, id: &str, first: &str, last: &str) {
        self.students
            .entry(student_name_key(first, last))
            .or_default()
            .push(id.to_string());
    }

    pub fn add_existing_key(&mut self, key: String) {
        self.existing_keys.insert(key);
    }

    pub fn resolve_class(&self, name: &str) -> Lookup {
        pick(self.classes.get(&normalize_key(name)))
    }

    pub fn resolve_student(&self, first: &str, last: &str) -> Lookup {
        pick(self.students.get(&student_name_key(first, last)))
    }

    pub fn has_existing(&self, key: &str) -> bool {
        self.existing_keys.contains(key)
    }

    /// Snapshot of the workspace as it is right now.
    pub fn load(conn: &Connection, import_type: ImportType) -> anyhow::Result<Self> {
        let mut out = Self::new();

        let mut stmt = conn.prepare("SELECT id, name FROM classes")?;
        let classes = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to load classes")?;
        for (id, name) in classes {
            out.add_class(&id, &name);
        }

        let mut stmt = conn.prepare("SELECT id, first_name, last_name FROM students")?;
        let students = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to load students")?;
        for (id, first, last) in students {
            out.add_student(&id, &first, &last);
        }

        let sql = match import_type {
            ImportType::Students => {
                "SELECT first_name, last_name, COALESCE(date_of_birth, '') FROM students"
            }
            ImportType::Guardians => {
                "SELECT s.first_name, s.last_name, g.first_name, g.last_name
                 FROM guardians g JOIN students s ON s.id = g.student_id"
            }
            ImportType::EmergencyContacts => {
                "SELECT s.first_name, s.last_name, e.name
                 FROM emergency_contacts e JOIN students s ON s.id = e.student_id"
            }
            ImportType::MedicalConditions => {
                "SELECT s.first_name, s.last_name, m.condition_name
                 FROM medical_conditions m JOIN students s ON s.id = m.student_id"
            }
            ImportType::Staff => "SELECT email FROM staff",
            ImportType::Attendance => {
                "SELECT s.first_name, s.last_name, a.date
                 FROM attendance_records a JOIN students s ON s.id = a.student_id"
            }
        };
        let width = import_type.natural_key_fields().len();
        let mut stmt = conn.prepare(sql)?;
        let keys = stmt
            .query_map([], |r| {
                let mut parts = Vec::with_capacity(width);
                for i in 0..width {
                    parts.push(r.get::<_, String>(i)?);
                }
                Ok(natural_key(parts.iter().map(|s| s.as_str())))
            })?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("failed to load existing {}", import_type.as_str()))?;
        for key in keys {
            out.add_existing_key(key);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case_and_spacing() {
        let mut r = ReferenceData::new();
        r.add_class("c1", "Banksia Room");
        r.add_student("s1", "Olivia", "Nguyen");
        r.add_student("s2", "Ari", "Cohen");
        r.add_student("s3", "Ari", "Cohen");

        assert_eq!(r.resolve_class("  banksia   ROOM "), Lookup::Found("c1".into()));
        assert_eq!(r.resolve_class("Wattle Room"), Lookup::Missing);
        assert_eq!(r.resolve_student("olivia", "NGUYEN"), Lookup::Found("s1".into()));
        assert_eq!(r.resolve_student("Ari", "Cohen"), Lookup::Ambiguous(2));
    }

    #[test]
    fn natural_keys_are_normalized() {
        assert_eq!(natural_key(["  Olivia ", "NGUYEN", "2019-03-14"]), "olivia|nguyen|2019-03-14");
        let mut r = ReferenceData::new();
        r.add_existing_key(natural_key(["a@b.com"]));
        assert!(r.has_existing("a@b.com"));
    }
}
