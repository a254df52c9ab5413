//! Coercion of raw cell text into typed values.

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern compiles")
});

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"];
const TIME_FORMATS: [&str; 4] = ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    #[serde(serialize_with = "serialize_date")]
    Date(NaiveDate),
    #[serde(serialize_with = "serialize_time")]
    Time(NaiveTime),
    Bool(bool),
    Integer(i64),
}

fn serialize_date<S: serde::Serializer>(d: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&d.format("%Y-%m-%d").to_string())
}

fn serialize_time<S: serde::Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.format("%H:%M").to_string())
}

impl CellValue {
    /// Canonical text form, used for duplicate keys and SQL parameters.
    pub fn to_db_string(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Time(t) => t.format("%H:%M").to_string(),
            CellValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            CellValue::Integer(n) => n.to_string(),
        }
    }
}

/// Dates are read day-first when ambiguous (`03/04/2020` is 3 April).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim().to_ascii_uppercase();
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(&s, f).ok())
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "x" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

pub fn is_valid_email(raw: &str) -> bool {
    EMAIL_RE.is_match(raw.trim())
}

/// Phone numbers keep their leading `+` and digits. Returns `None` when
/// anything other than separators is present or the digit count is off.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let s = raw.trim();
    let mut out = String::new();
    for (i, c) in s.chars().enumerate() {
        match c {
            '0'..='9' => out.push(c),
            '+' if i == 0 => out.push(c),
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => return None,
        }
    }
    let digits = out.chars().filter(|c| c.is_ascii_digit()).count();
    if (8..=15).contains(&digits) {
        Some(out)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_accept_iso_and_day_first() {
        let d = NaiveDate::from_ymd_opt(2019, 3, 14);
        assert_eq!(parse_date("2019-03-14"), d);
        assert_eq!(parse_date("14/03/2019"), d);
        assert_eq!(parse_date(" 14/3/2019 "), d);
        assert_eq!(parse_date("14.03.2019"), d);
        assert_eq!(parse_date("03/04/2020"), NaiveDate::from_ymd_opt(2020, 4, 3));
        assert_eq!(parse_date("2019-02-30"), None);
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn times_accept_24h_and_am_pm() {
        let t = NaiveTime::from_hms_opt(15, 10, 0);
        assert_eq!(parse_time("15:10"), t);
        assert_eq!(parse_time("3:10 pm"), t);
        assert_eq!(parse_time("03:10PM"), t);
        assert_eq!(parse_time("25:00"), None);
    }

    #[test]
    fn phones_and_emails() {
        assert_eq!(normalize_phone("0412 345 678"), Some("0412345678".into()));
        assert_eq!(normalize_phone("+61 (2) 9876-5432"), Some("+61298765432".into()));
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone("0412 ABC 678"), None);
        assert!(is_valid_email("mai.nguyen@example.com"));
        assert!(is_valid_email("o'neil+school@mail.example.edu.au"));
        assert!(!is_valid_email("mai@example"));
        assert!(!is_valid_email("mai nguyen@example.com"));
    }

    #[test]
    fn typed_values_serialize_as_plain_json() {
        let v = serde_json::to_value(CellValue::Date(
            NaiveDate::from_ymd_opt(2024, 5, 6).expect("date"),
        ))
        .expect("json");
        assert_eq!(v, serde_json::json!("2024-05-06"));
        assert_eq!(
            serde_json::to_value(CellValue::Bool(true)).expect("json"),
            serde_json::json!(true)
        );
        assert_eq!(CellValue::Bool(false).to_db_string(), "0");
    }
}
