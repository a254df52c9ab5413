use super::registry::FieldDescriptor;
use serde::Serialize;
use std::collections::BTreeMap;

/// Suggestions at or above this confidence are applied without asking.
pub const DEFAULT_AUTO_APPLY_THRESHOLD: f64 = 0.7;
/// Suggestions below this confidence are not surfaced at all.
pub const DEFAULT_HINT_THRESHOLD: f64 = 0.6;

const CONTAINMENT_WEIGHT: f64 = 0.85;
const MIN_CONTAINED_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSuggestion {
    pub source_header: String,
    pub target_field_key: String,
    pub confidence: f64,
}

impl MappingSuggestion {
    pub fn is_auto(&self, auto_apply_threshold: f64) -> bool {
        self.confidence >= auto_apply_threshold
    }
}

/// Operator-confirmed association of source headers to target field keys.
/// A field key is held by at most one header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    by_header: BTreeMap<String, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping from explicit pairs. Returns the offending field key
    /// when two headers claim the same field.
    pub fn try_from_pairs<I>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut out = Self::new();
        for (header, key) in pairs {
            if out.header_for(&key).is_some() {
                return Err(key);
            }
            out.by_header.insert(header, key);
        }
        Ok(out)
    }

    /// Map `header` to `key` (or unmap it with `None`). Any other header that
    /// held `key` loses it; that header is returned.
    pub fn assign(&mut self, header: &str, key: Option<&str>) -> Option<String> {
        let Some(key) = key else {
            self.by_header.remove(header);
            return None;
        };
        let previous = self
            .header_for(key)
            .filter(|h| *h != header)
            .map(|h| h.to_string());
        if let Some(prev) = previous.as_deref() {
            self.by_header.remove(prev);
        }
        self.by_header.insert(header.to_string(), key.to_string());
        previous
    }

    pub fn field_for(&self, header: &str) -> Option<&str> {
        self.by_header.get(header).map(|s| s.as_str())
    }

    pub fn header_for(&self, key: &str) -> Option<&str> {
        self.by_header
            .iter()
            .find(|(_, k)| k.as_str() == key)
            .map(|(h, _)| h.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_header.is_empty()
    }
}

/// Lowercase and drop everything that is not a letter or digit.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Similarity of two normalized strings in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let ac: Vec<char> = a.chars().collect();
    let bc: Vec<char> = b.chars().collect();
    let longest = ac.len().max(bc.len());
    let edit = 1.0 - levenshtein(&ac, &bc) as f64 / longest as f64;

    let shortest = ac.len().min(bc.len());
    let contained = shortest >= MIN_CONTAINED_LEN && (a.contains(b) || b.contains(a));
    let containment = if contained {
        CONTAINMENT_WEIGHT * shortest as f64 / longest as f64
    } else {
        0.0
    };
    edit.max(containment)
}

/// Best score of a normalized header against a field's key, label and synonyms.
/// The flag is true when one of them matched exactly.
fn score_field(header: &str, field: &FieldDescriptor) -> (f64, bool) {
    let candidates = [field.key, field.label]
        .into_iter()
        .chain(field.synonyms.iter().copied());
    let mut best = (0.0f64, false);
    for c in candidates {
        let c = normalize(c);
        if c == header {
            return (1.0, true);
        }
        let s = similarity(header, &c);
        if s > best.0 {
            best = (s, false);
        }
    }
    best
}

/// At most one suggestion per header, for headers whose best field scores at
/// least `floor`. Exact matches beat fuzzy ones; remaining ties go to the
/// field declared first.
pub fn suggest_mappings(
    headers: &[String],
    fields: &[FieldDescriptor],
    floor: f64,
) -> Vec<MappingSuggestion> {
    let mut out = Vec::new();
    for header in headers {
        let norm = normalize(header);
        if norm.is_empty() {
            continue;
        }
        let mut best: Option<(&FieldDescriptor, f64, bool)> = None;
        for f in fields {
            let (score, exact) = score_field(&norm, f);
            let better = match best {
                None => true,
                Some((_, s, e)) => score > s || (score == s && exact && !e),
            };
            if better {
                best = Some((f, score, exact));
            }
        }
        if let Some((f, score, _)) = best {
            if score >= floor {
                out.push(MappingSuggestion {
                    source_header: header.clone(),
                    target_field_key: f.key.to_string(),
                    confidence: score,
                });
            }
        }
    }
    out
}

/// Mapping built from the confident suggestions. When two headers want the
/// same field the more confident one keeps it (earlier header on a tie).
pub fn auto_mapping(suggestions: &[MappingSuggestion], threshold: f64) -> ColumnMapping {
    let mut ranked = suggestions
        .iter()
        .filter(|s| s.is_auto(threshold))
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut mapping = ColumnMapping::new();
    for s in ranked {
        if mapping.header_for(&s.target_field_key).is_none() {
            mapping.assign(&s.source_header, Some(&s.target_field_key));
        }
    }
    mapping
}

pub fn missing_required(mapping: &ColumnMapping, fields: &[FieldDescriptor]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| f.required && mapping.header_for(f.key).is_none())
        .map(|f| f.key.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::parser::{parse_table, Delimiter};
    use crate::import::registry::{template_csv, ImportType, ALL_IMPORT_TYPES};

    fn headers(hs: &[&str]) -> Vec<String> {
        hs.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn template_headers_round_trip_with_full_confidence() {
        for t in ALL_IMPORT_TYPES {
            let table = parse_table(&template_csv(t), Delimiter::Auto).expect("template parses");
            let s = suggest_mappings(&table.headers, t.fields(), DEFAULT_HINT_THRESHOLD);
            assert_eq!(s.len(), t.fields().len(), "{}", t.as_str());
            for (sugg, field) in s.iter().zip(t.fields()) {
                assert_eq!(sugg.target_field_key, field.key, "{}", t.as_str());
                assert_eq!(sugg.confidence, 1.0);
            }
            let mapping = auto_mapping(&s, DEFAULT_AUTO_APPLY_THRESHOLD);
            assert!(missing_required(&mapping, t.fields()).is_empty());
        }
    }

    #[test]
    fn synonyms_and_typos_are_suggested() {
        let fields = ImportType::Students.fields();
        let s = suggest_mappings(
            &headers(&["First Name", "SURNAME", "D.O.B", "Frist Name", "Shoe Size"]),
            fields,
            DEFAULT_HINT_THRESHOLD,
        );
        let by_header = |h: &str| s.iter().find(|x| x.source_header == h).cloned();
        assert_eq!(by_header("First Name").map(|x| x.target_field_key), Some("first_name".into()));
        assert_eq!(by_header("SURNAME").map(|x| x.confidence), Some(1.0));
        assert_eq!(
            by_header("D.O.B").map(|x| x.target_field_key),
            Some("date_of_birth".into())
        );
        let typo = by_header("Frist Name").expect("typo suggestion");
        assert_eq!(typo.target_field_key, "first_name");
        assert!(typo.confidence >= 0.7 && typo.confidence < 1.0);
        assert!(by_header("Shoe Size").is_none());
    }

    #[test]
    fn auto_mapping_keeps_field_keys_unique() {
        let fields = ImportType::Students.fields();
        let s = suggest_mappings(
            &headers(&["Frist Name", "First Name"]),
            fields,
            DEFAULT_HINT_THRESHOLD,
        );
        assert_eq!(s.len(), 2);
        let m = auto_mapping(&s, DEFAULT_AUTO_APPLY_THRESHOLD);
        assert_eq!(m.len(), 1);
        assert_eq!(m.header_for("first_name"), Some("First Name"));
    }

    #[test]
    fn assign_moves_a_field_between_headers() {
        let mut m = ColumnMapping::new();
        assert_eq!(m.assign("Given", Some("first_name")), None);
        assert_eq!(m.assign("Name", Some("first_name")), Some("Given".to_string()));
        assert_eq!(m.field_for("Given"), None);
        assert_eq!(m.header_for("first_name"), Some("Name"));
        m.assign("Name", Some("first_name"));
        assert_eq!(m.len(), 1);
        m.assign("Name", None);
        assert!(m.is_empty());

        assert_eq!(
            ColumnMapping::try_from_pairs(vec![
                ("A".to_string(), "first_name".to_string()),
                ("B".to_string(), "first_name".to_string()),
            ]),
            Err("first_name".to_string())
        );
    }

    #[test]
    fn missing_required_lists_unmapped_required_keys() {
        let fields = ImportType::Students.fields();
        let mut m = ColumnMapping::new();
        m.assign("First Name", Some("first_name"));
        assert_eq!(missing_required(&m, fields), vec!["last_name".to_string()]);
    }

    #[test]
    fn similarity_is_bounded_and_symmetric() {
        assert_eq!(similarity("", "abc"), 0.0);
        assert_eq!(similarity("abc", "abc"), 1.0);
        let s = similarity("birthdt", "birthdate");
        assert!((s - similarity("birthdate", "birthdt")).abs() < 1e-12);
        assert!(s > 0.7 && s < 1.0);
        assert_eq!(normalize(" E-mail Address! "), "emailaddress");
    }
}
