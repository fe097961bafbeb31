//! Secondary index definitions and sort-key encoding.

use serde::{Deserialize, Serialize};

/// Which primary keys an index covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPattern {
    /// Every key
    All,
    /// A single key
    Exact(String),
    /// Keys starting with the prefix
    Prefix(String),
    /// Keys made only of ASCII digits (legacy user records)
    Numeric,
}

impl KeyPattern {
    /// Parse a glob such as `*`, `drone:*` or `config`.
    #[must_use]
    pub fn glob(pattern: &str) -> Self {
        match pattern {
            "*" => Self::All,
            p => p
                .strip_suffix('*')
                .map_or_else(|| Self::Exact(p.to_string()), |prefix| Self::Prefix(prefix.to_string())),
        }
    }

    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(exact) => key == exact,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Self::Numeric => !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()),
        }
    }
}

/// How index entries are ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// By the raw record value
    String,
    /// By a field of the record parsed as JSON; dotted paths reach nested fields
    Json(String),
}

/// Named secondary index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub pattern: KeyPattern,
    pub kind: IndexKind,
}

impl IndexSpec {
    pub fn string(name: impl Into<String>, pattern: &str) -> Self {
        Self {
            name: name.into(),
            pattern: KeyPattern::glob(pattern),
            kind: IndexKind::String,
        }
    }

    pub fn json(name: impl Into<String>, pattern: &str, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: KeyPattern::glob(pattern),
            kind: IndexKind::Json(field.into()),
        }
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: KeyPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub(crate) fn table_name(&self) -> String {
        table_name(&self.name)
    }

    /// Byte string whose lexicographic order is the index order.
    #[must_use]
    pub fn sort_key(&self, value: &str) -> Vec<u8> {
        match &self.kind {
            IndexKind::String => value.as_bytes().to_vec(),
            IndexKind::Json(field) => json_sort_key(value, field),
        }
    }
}

pub(crate) fn table_name(index: &str) -> String {
    format!("index:{index}")
}

// Type tags: missing/null < bool < number < string < composite
const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_COMPOSITE: u8 = 4;

fn json_sort_key(value: &str, field: &str) -> Vec<u8> {
    let Ok(doc) = serde_json::from_str::<serde_json::Value>(value) else {
        return vec![TAG_NULL];
    };
    let pointer = format!("/{}", field.replace('.', "/"));

    match doc.pointer(&pointer) {
        None | Some(serde_json::Value::Null) => vec![TAG_NULL],
        Some(serde_json::Value::Bool(b)) => vec![TAG_BOOL, u8::from(*b)],
        Some(serde_json::Value::Number(n)) => {
            let mut key = vec![TAG_NUMBER];
            key.extend_from_slice(&ordered_f64(n.as_f64().unwrap_or_default()));
            key
        }
        Some(serde_json::Value::String(s)) => {
            let mut key = vec![TAG_STRING];
            key.extend_from_slice(s.as_bytes());
            key
        }
        Some(composite) => {
            let mut key = vec![TAG_COMPOSITE];
            key.extend_from_slice(composite.to_string().as_bytes());
            key
        }
    }
}

/// Big-endian IEEE-754 bits with the sign flipped so byte order matches
/// numeric order.
fn ordered_f64(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    let ordered = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };
    ordered.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_patterns() {
        assert_eq!(KeyPattern::glob("*"), KeyPattern::All);
        assert_eq!(KeyPattern::glob("drone:*"), KeyPattern::Prefix("drone:".into()));
        assert_eq!(KeyPattern::glob("config"), KeyPattern::Exact("config".into()));

        assert!(KeyPattern::glob("drone:*").matches("drone:SN1"));
        assert!(!KeyPattern::glob("drone:*").matches("med:SN1"));
        assert!(KeyPattern::Numeric.matches("12"));
        assert!(!KeyPattern::Numeric.matches("config"));
        assert!(!KeyPattern::Numeric.matches(""));
    }

    #[test]
    fn test_numeric_sort_keys_follow_number_order() {
        let spec = IndexSpec::json("battery", "drone:*", "batteryCapacity");
        let values = [-3.5, 0.0, 12.9, 25.0, 25.5, 99.2, 100.0];
        let keys: Vec<_> = values
            .iter()
            .map(|v| spec.sort_key(&format!(r#"{{"batteryCapacity":{v}}}"#)))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_missing_and_malformed_sort_first() {
        let spec = IndexSpec::json("weight", "med:*", "weight");
        let missing = spec.sort_key(r#"{"name":"x"}"#);
        let malformed = spec.sort_key("{not json");
        let number = spec.sort_key(r#"{"weight":-1000}"#);
        assert_eq!(missing, malformed);
        assert!(missing < number);
    }

    #[test]
    fn test_nested_field_path() {
        let spec = IndexSpec::json("nested", "*", "a.b");
        assert!(spec.sort_key(r#"{"a":{"b":1}}"#) < spec.sort_key(r#"{"a":{"b":2}}"#));
    }
}
