//! Ordered index keys
//!
//! Every value that can appear in an index is mapped to an `IndexKey`.
//! The mapping is total: missing fields and JSON null both map to `Null`,
//! arrays and objects map to `Composite` holding their canonical JSON text.
//!
//! Ordering is deterministic: Null < Bool < Number < String < Composite.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Index key representing a single field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum IndexKey {
    /// Null or missing value
    Null,
    /// Boolean value (false < true)
    Bool(bool),
    /// Number stored as order-preserving f64 bits
    Number(u64),
    /// String value
    String(String),
    /// Array or object, canonical JSON
    Composite(String),
}

impl IndexKey {
    /// Create a key from a float.
    ///
    /// Uses bit representation for total ordering.
    pub fn from_f64(v: f64) -> Self {
        // -0.0 and 0.0 must collide
        let v = if v == 0.0 { 0.0 } else { v };
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        IndexKey::Number(ordered)
    }

    /// Create a key from a string
    pub fn from_string(v: impl Into<String>) -> Self {
        IndexKey::String(v.into())
    }

    /// Create a key from a JSON value
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => IndexKey::Null,
            Value::Bool(b) => IndexKey::Bool(*b),
            Value::Number(n) => IndexKey::from_f64(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => IndexKey::String(s.clone()),
            Value::Array(_) | Value::Object(_) => {
                IndexKey::Composite(serde_json::to_string(value).unwrap_or_default())
            }
        }
    }

    /// Key for an optional field value (missing is `Null`)
    pub fn from_field(value: Option<&Value>) -> Self {
        value.map(Self::from_json).unwrap_or(IndexKey::Null)
    }

    /// Decodes the number bits back into an f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            IndexKey::Number(ordered) => {
                let bits = if (ordered >> 63) == 1 {
                    ordered ^ (1 << 63)
                } else {
                    !ordered
                };
                Some(f64::from_bits(bits))
            }
            _ => None,
        }
    }

    /// Converts the key back into a JSON value.
    ///
    /// Integral numbers within the safe integer range come back as integers.
    pub fn to_json(&self) -> Value {
        match self {
            IndexKey::Null => Value::Null,
            IndexKey::Bool(b) => Value::Bool(*b),
            IndexKey::Number(_) => {
                let f = self.as_f64().unwrap_or(0.0);
                if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                    Value::from(f as i64)
                } else {
                    serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            IndexKey::String(s) => Value::String(s.clone()),
            IndexKey::Composite(json) => serde_json::from_str(json).unwrap_or(Value::Null),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, IndexKey::Null)
    }

    /// Smallest key strictly greater than every string starting with `prefix`.
    ///
    /// Increments the last character that can be incremented and truncates
    /// after it. When no character can be incremented the bound falls on the
    /// first key past the string range.
    pub fn prefix_upper_bound(prefix: &str) -> IndexKey {
        let mut chars: Vec<char> = prefix.chars().collect();
        while let Some(last) = chars.pop() {
            if let Some(next) = next_char(last) {
                chars.push(next);
                return IndexKey::String(chars.into_iter().collect());
            }
        }
        IndexKey::Composite(String::new())
    }
}

fn next_char(c: char) -> Option<char> {
    let mut code = c as u32 + 1;
    // skip the surrogate block
    if (0xD800..=0xDFFF).contains(&code) {
        code = 0xE000;
    }
    char::from_u32(code)
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Null => write!(f, "null"),
            IndexKey::Composite(json) => write!(f, "{}", json),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&Value> for IndexKey {
    fn from(value: &Value) -> Self {
        IndexKey::from_json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_ordering() {
        let keys = vec![
            IndexKey::Null,
            IndexKey::Bool(false),
            IndexKey::Bool(true),
            IndexKey::from_f64(-100.5),
            IndexKey::from_f64(-1.0),
            IndexKey::from_f64(0.0),
            IndexKey::from_f64(2.0),
            IndexKey::from_f64(100.0),
            IndexKey::from_string(""),
            IndexKey::from_string("aaa"),
            IndexKey::from_string("zzz"),
            IndexKey::from_json(&json!([1])),
        ];

        for i in 1..keys.len() {
            assert!(keys[i - 1] < keys[i], "{} should sort before {}", keys[i - 1], keys[i]);
        }
    }

    #[test]
    fn test_integer_and_float_collide() {
        assert_eq!(IndexKey::from_json(&json!(18)), IndexKey::from_json(&json!(18.0)));
        assert_eq!(IndexKey::from_f64(-0.0), IndexKey::from_f64(0.0));
    }

    #[test]
    fn test_to_json_round_trip() {
        for value in [json!(null), json!(true), json!(42), json!(-3.5), json!("x"), json!({"a": [1, 2]})] {
            assert_eq!(IndexKey::from_json(&value).to_json(), value);
        }
    }

    #[test]
    fn test_missing_field_is_null() {
        assert_eq!(IndexKey::from_field(None), IndexKey::Null);
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(IndexKey::prefix_upper_bound("ab"), IndexKey::from_string("ac"));
        assert!(IndexKey::from_string("abzzzz") < IndexKey::prefix_upper_bound("ab"));
        assert!(IndexKey::from_string("ab") < IndexKey::prefix_upper_bound("ab"));

        let all_max = format!("a{}", char::MAX);
        assert_eq!(IndexKey::prefix_upper_bound(&all_max), IndexKey::from_string("b"));
        assert_eq!(IndexKey::prefix_upper_bound(""), IndexKey::Composite(String::new()));
        assert!(IndexKey::from_string("anything") < IndexKey::prefix_upper_bound(""));
    }
}
