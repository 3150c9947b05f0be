//! Literal values read out of, and written back into, component source.
//!
//! The encoding is the contract with downstream bundlers: identical values
//! always print to identical bytes.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

/// The literal subset of JavaScript understood by the metadata extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<LiteralValue>),
    /// Ordered record; source order is kept for deterministic output.
    Object(Vec<(String, LiteralValue)>),
    /// Any non-literal expression (identifier, call, template with holes...).
    Dynamic,
}

impl LiteralValue {
    pub fn string(value: impl Into<String>) -> Self {
        LiteralValue::String(value.into())
    }

    pub fn strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LiteralValue::Array(values.into_iter().map(|v| LiteralValue::String(v.into())).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LiteralValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// JavaScript truthiness. Dynamic values are not known to be truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            LiteralValue::Null | LiteralValue::Dynamic => false,
            LiteralValue::Bool(b) => *b,
            LiteralValue::Number(n) => *n != 0.0 && !n.is_nan(),
            LiteralValue::String(s) => !s.is_empty(),
            LiteralValue::Array(_) | LiteralValue::Object(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LiteralValue::Null => "null",
            LiteralValue::Bool(_) => "boolean",
            LiteralValue::Number(_) => "number",
            LiteralValue::String(_) => "string",
            LiteralValue::Array(_) => "array",
            LiteralValue::Object(_) => "object",
            LiteralValue::Dynamic => "expression",
        }
    }

    pub fn get(&self, key: &str) -> Option<&LiteralValue> {
        match self {
            LiteralValue::Object(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Print as a JavaScript literal expression.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut String) {
        match self {
            LiteralValue::Null | LiteralValue::Dynamic => out.push_str("null"),
            LiteralValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            LiteralValue::Number(n) => out.push_str(&encode_number(*n)),
            LiteralValue::String(s) => out.push_str(&encode_string(s)),
            LiteralValue::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.encode_into(out);
                }
                out.push(']');
            }
            LiteralValue::Object(entries) => {
                if entries.is_empty() {
                    out.push_str("{}");
                    return;
                }
                out.push_str("{ ");
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    if IDENT_RE.is_match(key) {
                        out.push_str(key);
                    } else {
                        out.push_str(&encode_string(key));
                    }
                    out.push_str(": ");
                    value.encode_into(out);
                }
                out.push_str(" }");
            }
        }
    }
}

impl From<&serde_json::Value> for LiteralValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => LiteralValue::Null,
            serde_json::Value::Bool(b) => LiteralValue::Bool(*b),
            serde_json::Value::Number(n) => LiteralValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => LiteralValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                LiteralValue::Array(items.iter().map(LiteralValue::from).collect())
            }
            serde_json::Value::Object(map) => LiteralValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), LiteralValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Double-quoted, JSON-escaped. U+2028/U+2029 are escaped as well since they
/// terminate lines in older JavaScript engines.
fn encode_string(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
}

fn encode_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_strings_and_arrays() {
        assert_eq!(LiteralValue::string("cmp-a").encode(), "\"cmp-a\"");
        assert_eq!(
            LiteralValue::string("say \"hi\"\n").encode(),
            r#""say \"hi\"\n""#
        );
        assert_eq!(
            LiteralValue::strings(["a.css", "b.css"]).encode(),
            r#"["a.css", "b.css"]"#
        );
        assert_eq!(LiteralValue::Array(vec![]).encode(), "[]");
    }

    #[test]
    fn test_encode_nested_object() {
        let value = LiteralValue::Object(vec![
            ("ios".to_string(), LiteralValue::string("a.ios.css")),
            (
                "material-dark".to_string(),
                LiteralValue::strings(["m.css", "d.css"]),
            ),
        ]);
        assert_eq!(
            value.encode(),
            r#"{ ios: "a.ios.css", "material-dark": ["m.css", "d.css"] }"#
        );
    }

    #[test]
    fn test_encode_numbers() {
        assert_eq!(LiteralValue::Number(3.0).encode(), "3");
        assert_eq!(LiteralValue::Number(0.5).encode(), "0.5");
        assert_eq!(LiteralValue::Number(-2.0).encode(), "-2");
    }

    #[test]
    fn test_truthiness_matches_javascript() {
        assert!(LiteralValue::Bool(true).is_truthy());
        assert!(!LiteralValue::Bool(false).is_truthy());
        assert!(!LiteralValue::Number(0.0).is_truthy());
        assert!(LiteralValue::Number(1.0).is_truthy());
        assert!(!LiteralValue::string("").is_truthy());
        assert!(LiteralValue::string("false").is_truthy());
        assert!(LiteralValue::Array(vec![]).is_truthy());
        assert!(!LiteralValue::Null.is_truthy());
        assert!(!LiteralValue::Dynamic.is_truthy());
    }

    #[test]
    fn test_from_json_object() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"tag": "cmp-a", "shadow": true}"#).unwrap();
        let value = LiteralValue::from(&json);
        assert_eq!(value.get("tag"), Some(&LiteralValue::string("cmp-a")));
        assert_eq!(value.get("shadow"), Some(&LiteralValue::Bool(true)));
    }
}
