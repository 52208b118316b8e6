// Loosely typed algorithm parameters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter mapping. Ordered by key so iteration is canonical.
pub type Parameters = BTreeMap<String, ParamValue>;

/// A single parameter value as it arrives at the boundary.
///
/// Variant order matters for untagged deserialization: integers must be
/// tried before floats so that `100` stays an integer and `100.0` a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view of the value. Text is parsed, booleans count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Null => None,
            ParamValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) if f.is_finite() => Some(*f),
            ParamValue::Float(_) => None,
            ParamValue::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        }
    }

    /// Integer view of the value; floats are truncated toward zero.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            other => other.as_f64().map(|f| f.trunc() as i64),
        }
    }

    /// Renders the value the way the legacy service printed it inside
    /// `str(sorted(params.items()))`. Cache keys depend on this exact text.
    pub fn legacy_repr(&self) -> String {
        match self {
            ParamValue::Null => "None".to_string(),
            ParamValue::Bool(true) => "True".to_string(),
            ParamValue::Bool(false) => "False".to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => float_repr(*f),
            ParamValue::Text(s) => quote_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// `[('k1', v1), ('k2', v2)]` over the key-sorted entries.
pub fn canonical_parameter_string(params: &Parameters) -> String {
    let entries: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("({}, {})", quote_str(k), v.legacy_repr()))
        .collect();
    format!("[{}]", entries.join(", "))
}

fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    // Debug already gives the shortest round-trip digits and keeps ".0";
    // only the exponent layout differs (1e-5 vs 1e-05, 1e16 vs 1e+16).
    let s = format!("{:?}", f);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => s,
    }
}

fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_deserialization() {
        let params: Parameters =
            serde_json::from_str(r#"{"a": 100, "b": 0.5, "c": "x", "d": true, "e": null, "f": 10.0}"#)
                .unwrap();
        assert_eq!(params["a"], ParamValue::Int(100));
        assert_eq!(params["b"], ParamValue::Float(0.5));
        assert_eq!(params["c"], ParamValue::Text("x".to_string()));
        assert_eq!(params["d"], ParamValue::Bool(true));
        assert_eq!(params["e"], ParamValue::Null);
        assert_eq!(params["f"], ParamValue::Float(10.0));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(ParamValue::Text(" 2.5 ".into()).as_f64(), Some(2.5));
        assert_eq!(ParamValue::Float(7.9).as_i64(), Some(7));
        assert_eq!(ParamValue::Bool(true).as_i64(), Some(1));
        assert_eq!(ParamValue::Text("abc".into()).as_f64(), None);
        assert_eq!(ParamValue::Null.as_i64(), None);
        assert_eq!(ParamValue::Float(f64::NAN).as_f64(), None);
    }

    #[test]
    fn test_legacy_repr() {
        assert_eq!(ParamValue::Int(100).legacy_repr(), "100");
        assert_eq!(ParamValue::Float(0.5).legacy_repr(), "0.5");
        assert_eq!(ParamValue::Float(1.0).legacy_repr(), "1.0");
        assert_eq!(ParamValue::Float(1e-5).legacy_repr(), "1e-05");
        assert_eq!(ParamValue::Float(1e16).legacy_repr(), "1e+16");
        assert_eq!(ParamValue::Bool(false).legacy_repr(), "False");
        assert_eq!(ParamValue::Null.legacy_repr(), "None");
        assert_eq!(ParamValue::Text("it's".into()).legacy_repr(), "\"it's\"");
        assert_eq!(ParamValue::Text("plain".into()).legacy_repr(), "'plain'");
    }

    #[test]
    fn test_canonical_parameter_string_is_sorted() {
        let mut params = Parameters::new();
        params.insert("sigma".into(), ParamValue::Float(0.5));
        params.insert("min_size".into(), ParamValue::Int(50));
        params.insert("scale".into(), ParamValue::Int(100));
        assert_eq!(
            canonical_parameter_string(&params),
            "[('min_size', 50), ('scale', 100), ('sigma', 0.5)]"
        );
    }

    #[test]
    fn test_canonical_parameter_string_empty() {
        assert_eq!(canonical_parameter_string(&Parameters::new()), "[]");
    }
}
