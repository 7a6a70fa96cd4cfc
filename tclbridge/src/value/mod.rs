//! Host values and their Tcl literal form.
//!
//! [`stringify`] turns a [`Value`] into one Tcl word that the interpreter
//! re-parses to the same string; [`parse_list`], [`parse_dict`] and
//! [`parse_number`] read interpreter results back without a second
//! interpreter.

mod number;
mod parse;
mod quote;

use indexmap::IndexMap;

pub use number::{Number, format_float, parse_bool, parse_number};
pub use parse::{parse_dict, parse_list, unquote};
pub use quote::{join, stringify, to_text};

/// A host value that can be sent to the interpreter.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// Text, sent as-is after quoting.
    Str(String),
    /// Sent as `0` or `1`.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float, always written so that it re-parses as a float.
    Float(f64),
    /// `(re, im)` pair, sent as a two-element list.
    Complex(f64, f64),
    /// Ordered sequence, sent as a list.
    List(Vec<Self>),
    /// Ordered mapping, sent as a flat key/value list.
    Dict(IndexMap<String, Self>),
    /// Raw bytes, sent as Latin-1 text.
    Bytes(Vec<u8>),
}

impl Value {
    /// Builds a list of strings.
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|s| Self::Str(s.into())).collect())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<(f64, f64)> for Value {
    fn from((re, im): (f64, f64)) -> Self {
        Self::Complex(re, im)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(i) => Self::Int(i),
            Number::Float(x) => Self::Float(x),
            Number::Complex(re, im) => Self::Complex(re, im),
        }
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Self>> From<IndexMap<String, V>> for Value {
    fn from(map: IndexMap<String, V>) -> Self {
        Self::Dict(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decodes `word` back into the shape of `like`.
    fn decode_like(word: &str, like: &Value) -> Value {
        let text = unquote(word).unwrap();
        decode_text(&text, like)
    }

    fn decode_text(text: &str, like: &Value) -> Value {
        match like {
            Value::Str(_) => Value::Str(text.to_owned()),
            Value::Bool(_) => Value::Bool(parse_bool(text).unwrap()),
            Value::Int(_) | Value::Float(_) | Value::Complex(..) => {
                parse_number(text).unwrap().into()
            }
            Value::Bytes(_) => Value::Bytes(text.chars().map(|c| c as u8).collect()),
            Value::List(items) => {
                let parts = parse_list(text).unwrap();
                assert_eq!(parts.len(), items.len(), "list {text:?}");
                Value::List(
                    parts
                        .iter()
                        .zip(items)
                        .map(|(p, item)| decode_text(p, item))
                        .collect(),
                )
            }
            Value::Dict(map) => {
                let parts = parse_dict(text).unwrap();
                assert_eq!(parts.len(), map.len(), "dict {text:?}");
                Value::Dict(
                    parts
                        .iter()
                        .zip(map.values())
                        .map(|((k, v), like)| (k.clone(), decode_text(v, like)))
                        .collect(),
                )
            }
        }
    }

    fn roundtrip(v: &Value) {
        let word = stringify(v);
        assert_eq!(&decode_like(&word, v), v, "word {word:?}");
    }

    #[test]
    fn strings_roundtrip() {
        for s in [
            "",
            "plain",
            "two words",
            "{",
            "}",
            "{}",
            "a{b",
            "back\\slash",
            "trailing\\",
            "$var",
            "[cmd]",
            "semi;colon",
            "\"quoted\"",
            "\"lead",
            "line\nbreak",
            "tab\there",
            " padded ",
            "{a b} c",
            "mixed {brace} and \\ and $x [y]",
            "#comment",
            "grüße → ∞",
        ] {
            roundtrip(&Value::from(s));
        }
    }

    #[test]
    fn scalars_roundtrip() {
        roundtrip(&Value::Int(0));
        roundtrip(&Value::Int(-42));
        roundtrip(&Value::Int(i64::MAX));
        roundtrip(&Value::Float(1.0));
        roundtrip(&Value::Float(-2.5e-7));
        roundtrip(&Value::Float(1e300));
        roundtrip(&Value::Float(f64::INFINITY));
        roundtrip(&Value::Bool(true));
        roundtrip(&Value::Bool(false));
        roundtrip(&Value::Complex(1.5, -2.0));
        roundtrip(&Value::Bytes(vec![0x41, 0xe9, 0x20, 0x7b]));
    }

    #[test]
    fn containers_roundtrip() {
        roundtrip(&Value::List(vec![]));
        roundtrip(&Value::strings(["only"]));
        roundtrip(&Value::strings(["a b"]));
        roundtrip(&Value::strings(["{"]));
        roundtrip(&Value::strings(["", ""]));
        roundtrip(&Value::strings(["a", "b c", "{d}", "e\\f", ""]));
        roundtrip(&Value::List(vec![
            Value::strings(["x", "y z"]),
            Value::List(vec![]),
            Value::Int(3),
            Value::List(vec![Value::strings(["deep", "{er}"])]),
        ]));

        let mut map = IndexMap::new();
        map.insert("k 1".to_owned(), Value::from("v {1}"));
        map.insert("k2".to_owned(), Value::strings(["a", "b"]));
        map.insert(String::new(), Value::Int(7));
        roundtrip(&Value::Dict(map));
        roundtrip(&Value::Dict(IndexMap::new()));
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from(3), Value::Int(3));
        assert_eq!(Value::from(vec!["a", "b"]), Value::strings(["a", "b"]));
        assert_eq!(Value::from((1.0, 2.0)), Value::Complex(1.0, 2.0));
        assert_eq!(Value::from(Number::Int(4)), Value::Int(4));
    }
}
