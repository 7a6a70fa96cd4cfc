//! Host value → Tcl word.

use super::Value;
use super::number::format_float;

/// Characters that trigger per-character backslash escaping.
const MAGIC: &[char] = &['\\', '{', '}', '[', ']', '$', '"', ';'];

/// Whitespace as the Tcl list parser sees it.
pub(crate) const fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Whether `s` contains a character that must be escaped.
fn has_magic(s: &str) -> bool {
    s.contains(MAGIC)
}

/// Encodes `value` as a single word that the interpreter parses back to the
/// value's string form, both as a command argument and as a list element.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Bool(b) => if *b { "1" } else { "0" }.to_owned(),
        Value::Int(n) => n.to_string(),
        Value::Float(x) => format_float(*x),
        Value::Complex(re, im) => format!("{{{} {}}}", format_float(*re), format_float(*im)),
        Value::List(items) if items.len() == 1 => {
            let inner = stringify(&items[0]);
            if has_magic(&inner) {
                format!("{{{inner}}}")
            } else {
                inner
            }
        }
        Value::List(_) | Value::Dict(_) => format!("{{{}}}", to_text(value)),
        Value::Str(s) => quote_str(s),
        Value::Bytes(b) => quote_str(&b.iter().map(|&c| char::from(c)).collect::<String>()),
    }
}

/// The string the interpreter holds for `value`: what `set x <word>` stores
/// when `<word>` is [`stringify`]'s output.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Bytes(b) => b.iter().map(|&c| char::from(c)).collect(),
        Value::Complex(re, im) => format!("{} {}", format_float(*re), format_float(*im)),
        Value::List(items) if items.len() == 1 => stringify(&items[0]),
        Value::List(items) => join(items),
        Value::Dict(map) => {
            let mut words = Vec::with_capacity(map.len() * 2);
            for (k, v) in map {
                words.push(quote_str(k));
                words.push(stringify(v));
            }
            words.join(" ")
        }
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => stringify(value),
    }
}

/// Space-joins the words of `values`, for building multi-argument commands.
pub fn join(values: &[Value]) -> String {
    values.iter().map(stringify).collect::<Vec<_>>().join(" ")
}

/// Quotes plain text.
fn quote_str(s: &str) -> String {
    if s.is_empty() {
        return "{}".to_owned();
    }
    if has_magic(s) {
        let mut out = String::with_capacity(s.len() * 2);
        for c in s.chars() {
            if c == '\n' {
                out.push_str("\\n");
            } else if MAGIC.contains(&c) || is_space(c) {
                out.push('\\');
                out.push(c);
            } else {
                out.push(c);
            }
        }
        return out;
    }
    if s.chars().any(is_space) {
        return format!("{{{s}}}");
    }
    s.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words_pass_through() {
        assert_eq!(stringify(&"abc".into()), "abc");
        assert_eq!(stringify(&"a(b)".into()), "a(b)");
        assert_eq!(stringify(&Value::Int(-3)), "-3");
    }

    #[test]
    fn empty_and_spaced_text_is_braced() {
        assert_eq!(stringify(&"".into()), "{}");
        assert_eq!(stringify(&"a b".into()), "{a b}");
        assert_eq!(stringify(&"a\nb".into()), "{a\nb}");
    }

    #[test]
    fn magic_text_is_backslash_escaped() {
        assert_eq!(stringify(&"$x".into()), "\\$x");
        assert_eq!(stringify(&"[a b]".into()), "\\[a\\ b\\]");
        assert_eq!(stringify(&"{\n}".into()), "\\{\\n\\}");
        assert_eq!(stringify(&"\"q".into()), "\\\"q");
        assert_eq!(stringify(&"a;b".into()), "a\\;b");
    }

    #[test]
    fn booleans_are_digits() {
        assert_eq!(stringify(&true.into()), "1");
        assert_eq!(stringify(&false.into()), "0");
    }

    #[test]
    fn lists_and_dicts_are_braced_joins() {
        assert_eq!(stringify(&Value::strings(["a", "b c"])), "{a {b c}}");
        assert_eq!(stringify(&Value::strings(["a"])), "a");
        assert_eq!(stringify(&Value::strings(["a b"])), "{{a b}}");
        assert_eq!(stringify(&Value::List(vec![])), "{}");

        let mut map = indexmap::IndexMap::new();
        map.insert("k".to_owned(), Value::Int(1));
        map.insert("j".to_owned(), Value::from("x y"));
        assert_eq!(stringify(&Value::Dict(map)), "{k 1 j {x y}}");
    }

    #[test]
    fn complex_is_a_pair() {
        assert_eq!(stringify(&Value::Complex(1.0, -0.5)), "{1.0 -0.5}");
    }

    #[test]
    fn text_form_is_the_unbraced_word() {
        assert_eq!(to_text(&"a b".into()), "a b");
        assert_eq!(to_text(&Value::strings(["a", "b c"])), "a {b c}");
        assert_eq!(to_text(&Value::strings(["a b"])), "{a b}");
        assert_eq!(to_text(&Value::Complex(1.0, 2.0)), "1.0 2.0");
        assert_eq!(to_text(&Value::Int(7)), "7");
        for v in [
            Value::from("x {y} $z"),
            Value::strings(["p", "q r"]),
            Value::strings(["{"]),
        ] {
            assert_eq!(super::super::unquote(&stringify(&v)).unwrap(), to_text(&v));
        }
    }

    #[test]
    fn join_builds_arguments() {
        assert_eq!(
            join(&[Value::from("a"), Value::Int(2), Value::from("c d")]),
            "a 2 {c d}"
        );
        assert_eq!(join(&[]), "");
    }
}
