//! Tcl list grammar, read directly.

use indexmap::IndexMap;

use super::quote::is_space;
use crate::{Error, Result};

/// Splits `text` into list elements, undoing brace, quote and backslash
/// quoting.
pub fn parse_list(text: &str) -> Result<Vec<String>> {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let mut items = Vec::new();
    loop {
        while pos < chars.len() && is_space(chars[pos]) {
            pos += 1;
        }
        if pos >= chars.len() {
            return Ok(items);
        }
        let (item, next) = match chars[pos] {
            '{' => braced(&chars, pos)?,
            '"' => quoted(&chars, pos)?,
            _ => bare(&chars, pos),
        };
        items.push(item);
        pos = next;
    }
}

/// Reads `text` as a flat key/value list. Later duplicates overwrite earlier
/// values but keep the first key's position.
pub fn parse_dict(text: &str) -> Result<IndexMap<String, String>> {
    let items = parse_list(text)?;
    if items.len() % 2 != 0 {
        return Err(Error::Parse("missing value to go with key".into()));
    }
    let mut map = IndexMap::with_capacity(items.len() / 2);
    let mut it = items.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        map.insert(k, v);
    }
    Ok(map)
}

/// Reverses one level of word quoting: the inverse of
/// [`stringify`](super::stringify) on text.
pub fn unquote(word: &str) -> Result<String> {
    let mut items = parse_list(word)?;
    if items.len() != 1 {
        return Err(Error::Parse(format!(
            "expected a single word, found {} elements",
            items.len()
        )));
    }
    Ok(items.swap_remove(0))
}

/// Element in braces starting at `start`; content is literal.
fn braced(chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut depth = 0usize;
    let mut pos = start;
    while pos < chars.len() {
        match chars[pos] {
            '\\' => pos += 1,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let item: String = chars[start + 1..pos].iter().collect();
                    let next = pos + 1;
                    if next < chars.len() && !is_space(chars[next]) {
                        return Err(Error::Parse(format!(
                            "list element in braces followed by \"{}\" instead of space",
                            chars[next]
                        )));
                    }
                    return Ok((item, next));
                }
            }
            _ => {}
        }
        pos += 1;
    }
    Err(Error::Parse("unmatched open brace in list".into()))
}

/// Element in double quotes starting at `start`; backslashes are substituted.
fn quoted(chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut out = String::new();
    let mut pos = start + 1;
    while pos < chars.len() {
        match chars[pos] {
            '"' => {
                let next = pos + 1;
                if next < chars.len() && !is_space(chars[next]) {
                    return Err(Error::Parse(format!(
                        "list element in quotes followed by \"{}\" instead of space",
                        chars[next]
                    )));
                }
                return Ok((out, next));
            }
            '\\' => pos = backslash(chars, pos, &mut out),
            c => {
                out.push(c);
                pos += 1;
            }
        }
    }
    Err(Error::Parse("unmatched open quote in list".into()))
}

/// Bare element starting at `start`, ending at unescaped whitespace.
fn bare(chars: &[char], start: usize) -> (String, usize) {
    let mut out = String::new();
    let mut pos = start;
    while pos < chars.len() && !is_space(chars[pos]) {
        if chars[pos] == '\\' {
            pos = backslash(chars, pos, &mut out);
        } else {
            out.push(chars[pos]);
            pos += 1;
        }
    }
    (out, pos)
}

/// Substitutes the backslash sequence at `pos` into `out`; returns the
/// position after it.
fn backslash(chars: &[char], pos: usize, out: &mut String) -> usize {
    let Some(&c) = chars.get(pos + 1) else {
        out.push('\\');
        return pos + 1;
    };
    let mut next = pos + 2;
    match c {
        'a' => out.push('\x07'),
        'b' => out.push('\x08'),
        'f' => out.push('\x0c'),
        'n' => out.push('\n'),
        'r' => out.push('\r'),
        't' => out.push('\t'),
        'v' => out.push('\x0b'),
        'x' | 'u' | 'U' => {
            let max = match c {
                'x' => 2,
                'u' => 4,
                _ => 8,
            };
            let digits: String = chars[next..]
                .iter()
                .take(max)
                .take_while(|d| d.is_ascii_hexdigit())
                .collect();
            if digits.is_empty() {
                out.push(c);
            } else {
                next += digits.len();
                let code = u32::from_str_radix(&digits, 16).unwrap_or(0);
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
        }
        '0'..='7' => {
            let digits: String = chars[pos + 1..]
                .iter()
                .take(3)
                .take_while(|d| ('0'..='7').contains(*d))
                .collect();
            next = pos + 1 + digits.len();
            let code = u32::from_str_radix(&digits, 8).unwrap_or(0) & 0xff;
            out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
        }
        '\n' => {
            while next < chars.len() && matches!(chars[next], ' ' | '\t') {
                next += 1;
            }
            out.push(' ');
        }
        other => out.push(other),
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(text: &str) -> Vec<String> {
        parse_list(text).unwrap()
    }

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(list("a b\tc\n d"), ["a", "b", "c", "d"]);
        assert!(list("").is_empty());
        assert!(list("   ").is_empty());
    }

    #[test]
    fn braces_group_and_nest() {
        assert_eq!(list("{a b} {} {{x} y}"), ["a b", "", "{x} y"]);
        assert_eq!(list("{a \\} b}"), ["a \\} b"]);
    }

    #[test]
    fn quotes_substitute_backslashes() {
        assert_eq!(list("\"a b\" \"c\\td\""), ["a b", "c\td"]);
    }

    #[test]
    fn backslash_sequences() {
        assert_eq!(list("a\\ b"), ["a b"]);
        assert_eq!(list("\\x41\\u00e9\\101\\n"), ["A\u{e9}A\n"]);
        assert_eq!(list("\\{\\}\\$"), ["{}$"]);
        assert_eq!(list("x\\"), ["x\\"]);
        assert_eq!(list("\\q"), ["q"]);
    }

    #[test]
    fn malformed_lists_fail() {
        assert!(parse_list("{a b").is_err());
        assert!(parse_list("\"a b").is_err());
        assert!(parse_list("{a}b").is_err());
        assert!(parse_list("\"a\"b").is_err());
    }

    #[test]
    fn dict_pairs_keep_order() {
        let d = parse_dict("b 1 a {2 3} b 4").unwrap();
        assert_eq!(d.keys().collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(d["b"], "4");
        assert_eq!(d["a"], "2 3");
        assert!(parse_dict("a 1 b").is_err());
    }

    #[test]
    fn unquote_single_word() {
        assert_eq!(unquote("{a b}").unwrap(), "a b");
        assert_eq!(unquote("{}").unwrap(), "");
        assert_eq!(unquote("a\\ b").unwrap(), "a b");
        assert!(unquote("a b").is_err());
    }
}
