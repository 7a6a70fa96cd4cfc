//! Numeric and boolean literals.

use super::parse::parse_list;
use crate::{Error, Result};

/// A number read from interpreter text.
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub enum Number {
    /// Integer literal (decimal, `0x`, `0o` or `0b`).
    Int(i64),
    /// Floating-point literal, including `Inf` and `NaN`.
    Float(f64),
    /// Two-element list of numbers.
    Complex(f64, f64),
}

impl Number {
    /// Integer value, if the number is integral and fits.
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    pub fn to_i64(self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(n),
            Self::Float(x) if x.fract() == 0.0 && x.abs() < 9.2e18 => Some(x as i64),
            Self::Complex(re, im) if im == 0.0 => Self::Float(re).to_i64(),
            _ => None,
        }
    }

    /// Real value, if the imaginary part is zero.
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    pub fn to_f64(self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(n as f64),
            Self::Float(x) => Some(x),
            Self::Complex(re, im) if im == 0.0 => Some(re),
            Self::Complex(..) => None,
        }
    }

    /// `(re, im)` pair.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_complex(self) -> (f64, f64) {
        match self {
            Self::Int(n) => (n as f64, 0.0),
            Self::Float(x) => (x, 0.0),
            Self::Complex(re, im) => (re, im),
        }
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Number {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Number {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<(f64, f64)> for Number {
    fn from((re, im): (f64, f64)) -> Self {
        Self::Complex(re, im)
    }
}

impl std::fmt::Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Complex(re, im) => write!(f, "{} {}", format_float(*re), format_float(*im)),
        }
    }
}

/// Formats `x` so that the interpreter reads it back as a float.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_owned()
    } else if x.is_infinite() {
        if x > 0.0 { "Inf" } else { "-Inf" }.to_owned()
    } else {
        // `{:?}` keeps a fractional part or exponent ("1.0", "1e-7").
        format!("{x:?}")
    }
}

/// Reads a numeric literal; a two-element list of numbers is a complex pair.
pub fn parse_number(text: &str) -> Result<Number> {
    let trimmed = text.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b');
    if let Some(n) = parse_int(trimmed) {
        return Ok(Number::Int(n));
    }
    if let Some(x) = parse_float(trimmed) {
        return Ok(Number::Float(x));
    }
    if let Ok(parts) = parse_list(trimmed) {
        if let [re, im] = parts.as_slice() {
            let re = parse_number(re)?.to_f64();
            let im = parse_number(im)?.to_f64();
            if let (Some(re), Some(im)) = (re, im) {
                return Ok(Number::Complex(re, im));
            }
        }
    }
    Err(Error::Parse(format!("expected a number but got \"{text}\"")))
}

/// Integer literal with optional sign and radix prefix. Leading zeros mean
/// decimal.
fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest)
    } else if let Some(rest) = lower.strip_prefix("0d") {
        (10, rest)
    } else {
        (10, lower.as_str())
    };
    if body.is_empty() || !body.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = u64::from_str_radix(body, radix).ok()?;
    if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    }
}

/// Float literal; rejects the hex and radix forms `f64::from_str` would not
/// see anyway, and words such as `infinity` spelled differently from Tcl.
fn parse_float(text: &str) -> Option<f64> {
    let body = text.trim_start_matches(['+', '-']);
    let lower = body.to_ascii_lowercase();
    if !matches!(lower.as_str(), "inf" | "infinity" | "nan")
        && !body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    text.parse().ok()
}

/// Reads a boolean the way the interpreter does: any number (non-zero is
/// true) or a unique prefix of `true`, `false`, `yes`, `no`, `on`, `off`.
pub fn parse_bool(text: &str) -> Result<bool> {
    let trimmed = text.trim();
    if let Ok(n) = parse_number(trimmed) {
        return match n {
            Number::Int(i) => Ok(i != 0),
            Number::Float(x) if !x.is_nan() => Ok(x != 0.0),
            _ => Err(Error::Parse(format!("expected boolean value but got \"{text}\""))),
        };
    }
    let lower = trimmed.to_ascii_lowercase();
    if !lower.is_empty() {
        // "o" alone is ambiguous between on and off.
        let words = [
            ("true", true),
            ("false", false),
            ("yes", true),
            ("no", false),
            ("on", true),
            ("off", false),
        ];
        let hits: Vec<bool> = words
            .iter()
            .filter(|(w, _)| w.starts_with(&lower) && (lower.len() >= 2 || !w.starts_with('o')))
            .map(|&(_, v)| v)
            .collect();
        if let [v] = hits.as_slice() {
            return Ok(*v);
        }
    }
    Err(Error::Parse(format!("expected boolean value but got \"{text}\"")))
}
