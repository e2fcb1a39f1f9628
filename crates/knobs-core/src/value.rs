//! Value kinds and their text conversions.
//!
//! A setting holds exactly one of four kinds of value. Conversions from text
//! never fail: form input that does not parse degrades to the kind's zero
//! value, mirroring how a browser form is expected to behave when a user
//! types garbage into a numeric box.
//!
//! Floats are rendered with a fixed number of decimals (the field's
//! precision). Ties round half away from zero, so `21.25` at precision 1
//! renders as `21.3`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound for float display precision.
pub const MAX_PRECISION: u32 = 9;

/// Tolerance used when deriving a precision from a step size.
const STEP_EPSILON: f32 = 1e-6;

/// The closed set of value kinds a setting can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Float,
    Integer,
    Boolean,
    Text,
}

impl ValueKind {
    /// Lowercase name, as used in schemas and log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f32),
    Integer(i32),
    Boolean(bool),
    Text(String),
}

impl Value {
    /// The kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Float(_) => ValueKind::Float,
            Self::Integer(_) => ValueKind::Integer,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Text(_) => ValueKind::Text,
        }
    }

    /// The zero value of a kind: `0.0`, `0`, `false`, or the empty string.
    #[must_use]
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Float => Self::Float(0.0),
            ValueKind::Integer => Self::Integer(0),
            ValueKind::Boolean => Self::Boolean(false),
            ValueKind::Text => Self::Text(String::new()),
        }
    }

    /// Parse form text as a value of `kind`.
    ///
    /// - Boolean: `"1"`, `"true"` and `"on"` are true, anything else false.
    /// - Integer / Float: the leading numeric prefix (after whitespace) is
    ///   parsed; no prefix yields zero. Integers saturate to the `i32` range
    ///   and non-finite floats become `0.0`.
    /// - Text: taken verbatim.
    #[must_use]
    pub fn parse(kind: ValueKind, text: &str) -> Self {
        match kind {
            ValueKind::Boolean => Self::Boolean(matches!(text, "1" | "true" | "on")),
            ValueKind::Integer => Self::Integer(parse_integer(text)),
            ValueKind::Float => Self::Float(parse_float(text)),
            ValueKind::Text => Self::Text(text.to_owned()),
        }
    }

    /// Render the value as form text. `precision` only affects floats.
    #[must_use]
    pub fn to_text(&self, precision: u32) -> String {
        match self {
            Self::Float(v) => format_float(*v, precision),
            Self::Integer(v) => v.to_string(),
            Self::Boolean(v) => String::from(if *v { "1" } else { "0" }),
            Self::Text(v) => v.clone(),
        }
    }

    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Derive a display precision from a float step size.
///
/// Multiplies the step by ten until it is within `1e-6` of an integer,
/// counting the multiplications, up to [`MAX_PRECISION`].
#[must_use]
pub fn precision_from_step(step: f32) -> u32 {
    let mut x = step;
    let mut precision = 0;
    while precision < MAX_PRECISION && (x - x.round()).abs() > STEP_EPSILON {
        x *= 10.0;
        precision += 1;
    }
    precision
}

/// Format a float with exactly `precision` decimals, ties away from zero.
#[must_use]
pub fn format_float(value: f32, precision: u32) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let precision = precision.min(MAX_PRECISION);
    let factor = (0..precision).fold(1.0_f64, |f, _| f * 10.0);
    // Adding 0.0 turns -0.0 into 0.0.
    let rounded = (f64::from(value) * factor).round() / factor + 0.0;
    let digits = usize::try_from(precision).unwrap_or(0);
    format!("{rounded:.digits$}")
}

/// Length of the numeric prefix of `s`: optional sign, digits, and for
/// floats an optional fraction and exponent. Zero when no digit is found.
fn numeric_prefix_len(s: &str, allow_fraction: bool) -> usize {
    let bytes = s.as_bytes();
    let digits_from = |start: usize| {
        bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = digits_from(end);
    end += int_digits;
    let mut mantissa_digits = int_digits;

    if allow_fraction {
        if bytes.get(end) == Some(&b'.') {
            let frac_digits = digits_from(end + 1);
            mantissa_digits += frac_digits;
            end += 1 + frac_digits;
        }
        if mantissa_digits > 0 && matches!(bytes.get(end), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
            let exp_digits = digits_from(end + 1 + sign);
            if exp_digits > 0 {
                end += 1 + sign + exp_digits;
            }
        }
    }

    if mantissa_digits == 0 { 0 } else { end }
}

fn parse_integer(text: &str) -> i32 {
    let s = text.trim_start();
    let prefix = &s[..numeric_prefix_len(s, false)];
    if prefix.is_empty() {
        return 0;
    }
    let wide = prefix.parse::<i64>().unwrap_or(if prefix.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    });
    i32::try_from(wide).unwrap_or(if wide < 0 { i32::MIN } else { i32::MAX })
}

fn parse_float(text: &str) -> f32 {
    let s = text.trim_start();
    let prefix = &s[..numeric_prefix_len(s, true)];
    match prefix.parse::<f32>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn precision_follows_step() {
        assert_eq!(precision_from_step(1.0), 0);
        assert_eq!(precision_from_step(0.1), 1);
        assert_eq!(precision_from_step(0.01), 2);
        assert_eq!(precision_from_step(0.25), 2);
        assert_eq!(precision_from_step(0.001), 3);
        assert_eq!(precision_from_step(0.0), 0);
    }

    #[test]
    fn precision_is_capped() {
        assert_eq!(precision_from_step(0.012_345_679), MAX_PRECISION);
    }

    #[test]
    fn float_ties_round_away_from_zero() {
        assert_eq!(format_float(21.25, 1), "21.3");
        assert_eq!(format_float(-21.25, 1), "-21.3");
        assert_eq!(format_float(0.5, 0), "1");
        assert_eq!(format_float(1.2, 2), "1.20");
    }

    #[test]
    fn float_formatting_drops_negative_zero() {
        assert_eq!(format_float(-0.04, 1), "0.0");
    }

    #[test]
    fn boolean_parsing() {
        for truthy in ["1", "true", "on"] {
            assert_eq!(Value::parse(ValueKind::Boolean, truthy), Value::Boolean(true));
        }
        for falsy in ["0", "false", "off", "", "yes", "TRUE"] {
            assert_eq!(Value::parse(ValueKind::Boolean, falsy), Value::Boolean(false));
        }
    }

    #[test]
    fn integer_parsing_is_lenient() {
        assert_eq!(parse_integer("42"), 42);
        assert_eq!(parse_integer("  -7"), -7);
        assert_eq!(parse_integer("+3"), 3);
        assert_eq!(parse_integer("12abc"), 12);
        assert_eq!(parse_integer("3.9"), 3);
        assert_eq!(parse_integer("abc"), 0);
        assert_eq!(parse_integer(""), 0);
        assert_eq!(parse_integer("-"), 0);
    }

    #[test]
    fn integer_parsing_saturates() {
        assert_eq!(parse_integer("99999999999"), i32::MAX);
        assert_eq!(parse_integer("-99999999999999999999999"), i32::MIN);
    }

    #[test]
    fn float_parsing_is_lenient() {
        assert_eq!(parse_float("21.25"), 21.25);
        assert_eq!(parse_float(" 1.5kg"), 1.5);
        assert_eq!(parse_float(".5"), 0.5);
        assert_eq!(parse_float("2."), 2.0);
        assert_eq!(parse_float("1e3"), 1000.0);
        assert_eq!(parse_float("1e"), 1.0);
        assert_eq!(parse_float("-2.5e-1x"), -0.25);
        assert_eq!(parse_float("."), 0.0);
        assert_eq!(parse_float("nan"), 0.0);
        assert_eq!(parse_float("1e99"), 0.0);
        assert_eq!(parse_float("1,5"), 1.0);
    }

    #[test]
    fn text_round_trips() {
        for value in [
            Value::Integer(-12),
            Value::Integer(i32::MAX),
            Value::Boolean(true),
            Value::Boolean(false),
            Value::Text("Grow room <1>".to_owned()),
            Value::Text(String::new()),
        ] {
            let text = value.to_text(0);
            assert_eq!(Value::parse(value.kind(), &text), value);
        }
    }

    #[test]
    fn float_round_trips_within_precision() {
        for (v, precision) in [(20.0_f32, 1), (1.23, 2), (-0.004, 3), (1234.5678, 4)] {
            let text = format_float(v, precision);
            let back = parse_float(&text);
            let tolerance = 10f32.powi(-i32::try_from(precision).unwrap_or(0));
            assert!(
                (back - v).abs() <= tolerance,
                "{v} at precision {precision} came back as {back}"
            );
        }
    }

    #[test]
    fn accessors_match_kind() {
        assert_eq!(Value::from(1.5_f32).as_f32(), Some(1.5));
        assert_eq!(Value::from(3).as_i32(), Some(3));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(3).as_f32(), None);
        assert_eq!(Value::zero(ValueKind::Text), Value::Text(String::new()));
    }
}
