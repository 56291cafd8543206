//! Scalar parameter values and hardware response parsing.
//!
//! Instruments report every setting as text. A reply such as `"16"` is an
//! integer, `"2.5E-3"` is a float, and `"SAMPLE"` is a plain token. Rather
//! than inspecting types at runtime, [`ParamValue::parse`] runs an explicit
//! ordered attempt chain (integer, float, string) and returns a tagged value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar configuration value as carried over the wire.
///
/// Variant order matters for untagged deserialization: integers are tried
/// before floats so that `16` round-trips as `Int(16)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value, including floats that collapsed to a whole number.
    Int(i64),
    /// Non-integral floating point value.
    Float(f64),
    /// Anything that does not parse as a number.
    Str(String),
}

impl ParamValue {
    /// Parse raw response text through the ordered attempt chain.
    ///
    /// Integers win over floats; a finite float with no fractional part is
    /// collapsed to an integer (instruments freely answer `16.0` for a
    /// setting that was written as `16`). Everything else is kept as a
    /// trimmed string.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(int) = trimmed.parse::<i64>() {
            return ParamValue::Int(int);
        }
        if let Ok(float) = trimmed.parse::<f64>() {
            if float.is_finite() && float.fract() == 0.0 && float.abs() < 9.0e18 {
                return ParamValue::Int(float as i64);
            }
            return ParamValue::Float(float);
        }
        ParamValue::Str(trimmed.to_string())
    }

    /// Integer view, if this value is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(int) => Some(*int),
            _ => None,
        }
    }

    /// Numeric view covering both integers and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(int) => Some(*int as f64),
            ParamValue::Float(float) => Some(*float),
            ParamValue::Str(_) => None,
        }
    }

    /// String slice view, if this value is a plain token.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    /// Wire rendering, exactly what follows the command word in a write.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(int) => write!(f, "{int}"),
            ParamValue::Float(float) => write!(f, "{float}"),
            ParamValue::Str(text) => write!(f, "{text}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_first() {
        assert_eq!(ParamValue::parse("16"), ParamValue::Int(16));
        assert_eq!(ParamValue::parse(" -3 "), ParamValue::Int(-3));
    }

    #[test]
    fn integral_float_collapses_to_int() {
        assert_eq!(ParamValue::parse("16.0"), ParamValue::Int(16));
        assert_eq!(ParamValue::parse("1e3"), ParamValue::Int(1000));
    }

    #[test]
    fn fractional_float_stays_float() {
        assert_eq!(ParamValue::parse("2.5"), ParamValue::Float(2.5));
        assert_eq!(ParamValue::parse("2.5E-3"), ParamValue::Float(0.0025));
    }

    #[test]
    fn non_numeric_falls_back_to_string() {
        assert_eq!(
            ParamValue::parse(" SAMPLE "),
            ParamValue::Str("SAMPLE".to_string())
        );
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(ParamValue::Int(16).to_string(), "16");
        assert_eq!(ParamValue::Float(2.5).to_string(), "2.5");
        assert_eq!(ParamValue::Str("SAMPLE".into()).to_string(), "SAMPLE");
    }

    #[test]
    fn numeric_views() {
        assert_eq!(ParamValue::Int(4).as_f64(), Some(4.0));
        assert_eq!(ParamValue::Float(0.5).as_f64(), Some(0.5));
        assert_eq!(ParamValue::Str("x".into()).as_f64(), None);
    }
}
