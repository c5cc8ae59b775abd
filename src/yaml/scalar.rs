//! Scalar typing and rendering.
//!
//! - [`encode_scalar`] turns any serializable value into the value text and
//!   tag a scalar node stores, using `serde_yaml`'s canonical forms.
//! - [`resolve_plain`] types an unquoted scalar (YAML 1.2 core schema).
//! - [`render_scalar`] writes a value back as source text in a given style.

use crate::yaml::errors::PatchError;
use crate::yaml::node::{ScalarStyle, ScalarTag};
use serde::Serialize;
use serde_yaml::Value;

/// Value text and tag ready to be stored on a scalar node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedScalar {
    pub value: String,
    pub tag: ScalarTag,
}

/// Encode a primitive value into scalar form.
///
/// Integers, booleans, floats and null use their canonical unquoted text;
/// strings are kept verbatim with the `!!str` tag. Collections are rejected.
pub fn encode_scalar<T: Serialize + ?Sized>(value: &T) -> Result<EncodedScalar, PatchError> {
    let value = serde_yaml::to_value(value).map_err(|err| PatchError::UnsupportedValue {
        message: err.to_string(),
    })?;

    let encoded = match value {
        Value::Null => EncodedScalar {
            value: "null".to_string(),
            tag: ScalarTag::Null,
        },
        Value::Bool(b) => EncodedScalar {
            value: b.to_string(),
            tag: ScalarTag::Bool,
        },
        Value::Number(n) => {
            let tag = if n.is_f64() {
                ScalarTag::Float
            } else {
                ScalarTag::Int
            };
            EncodedScalar {
                value: n.to_string(),
                tag,
            }
        }
        Value::String(s) => EncodedScalar {
            value: s,
            tag: ScalarTag::Str,
        },
        Value::Sequence(_) => {
            return Err(PatchError::UnsupportedValue {
                message: "sequences cannot be written to a scalar".to_string(),
            })
        }
        Value::Mapping(_) => {
            return Err(PatchError::UnsupportedValue {
                message: "mappings cannot be written to a scalar".to_string(),
            })
        }
        Value::Tagged(tagged) => {
            return Err(PatchError::UnsupportedValue {
                message: format!("tagged value {} cannot be written to a scalar", tagged.tag),
            })
        }
    };

    Ok(encoded)
}

/// Resolve the tag of a plain (unquoted) scalar.
pub fn resolve_plain(text: &str) -> ScalarTag {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return ScalarTag::Null,
        "true" | "True" | "TRUE" | "false" | "False" | "FALSE" => return ScalarTag::Bool,
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" | "-.inf" | "-.Inf" | "-.INF"
        | ".nan" | ".NaN" | ".NAN" => return ScalarTag::Float,
        _ => {}
    }

    if is_int(text) {
        ScalarTag::Int
    } else if is_float(text) {
        ScalarTag::Float
    } else {
        ScalarTag::Str
    }
}

fn is_int(text: &str) -> bool {
    if let Some(hex) = text.strip_prefix("0x") {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(octal) = text.strip_prefix("0o") {
        return !octal.is_empty() && octal.chars().all(|c| ('0'..='7').contains(&c));
    }
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_float(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (mantissa, None),
    };
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || !frac_part.map_or(true, all_digits) {
        return false;
    }
    let has_digits = !int_part.is_empty() || frac_part.is_some_and(|f| !f.is_empty());
    if !has_digits {
        return false;
    }
    // `1` alone is an int; a float needs a dot or an exponent
    if frac_part.is_none() && exponent.is_none() {
        return false;
    }

    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['-', '+']).unwrap_or(exp);
            !exp.is_empty() && all_digits(exp)
        }
    }
}

/// True when `value` can be written unquoted and still read back as the same string.
pub fn is_plain_safe(value: &str, flow: bool) -> bool {
    if value.is_empty() || resolve_plain(value) != ScalarTag::Str {
        return false;
    }
    if value.starts_with(char::is_whitespace) || value.ends_with(char::is_whitespace) {
        return false;
    }
    if value.starts_with("---") || value.starts_with("...") {
        return false;
    }
    if value.chars().any(|c| c.is_control()) {
        return false;
    }
    if value.contains(": ") || value.contains(" #") || value.ends_with(':') {
        return false;
    }
    if flow && value.contains([',', '[', ']', '{', '}']) {
        return false;
    }

    let mut chars = value.chars();
    let first = chars.next().unwrap_or(' ');
    match first {
        ',' | '[' | ']' | '{' | '}' | '#' | '&' | '*' | '!' | '|' | '>' | '\'' | '"' | '%'
        | '@' | '`' => false,
        '-' | '?' | ':' => chars
            .next()
            .is_some_and(|next| !next.is_whitespace() && !(flow && ",[]{}".contains(next))),
        _ => true,
    }
}

/// Render a scalar value as source text.
///
/// Non-string tags render as their bare canonical text. Strings keep the
/// requested style where it can represent the value and otherwise fall back
/// to double quotes. Block styles are rendered inline.
pub fn render_scalar(value: &str, tag: &ScalarTag, style: ScalarStyle, flow: bool) -> String {
    match tag {
        ScalarTag::Str | ScalarTag::Custom(_) => {}
        _ => return value.to_string(),
    }

    match style {
        ScalarStyle::Plain | ScalarStyle::Literal | ScalarStyle::Folded => {
            if is_plain_safe(value, flow) {
                value.to_string()
            } else {
                double_quoted(value)
            }
        }
        ScalarStyle::SingleQuoted => {
            if value.chars().any(|c| c.is_control()) {
                double_quoted(value)
            } else {
                format!("'{}'", value.replace('\'', "''"))
            }
        }
        ScalarStyle::DoubleQuoted => double_quoted(value),
    }
}

/// Double-quoted form with JSON-compatible escapes.
pub fn double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_core_schema() {
        assert_eq!(resolve_plain(""), ScalarTag::Null);
        assert_eq!(resolve_plain("~"), ScalarTag::Null);
        assert_eq!(resolve_plain("True"), ScalarTag::Bool);
        assert_eq!(resolve_plain("42"), ScalarTag::Int);
        assert_eq!(resolve_plain("-7"), ScalarTag::Int);
        assert_eq!(resolve_plain("0x1F"), ScalarTag::Int);
        assert_eq!(resolve_plain("0o17"), ScalarTag::Int);
        assert_eq!(resolve_plain("1.5"), ScalarTag::Float);
        assert_eq!(resolve_plain(".5"), ScalarTag::Float);
        assert_eq!(resolve_plain("1e10"), ScalarTag::Float);
        assert_eq!(resolve_plain("-.inf"), ScalarTag::Float);
        assert_eq!(resolve_plain(".nan"), ScalarTag::Float);
        assert_eq!(resolve_plain("1.2.3"), ScalarTag::Str);
        assert_eq!(resolve_plain("yes"), ScalarTag::Str);
        assert_eq!(resolve_plain("."), ScalarTag::Str);
        assert_eq!(resolve_plain("1e"), ScalarTag::Str);
    }

    #[test]
    fn encodes_primitives() {
        assert_eq!(
            encode_scalar(&3).unwrap(),
            EncodedScalar {
                value: "3".to_string(),
                tag: ScalarTag::Int
            }
        );
        assert_eq!(encode_scalar(&true).unwrap().tag, ScalarTag::Bool);
        assert_eq!(encode_scalar(&1.5).unwrap().value, "1.5");
        assert_eq!(encode_scalar(&1.5).unwrap().tag, ScalarTag::Float);
        assert_eq!(encode_scalar("1.2.3").unwrap().tag, ScalarTag::Str);
        assert_eq!(encode_scalar(&None::<i32>).unwrap().tag, ScalarTag::Null);
    }

    #[test]
    fn rejects_collections() {
        let result = encode_scalar(&vec![1, 2]);
        assert!(matches!(result, Err(PatchError::UnsupportedValue { .. })));
    }

    #[test]
    fn renders_plain_when_safe() {
        let digest = "1.2.3@sha256:d7500ff35777c1835490fb5d4bd5283236c9d18cdc59858c3203eda82abab412";
        assert_eq!(
            render_scalar(digest, &ScalarTag::Str, ScalarStyle::Plain, false),
            digest
        );
        assert_eq!(
            render_scalar("my.registry.com/project/app", &ScalarTag::Str, ScalarStyle::Plain, false),
            "my.registry.com/project/app"
        );
    }

    #[test]
    fn quotes_strings_that_would_change_type() {
        assert_eq!(
            render_scalar("123", &ScalarTag::Str, ScalarStyle::Plain, false),
            "\"123\""
        );
        assert_eq!(
            render_scalar("true", &ScalarTag::Str, ScalarStyle::Plain, false),
            "\"true\""
        );
        assert_eq!(
            render_scalar("", &ScalarTag::Str, ScalarStyle::Plain, false),
            "\"\""
        );
        assert_eq!(
            render_scalar("a: b", &ScalarTag::Str, ScalarStyle::Plain, false),
            "\"a: b\""
        );
        assert_eq!(
            render_scalar("a,b", &ScalarTag::Str, ScalarStyle::Plain, true),
            "\"a,b\""
        );
    }

    #[test]
    fn keeps_quoting_style() {
        assert_eq!(
            render_scalar("it's", &ScalarTag::Str, ScalarStyle::SingleQuoted, false),
            "'it''s'"
        );
        assert_eq!(
            render_scalar("line\nbreak", &ScalarTag::Str, ScalarStyle::SingleQuoted, false),
            "\"line\\nbreak\""
        );
        assert_eq!(
            render_scalar("x", &ScalarTag::Str, ScalarStyle::DoubleQuoted, false),
            "\"x\""
        );
    }

    #[test]
    fn non_strings_render_bare() {
        assert_eq!(render_scalar("3", &ScalarTag::Int, ScalarStyle::DoubleQuoted, false), "3");
        assert_eq!(render_scalar("false", &ScalarTag::Bool, ScalarStyle::Plain, false), "false");
    }

    #[test]
    fn leading_dash_needs_following_text() {
        assert!(is_plain_safe("-v", false));
        assert!(!is_plain_safe("- v", false));
        assert!(!is_plain_safe("-", false));
        assert!(!is_plain_safe("*alias", false));
    }
}
