//! Field coercion for survey extracts.
//!
//! Raw cells arrive as bytes in the extract's declared encoding. Anything that
//! does not coerce cleanly becomes `None`; nothing here fails.

use encoding_rs::Encoding;
use std::borrow::Cow;

/// Decodes one cell using the extract's declared encoding.
pub fn decode_field<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Cow<'a, str> {
    encoding.decode_without_bom_handling(bytes).0
}

/// Parses a numeric cell.
///
/// Accepts a decimal comma when the cell has no decimal point (`"1234,5"`).
/// Blank, non-numeric and non-finite cells yield `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = match trimmed.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) if !trimmed.contains('.') && trimmed.matches(',').count() == 1 => {
            trimmed.replace(',', ".").parse::<f64>().ok()
        }
        Err(_) => None,
    };

    parsed.filter(|v| v.is_finite())
}

/// Parses an income cell, mapping any of `missing_codes` to `None`.
pub fn parse_income(raw: &str, missing_codes: &[f64]) -> Option<f64> {
    parse_number(raw).filter(|v| !missing_codes.contains(v))
}

/// Parses an integral survey code such as `2` or `2.0`.
pub fn parse_code(raw: &str) -> Option<i32> {
    let v = parse_number(raw)?;
    if v.fract() != 0.0 || v < i32::MIN as f64 || v > i32::MAX as f64 {
        return None;
    }
    Some(v as i32)
}

/// Parses a quarter number, accepting only 1 through 4.
pub fn parse_quarter(raw: &str) -> Option<u8> {
    match parse_code(raw)? {
        q @ 1..=4 => Some(q as u8),
        _ => None,
    }
}

/// Parses a non-negative domain code.
pub fn parse_domain(raw: &str) -> Option<u32> {
    parse_code(raw).and_then(|c| u32::try_from(c).ok())
}
