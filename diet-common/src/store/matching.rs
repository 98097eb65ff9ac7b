//! Text matching shared by both backends
//!
//! The document backend evaluates filters inside SQLite, the flat-file backend in
//! memory. These helpers make the in-memory side render and fold values exactly the
//! way the SQL predicates do:
//! - numbers are matched on SQLite's `CAST(<real> AS TEXT)` form (`%!.15g`)
//! - ASCII needles fold ASCII only, like SQLite's built-in `lower()`
//! - needles with non-ASCII letters fold full Unicode; the document backend evaluates
//!   those in memory too

use serde_json::Value;
use std::borrow::Cow;

/// Lower-case a needle
pub fn fold_case(s: &str) -> String {
    if s.is_ascii() {
        s.to_ascii_lowercase()
    } else {
        s.to_lowercase()
    }
}

/// True when a folded needle can be evaluated by SQLite's ASCII `lower()`
pub fn is_sql_foldable(folded_needle: &str) -> bool {
    folded_needle.is_ascii()
}

/// Case-insensitive containment of an already folded needle
pub fn contains_folded(haystack: &str, folded_needle: &str) -> bool {
    if is_sql_foldable(folded_needle) {
        haystack.to_ascii_lowercase().contains(folded_needle)
    } else {
        haystack.to_lowercase().contains(folded_needle)
    }
}

/// Text a field value is matched on
pub fn match_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        Value::Bool(true) => Cow::Borrowed("1"),
        Value::Bool(false) => Cow::Borrowed("0"),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Cow::Owned(i.to_string()),
            (None, Some(f)) => Cow::Owned(real_text(f)),
            (None, None) => Cow::Owned(n.to_string()),
        },
        other => Cow::Owned(other.to_string()),
    }
}

/// Render a float as SQLite casts a REAL to TEXT: 15 significant digits, `%g` layout,
/// and always a fractional part (`20.0`, `1.0e+20`)
pub fn real_text(value: f64) -> String {
    if value == 0.0 {
        return "0.0".to_string();
    }

    let sci = format!("{:.14e}", value);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exponent: i32 = match exponent.parse() {
        Ok(e) => e,
        Err(_) => return sci,
    };
    let sign = if mantissa.starts_with('-') { "-" } else { "" };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    if (-4..15).contains(&exponent) {
        let (int_part, frac_part) = if exponent >= 0 {
            let split = (exponent + 1) as usize;
            (digits[..split].to_string(), digits[split..].to_string())
        } else {
            let zeros = "0".repeat((-exponent - 1) as usize);
            ("0".to_string(), format!("{}{}", zeros, digits))
        };
        format!("{}{}.{}", sign, int_part, trim_fraction(&frac_part))
    } else {
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}{}.{}e{}{:02}",
            sign,
            &digits[..1],
            trim_fraction(&digits[1..]),
            exp_sign,
            exponent.abs()
        )
    }
}

fn trim_fraction(frac: &str) -> &str {
    let trimmed = frac.trim_end_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}
