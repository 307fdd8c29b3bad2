//! Exact-decimal currency parsing and formatting.
//!
//! Statements print amounts with thousands separators, currency symbols and a
//! handful of debit conventions:
//!   -£1,234.56    1234.56 DR    (1,234.56)    1,234.56 D    EUR 1.234,56-
//! Everything is parsed into `rust_decimal::Decimal`; no value ever passes
//! through a binary float.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MoneyError;

const CURRENCY_SYMBOLS: &[&str] = &["£", "$", "€"];
const CURRENCY_CODES: &[&str] = &["GBP", "USD", "EUR"];

/// Trailing markers, longest first. `true` means debit.
const SIGN_SUFFIXES: &[(&str, bool)] = &[("DR", true), ("OD", true), ("CR", false), ("D", true)];

/// Separator conventions for the digits of an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    pub decimal_separator: char,
    pub group_separator: char,
}

impl NumberFormat {
    pub const UK: NumberFormat = NumberFormat {
        decimal_separator: '.',
        group_separator: ',',
    };

    pub const EUROPEAN: NumberFormat = NumberFormat {
        decimal_separator: ',',
        group_separator: '.',
    };
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::UK
    }
}

/// How a negative amount is rendered by [`format_amount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignStyle {
    /// `-£1,234.56`
    Minus,
    /// `1,234.56 DR`
    DebitSuffix,
    /// `(1,234.56)`
    Parentheses,
}

/// Parse a UK-formatted amount.
pub fn parse_amount(raw: &str) -> Result<Decimal, MoneyError> {
    parse_amount_with(raw, NumberFormat::UK)
}

/// Parse an amount using the given separator convention.
pub fn parse_amount_with(raw: &str, format: NumberFormat) -> Result<Decimal, MoneyError> {
    let original = raw.trim();
    let invalid = || MoneyError::Invalid(original.to_string());

    let mut s = original;
    let mut negations = 0u8;

    if let Some((rest, debit)) = strip_sign_suffix(s) {
        s = rest;
        if debit {
            negations += 1;
        }
    }

    // Peel symbols, codes, brackets and sign characters off both ends until
    // only digits and separators are left.
    loop {
        let before = s;
        s = s.trim();
        for sym in CURRENCY_SYMBOLS.iter().chain(CURRENCY_CODES) {
            if let Some(rest) = s.strip_prefix(sym) {
                s = rest;
            }
            if let Some(rest) = s.strip_suffix(sym) {
                s = rest;
            }
        }
        s = s.trim();
        if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            s = inner;
            negations += 1;
        }
        if let Some(rest) = s.strip_prefix('-') {
            s = rest;
            negations += 1;
        } else if let Some(rest) = s.strip_suffix('-') {
            s = rest;
            negations += 1;
        } else if let Some(rest) = s.strip_prefix('+') {
            s = rest;
        }
        if s == before {
            break;
        }
    }

    if negations > 1 {
        return Err(MoneyError::ConflictingSign(original.to_string()));
    }

    let canonical = canonical_digits(s, format).ok_or_else(invalid)?;
    let value = Decimal::from_str(&canonical).map_err(|_| invalid())?;
    Ok(if negations == 1 { -value } else { value })
}

/// Returns the amount with a trailing `DR`/`CR`/`D`/`OD` marker removed.
/// The marker must be separated from letters (so `USD` is not read as `US` + `D`).
fn strip_sign_suffix(s: &str) -> Option<(&str, bool)> {
    let upper = s.to_ascii_uppercase();
    for (suffix, debit) in SIGN_SUFFIXES {
        if !upper.ends_with(suffix) {
            continue;
        }
        let rest = &s[..s.len() - suffix.len()];
        match rest.chars().last() {
            Some(c) if !c.is_alphabetic() => return Some((rest.trim_end(), *debit)),
            _ => continue,
        }
    }
    None
}

/// Validates grouping and returns a `1234.56` style string.
fn canonical_digits(s: &str, format: NumberFormat) -> Option<String> {
    if s.is_empty() {
        return None;
    }
    let (int_part, frac_part) = match s.split_once(format.decimal_separator) {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };

    if let Some(frac) = frac_part {
        if frac.is_empty() || frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }

    let digits: String = if int_part.contains(format.group_separator) {
        let groups: Vec<&str> = int_part.split(format.group_separator).collect();
        let first_ok = (1..=3).contains(&groups[0].len());
        let rest_ok = groups[1..].iter().all(|g| g.len() == 3);
        if !first_ok || !rest_ok {
            return None;
        }
        groups.concat()
    } else {
        int_part.to_string()
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(match frac_part {
        Some(frac) => format!("{digits}.{frac}"),
        None => digits,
    })
}

/// Render an amount with thousands separators and two decimal places.
pub fn format_amount(amount: Decimal, style: SignStyle, symbol: Option<&str>) -> String {
    let grouped = group_thousands(amount.abs());
    let symbol = symbol.unwrap_or("");
    if !amount.is_sign_negative() || amount.is_zero() {
        return format!("{symbol}{grouped}");
    }
    match style {
        SignStyle::Minus => format!("-{symbol}{grouped}"),
        SignStyle::DebitSuffix => format!("{symbol}{grouped} DR"),
        SignStyle::Parentheses => format!("({symbol}{grouped})"),
    }
}

/// Plain two-decimal rendering used by the exports, e.g. `-1234.50`.
pub fn format_plain(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

fn group_thousands(abs: Decimal) -> String {
    let plain = format!("{:.2}", abs.round_dp(2));
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));
    let mut out = String::with_capacity(plain.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.push('.');
    out.push_str(frac_part);
    out
}
