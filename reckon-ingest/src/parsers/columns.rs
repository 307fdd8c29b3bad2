//! Column bucketing for one extracted line.

use reckon_core::money::parse_amount_with;
use reckon_core::{AmountColumns, ColumnLayout, ColumnRange, RawLine};
use rust_decimal::Decimal;

/// The text of one line split into the layout's columns.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Cells {
    pub date: String,
    pub description: String,
    pub amount: AmountCell,
    pub balance: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AmountCell {
    Empty,
    Value(Decimal),
    /// Text in an amount column that is not an amount, or both split columns filled
    Invalid(String),
}

fn text_in(line: &RawLine, range: ColumnRange) -> String {
    line.text_between(range.min, range.max)
}

pub(crate) fn cells(line: &RawLine, layout: &ColumnLayout) -> Cells {
    let nf = layout.number_format;
    let amount = match &layout.amounts {
        AmountColumns::Split { paid_out, paid_in } => {
            let out = text_in(line, *paid_out);
            let inn = text_in(line, *paid_in);
            match (out.is_empty(), inn.is_empty()) {
                (true, true) => AmountCell::Empty,
                (false, true) => match parse_amount_with(&out, nf) {
                    Ok(v) => AmountCell::Value(-v.abs()),
                    Err(_) => AmountCell::Invalid(out),
                },
                (true, false) => match parse_amount_with(&inn, nf) {
                    Ok(v) => AmountCell::Value(v.abs()),
                    Err(_) => AmountCell::Invalid(inn),
                },
                (false, false) => AmountCell::Invalid(format!("{out} | {inn}")),
            }
        }
        AmountColumns::Signed {
            amount,
            positive_is_debit,
        } => {
            let raw = text_in(line, *amount);
            if raw.is_empty() {
                AmountCell::Empty
            } else {
                match parse_amount_with(&raw, nf) {
                    Ok(v) if *positive_is_debit => AmountCell::Value(-v),
                    Ok(v) => AmountCell::Value(v),
                    Err(_) => AmountCell::Invalid(raw),
                }
            }
        }
    };

    let balance = layout
        .balance
        .map(|range| text_in(line, range))
        .filter(|s| !s.is_empty())
        .and_then(|s| parse_amount_with(&s, nf).ok());

    Cells {
        date: text_in(line, layout.date),
        description: text_in(line, layout.description),
        amount,
        balance,
    }
}
