//! Transaction line parsing.
//!
//! A `LineParser` turns the lines of one statement block into transactions
//! using a column layout. Rows are read top to bottom as a small state
//! machine: a date opens an entry, an amount completes it, and undated text
//! either continues the open entry or the previous one.
//!
//! Layout rules:
//!   - lines before the column header on each page are ignored (when the
//!     layout names a header)
//!   - `skip_patterns` lines are ignored everywhere
//!   - with `carry_forward_dates`, undated rows reuse the last printed date

pub mod columns;

use chrono::NaiveDate;
use regex::Regex;
use reckon_core::dates::parse_in_period;
use reckon_core::{
    ColumnLayout, LineRef, RawLine, StatementBlock, Transaction, UnparsedLineWarning,
};
use rust_decimal::Decimal;

use columns::{cells, AmountCell};

/// Transactions of one block, sorted by date, and the lines that were dropped.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub transactions: Vec<Transaction>,
    pub warnings: Vec<UnparsedLineWarning>,
    /// Dated rows with an amount that were ignored because the layout's
    /// column header never appeared in the block. Non-zero means the block
    /// is not in this layout.
    pub rows_outside_table: usize,
}

/// Compiled column layout.
pub struct LineParser {
    layout: ColumnLayout,
    header: Option<Regex>,
    skips: Vec<Regex>,
    markers: Vec<String>,
}

/// An entry whose date has been read but whose amount has not.
struct Pending {
    date: NaiveDate,
    description: String,
    page: u32,
    text: String,
    refs: Vec<LineRef>,
}

struct RowState<'a> {
    block: &'a StatementBlock,
    last_date: Option<NaiveDate>,
    pending: Option<Pending>,
    out: ParseOutcome,
}

impl RowState<'_> {
    fn warn(&mut self, line: &RawLine, reason: &str) {
        self.warn_text(line.page, line.text.clone(), reason);
    }

    fn warn_text(&mut self, page: u32, text: String, reason: &str) {
        let warning = UnparsedLineWarning {
            page,
            text,
            reason: reason.to_string(),
        };
        tracing::warn!(block = %self.block.header.label(), %warning, "unparsed line");
        self.out.warnings.push(warning);
    }

    /// An open entry that never received an amount.
    fn abandon_pending(&mut self) {
        if let Some(p) = self.pending.take() {
            self.warn_text(p.page, p.text, "date without amount");
        }
    }

    fn push(
        &mut self,
        date: NaiveDate,
        description: String,
        amount: Decimal,
        balance: Option<Decimal>,
        refs: Vec<LineRef>,
    ) {
        let mut txn = Transaction::new(date, description, amount, self.block.header.clone());
        txn.running_balance = balance;
        txn.line_refs = refs;
        self.out.transactions.push(txn);
    }
}

fn join(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a} {b}"),
    }
}

impl LineParser {
    pub fn new(layout: &ColumnLayout) -> Result<Self, regex::Error> {
        let header = layout
            .header_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?;
        let skips = layout
            .skip_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        let markers = layout
            .entry_markers
            .iter()
            .map(|m| m.to_uppercase())
            .collect();
        Ok(Self {
            layout: layout.clone(),
            header,
            skips,
            markers,
        })
    }

    fn opens_entry(&self, description: &str) -> bool {
        description
            .split_whitespace()
            .next()
            .is_some_and(|first| self.markers.iter().any(|m| *m == first.to_uppercase()))
    }

    fn looks_like_row(&self, line: &RawLine, block: &StatementBlock) -> bool {
        let row = cells(line, &self.layout);
        matches!(row.amount, AmountCell::Value(_))
            && !row.date.is_empty()
            && parse_in_period(
                &row.date,
                &self.layout.date_formats,
                block.header.period_start,
                block.header.period_end,
            )
            .is_ok()
    }

    pub fn parse(&self, block: &StatementBlock) -> ParseOutcome {
        let header = &block.header;
        let carry = self.layout.carry_forward_dates;
        let mut state = RowState {
            block,
            last_date: None,
            pending: None,
            out: ParseOutcome::default(),
        };
        let mut in_table = self.header.is_none();
        let mut header_seen = false;
        let mut gated_rows = 0;
        let mut page = None;

        for (line_index, line) in block.raw_lines.iter().enumerate() {
            if page != Some(line.page) {
                page = Some(line.page);
                if self.header.is_some() {
                    in_table = false;
                }
            }
            if !in_table {
                if self.header.as_ref().is_some_and(|re| re.is_match(&line.text)) {
                    in_table = true;
                    header_seen = true;
                } else if !header_seen && self.looks_like_row(line, block) {
                    gated_rows += 1;
                }
                continue;
            }
            if self.skips.iter().any(|re| re.is_match(&line.text)) {
                continue;
            }

            let row = cells(line, &self.layout);
            let line_ref = LineRef {
                page: line.page,
                line_index,
            };

            let date = if row.date.is_empty() {
                None
            } else {
                match parse_in_period(
                    &row.date,
                    &self.layout.date_formats,
                    header.period_start,
                    header.period_end,
                ) {
                    Ok(d) => Some(d),
                    Err(_) => {
                        if row.amount != AmountCell::Empty {
                            state.warn(line, "unparsable date");
                        }
                        continue;
                    }
                }
            };

            let amount = match row.amount {
                AmountCell::Empty => None,
                AmountCell::Value(v) => Some(v),
                AmountCell::Invalid(_) => {
                    state.warn(line, "unparsable amount");
                    continue;
                }
            };

            // A payment code on an undated row starts a new same-day entry.
            if date.is_none() && carry && state.pending.is_some() && self.opens_entry(&row.description) {
                state.abandon_pending();
            }

            match (date, amount) {
                (Some(d), Some(a)) => {
                    state.abandon_pending();
                    state.last_date = Some(d);
                    state.push(d, row.description, a, row.balance, vec![line_ref]);
                }
                (Some(d), None) => {
                    state.abandon_pending();
                    state.last_date = Some(d);
                    state.pending = Some(Pending {
                        date: d,
                        description: row.description,
                        page: line.page,
                        text: line.text.clone(),
                        refs: vec![line_ref],
                    });
                }
                (None, Some(a)) => {
                    if let Some(mut p) = state.pending.take() {
                        p.refs.push(line_ref);
                        let description = join(&p.description, &row.description);
                        state.push(p.date, description, a, row.balance, p.refs);
                    } else if let (true, Some(d)) = (carry, state.last_date) {
                        state.push(d, row.description, a, row.balance, vec![line_ref]);
                    } else {
                        state.warn(line, "amount without date");
                    }
                }
                (None, None) => {
                    if row.description.is_empty() {
                        continue;
                    }
                    if let Some(p) = state.pending.as_mut() {
                        p.description = join(&p.description, &row.description);
                        p.refs.push(line_ref);
                    } else if let (true, Some(d), true) =
                        (carry, state.last_date, self.opens_entry(&row.description))
                    {
                        state.pending = Some(Pending {
                            date: d,
                            description: row.description,
                            page: line.page,
                            text: line.text.clone(),
                            refs: vec![line_ref],
                        });
                    } else if let Some(prev) = state.out.transactions.last_mut() {
                        prev.description = join(&prev.description, &row.description);
                        prev.line_refs.push(line_ref);
                    }
                }
            }
        }
        state.abandon_pending();

        let mut out = state.out;
        if self.header.is_some() && !header_seen && gated_rows > 0 {
            tracing::warn!(
                block = %header.label(),
                rows = gated_rows,
                "column header not found; block does not match its layout"
            );
            out.rows_outside_table = gated_rows;
        }
        out.transactions.sort_by_key(|t| t.date);
        tracing::debug!(
            block = %header.label(),
            transactions = out.transactions.len(),
            warnings = out.warnings.len(),
            "parsed block"
        );
        out
    }
}

/// Parse with a freshly compiled [`LineParser`].
pub fn parse(block: &StatementBlock, layout: &ColumnLayout) -> Result<ParseOutcome, regex::Error> {
    Ok(LineParser::new(layout)?.parse(block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reckon_core::{AccountType, BlockHeader, TextSegment};
    use std::path::{Path, PathBuf};
    use std::str::FromStr;
    use std::sync::Arc;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(page: u32, y: f32, parts: &[(f32, &str)]) -> RawLine {
        RawLine::new(
            Arc::from(Path::new("a.pdf")),
            page,
            y,
            parts
                .iter()
                .map(|(x, t)| TextSegment { x: *x, text: t.to_string() })
                .collect(),
        )
    }

    fn table_header(page: u32) -> RawLine {
        row(
            page,
            720.0,
            &[(40.0, "Date"), (100.0, "Payment type and details"), (340.0, "Paid out"), (420.0, "Paid in"), (500.0, "Balance")],
        )
    }

    fn block(start: NaiveDate, end: NaiveDate, lines: Vec<RawLine>) -> StatementBlock {
        StatementBlock {
            header: Arc::new(BlockHeader {
                source_file: PathBuf::from("a.pdf"),
                index: 0,
                account_id: "12345678".into(),
                account_name: "MR J SMITH".into(),
                sort_code: "40-11-22".into(),
                account_type: AccountType::Current,
                period_start: start,
                period_end: end,
                opening_balance: dec("100.00"),
                closing_balance: dec("130.00"),
                payments_in: None,
                payments_out: None,
            }),
            raw_lines: lines,
        }
    }

    fn april(lines: Vec<RawLine>) -> StatementBlock {
        block(ymd(2025, 4, 1), ymd(2025, 4, 30), lines)
    }

    fn parse_current(b: &StatementBlock) -> ParseOutcome {
        parse(b, &ColumnLayout::uk_current()).unwrap()
    }

    #[test]
    fn test_dated_rows_with_split_columns() {
        let b = april(vec![
            row(1, 800.0, &[(40.0, "Opening Balance 100.00")]),
            table_header(1),
            row(1, 700.0, &[(40.0, "01 Apr 25"), (100.0, "BALANCE BROUGHT FORWARD"), (500.0, "100.00")]),
            row(1, 690.0, &[(40.0, "02 Apr 25"), (100.0, "CR EMPLOYER"), (420.0, "50.00"), (500.0, "150.00")]),
            row(1, 680.0, &[(40.0, "03 Apr 25"), (100.0, "DD ENERGY"), (350.0, "20.00"), (500.0, "130.00")]),
        ]);
        let out = parse_current(&b);
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.transactions[0].amount, dec("50.00"));
        assert_eq!(out.transactions[0].date, ymd(2025, 4, 2));
        assert_eq!(out.transactions[1].amount, dec("-20.00"));
        assert_eq!(out.transactions[1].running_balance, Some(dec("130.00")));
        assert_eq!(out.transactions[1].line_refs[0].line_index, 4);
    }

    #[test]
    fn test_rows_before_header_are_ignored() {
        let b = april(vec![
            row(1, 800.0, &[(40.0, "02 Apr 25"), (100.0, "Opening Balance"), (420.0, "100.00")]),
            table_header(1),
            row(1, 700.0, &[(40.0, "03 Apr 25"), (100.0, "CR PAY"), (420.0, "5.00")]),
        ]);
        let out = parse_current(&b);
        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.transactions[0].description, "CR PAY");
    }

    #[test]
    fn test_same_day_entries_carry_the_date() {
        let b = april(vec![
            table_header(1),
            row(1, 700.0, &[(40.0, "04 Apr 25"), (100.0, "VIS TESCO STORES"), (350.0, "12.50")]),
            row(1, 690.0, &[(100.0, ")))"), (120.0, "COFFEE SHOP")]),
            row(1, 680.0, &[(100.0, "LONDON"), (350.0, "3.20")]),
            row(1, 670.0, &[(100.0, "DD COUNCIL TAX"), (350.0, "150.00"), (500.0, "0.00")]),
        ]);
        let out = parse_current(&b);
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        let descs: Vec<&str> = out.transactions.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(descs, vec!["VIS TESCO STORES", "))) COFFEE SHOP LONDON", "DD COUNCIL TAX"]);
        assert!(out.transactions.iter().all(|t| t.date == ymd(2025, 4, 4)));
        assert_eq!(out.transactions[1].line_refs.len(), 2);
    }

    #[test]
    fn test_dated_line_completed_by_next_line() {
        let b = april(vec![
            table_header(1),
            row(1, 700.0, &[(40.0, "05 Apr 25"), (100.0, "BP LANDLORD")]),
            row(1, 690.0, &[(100.0, "RENT APRIL"), (350.0, "600.00")]),
        ]);
        let out = parse_current(&b);
        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.transactions[0].description, "BP LANDLORD RENT APRIL");
        assert_eq!(out.transactions[0].amount, dec("-600.00"));
    }

    #[test]
    fn test_incomplete_entry_becomes_warning() {
        let b = april(vec![
            table_header(1),
            row(1, 700.0, &[(40.0, "05 Apr 25"), (100.0, "BP LANDLORD")]),
            row(1, 690.0, &[(40.0, "06 Apr 25"), (100.0, "CR REFUND"), (420.0, "9.99")]),
        ]);
        let out = parse_current(&b);
        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].reason, "date without amount");
        assert!(out.warnings[0].text.contains("BP LANDLORD"));
    }

    #[test]
    fn test_amount_without_date_and_no_carry() {
        let b = april(vec![
            row(1, 720.0, &[(40.0, "Date"), (120.0, "Description"), (390.0, "Amount")]),
            row(1, 700.0, &[(120.0, "ORPHAN"), (390.0, "4.00")]),
            row(1, 690.0, &[(40.0, "07 Apr 25"), (120.0, "INTEREST"), (390.0, "0.12")]),
        ]);
        let out = parse(&b, &ColumnLayout::uk_savings()).unwrap();
        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.warnings[0].reason, "amount without date");
    }

    #[test]
    fn test_header_gate_resets_per_page_and_dates_carry_across() {
        let b = april(vec![
            table_header(1),
            row(1, 700.0, &[(40.0, "08 Apr 25"), (100.0, "SO SAVINGS"), (350.0, "10.00")]),
            row(2, 800.0, &[(40.0, "Account Name Sortcode Account Number Sheet Number")]),
            row(2, 790.0, &[(40.0, "09 Apr 25 is not a row"), (420.0, "1.00")]),
            table_header(2),
            row(2, 700.0, &[(100.0, "DD GYM"), (350.0, "30.00")]),
        ]);
        let out = parse_current(&b);
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.transactions[1].date, ymd(2025, 4, 8));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_yearless_dates_and_sorting() {
        let b = block(
            ymd(2024, 12, 15),
            ymd(2025, 1, 14),
            vec![
                table_header(1),
                row(1, 700.0, &[(40.0, "02 Jan"), (100.0, "CR LATE"), (420.0, "1.00")]),
                row(1, 690.0, &[(40.0, "28 Dec"), (100.0, "CR EARLY"), (420.0, "2.00")]),
            ],
        );
        let out = parse_current(&b);
        assert_eq!(out.transactions[0].date, ymd(2024, 12, 28));
        assert_eq!(out.transactions[1].date, ymd(2025, 1, 2));
    }

    #[test]
    fn test_empty_block() {
        let out = parse_current(&april(Vec::new()));
        assert!(out.transactions.is_empty());
        assert!(out.warnings.is_empty());
        assert_eq!(out.rows_outside_table, 0);
    }

    #[test]
    fn test_unknown_column_header_counts_ignored_rows() {
        let b = april(vec![
            row(1, 800.0, &[(40.0, "Opening Balance 100.00")]),
            row(1, 720.0, &[(40.0, "Date"), (100.0, "Details"), (340.0, "Money out"), (420.0, "Money in")]),
            row(1, 700.0, &[(40.0, "02 Apr 25"), (100.0, "CR EMPLOYER"), (420.0, "50.00")]),
            row(1, 690.0, &[(40.0, "03 Apr 25"), (100.0, "DD ENERGY"), (350.0, "20.00")]),
        ]);
        let out = parse_current(&b);
        assert!(out.transactions.is_empty());
        assert_eq!(out.rows_outside_table, 2);
    }

    #[test]
    fn test_rows_above_a_found_header_are_not_counted() {
        let b = april(vec![
            row(1, 800.0, &[(40.0, "02 Apr 25"), (100.0, "Summary"), (420.0, "100.00")]),
            table_header(1),
        ]);
        assert_eq!(parse_current(&b).rows_outside_table, 0);
    }
}
