//! Statement segmentation.
//!
//! One PDF may hold several statement periods, possibly for several accounts.
//! A line matching the period marker opens a block that runs until the next
//! marker. Within each block the segmenter picks up the account identity, the
//! account type and the declared balances. Consecutive blocks for the same
//! account and period are continuation sheets and are merged.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use regex::Regex;
use reckon_core::dates::parse_period;
use reckon_core::money::parse_amount_with;
use reckon_core::{
    AccountType, BlockHeader, NumberFormat, RawLine, SegmentationError, SegmenterConfig,
    StatementBlock,
};
use rust_decimal::Decimal;

const MISSING_ACCOUNT_NUMBER: &str = "<missing account number>";
const MISSING_ACCOUNT_NAME: &str = "<missing account name>";
const MISSING_SORT_CODE: &str = "<missing sort code>";

/// Blocks found in one document, in document order, plus the blocks that had
/// to be dropped.
#[derive(Debug, Default)]
pub struct SegmentOutcome {
    pub blocks: Vec<StatementBlock>,
    pub errors: Vec<SegmentationError>,
}

/// Compiled segmenter rules.
pub struct Segmenter {
    marker: Regex,
    config: SegmenterConfig,
}

#[derive(Debug, Clone, PartialEq)]
struct AccountIdentity {
    name: String,
    sort_code: String,
    number: String,
}

/// A block before validation.
struct Draft {
    page: u32,
    period: Result<(NaiveDate, NaiveDate), String>,
    identity: Option<AccountIdentity>,
    account_type: AccountType,
    opening: Option<Decimal>,
    closing: Option<Decimal>,
    payments_in: Option<Decimal>,
    payments_out: Option<Decimal>,
    lines: Vec<RawLine>,
}

impl Draft {
    fn continues(&self, prev: &Draft) -> bool {
        match (&self.period, &prev.period) {
            (Ok(a), Ok(b)) => a == b && self.identity.is_some() && self.identity == prev.identity,
            _ => false,
        }
    }

    fn absorb(&mut self, next: Draft) {
        self.opening = self.opening.or(next.opening);
        self.closing = self.closing.or(next.closing);
        self.payments_in = self.payments_in.or(next.payments_in);
        self.payments_out = self.payments_out.or(next.payments_out);
        self.lines.extend(next.lines);
    }
}

impl Segmenter {
    pub fn new(config: &SegmenterConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            marker: Regex::new(&config.period_marker)?,
            config: config.clone(),
        })
    }

    /// Split the lines of `source` into statement blocks.
    pub fn segment(&self, lines: Vec<RawLine>, source: &Path) -> SegmentOutcome {
        let markers: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| self.marker.is_match(&l.text))
            .map(|(i, _)| i)
            .collect();

        let mut outcome = SegmentOutcome::default();
        let Some(&first) = markers.first() else {
            tracing::warn!(path = %source.display(), "no statement period marker found");
            return outcome;
        };

        let preamble_identity = self.find_identity(&lines[..first]);

        let mut rest = lines;
        // Walk from the back so each split_off leaves the earlier lines in place.
        let mut slices: Vec<Vec<RawLine>> = Vec::with_capacity(markers.len());
        for &start in markers.iter().rev() {
            slices.push(rest.split_off(start));
        }
        slices.reverse();

        let mut drafts: Vec<Draft> = Vec::new();
        for slice in slices {
            let mut draft = self.draft(slice);
            if draft.identity.is_none() {
                draft.identity = preamble_identity.clone();
            }
            match drafts.last_mut() {
                Some(prev) if draft.continues(prev) => {
                    tracing::debug!(page = draft.page, "merging continuation sheet");
                    prev.absorb(draft);
                }
                _ => drafts.push(draft),
            }
        }

        for draft in drafts {
            match self.validate(draft, source, outcome.blocks.len()) {
                Ok(block) => {
                    tracing::debug!(
                        block = %block.header.label(),
                        lines = block.raw_lines.len(),
                        "segmented block"
                    );
                    outcome.blocks.push(block);
                }
                Err(err) => {
                    tracing::warn!(path = %source.display(), error = %err, "dropping statement block");
                    outcome.errors.push(err);
                }
            }
        }
        outcome
    }

    fn draft(&self, lines: Vec<RawLine>) -> Draft {
        let head = &lines[0];
        let page = head.page;
        let period = self
            .marker
            .captures(&head.text)
            .ok_or_else(|| format!("period marker not recognised in '{}'", head.text))
            .and_then(|caps| {
                let start = caps.name("start").map(|m| m.as_str()).unwrap_or_default();
                let end = caps.name("end").map(|m| m.as_str()).unwrap_or_default();
                parse_period(start, end, &self.config.period_formats)
                    .map_err(|e| format!("unparsable statement period '{}': {e}", head.text))
            });

        let nf = self.config.number_format;
        Draft {
            page,
            period,
            identity: self.find_identity(&lines),
            account_type: self.account_type(&lines),
            opening: find_labelled_amount(&lines, &self.config.opening_labels, nf),
            closing: find_labelled_amount(&lines, &self.config.closing_labels, nf),
            payments_in: find_labelled_amount(&lines, &self.config.payments_in_labels, nf),
            payments_out: find_labelled_amount(&lines, &self.config.payments_out_labels, nf),
            lines,
        }
    }

    fn validate(
        &self,
        draft: Draft,
        source: &Path,
        index: usize,
    ) -> Result<StatementBlock, SegmentationError> {
        let fail = |reason: String| SegmentationError {
            page: draft.page,
            reason,
        };
        let (start, end) = draft.period.clone().map_err(fail)?;
        if start > end {
            return Err(fail(format!("statement period starts after it ends ({start} > {end})")));
        }
        let opening = draft
            .opening
            .ok_or_else(|| fail("no opening balance found".to_string()))?;
        let closing = draft
            .closing
            .ok_or_else(|| fail("no closing balance found".to_string()))?;

        let identity = draft.identity.unwrap_or_else(|| {
            tracing::warn!(
                path = %source.display(),
                page = draft.page,
                "account identity not found; using placeholders"
            );
            AccountIdentity {
                name: MISSING_ACCOUNT_NAME.to_string(),
                sort_code: MISSING_SORT_CODE.to_string(),
                number: MISSING_ACCOUNT_NUMBER.to_string(),
            }
        });

        let header = BlockHeader {
            source_file: source.to_path_buf(),
            index,
            account_id: identity.number,
            account_name: identity.name,
            sort_code: identity.sort_code,
            account_type: draft.account_type,
            period_start: start,
            period_end: end,
            opening_balance: opening,
            closing_balance: closing,
            payments_in: draft.payments_in,
            payments_out: draft.payments_out,
        };
        Ok(StatementBlock {
            header: Arc::new(header),
            raw_lines: draft.lines,
        })
    }

    /// The line after the account header reads `NAME... SORTCODE NUMBER SHEET`.
    fn find_identity(&self, lines: &[RawLine]) -> Option<AccountIdentity> {
        let wanted = squash(&self.config.account_header);
        let pos = lines.iter().position(|l| squash(&l.text) == wanted)?;
        let next = lines.get(pos + 1)?;

        let mut tokens: Vec<&str> = next.text.split_whitespace().collect();
        if tokens.len() < 4 {
            return None;
        }
        let _sheet = tokens.pop()?;
        let number = tokens.pop()?.to_string();
        let sort_code = tokens.pop()?.to_string();
        Some(AccountIdentity {
            name: tokens.join(" "),
            sort_code,
            number,
        })
    }

    /// Lines above the balance summary. Transaction rows never reach this
    /// far up, so a description such as `TFR TO SAVINGS` cannot pick the type.
    fn header_region<'a>(&self, lines: &'a [RawLine]) -> &'a [RawLine] {
        let c = &self.config;
        let labels = [
            &c.opening_labels,
            &c.closing_labels,
            &c.payments_in_labels,
            &c.payments_out_labels,
        ];
        let end = lines
            .iter()
            .position(|l| labels.iter().any(|ls| has_label(&l.text, ls)))
            .unwrap_or(lines.len());
        &lines[..end]
    }

    fn account_type(&self, lines: &[RawLine]) -> AccountType {
        let head = self.header_region(lines);
        self.config
            .account_type_rules
            .iter()
            .find(|rule| {
                let needle = rule.pattern.to_lowercase();
                head.iter().any(|l| l.text.to_lowercase().contains(&needle))
            })
            .map(|rule| rule.account_type)
            .unwrap_or(self.config.default_account_type)
    }
}

/// Lowercase with all whitespace removed, for label comparisons.
fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn label_needles(label: &str) -> [String; 2] {
    let spaced = label.to_ascii_lowercase();
    let compact: String = spaced.split_whitespace().collect();
    [spaced, compact]
}

fn has_label(text: &str, labels: &[String]) -> bool {
    let haystack = text.to_ascii_lowercase();
    labels.iter().any(|label| {
        label_needles(label)
            .iter()
            .any(|n| !n.is_empty() && haystack.contains(n.as_str()))
    })
}

/// First amount printed after any of `labels`, written with or without spaces.
fn find_labelled_amount(lines: &[RawLine], labels: &[String], nf: NumberFormat) -> Option<Decimal> {
    for line in lines {
        let haystack = line.text.to_ascii_lowercase();
        for label in labels {
            for needle in &label_needles(label) {
                if needle.is_empty() {
                    continue;
                }
                if let Some(pos) = haystack.find(needle) {
                    let tail = &line.text[pos + needle.len()..];
                    if let Some(amount) = leading_amount(tail, nf) {
                        return Some(amount);
                    }
                }
            }
        }
    }
    None
}

/// Longest run of up to three leading tokens that parses as an amount, so
/// that `100.00 D` and `£100.00 Payments In ...` both work.
fn leading_amount(tail: &str, nf: NumberFormat) -> Option<Decimal> {
    let tokens: Vec<&str> = tail
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .split_whitespace()
        .collect();
    (1..=tokens.len().min(3))
        .rev()
        .find_map(|n| parse_amount_with(&tokens[..n].join(" "), nf).ok())
}

/// Segment with a freshly compiled [`Segmenter`].
pub fn segment(
    lines: Vec<RawLine>,
    source: &Path,
    config: &SegmenterConfig,
) -> Result<SegmentOutcome, regex::Error> {
    Ok(Segmenter::new(config)?.segment(lines, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reckon_core::TextSegment;
    use std::str::FromStr;

    fn line(page: u32, y: f32, text: &str) -> RawLine {
        RawLine::new(
            Arc::from(Path::new("s.pdf")),
            page,
            y,
            vec![TextSegment {
                x: 40.0,
                text: text.to_string(),
            }],
        )
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn statement(page: u32, period: &str, number: &str, opening: &str, closing: &str) -> Vec<RawLine> {
        vec![
            line(page, 800.0, period),
            line(page, 780.0, "Account Name Sortcode Account Number Sheet Number"),
            line(page, 770.0, &format!("MR J SMITH 40-11-22 {number} 1")),
            line(page, 750.0, &format!("Opening Balance {opening}")),
            line(page, 740.0, "Payments In 50.00"),
            line(page, 730.0, "Payments Out 20.00"),
            line(page, 720.0, &format!("Closing Balance {closing}")),
            line(page, 700.0, "Date Payment type and details Paid out Paid in Balance"),
        ]
    }

    fn run(lines: Vec<RawLine>) -> SegmentOutcome {
        segment(lines, Path::new("s.pdf"), &SegmenterConfig::default()).unwrap()
    }

    #[test]
    fn test_single_block_header() {
        let out = run(statement(
            1,
            "Your Statement 01 April 2025 to 30 April 2025",
            "12345678",
            "100.00",
            "130.00",
        ));
        assert!(out.errors.is_empty());
        assert_eq!(out.blocks.len(), 1);
        let h = &out.blocks[0].header;
        assert_eq!(h.account_id, "12345678");
        assert_eq!(h.sort_code, "40-11-22");
        assert_eq!(h.account_name, "MR J SMITH");
        assert_eq!(h.account_type, AccountType::Current);
        assert_eq!((h.period_start, h.period_end), (ymd(2025, 4, 1), ymd(2025, 4, 30)));
        assert_eq!(h.opening_balance, dec("100.00"));
        assert_eq!(h.closing_balance, dec("130.00"));
        assert_eq!(h.payments_in, Some(dec("50.00")));
        assert_eq!(h.payments_out, Some(dec("20.00")));
        assert_eq!(out.blocks[0].raw_lines.len(), 8);
    }

    #[test]
    fn test_two_accounts_in_one_file() {
        let mut lines = statement(1, "Your Statement 01 April 2025 to 30 April 2025", "11111111", "10.00", "20.00");
        let mut savings = statement(2, "Your Statement 01 April 2025 to 30 April 2025", "22222222", "5.00", "5.00");
        savings.insert(1, line(2, 790.0, "Savings Account"));
        lines.extend(savings);
        let out = run(lines);
        assert_eq!(out.blocks.len(), 2);
        assert_eq!(out.blocks[0].header.account_id, "11111111");
        assert_eq!(out.blocks[1].header.account_id, "22222222");
        assert_eq!(out.blocks[1].header.index, 1);
        assert_eq!(out.blocks[1].header.account_type, AccountType::Savings);
    }

    #[test]
    fn test_account_type_ignores_transaction_rows() {
        let mut lines = statement(1, "Your Statement 01 April 2025 to 30 April 2025", "12345678", "100.00", "130.00");
        lines.push(line(1, 690.0, "02 Apr 25 CR EMPLOYER LTD 50.00"));
        lines.push(line(1, 680.0, "03 Apr 25 TFR TO SAVINGS 20.00"));
        lines.push(line(1, 670.0, "Business banking helpline 0345 000 000"));
        let out = run(lines);
        assert_eq!(out.blocks.len(), 1);
        assert_eq!(out.blocks[0].header.account_type, AccountType::Current);
    }

    #[test]
    fn test_continuation_sheet_merges() {
        let mut lines = statement(1, "Your Statement 01 April 2025 to 30 April 2025", "12345678", "100.00", "130.00");
        lines.push(line(2, 800.0, "Your Statement 01 April 2025 to 30 April 2025"));
        lines.push(line(2, 780.0, "Account Name Sortcode Account Number Sheet Number"));
        lines.push(line(2, 770.0, "MR J SMITH 40-11-22 12345678 2"));
        let out = run(lines);
        assert_eq!(out.blocks.len(), 1);
        assert_eq!(out.blocks[0].raw_lines.len(), 11);
    }

    #[test]
    fn test_missing_closing_balance_drops_block() {
        let mut lines = statement(1, "Your Statement 01 April 2025 to 30 April 2025", "12345678", "100.00", "130.00");
        lines.retain(|l| !l.text.starts_with("Closing"));
        let out = run(lines);
        assert!(out.blocks.is_empty());
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].page, 1);
        assert!(out.errors[0].reason.contains("closing balance"));
    }

    #[test]
    fn test_inverted_period_is_rejected() {
        let out = run(statement(
            3,
            "Statement period 30 April 2025 to 01 April 2025",
            "12345678",
            "1.00",
            "1.00",
        ));
        assert!(out.blocks.is_empty());
        assert_eq!(out.errors[0].page, 3);
    }

    #[test]
    fn test_identity_from_preamble_and_placeholders() {
        let mut lines = vec![
            line(1, 820.0, "Account Name Sortcode Account Number Sheet Number"),
            line(1, 810.0, "MRS A JONES 60-00-01 87654321 1"),
        ];
        lines.push(line(1, 800.0, "Your Statement 01 March to 31 March 2025"));
        lines.push(line(1, 790.0, "OpeningBalance 1,000.00"));
        lines.push(line(1, 780.0, "ClosingBalance 900.00 D"));
        let out = run(lines);
        let h = &out.blocks[0].header;
        assert_eq!(h.account_id, "87654321");
        assert_eq!(h.period_start, ymd(2025, 3, 1));
        assert_eq!(h.opening_balance, dec("1000.00"));
        assert_eq!(h.closing_balance, dec("-900.00"));

        let out = run(vec![
            line(1, 800.0, "Your Statement 01 March 2025 to 31 March 2025"),
            line(1, 790.0, "Opening Balance 0.00"),
            line(1, 780.0, "Closing Balance 0.00"),
        ]);
        assert_eq!(out.blocks[0].header.account_id, MISSING_ACCOUNT_NUMBER);
        assert_eq!(out.blocks[0].header.label(), "<missing account number> (01 March 2025 to 31 March 2025)");
    }

    #[test]
    fn test_no_marker_yields_nothing() {
        let out = run(vec![line(1, 800.0, "Hello")]);
        assert!(out.blocks.is_empty());
        assert!(out.errors.is_empty());
    }
}
