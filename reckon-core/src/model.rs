//! Statement data model: raw lines, statement blocks and transactions.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::dates::describe_period;

/// A run of text drawn at one horizontal position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    /// Left edge in PDF points
    pub x: f32,
    pub text: String,
}

/// One visual line of a PDF page, as produced by the layout extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    /// Segments joined by single spaces, left to right
    pub text: String,
    /// 1-based page number
    pub page: u32,
    /// Baseline y in PDF user space (larger is higher on the page)
    pub y_position: f32,
    pub source_file: Arc<Path>,
    pub segments: Vec<TextSegment>,
}

impl RawLine {
    pub fn new(source_file: Arc<Path>, page: u32, y_position: f32, segments: Vec<TextSegment>) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            text,
            page,
            y_position,
            source_file,
            segments,
        }
    }

    /// Text of the segments whose left edge falls in `min..max`.
    pub fn text_between(&self, min: f32, max: f32) -> String {
        self.segments
            .iter()
            .filter(|s| s.x >= min && s.x < max)
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Current,
    Savings,
    Business,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Current => "current",
            AccountType::Savings => "savings",
            AccountType::Business => "business",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and declared figures of one statement period for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockHeader {
    pub source_file: PathBuf,
    /// Position of the block within its file, from 0
    pub index: usize,
    pub account_id: String,
    pub account_name: String,
    pub sort_code: String,
    pub account_type: AccountType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub payments_in: Option<Decimal>,
    pub payments_out: Option<Decimal>,
}

impl BlockHeader {
    pub fn declared_movement(&self) -> Decimal {
        self.closing_balance - self.opening_balance
    }

    pub fn period_desc(&self) -> String {
        describe_period(self.period_start, self.period_end)
    }

    /// Short identity used in logs, e.g. `40-11-22 12345678 (01 April 2025 to 30 April 2025)`.
    pub fn label(&self) -> String {
        if self.sort_code.starts_with('<') {
            format!("{} ({})", self.account_id, self.period_desc())
        } else {
            format!("{} {} ({})", self.sort_code, self.account_id, self.period_desc())
        }
    }
}

/// A segmented statement period together with the lines it spans.
#[derive(Debug, Clone)]
pub struct StatementBlock {
    pub header: Arc<BlockHeader>,
    pub raw_lines: Vec<RawLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn of(amount: Decimal) -> Self {
        if amount.is_sign_negative() && !amount.is_zero() {
            Direction::Debit
        } else {
            Direction::Credit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "Credit",
            Direction::Debit => "Debit",
        }
    }
}

/// Label assigned by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionType(String);

impl TransactionType {
    pub const UNCLASSIFIED: &'static str = "unclassified";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn unclassified() -> Self {
        Self(Self::UNCLASSIFIED.to_string())
    }

    pub fn is_unclassified(&self) -> bool {
        self.0 == Self::UNCLASSIFIED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TransactionType {
    fn default() -> Self {
        Self::unclassified()
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Points back at a line of the owning block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRef {
    pub page: u32,
    /// Index into `StatementBlock::raw_lines`
    pub line_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    /// Positive = credit, negative = debit
    pub amount: Decimal,
    pub direction: Direction,
    pub transaction_type: TransactionType,
    /// Balance printed on the statement after this entry, when the layout has one
    pub running_balance: Option<Decimal>,
    pub source_block: Arc<BlockHeader>,
    pub line_refs: Vec<LineRef>,
}

impl Transaction {
    pub fn new(
        date: NaiveDate,
        description: impl Into<String>,
        amount: Decimal,
        source_block: Arc<BlockHeader>,
    ) -> Self {
        Self {
            date,
            description: description.into(),
            amount,
            direction: Direction::of(amount),
            transaction_type: TransactionType::unclassified(),
            running_balance: None,
            source_block,
            line_refs: Vec::new(),
        }
    }

    pub fn is_credit(&self) -> bool {
        self.direction == Direction::Credit
    }
}
