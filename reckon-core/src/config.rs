//! Engine configuration: segmenter anchors, column layouts keyed by account
//! type, the classifier registry and the reconciliation tolerance.
//!
//! Every stage receives its section explicitly; nothing is read from global
//! state. `Default` describes the UK current/savings account layout the engine
//! ships with.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::AccountType;
use crate::money::NumberFormat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReckonConfig {
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub layouts: LayoutRegistry,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub reconciliation: ReconcileConfig,
}

// ---------------------------------------------------------------------------
// Segmenter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Regex with named groups `start` and `end`; a match opens a block
    pub period_marker: String,
    pub period_formats: Vec<String>,
    /// Label line; the account identity is printed on the line below it
    pub account_header: String,
    pub account_type_rules: Vec<AccountTypeRule>,
    pub default_account_type: AccountType,
    pub opening_labels: Vec<String>,
    pub closing_labels: Vec<String>,
    pub payments_in_labels: Vec<String>,
    pub payments_out_labels: Vec<String>,
    pub number_format: NumberFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTypeRule {
    pub pattern: String,
    pub account_type: AccountType,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            period_marker: r"(?i)^\s*(?:your\s+statement|statement\s+period)\s*:?\s*(?:from\s+)?(?P<start>\d{1,2}[\s/][A-Za-z0-9]+(?:[\s/]\d{2,4})?)\s+(?:to|-)\s+(?P<end>\d{1,2}[\s/][A-Za-z0-9]+[\s/]\d{2,4})\s*$"
                .to_string(),
            period_formats: strings(&["%d %B %Y", "%d %b %Y", "%d/%m/%Y", "%d %B", "%d %b"]),
            account_header: "Account Name Sortcode Account Number Sheet Number".to_string(),
            account_type_rules: vec![
                AccountTypeRule {
                    pattern: "savings".to_string(),
                    account_type: AccountType::Savings,
                },
                AccountTypeRule {
                    pattern: "business".to_string(),
                    account_type: AccountType::Business,
                },
            ],
            default_account_type: AccountType::Current,
            opening_labels: strings(&["Opening Balance"]),
            closing_labels: strings(&["Closing Balance"]),
            payments_in_labels: strings(&["Payments In"]),
            payments_out_labels: strings(&["Payments Out"]),
            number_format: NumberFormat::UK,
        }
    }
}

// ---------------------------------------------------------------------------
// Column layouts
// ---------------------------------------------------------------------------

/// Horizontal band of a column, `min <= x < max`, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub min: f32,
    pub max: f32,
}

impl ColumnRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, x: f32) -> bool {
        x >= self.min && x < self.max
    }
}

/// Where amounts are printed and how their direction is decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum AmountColumns {
    /// Separate paid-out and paid-in columns; the column gives the direction
    Split {
        paid_out: ColumnRange,
        paid_in: ColumnRange,
    },
    /// One column whose token carries its own sign
    Signed {
        amount: ColumnRange,
        #[serde(default)]
        positive_is_debit: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub date: ColumnRange,
    pub description: ColumnRange,
    pub amounts: AmountColumns,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<ColumnRange>,
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub number_format: NumberFormat,
    /// Column header regex; when set, rows are read only below it on each page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_pattern: Option<String>,
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    /// Payment type codes that open a same-day entry on an undated line
    #[serde(default)]
    pub entry_markers: Vec<String>,
    /// Undated rows reuse the last printed date
    #[serde(default)]
    pub carry_forward_dates: bool,
}

impl ColumnLayout {
    /// Paid out / paid in columns with a running balance, dates printed once per day.
    pub fn uk_current() -> Self {
        Self {
            date: ColumnRange::new(30.0, 95.0),
            description: ColumnRange::new(95.0, 330.0),
            amounts: AmountColumns::Split {
                paid_out: ColumnRange::new(330.0, 410.0),
                paid_in: ColumnRange::new(410.0, 480.0),
            },
            balance: Some(ColumnRange::new(480.0, 580.0)),
            date_formats: strings(&["%d %b %y", "%d %b %Y", "%d %b"]),
            number_format: NumberFormat::UK,
            header_pattern: Some(r"(?i)^date\s+payment\s*type\s+and\s+details".to_string()),
            skip_patterns: strings(&[
                r"(?i)balance\s*brought\s*forward",
                r"(?i)balance\s*carried\s*forward",
                r"(?i)^page\s+\d+",
            ]),
            entry_markers: strings(&[
                "CR", "DD", "SO", "BP", "OBP", "VIS", ")))", "ATM", "TFR", "CHQ", "DR",
            ]),
            carry_forward_dates: true,
        }
    }

    /// One signed amount column, every row dated.
    pub fn uk_savings() -> Self {
        Self {
            date: ColumnRange::new(30.0, 110.0),
            description: ColumnRange::new(110.0, 380.0),
            amounts: AmountColumns::Signed {
                amount: ColumnRange::new(380.0, 470.0),
                positive_is_debit: false,
            },
            balance: Some(ColumnRange::new(470.0, 580.0)),
            date_formats: strings(&["%d %b %y", "%d %b %Y", "%d/%m/%Y", "%d %b"]),
            number_format: NumberFormat::UK,
            header_pattern: Some(r"(?i)^date\s+description".to_string()),
            skip_patterns: strings(&[
                r"(?i)balance\s*brought\s*forward",
                r"(?i)balance\s*carried\s*forward",
                r"(?i)^page\s+\d+",
            ]),
            entry_markers: Vec::new(),
            carry_forward_dates: false,
        }
    }
}

/// Column layouts keyed by account type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRegistry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<ColumnLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings: Option<ColumnLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business: Option<ColumnLayout>,
}

impl LayoutRegistry {
    pub fn empty() -> Self {
        Self {
            current: None,
            savings: None,
            business: None,
        }
    }

    pub fn insert(&mut self, account_type: AccountType, layout: ColumnLayout) {
        *self.slot(account_type) = Some(layout);
    }

    fn slot(&mut self, account_type: AccountType) -> &mut Option<ColumnLayout> {
        match account_type {
            AccountType::Current => &mut self.current,
            AccountType::Savings => &mut self.savings,
            AccountType::Business => &mut self.business,
        }
    }

    /// Layout for `account_type`, falling back to the current-account layout.
    pub fn get(&self, account_type: AccountType) -> Option<&ColumnLayout> {
        let own = match account_type {
            AccountType::Current => self.current.as_ref(),
            AccountType::Savings => self.savings.as_ref(),
            AccountType::Business => self.business.as_ref(),
        };
        own.or(self.current.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (AccountType, &ColumnLayout)> {
        [
            (AccountType::Current, self.current.as_ref()),
            (AccountType::Savings, self.savings.as_ref()),
            (AccountType::Business, self.business.as_ref()),
        ]
        .into_iter()
        .filter_map(|(t, l)| l.map(|l| (t, l)))
    }
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self {
            current: Some(ColumnLayout::uk_current()),
            savings: Some(ColumnLayout::uk_savings()),
            business: Some(ColumnLayout::uk_current()),
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Case-insensitive substring
    #[default]
    Contains,
    /// Case-insensitive match of the leading words
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRule {
    pub pattern: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    #[serde(default)]
    pub kind: MatchKind,
}

impl ClassifierRule {
    pub fn new(pattern: &str, transaction_type: &str, kind: MatchKind) -> Self {
        Self {
            pattern: pattern.to_string(),
            transaction_type: transaction_type.to_string(),
            kind,
        }
    }
}

/// Ordered registry; the first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub rules: Vec<ClassifierRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        use MatchKind::{Contains, Prefix};
        let rules = vec![
            ClassifierRule::new("CR", "credit", Prefix),
            ClassifierRule::new("DD", "direct_debit", Prefix),
            ClassifierRule::new("SO", "standing_order", Prefix),
            ClassifierRule::new("BP", "bill_payment", Prefix),
            ClassifierRule::new("OBP", "online_bill_payment", Prefix),
            ClassifierRule::new("VIS", "card_payment", Prefix),
            ClassifierRule::new(")))", "contactless", Prefix),
            ClassifierRule::new("ATM", "cash_withdrawal", Prefix),
            ClassifierRule::new("TFR", "transfer", Prefix),
            ClassifierRule::new("CHQ", "cheque", Prefix),
            ClassifierRule::new("DR", "debit", Prefix),
            ClassifierRule::new("interest charge", "fee", Contains),
            ClassifierRule::new("overdraft fee", "fee", Contains),
            ClassifierRule::new("interest", "interest", Contains),
            ClassifierRule::new("salary", "income", Contains),
            ClassifierRule::new("transfer", "transfer", Contains),
        ];
        Self { rules }
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Largest |delta| still reported as a pass
    pub tolerance: Decimal,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tolerance: Decimal::ZERO,
        }
    }
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
