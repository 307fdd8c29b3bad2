//! Balance reconciliation.
//!
//! A block passes when its transactions sum to the movement the bank declared:
//!   delta = Σ amount − (closing − opening),   pass iff |delta| <= tolerance
//! Totals and running-balance checks are diagnostics for failed blocks and
//! never change the status.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use reckon_core::money::format_plain;
use reckon_core::{BlockHeader, ReconcileConfig, StatementBlock, Transaction};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationStatus {
    Pass,
    Fail,
    SkippedNoTransactions,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStatus::Pass => "pass",
            ReconciliationStatus::Fail => "fail",
            ReconciliationStatus::SkippedNoTransactions => "skipped_no_transactions",
        }
    }
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed credit/debit totals against the declared Payments In/Out.
#[derive(Debug, Clone, PartialEq)]
pub struct TotalsCheck {
    pub credits: Decimal,
    /// Magnitude of the debits
    pub debits: Decimal,
    pub declared_in: Option<Decimal>,
    pub declared_out: Option<Decimal>,
    pub matches: bool,
}

/// First transaction whose printed balance disagrees with the replayed one.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceBreak {
    pub date: NaiveDate,
    pub description: String,
    pub expected: Decimal,
    pub stated: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub block: Arc<BlockHeader>,
    pub computed_movement: Decimal,
    pub declared_movement: Decimal,
    /// computed − declared
    pub delta: Decimal,
    pub status: ReconciliationStatus,
    pub transaction_count: usize,
    pub totals: Option<TotalsCheck>,
    pub balance_break: Option<BalanceBreak>,
}

impl ReconciliationResult {
    pub fn is_fail(&self) -> bool {
        self.status == ReconciliationStatus::Fail
    }

    /// `delta` in words, since its sign is easy to misread.
    pub fn delta_meaning(&self) -> String {
        let size = format_plain(self.delta.abs());
        if self.delta > Decimal::ZERO {
            format!("parsed exceeds declared by {size}")
        } else if self.delta < Decimal::ZERO {
            format!("parsed falls short of declared by {size}")
        } else {
            "parsed equals declared".to_string()
        }
    }

    /// One-line summary for the run log.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} [{}] {} transactions",
            self.block.label(),
            self.status,
            self.transaction_count
        );
        if self.is_fail() {
            line.push_str(&format!(
                ", computed {} vs declared {}, delta {} ({})",
                format_plain(self.computed_movement),
                format_plain(self.declared_movement),
                format_plain(self.delta),
                self.delta_meaning()
            ));
            if let Some(totals) = self.totals.as_ref().filter(|t| !t.matches) {
                line.push_str(&format!(
                    ", parsed in/out {}/{}",
                    format_plain(totals.credits),
                    format_plain(totals.debits)
                ));
            }
            if let Some(b) = &self.balance_break {
                line.push_str(&format!(
                    ", balance first disagrees on {} '{}' (expected {}, statement {})",
                    b.date,
                    b.description,
                    format_plain(b.expected),
                    format_plain(b.stated)
                ));
            }
        }
        line
    }
}

pub fn check(
    block: &StatementBlock,
    txns: &[Transaction],
    config: &ReconcileConfig,
) -> ReconciliationResult {
    let header = &block.header;
    let computed: Decimal = txns.iter().map(|t| t.amount).sum();
    let declared = header.declared_movement();
    let delta = computed - declared;

    let status = if txns.is_empty() {
        ReconciliationStatus::SkippedNoTransactions
    } else if delta.abs() <= config.tolerance {
        ReconciliationStatus::Pass
    } else {
        ReconciliationStatus::Fail
    };

    let result = ReconciliationResult {
        block: header.clone(),
        computed_movement: computed,
        declared_movement: declared,
        delta,
        status,
        transaction_count: txns.len(),
        totals: totals_check(header, txns),
        balance_break: balance_break(header.opening_balance, txns),
    };

    match status {
        ReconciliationStatus::Pass => tracing::info!(
            file = %header.source_file.display(),
            block = %header.label(),
            transactions = txns.len(),
            "reconciled"
        ),
        ReconciliationStatus::SkippedNoTransactions => tracing::warn!(
            file = %header.source_file.display(),
            block = %header.label(),
            "no transactions parsed; reconciliation skipped"
        ),
        ReconciliationStatus::Fail => tracing::error!(
            file = %header.source_file.display(),
            block = %header.label(),
            delta = %format_plain(delta),
            computed = %format_plain(computed),
            declared = %format_plain(declared),
            "reconciliation failed"
        ),
    }
    result
}

fn totals_check(header: &BlockHeader, txns: &[Transaction]) -> Option<TotalsCheck> {
    if header.payments_in.is_none() && header.payments_out.is_none() {
        return None;
    }
    let credits: Decimal = txns.iter().filter(|t| t.is_credit()).map(|t| t.amount).sum();
    let debits: Decimal = txns
        .iter()
        .filter(|t| !t.is_credit())
        .map(|t| t.amount.abs())
        .sum();
    let matches = header.payments_in.is_none_or(|v| v.abs() == credits)
        && header.payments_out.is_none_or(|v| v.abs() == debits);
    Some(TotalsCheck {
        credits,
        debits,
        declared_in: header.payments_in,
        declared_out: header.payments_out,
        matches,
    })
}

fn balance_break(opening: Decimal, txns: &[Transaction]) -> Option<BalanceBreak> {
    let mut running = opening;
    for txn in txns {
        running += txn.amount;
        if let Some(stated) = txn.running_balance {
            if stated != running {
                return Some(BalanceBreak {
                    date: txn.date,
                    description: txn.description.clone(),
                    expected: running,
                    stated,
                });
            }
        }
    }
    None
}
