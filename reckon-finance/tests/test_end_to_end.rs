use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reckon_core::{AccountType, ReckonConfig};
use reckon_finance::export::{export_rows, write_all};
use reckon_finance::{
    process_file, run_batch, BatchOptions, IssueKind, ReconciliationStatus, RunReport,
};
use reckon_ingest::{write_text_pdf, PlacedText};
use rust_decimal::Decimal;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// One statement page for account `number`; `rows` are (date, details, paid out, paid in).
fn statement(
    number: &str,
    kind: &str,
    opening: &str,
    closing: &str,
    rows: &[(&str, &str, &str, &str)],
) -> Vec<PlacedText> {
    let mut page = vec![
        PlacedText::new(40.0, 800.0, "Your Statement 01 April 2025 to 30 April 2025"),
        PlacedText::new(40.0, 790.0, format!("{kind} Account")),
        PlacedText::new(40.0, 780.0, "Account Name Sortcode Account Number Sheet Number"),
        PlacedText::new(40.0, 770.0, format!("MR J SMITH 40-11-22 {number} 1")),
        PlacedText::new(40.0, 750.0, format!("Opening Balance {opening}")),
        PlacedText::new(40.0, 720.0, format!("Closing Balance {closing}")),
        PlacedText::new(40.0, 700.0, "Date"),
        PlacedText::new(100.0, 700.0, "Payment type and details"),
        PlacedText::new(340.0, 700.0, "Paid out"),
        PlacedText::new(420.0, 700.0, "Paid in"),
        PlacedText::new(500.0, 700.0, "Balance"),
    ];
    let mut y = 680.0;
    for (date, details, out, inn) in rows {
        for (x, text) in [(40.0, date), (100.0, details), (340.0, out), (420.0, inn)] {
            if !text.is_empty() {
                page.push(PlacedText::new(x, y, *text));
            }
        }
        y -= 10.0;
    }
    page
}

const ROWS: &[(&str, &str, &str, &str)] = &[
    ("02 Apr 25", "CR EMPLOYER LTD", "", "50.00"),
    ("03 Apr 25", "DD ENERGY CO", "20.00", ""),
];

fn write(dir: &Path, name: &str, pages: &[Vec<PlacedText>]) -> PathBuf {
    let path = dir.join(name);
    write_text_pdf(&path, pages).unwrap();
    path
}

async fn batch(paths: Vec<PathBuf>) -> RunReport {
    let options = BatchOptions {
        concurrency: 2,
        timeout: Duration::from_secs(30),
    };
    run_batch(paths, Arc::new(ReckonConfig::default()), options)
        .await
        .unwrap()
}

#[test]
fn test_balanced_statement_passes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "april.pdf", &[statement("12345678", "Current", "100.00", "130.00", ROWS)]);

    let outcome = process_file(&path, &ReckonConfig::default());
    assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
    assert_eq!(outcome.results.len(), 1);
    let result = &outcome.results[0];
    assert_eq!(result.status, ReconciliationStatus::Pass);
    assert_eq!(result.delta, dec("0.00"));
    assert_eq!(outcome.transactions.len(), 2);
    assert_eq!(outcome.transactions[0].transaction_type.as_str(), "credit");
    assert_eq!(outcome.transactions[1].transaction_type.as_str(), "direct_debit");
}

#[tokio::test]
async fn test_misstated_closing_balance_fails_but_exports() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "april.pdf", &[statement("12345678", "Current", "100.00", "125.00", ROWS)]);

    let report = batch(vec![path.clone()]).await;
    assert!(!report.is_clean());
    let results = &report.per_file[&path];
    assert_eq!(results[0].status, ReconciliationStatus::Fail);
    assert_eq!(results[0].delta, dec("5.00"));
    assert_eq!(
        report
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::ReconciliationFailure)
            .count(),
        1
    );

    let out = dir.path().join("out");
    let paths = write_all(&report, &out, "20250501_000000").unwrap();
    assert_eq!(export_rows(&report).len(), 2);
    let log = std::fs::read_to_string(paths.run_log).unwrap();
    assert!(log.contains("delta 5.00"));
    assert!(log.contains("parsed exceeds declared by 5.00"));
    let csv = std::fs::read_to_string(paths.transactions_csv).unwrap();
    assert_eq!(csv.lines().count(), 3);
}

#[tokio::test]
async fn test_one_corrupt_file_does_not_affect_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(dir.path(), "a.pdf", &[statement("11111111", "Current", "100.00", "130.00", ROWS)]);
    let corrupt = dir.path().join("b.pdf");
    std::fs::write(&corrupt, b"%PDF-1.5 truncated").unwrap();
    let last = write(dir.path(), "c.pdf", &[statement("33333333", "Current", "100.00", "130.00", ROWS)]);

    let report = batch(vec![first.clone(), corrupt.clone(), last.clone()]).await;
    assert_eq!(report.files, vec![first.clone(), corrupt.clone(), last.clone()]);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].kind, IssueKind::UnreadablePdf);
    assert_eq!(report.issues[0].file, corrupt);
    assert_eq!(report.per_file[&first][0].status, ReconciliationStatus::Pass);
    assert_eq!(report.per_file[&last][0].status, ReconciliationStatus::Pass);
    assert_eq!(report.all_transactions.len(), 4);
    assert!(!report.is_clean());
}

#[tokio::test]
async fn test_block_without_rows_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "quiet.pdf",
        &[statement("12345678", "Current", "100.00", "100.00", &[])],
    );
    let report = batch(vec![path.clone()]).await;
    assert_eq!(
        report.per_file[&path][0].status,
        ReconciliationStatus::SkippedNoTransactions
    );
    assert!(report.is_clean());
}

#[test]
fn test_two_accounts_in_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "both.pdf",
        &[
            statement("11111111", "Current", "100.00", "130.00", ROWS),
            statement("22222222", "Business", "1,000.00", "970.00", &[("10 Apr 25", "SO RENT", "30.00", "")]),
        ],
    );
    let outcome = process_file(&path, &ReckonConfig::default());
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results.iter().all(|r| r.status == ReconciliationStatus::Pass));
    assert_eq!(outcome.results[1].block.account_id, "22222222");
    assert_eq!(outcome.results[1].block.index, 1);
    assert_eq!(outcome.transactions[2].transaction_type.as_str(), "standing_order");
}

#[test]
fn test_transfer_to_savings_row_keeps_current_layout() {
    let dir = tempfile::tempdir().unwrap();
    let rows = &[
        ("02 Apr 25", "CR EMPLOYER LTD", "", "50.00"),
        ("03 Apr 25", "TFR TO SAVINGS", "20.00", ""),
    ];
    let path = write(dir.path(), "april.pdf", &[statement("12345678", "Current", "100.00", "130.00", rows)]);

    let outcome = process_file(&path, &ReckonConfig::default());
    assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
    let result = &outcome.results[0];
    assert_eq!(result.block.account_type, AccountType::Current);
    assert_eq!(result.status, ReconciliationStatus::Pass);
    assert_eq!(outcome.transactions.len(), 2);
    assert_eq!(outcome.transactions[1].transaction_type.as_str(), "transfer");
}

#[tokio::test]
async fn test_unknown_column_header_is_not_clean() {
    let dir = tempfile::tempdir().unwrap();
    let mut page = statement("12345678", "Current", "100.00", "130.00", ROWS);
    for item in page.iter_mut().filter(|p| p.y == 700.0) {
        item.text = match item.text.as_str() {
            "Payment type and details" => "Details".to_string(),
            "Paid out" => "Money out".to_string(),
            "Paid in" => "Money in".to_string(),
            other => other.to_string(),
        };
    }
    let path = write(dir.path(), "other_bank.pdf", &[page]);

    let report = batch(vec![path.clone()]).await;
    assert_eq!(
        report.per_file[&path][0].status,
        ReconciliationStatus::SkippedNoTransactions
    );
    let layout_issues: Vec<_> = report
        .issues
        .iter()
        .filter(|i| i.kind == IssueKind::UnrecognisedLayout)
        .collect();
    assert_eq!(layout_issues.len(), 1);
    assert!(layout_issues[0].message.starts_with("2 dated rows ignored"));
    assert!(!report.is_clean());
}
