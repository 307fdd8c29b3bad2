//! Run outputs: transaction tables, the run log and the per-block status report.
//!
//! Both table formats consume the same `ExportRow`s through `TabularSink`, so
//! the CSV and the spreadsheet always carry identical rows.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use reckon_core::money::format_plain;
use reckon_core::Transaction;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;

use crate::aggregate::RunReport;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write spreadsheet: {0}")]
    Xlsx(#[from] XlsxError),
}

/// One exported transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub source_file: String,
    pub account_id: String,
    pub account_type: String,
    pub statement_period: String,
    /// ISO date
    pub date: String,
    pub description: String,
    pub amount: Decimal,
    pub direction: String,
    pub transaction_type: String,
}

impl ExportRow {
    pub const HEADERS: [&'static str; 9] = [
        "source_file",
        "account_id",
        "account_type",
        "statement_period",
        "date",
        "description",
        "amount",
        "direction",
        "transaction_type",
    ];

    pub fn from_transaction(txn: &Transaction) -> Self {
        let block = &txn.source_block;
        Self {
            source_file: file_name(&block.source_file),
            account_id: block.account_id.clone(),
            account_type: block.account_type.to_string(),
            statement_period: block.period_desc(),
            date: txn.date.format("%Y-%m-%d").to_string(),
            description: txn.description.clone(),
            amount: txn.amount,
            direction: txn.direction.as_str().to_string(),
            transaction_type: txn.transaction_type.to_string(),
        }
    }

    fn text_fields(&self) -> [String; 9] {
        [
            self.source_file.clone(),
            self.account_id.clone(),
            self.account_type.clone(),
            self.statement_period.clone(),
            self.date.clone(),
            self.description.clone(),
            format_plain(self.amount),
            self.direction.clone(),
            self.transaction_type.clone(),
        ]
    }
}

pub fn export_rows(report: &RunReport) -> Vec<ExportRow> {
    report
        .all_transactions
        .iter()
        .map(ExportRow::from_transaction)
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A destination for transaction rows.
pub trait TabularSink {
    fn extension(&self) -> &'static str;
    fn write(&self, path: &Path, rows: &[ExportRow]) -> Result<(), ExportError>;
}

pub struct CsvSink;

impl TabularSink for CsvSink {
    fn extension(&self) -> &'static str {
        "csv"
    }

    fn write(&self, path: &Path, rows: &[ExportRow]) -> Result<(), ExportError> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(ExportRow::HEADERS)?;
        for row in rows {
            wtr.write_record(row.text_fields())?;
        }
        wtr.flush().map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

pub struct XlsxSink;

const AMOUNT_COLUMN: u16 = 6;

impl TabularSink for XlsxSink {
    fn extension(&self) -> &'static str {
        "xlsx"
    }

    fn write(&self, path: &Path, rows: &[ExportRow]) -> Result<(), ExportError> {
        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let amount_format = Format::new().set_num_format("#,##0.00");

        let sheet = workbook.add_worksheet().set_name("Transactions")?;
        for (col, header) in ExportRow::HEADERS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, &header_format)?;
        }
        for (i, row) in rows.iter().enumerate() {
            let r = i as u32 + 1;
            for (col, value) in row.text_fields().iter().enumerate() {
                let col = col as u16;
                if col == AMOUNT_COLUMN {
                    match row.amount.to_f64() {
                        Some(n) => sheet.write_number_with_format(r, col, n, &amount_format)?,
                        None => sheet.write_string(r, col, value)?,
                    };
                } else {
                    sheet.write_string(r, col, value)?;
                }
            }
        }
        sheet.set_freeze_panes(1, 0)?;
        sheet.set_column_width(3, 32)?;
        sheet.set_column_width(5, 48)?;

        workbook.save(path)?;
        Ok(())
    }
}

/// Files written for one run, all stamped with the same timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPaths {
    pub transactions_csv: PathBuf,
    pub transactions_xlsx: PathBuf,
    pub run_log: PathBuf,
    pub run_status: PathBuf,
}

impl ExportPaths {
    pub fn new(dir: &Path, stamp: &str) -> Self {
        Self {
            transactions_csv: dir.join(format!("bank_transactions_{stamp}.csv")),
            transactions_xlsx: dir.join(format!("bank_transactions_{stamp}.xlsx")),
            run_log: dir.join(format!("run_log_{stamp}.txt")),
            run_status: dir.join(format!("run_status_{stamp}.csv")),
        }
    }
}

/// Human-readable log: a summary, then each file with its blocks and issues.
pub fn render_run_log(report: &RunReport, stamp: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "reckon run {stamp}");
    let _ = writeln!(out, "{}", report.summary());
    let _ = writeln!(
        out,
        "result: {}",
        if report.is_clean() { "clean" } else { "NEEDS ATTENTION" }
    );

    for file in &report.files {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", file.display());
        for result in report.per_file.get(file).into_iter().flatten() {
            let _ = writeln!(out, "  {}", result.summary());
        }
        for issue in report.issues_for(file) {
            let marker = if issue.is_error() { "!" } else { "-" };
            let _ = writeln!(
                out,
                "  {marker} {}{}: {}",
                issue.stage.as_str(),
                issue
                    .block
                    .as_deref()
                    .map(|b| format!(" [{b}]"))
                    .unwrap_or_default(),
                issue.message
            );
        }
    }
    out
}

pub fn write_run_log(path: &Path, report: &RunReport, stamp: &str) -> Result<(), ExportError> {
    fs::write(path, render_run_log(report, stamp)).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

const STATUS_HEADERS: [&str; 12] = [
    "source_file",
    "account_id",
    "sort_code",
    "account_type",
    "statement_period",
    "status",
    "transactions",
    "opening_balance",
    "closing_balance",
    "computed_movement",
    "declared_movement",
    "delta",
];

/// One row per reconciled block.
pub fn write_status_report(path: &Path, report: &RunReport) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(STATUS_HEADERS)?;
    for r in report.results() {
        let h = &r.block;
        wtr.write_record([
            file_name(&h.source_file),
            h.account_id.clone(),
            h.sort_code.clone(),
            h.account_type.to_string(),
            h.period_desc(),
            r.status.to_string(),
            r.transaction_count.to_string(),
            format_plain(h.opening_balance),
            format_plain(h.closing_balance),
            format_plain(r.computed_movement),
            format_plain(r.declared_movement),
            format_plain(r.delta),
        ])?;
    }
    wtr.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Write every output of a run into `dir`.
pub fn write_all(report: &RunReport, dir: &Path, stamp: &str) -> Result<ExportPaths, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let paths = ExportPaths::new(dir, stamp);
    let rows = export_rows(report);

    CsvSink.write(&paths.transactions_csv, &rows)?;
    XlsxSink.write(&paths.transactions_xlsx, &rows)?;
    write_run_log(&paths.run_log, report, stamp)?;
    write_status_report(&paths.run_status, report)?;

    tracing::info!(dir = %dir.display(), rows = rows.len(), "exports written");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{FileOutcome, RunAggregator};
    use crate::reconcile::{check, ReconciliationResult};
    use chrono::NaiveDate;
    use reckon_core::{AccountType, BlockHeader, ReconcileConfig, StatementBlock};
    use std::str::FromStr;
    use std::sync::Arc;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn report() -> RunReport {
        let block = StatementBlock {
            header: Arc::new(BlockHeader {
                source_file: PathBuf::from("/statements/april.pdf"),
                index: 0,
                account_id: "12345678".into(),
                account_name: "MR J SMITH".into(),
                sort_code: "40-11-22".into(),
                account_type: AccountType::Current,
                period_start: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
                period_end: NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
                opening_balance: dec("100.00"),
                closing_balance: dec("125.00"),
                payments_in: None,
                payments_out: None,
            }),
            raw_lines: Vec::new(),
        };
        let date = block.header.period_start;
        let txns = vec![
            Transaction::new(date, "CR EMPLOYER, LTD", dec("1050.00"), block.header.clone()),
            Transaction::new(date, "DD ENERGY", dec("-1020.00"), block.header.clone()),
        ];
        let result: ReconciliationResult = check(&block, &txns, &ReconcileConfig::default());
        let path = PathBuf::from("/statements/april.pdf");
        let mut outcome = FileOutcome::new(&path);
        outcome.issues.push(crate::aggregate::RunIssue::reconciliation(&result));
        outcome.results.push(result);
        outcome.transactions = txns;
        let mut agg = RunAggregator::new(&[path]);
        agg.record(outcome);
        agg.finish()
    }

    #[test]
    fn test_csv_sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        CsvSink.write(&path, &export_rows(&report())).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, ExportRow::HEADERS);
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "april.pdf");
        assert_eq!(&rows[0][3], "01 April 2025 to 30 April 2025");
        assert_eq!(&rows[0][4], "2025-04-01");
        assert_eq!(&rows[0][5], "CR EMPLOYER, LTD");
        assert_eq!(&rows[1][6], "-1020.00");
        assert_eq!(&rows[1][7], "Debit");
        assert_eq!(&rows[1][8], "unclassified");
    }

    #[test]
    fn test_run_log_reports_failure_with_delta() {
        let log = render_run_log(&report(), "20250501_120000");
        assert!(log.contains("NEEDS ATTENTION"));
        assert!(log.contains("[fail]"));
        assert!(log.contains("delta 5.00"));
        assert!(log.contains("! reconcile [40-11-22 12345678"));
    }

    #[test]
    fn test_write_all_creates_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let paths = write_all(&report(), &out, "20250501_120000").unwrap();
        for p in [&paths.transactions_csv, &paths.transactions_xlsx, &paths.run_log, &paths.run_status] {
            assert!(p.exists(), "{}", p.display());
        }
        assert!(paths
            .transactions_xlsx
            .ends_with("bank_transactions_20250501_120000.xlsx"));

        let status = fs::read_to_string(&paths.run_status).unwrap();
        let mut lines = status.lines();
        assert!(lines.next().unwrap().starts_with("source_file,account_id,sort_code"));
        assert!(lines.next().unwrap().contains(",fail,2,100.00,125.00,30.00,25.00,5.00"));
    }
}
