//! reckon-finance: transaction classification, balance reconciliation, run
//! aggregation, the batch pipeline and run exports.

pub mod aggregate;
pub mod category_rules;
pub mod export;
pub mod pipeline;
pub mod reconcile;

pub use aggregate::{FileOutcome, IssueKind, RunAggregator, RunIssue, RunReport, Stage};
pub use category_rules::Classifier;
pub use export::{CsvSink, ExportPaths, ExportRow, TabularSink, XlsxSink};
pub use pipeline::{process_file, run_batch, BatchOptions, Engine, EngineError};
pub use reconcile::{check, ReconciliationResult, ReconciliationStatus};
