//! Per-file pipeline and the concurrent batch driver.
//!
//! Extract → segment → parse → classify → reconcile, one file at a time. Every
//! failure is captured in the file's `FileOutcome`; nothing escapes into the
//! batch. The batch runs files on the blocking pool, bounded by a semaphore,
//! and feeds the aggregator from a single consumer loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reckon_core::{AccountType, ReckonConfig, ReconcileConfig};
use reckon_ingest::{extract, LineParser, Segmenter};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::aggregate::{FileOutcome, IssueKind, RunAggregator, RunIssue, RunReport, Stage};
use crate::category_rules::Classifier;
use crate::reconcile;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid period marker pattern: {0}")]
    PeriodMarker(#[source] regex::Error),
    #[error("invalid pattern in {account_type} layout: {source}")]
    Layout {
        account_type: AccountType,
        #[source]
        source: regex::Error,
    },
    #[error("no column layouts configured")]
    NoLayouts,
}

/// Configuration compiled once and shared by every file of a run.
pub struct Engine {
    segmenter: Segmenter,
    parsers: HashMap<AccountType, LineParser>,
    classifier: Classifier,
    reconcile: ReconcileConfig,
}

impl Engine {
    pub fn new(config: &ReckonConfig) -> Result<Self, EngineError> {
        let segmenter = Segmenter::new(&config.segmenter).map_err(EngineError::PeriodMarker)?;
        let mut parsers = HashMap::new();
        for (account_type, layout) in config.layouts.iter() {
            let parser = LineParser::new(layout)
                .map_err(|source| EngineError::Layout { account_type, source })?;
            parsers.insert(account_type, parser);
        }
        if parsers.is_empty() {
            return Err(EngineError::NoLayouts);
        }
        Ok(Self {
            segmenter,
            parsers,
            classifier: Classifier::new(&config.classifier.rules),
            reconcile: config.reconciliation.clone(),
        })
    }

    fn parser_for(&self, account_type: AccountType) -> Option<&LineParser> {
        self.parsers
            .get(&account_type)
            .or_else(|| self.parsers.get(&AccountType::Current))
    }

    pub fn process(&self, path: &Path) -> FileOutcome {
        let mut outcome = FileOutcome::new(path);

        let lines = match extract::open(path).and_then(|stream| stream.materialize()) {
            Ok(lines) => lines,
            Err(err) => {
                tracing::error!(file = %path.display(), error = %err.reason, "unreadable PDF");
                outcome.issues.push(RunIssue::unreadable(&err));
                return outcome;
            }
        };

        let segmented = self.segmenter.segment(lines, path);
        for err in &segmented.errors {
            outcome.issues.push(RunIssue::segmentation(path, err));
        }

        for block in &segmented.blocks {
            let label = block.header.label();
            let Some(parser) = self.parser_for(block.header.account_type) else {
                tracing::error!(file = %path.display(), block = %label, "no layout for account type");
                outcome.issues.push(RunIssue {
                    file: path.to_path_buf(),
                    block: Some(label),
                    stage: Stage::Parse,
                    kind: IssueKind::Aborted,
                    message: format!("no layout for {} accounts", block.header.account_type),
                });
                continue;
            };

            let parsed = parser.parse(block);
            for warning in &parsed.warnings {
                outcome.issues.push(RunIssue::unparsed(path, &label, warning));
            }
            if parsed.rows_outside_table > 0 {
                outcome
                    .issues
                    .push(RunIssue::unrecognised_layout(path, block, parsed.rows_outside_table));
            }

            let mut txns = parsed.transactions;
            self.classifier.apply(&mut txns);

            let result = reconcile::check(block, &txns, &self.reconcile);
            if result.is_fail() {
                outcome.issues.push(RunIssue::reconciliation(&result));
            }
            outcome.results.push(result);
            outcome.transactions.extend(txns);
        }

        tracing::info!(
            file = %path.display(),
            blocks = outcome.results.len(),
            transactions = outcome.transactions.len(),
            issues = outcome.issues.len(),
            "processed file"
        );
        outcome
    }
}

/// Run the whole pipeline for one file with a freshly compiled engine.
pub fn process_file(path: &Path, config: &ReckonConfig) -> FileOutcome {
    match Engine::new(config) {
        Ok(engine) => engine.process(path),
        Err(err) => FileOutcome::failed(path, Stage::Batch, IssueKind::Aborted, err.to_string()),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Process `paths` concurrently and aggregate the outcomes in input order.
pub async fn run_batch(
    paths: Vec<PathBuf>,
    config: Arc<ReckonConfig>,
    options: BatchOptions,
) -> Result<RunReport, EngineError> {
    let engine = Arc::new(Engine::new(&config)?);
    Ok(run_with(paths, options, move |path| engine.process(path)).await)
}

/// The batch driver, generic over the per-file work.
///
/// A file's permit travels with its blocking job, so `concurrency` bounds
/// the jobs actually running. A job that outlives `timeout` is reported as
/// `Timeout` at once but keeps its slot until it returns, since blocking
/// work cannot be cancelled.
async fn run_with<F>(paths: Vec<PathBuf>, options: BatchOptions, process: F) -> RunReport
where
    F: Fn(&Path) -> FileOutcome + Send + Sync + 'static,
{
    let process = Arc::new(process);
    let permits = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut aggregator = RunAggregator::new(&paths);
    let mut tasks = JoinSet::new();

    tracing::info!(files = paths.len(), concurrency = options.concurrency, "starting batch");

    for path in paths {
        let process = Arc::clone(&process);
        let permits = Arc::clone(&permits);
        let timeout = options.timeout;
        tasks.spawn(async move {
            let Ok(permit) = permits.acquire_owned().await else {
                return FileOutcome::failed(&path, Stage::Batch, IssueKind::Aborted, "batch shut down");
            };
            let work_path = path.clone();
            let work = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                (*process)(&work_path)
            });
            match tokio::time::timeout(timeout, work).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_err)) => {
                    tracing::error!(file = %path.display(), error = %join_err, "file processing aborted");
                    FileOutcome::failed(&path, Stage::Batch, IssueKind::Aborted, join_err.to_string())
                }
                Err(_) => {
                    tracing::error!(file = %path.display(), secs = timeout.as_secs_f64(), "file processing timed out");
                    FileOutcome::failed(
                        &path,
                        Stage::Batch,
                        IssueKind::Timeout,
                        format!("no result after {:.1}s", timeout.as_secs_f64()),
                    )
                }
            }
        });
    }

    // A task that dies here leaves its file without an outcome; `finish`
    // reports it as aborted.
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => aggregator.record(outcome),
            Err(e) => tracing::error!(error = %e, "batch task failed"),
        }
    }

    let report = aggregator.finish();
    tracing::info!(summary = %report.summary(), "batch finished");
    report
}
