//! Run-level aggregation of per-file outcomes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use reckon_core::{
    SegmentationError, StatementBlock, Transaction, UnparsedLineWarning, UnreadablePdfError,
};

use crate::reconcile::{ReconciliationResult, ReconciliationStatus};

/// Pipeline step an issue was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Segment,
    Parse,
    Reconcile,
    Batch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Segment => "segment",
            Stage::Parse => "parse",
            Stage::Reconcile => "reconcile",
            Stage::Batch => "batch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    UnreadablePdf,
    Segmentation,
    UnparsedLine,
    ReconciliationFailure,
    /// Rows were found but the block's column layout never matched them
    UnrecognisedLayout,
    Timeout,
    Aborted,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::UnreadablePdf => "unreadable_pdf",
            IssueKind::Segmentation => "segmentation",
            IssueKind::UnparsedLine => "unparsed_line",
            IssueKind::ReconciliationFailure => "reconciliation_failure",
            IssueKind::UnrecognisedLayout => "unrecognised_layout",
            IssueKind::Timeout => "timeout",
            IssueKind::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunIssue {
    pub file: PathBuf,
    /// Block label, when the issue belongs to one block
    pub block: Option<String>,
    pub stage: Stage,
    pub kind: IssueKind,
    pub message: String,
}

impl RunIssue {
    /// Line-level warnings are reported but do not make a run unclean.
    pub fn is_error(&self) -> bool {
        self.kind != IssueKind::UnparsedLine
    }

    pub fn unreadable(err: &UnreadablePdfError) -> Self {
        Self {
            file: err.path.clone(),
            block: None,
            stage: Stage::Extract,
            kind: IssueKind::UnreadablePdf,
            message: err.reason.to_string(),
        }
    }

    pub fn segmentation(file: &Path, err: &SegmentationError) -> Self {
        Self {
            file: file.to_path_buf(),
            block: None,
            stage: Stage::Segment,
            kind: IssueKind::Segmentation,
            message: err.to_string(),
        }
    }

    pub fn unparsed(file: &Path, block: &str, warning: &UnparsedLineWarning) -> Self {
        Self {
            file: file.to_path_buf(),
            block: Some(block.to_string()),
            stage: Stage::Parse,
            kind: IssueKind::UnparsedLine,
            message: warning.to_string(),
        }
    }

    pub fn unrecognised_layout(file: &Path, block: &StatementBlock, rows: usize) -> Self {
        Self {
            file: file.to_path_buf(),
            block: Some(block.header.label()),
            stage: Stage::Parse,
            kind: IssueKind::UnrecognisedLayout,
            message: format!(
                "{rows} dated rows ignored: column header of the {} layout not found",
                block.header.account_type
            ),
        }
    }

    pub fn reconciliation(result: &ReconciliationResult) -> Self {
        Self {
            file: result.block.source_file.clone(),
            block: Some(result.block.label()),
            stage: Stage::Reconcile,
            kind: IssueKind::ReconciliationFailure,
            message: result.summary(),
        }
    }
}

impl fmt::Display for RunIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file.display())?;
        if let Some(block) = &self.block {
            write!(f, " [{block}]")?;
        }
        write!(f, " {}/{}: {}", self.stage.as_str(), self.kind.as_str(), self.message)
    }
}

/// Everything one file produced.
#[derive(Debug, Clone, Default)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub results: Vec<ReconciliationResult>,
    pub transactions: Vec<Transaction>,
    pub issues: Vec<RunIssue>,
}

impl FileOutcome {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// A file that produced nothing but a single file-level issue.
    pub fn failed(path: &Path, stage: Stage, kind: IssueKind, message: impl Into<String>) -> Self {
        let mut outcome = Self::new(path);
        outcome.issues.push(RunIssue {
            file: path.to_path_buf(),
            block: None,
            stage,
            kind,
            message: message.into(),
        });
        outcome
    }
}

/// Collects outcomes as files complete and restores input order at the end.
pub struct RunAggregator {
    inputs: Vec<PathBuf>,
    outcomes: Vec<FileOutcome>,
}

impl RunAggregator {
    pub fn new(inputs: &[PathBuf]) -> Self {
        Self {
            inputs: inputs.to_vec(),
            outcomes: Vec::with_capacity(inputs.len()),
        }
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        self.outcomes.push(outcome);
    }

    /// Inputs that never produced an outcome (their task died) are reported
    /// as aborted rather than left out.
    pub fn finish(mut self) -> RunReport {
        for input in &self.inputs {
            if !self.outcomes.iter().any(|o| &o.path == input) {
                tracing::error!(file = %input.display(), "no outcome recorded for file");
                self.outcomes.push(FileOutcome::failed(
                    input,
                    Stage::Batch,
                    IssueKind::Aborted,
                    "processing task ended without a result",
                ));
            }
        }
        let inputs = self.inputs;
        let rank = |p: &Path| inputs.iter().position(|i| i == p).unwrap_or(usize::MAX);
        self.outcomes.sort_by_key(|o| rank(&o.path));

        let mut report = RunReport {
            files: Vec::with_capacity(self.outcomes.len()),
            ..Default::default()
        };
        for outcome in self.outcomes {
            report.files.push(outcome.path.clone());
            report
                .per_file
                .entry(outcome.path)
                .or_default()
                .extend(outcome.results);
            report.all_transactions.extend(outcome.transactions);
            report.issues.extend(outcome.issues);
        }
        report
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Files in input order
    pub files: Vec<PathBuf>,
    pub per_file: BTreeMap<PathBuf, Vec<ReconciliationResult>>,
    pub all_transactions: Vec<Transaction>,
    pub issues: Vec<RunIssue>,
}

/// Block counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pass: usize,
    pub fail: usize,
    pub skipped: usize,
}

impl RunReport {
    /// No failed block and no file- or block-level error.
    pub fn is_clean(&self) -> bool {
        self.counts().fail == 0 && !self.issues.iter().any(RunIssue::is_error)
    }

    pub fn results(&self) -> impl Iterator<Item = &ReconciliationResult> {
        self.files
            .iter()
            .filter_map(|f| self.per_file.get(f))
            .flatten()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for r in self.per_file.values().flatten() {
            match r.status {
                ReconciliationStatus::Pass => counts.pass += 1,
                ReconciliationStatus::Fail => counts.fail += 1,
                ReconciliationStatus::SkippedNoTransactions => counts.skipped += 1,
            }
        }
        counts
    }

    pub fn issues_for<'a>(&'a self, file: &'a Path) -> impl Iterator<Item = &'a RunIssue> + 'a {
        self.issues.iter().filter(move |i| i.file == file)
    }

    /// One-line summary for the terminal.
    pub fn summary(&self) -> String {
        let c = self.counts();
        let errors = self.issues.iter().filter(|i| i.is_error()).count();
        let warnings = self.issues.len() - errors;
        format!(
            "{} files, {} blocks ({} pass, {} fail, {} skipped), {} transactions, {} errors, {} warnings",
            self.files.len(),
            c.pass + c.fail + c.skipped,
            c.pass,
            c.fail,
            c.skipped,
            self.all_transactions.len(),
            errors,
            warnings
        )
    }
}
