use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reckon_core::{RawLine, TextSegment};
use reckon_finance::export::write_all;
use reckon_finance::{run_batch, BatchOptions, ReconciliationStatus, RunReport};
use reckon_ingest::{extract, LineParser, Segmenter};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

mod config;
mod logging;
mod sample;
mod state;

#[derive(Parser, Debug)]
#[command(
    name = "reckon",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RECKON_BUILD_SHA"), ")"),
    about = "Parse bank-statement PDFs and reconcile them against their stated balances"
)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and reconcile every PDF in a directory, then write the exports
    Run {
        /// Directory of statement PDFs, or a single PDF
        #[arg(long)]
        input: PathBuf,

        /// Config file (default: ~/.reckon/config.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory (default: [run] output_dir)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Files processed at once (default: number of CPUs)
        #[arg(long)]
        jobs: Option<usize>,

        /// Per-file time limit in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Write the default config file
    InitConfig {
        /// Target path (default: ~/.reckon/config.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the extracted lines and statement blocks of one PDF
    Inspect {
        pdf: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Write a synthetic two-account statement PDF
    Sample {
        #[arg(default_value = "sample_statement.pdf")]
        output: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    let result = runtime.block_on(dispatch(cli.command));
    // Blocking work that outlived its file timeout is abandoned here, not joined.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn dispatch(command: Command) -> Result<ExitCode> {
    match command {
        Command::Run {
            input,
            config,
            output,
            jobs,
            timeout_secs,
        } => {
            let cfg = config::load_config(config.as_deref())?;
            let files = discover_pdfs(&input)?;

            let defaults = BatchOptions::default();
            let options = BatchOptions {
                concurrency: jobs.or(cfg.run.jobs).unwrap_or(defaults.concurrency),
                timeout: Duration::from_secs(timeout_secs.unwrap_or(cfg.run.timeout_secs)),
            };
            let output_dir = output.unwrap_or_else(|| cfg.run.output_dir.clone());

            let report = run_batch(files, Arc::new(cfg.engine), options)
                .await
                .context("invalid configuration")?;

            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
            // Exports are written whether or not the run is clean.
            match write_all(&report, &output_dir, &stamp) {
                Ok(paths) => {
                    println!("Transactions: {}", paths.transactions_csv.display());
                    println!("Spreadsheet:  {}", paths.transactions_xlsx.display());
                    println!("Run log:      {}", paths.run_log.display());
                    println!("Status:       {}", paths.run_status.display());
                }
                Err(e) => tracing::error!(error = %e, "failed to write exports"),
            }

            print_summary(&report);
            return Ok(if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            });
        }

        Command::InitConfig { path, force } => {
            config::init_config(path.as_deref(), force)?;
        }

        Command::Inspect { pdf, config, json } => {
            let cfg = config::load_config(config.as_deref())?;
            inspect(&pdf, &cfg.engine, json)?;
        }

        Command::Sample { output } => {
            sample::write_sample(&output)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// `*.pdf` files directly inside `input`, sorted; or `input` itself.
fn discover_pdfs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("input not found: {}", input.display());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(input).with_context(|| format!("read {}", input.display()))? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if path.is_file() && is_pdf {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        bail!("no PDF files in {}", input.display());
    }
    Ok(files)
}

fn print_summary(report: &RunReport) {
    println!();
    for result in report.results() {
        if result.status == ReconciliationStatus::Fail {
            println!(
                "FAIL {} {}",
                result.block.source_file.display(),
                result.summary()
            );
        }
    }
    for issue in report.issues.iter().filter(|i| i.is_error()) {
        if issue.kind != reckon_finance::IssueKind::ReconciliationFailure {
            println!("ERROR {issue}");
        }
    }
    println!("{}", report.summary());
    if report.is_clean() {
        println!("All statements reconciled.");
    } else {
        println!("Some statements need attention; see the run log.");
    }
}

#[derive(Serialize)]
struct InspectLine<'a> {
    page: u32,
    y: f32,
    segments: &'a [TextSegment],
}

#[derive(Serialize)]
struct InspectBlock<'a> {
    header: &'a reckon_core::BlockHeader,
    lines: usize,
    transactions: usize,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct InspectReport<'a> {
    lines: Vec<InspectLine<'a>>,
    blocks: Vec<InspectBlock<'a>>,
    errors: Vec<String>,
}

fn inspect(pdf: &Path, cfg: &reckon_core::ReckonConfig, json: bool) -> Result<()> {
    let lines: Vec<RawLine> = extract(pdf)?;
    let segmenter = Segmenter::new(&cfg.segmenter).context("invalid period marker")?;
    let segmented = segmenter.segment(lines.clone(), pdf);

    let mut blocks = Vec::new();
    for block in &segmented.blocks {
        let Some(layout) = cfg.layouts.get(block.header.account_type) else {
            bail!("no layout for {} accounts", block.header.account_type);
        };
        let parsed = LineParser::new(layout).context("invalid layout pattern")?.parse(block);
        let mut warnings: Vec<String> = parsed.warnings.iter().map(|w| w.to_string()).collect();
        if parsed.rows_outside_table > 0 {
            warnings.push(format!(
                "{} dated rows ignored: column header not found",
                parsed.rows_outside_table
            ));
        }
        blocks.push(InspectBlock {
            header: &block.header,
            lines: block.raw_lines.len(),
            transactions: parsed.transactions.len(),
            warnings,
        });
    }
    let report = InspectReport {
        lines: lines
            .iter()
            .map(|l| InspectLine {
                page: l.page,
                y: l.y_position,
                segments: &l.segments,
            })
            .collect(),
        blocks,
        errors: segmented.errors.iter().map(|e| e.to_string()).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in &report.lines {
        let cells: Vec<String> = line
            .segments
            .iter()
            .map(|s| format!("{:>6.1}:{}", s.x, s.text))
            .collect();
        println!("p{} y={:>6.1} | {}", line.page, line.y, cells.join(" | "));
    }
    println!();
    for b in &report.blocks {
        println!(
            "block {} {} [{}]: {} lines, {} transactions",
            b.header.index,
            b.header.label(),
            b.header.account_type,
            b.lines,
            b.transactions
        );
        for w in &b.warnings {
            println!("  - {w}");
        }
    }
    for e in &report.errors {
        println!("dropped block: {e}");
    }
    Ok(())
}
