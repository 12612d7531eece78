//! headword - fetch dictionary headwords for a numeric page range
//!
//! Pages `1..=N` are fetched in parallel, the headword label is extracted
//! from each, and `"<word>",<index>` records go to stdout or a CSV file.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use headword_core::{
    CancellationController, Collector, Cursor, DEFAULT_COUNT, HttpFetcher, MissingPolicy,
    Pipeline, ProgressContext, ProgressMode, ProgressReporter, RunConfig, SelectorExtractor,
    Summary, default_level, init_logging, spawn_signal_listener,
};

mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "headword")]
#[command(about = "Fetch headwords for a range of dictionary pages")]
#[command(version)]
struct Cli {
    /// Write CSV to FILE instead of stdout (sorted, with header)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Fetch pages 1..=N
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_COUNT,
          value_parser = clap::value_parser!(u64).range(1..))]
    count: u64,

    /// Number of simultaneous workers (0 = number of CPUs)
    #[arg(short, long, value_name = "N")]
    threads: Option<usize>,

    /// Show percentage done; repeat (-pp) for elapsed time and ETA
    #[arg(short, long, action = ArgAction::Count)]
    progress: u8,

    /// Log every parsed page plus start/stop milestones
    #[arg(short, long)]
    verbose: bool,

    /// Abort the run when a page lacks the headword element
    #[arg(long)]
    strict: bool,

    /// Page URL prefix (the page number is appended)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// CSS selector of the headword element
    #[arg(long, value_name = "CSS")]
    selector: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Config file path (default: ./headword.toml or ~/.config/headword/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let progress = Arc::new(ProgressContext::new());
    let mode = ProgressMode::from_count(cli.progress);

    // Route logs through the spinner only when one is actually drawn
    let multi = if progress.is_tty() && mode.is_enabled() {
        Some(progress.multi())
    } else {
        None
    };
    init_logging(default_level(cli.verbose, mode.is_enabled()), multi);

    let setup = match Setup::from_cli(&cli) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };

    match execute(&cli, setup, mode, &progress) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Fatal error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Everything validated before the first request goes out
struct Setup {
    run: RunConfig,
    fetcher: HttpFetcher,
    extractor: SelectorExtractor,
    collector: Collector,
}

#[cfg(test)]
impl std::fmt::Debug for Setup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setup").finish_non_exhaustive()
    }
}

impl Setup {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let config = if let Some(path) = &cli.config {
            Config::from_file(path)?
        } else {
            Config::load()?
        };

        let run = RunConfig {
            count: cli.count,
            workers: cli.threads.unwrap_or(config.workers.default),
            on_missing: if cli.strict {
                MissingPolicy::Abort
            } else {
                MissingPolicy::Skip
            },
        };
        run.validate()?;

        let mut http = config.http.to_http_config();
        if let Some(url) = &cli.base_url {
            http.base_url.clone_from(url);
        }
        if let Some(secs) = cli.timeout {
            http.timeout = Duration::from_secs(secs);
        }
        anyhow::ensure!(
            !http.timeout.is_zero(),
            "request timeout must be at least 1 second"
        );
        let fetcher = HttpFetcher::new(&http)?;

        let selector = cli.selector.as_deref().unwrap_or(&config.extract.selector);
        let extractor = SelectorExtractor::new(selector)?;

        // Create the file up front so a bad path fails before any fetching
        let collector = match &cli.output {
            Some(path) => {
                let file = std::fs::File::create(path)
                    .with_context(|| format!("Cannot create {}", path.display()))?;
                Collector::buffered(file)
            }
            None => Collector::immediate(std::io::stdout()),
        };

        Ok(Self {
            run,
            fetcher,
            extractor,
            collector,
        })
    }
}

fn execute(cli: &Cli, setup: Setup, mode: ProgressMode, progress: &ProgressContext) -> Result<()> {
    let Setup {
        run,
        fetcher,
        extractor,
        collector,
    } = setup;

    let cursor = Arc::new(Cursor::new(run.count));
    let controller = Arc::new(CancellationController::new(cursor.clone()));
    spawn_signal_listener(controller).context("Failed to install signal handler")?;

    let reporter = ProgressReporter::spawn(run.count, mode, progress)
        .context("Failed to start progress reporter")?;

    let summary = headword_core::run(
        &run,
        &Pipeline {
            cursor: &cursor,
            fetcher: &fetcher,
            extractor: &extractor,
            collector: &collector,
            ticker: reporter.ticker(),
        },
    )?;
    reporter.finish();

    if let Some(path) = &cli.output {
        log::info!("writing to {}", path.display());
        let written = collector
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::debug!("{written} records written");
    } else {
        collector.flush().context("Failed to flush stdout")?;
    }

    if progress.is_tty() && (mode.is_enabled() || cli.verbose) {
        print_summary(&summary);
    } else {
        summary.log();
    }

    log::info!("exiting");
    Ok(())
}

/// Print a key-value summary table on stderr
fn print_summary(summary: &Summary) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Run").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in summary.rows() {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}
