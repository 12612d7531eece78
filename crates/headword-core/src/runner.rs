//! Main runner: worker pool over the shared cursor

use std::sync::Mutex;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, ensure};

use crate::config::RunConfig;
use crate::cursor::Cursor;
use crate::extract::Extract;
use crate::fetch::Fetch;
use crate::progress::{Ticker, fmt_num};
use crate::sink::Collector;
use crate::worker::{self, RunCounters, WorkerContext};

/// Collaborators shared by every worker in a run
pub struct Pipeline<'a> {
    pub cursor: &'a Cursor,
    pub fetcher: &'a dyn Fetch,
    pub extractor: &'a dyn Extract,
    pub collector: &'a Collector,
    pub ticker: &'a Ticker,
}

/// Run execution summary
#[derive(Debug)]
pub struct Summary {
    pub total: u64,
    pub workers: usize,
    /// Keys handed out by the cursor
    pub claimed: u64,
    pub collected: u64,
    pub skipped: u64,
    pub failed: u64,
    pub elapsed: Duration,
    /// Cursor was closed early by an interrupt
    pub cancelled: bool,
}

impl Summary {
    /// Label/value rows for table output
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "Keys",
                format!("{}/{}", fmt_num(self.claimed), fmt_num(self.total)),
            ),
            ("Collected", fmt_num(self.collected)),
            ("Skipped", fmt_num(self.skipped)),
            ("Write errors", fmt_num(self.failed)),
            ("Workers", self.workers.to_string()),
            ("Time", format!("{:.1}s", self.elapsed.as_secs_f64())),
            ("Interrupted", if self.cancelled { "yes" } else { "no" }.to_string()),
        ]
    }

    pub fn log(&self) {
        log::info!(
            "Keys: {}/{} claimed, {} collected, {} skipped, {} failed",
            self.claimed,
            self.total,
            self.collected,
            self.skipped,
            self.failed
        );
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.collected > 0 && self.elapsed > Duration::ZERO {
            let rate = self.collected as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {rate:.1} keys/sec");
        }
    }
}

/// Run workers until the cursor is exhausted or closed.
///
/// Does not flush the collector; the caller does that once this returns
/// `Ok`. Returns `Err` for invalid configuration or when a worker hit a
/// fatal error under [`MissingPolicy::Abort`](crate::MissingPolicy::Abort).
pub fn run(config: &RunConfig, pipeline: &Pipeline<'_>) -> Result<Summary> {
    config.validate()?;
    ensure!(
        pipeline.cursor.total() == config.count,
        "cursor covers {} keys but count is {}",
        pipeline.cursor.total(),
        config.count
    );

    let start = Instant::now();
    let workers = config.effective_workers();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("worker-{i}"))
        .build()
        .context("Failed to create thread pool")?;

    let counters = RunCounters::default();
    let fatal = Mutex::new(None);
    let ctx = WorkerContext {
        cursor: pipeline.cursor,
        fetcher: pipeline.fetcher,
        extractor: pipeline.extractor,
        collector: pipeline.collector,
        ticker: pipeline.ticker,
        policy: config.on_missing,
        counters: &counters,
        fatal: &fatal,
    };

    log::info!("started {workers} workers for {} keys", config.count);

    pool.scope(|s| {
        for _ in 0..workers {
            s.spawn(|_| worker::run_worker(&ctx));
        }
    });

    if let Some((key, err)) = fatal
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
    {
        return Err(anyhow!(err).context(format!("key {key} failed")));
    }

    let summary = Summary {
        total: config.count,
        workers,
        claimed: pipeline.cursor.issued(),
        collected: counters.collected.load(Ordering::Relaxed),
        skipped: counters.skipped.load(Ordering::Relaxed),
        failed: counters.failed.load(Ordering::Relaxed),
        elapsed: start.elapsed(),
        cancelled: pipeline.cursor.is_closed(),
    };

    if summary.cancelled {
        log::warn!(
            "stopped early after {} of {} keys",
            summary.claimed,
            summary.total
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SelectorExtractor;
    use crate::fetch::FetchError;

    fn ok_page(_: u64) -> Result<String, FetchError> {
        Ok(r#"<span class="hwLabel">w</span>"#.to_string())
    }

    #[test]
    fn mismatched_cursor_rejected() {
        let cursor = Cursor::new(3);
        let collector = Collector::buffered(std::io::sink());
        let ticker = Ticker::counting();
        let config = RunConfig {
            count: 4,
            workers: 1,
            ..Default::default()
        };
        let err = run(
            &config,
            &Pipeline {
                cursor: &cursor,
                fetcher: &ok_page,
                extractor: &SelectorExtractor::default(),
                collector: &collector,
                ticker: &ticker,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("cursor covers 3 keys"));
    }

    #[test]
    fn summary_counts() {
        let cursor = Cursor::new(8);
        let collector = Collector::buffered(std::io::sink());
        let ticker = Ticker::counting();
        let config = RunConfig {
            count: 8,
            workers: 3,
            ..Default::default()
        };
        let summary = run(
            &config,
            &Pipeline {
                cursor: &cursor,
                fetcher: &ok_page,
                extractor: &SelectorExtractor::default(),
                collector: &collector,
                ticker: &ticker,
            },
        )
        .unwrap();
        assert_eq!(summary.total, 8);
        assert_eq!(summary.workers, 3);
        assert_eq!(summary.claimed, 8);
        assert_eq!(summary.collected, 8);
        assert_eq!(summary.skipped, 0);
        assert!(!summary.cancelled);
        assert_eq!(ticker.completed(), 8);
        assert_eq!(collector.buffered_len(), 8);
    }

    #[test]
    fn summary_rows() {
        let summary = Summary {
            total: 291_601,
            workers: 4,
            claimed: 1_000,
            collected: 990,
            skipped: 10,
            failed: 2,
            elapsed: Duration::from_millis(2_500),
            cancelled: true,
        };
        let rows = summary.rows();
        assert_eq!(rows[0], ("Keys", "1,000/291,601".to_string()));
        assert_eq!(rows[2], ("Skipped", "10".to_string()));
        assert_eq!(rows[3], ("Write errors", "2".to_string()));
        assert_eq!(rows[5], ("Time", "2.5s".to_string()));
        assert_eq!(rows[6], ("Interrupted", "yes".to_string()));
    }
}
