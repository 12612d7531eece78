//! Worker loop: claim → fetch → extract → collect → tick

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cursor::Cursor;
use crate::error::{KeyError, MissingPolicy};
use crate::extract::Extract;
use crate::fetch::Fetch;
use crate::progress::Ticker;
use crate::sink::Collector;

/// Outcome counters shared by all workers
#[derive(Debug, Default)]
pub struct RunCounters {
    pub collected: AtomicU64,
    /// Fetch or extract failures that dropped the key
    pub skipped: AtomicU64,
    /// Keys whose result could not be written
    pub failed: AtomicU64,
}

/// Everything a worker needs, borrowed for the duration of the pool scope
pub struct WorkerContext<'a> {
    pub cursor: &'a Cursor,
    pub fetcher: &'a dyn Fetch,
    pub extractor: &'a dyn Extract,
    pub collector: &'a Collector,
    pub ticker: &'a Ticker,
    pub policy: MissingPolicy,
    pub counters: &'a RunCounters,
    /// First fatal error, set at most once
    pub fatal: &'a Mutex<Option<(u64, KeyError)>>,
}

/// Fetch and extract one key
pub fn process_key(
    key: u64,
    fetcher: &dyn Fetch,
    extractor: &dyn Extract,
) -> Result<String, KeyError> {
    let document = fetcher.fetch(key)?;
    Ok(extractor.extract(&document)?)
}

/// Run until the cursor is exhausted (or closed)
pub fn run_worker(ctx: &WorkerContext<'_>) {
    while let Some(key) = ctx.cursor.claim() {
        let value = match process_key(key, ctx.fetcher, ctx.extractor) {
            Ok(v) => v,
            Err(e) if e.is_fatal(ctx.policy) => {
                log::error!("{key}: {e}, aborting run");
                ctx.cursor.close();
                let mut fatal = ctx
                    .fatal
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if fatal.is_none() {
                    *fatal = Some((key, e));
                }
                return;
            }
            Err(e) => {
                log::warn!("{key}: {e}");
                ctx.counters.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        if let Err(e) = ctx.collector.collect(key, value) {
            log::error!("{key}: {}", KeyError::from(e));
            ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        ctx.counters.collected.fetch_add(1, Ordering::Relaxed);
        log::debug!("parsed: {key}");
        ctx.ticker.tick();
    }
}
