//! Headword Core - parallel fetch/extract engine over a numeric key range
//!
//! Keys `1..=N` are handed out by a shared [`Cursor`] to a pool of workers.
//! Each worker fetches the page for its key, extracts one cleaned value and
//! hands it to a [`Collector`]. Progress is reported off the worker threads,
//! and a two-stage interrupt handler drains in-flight work before exiting.

pub mod config;
pub mod cursor;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod progress;
pub mod runner;
pub mod shutdown;
pub mod sink;
pub mod worker;

// Re-exports for convenience
pub use config::{DEFAULT_COUNT, RunConfig};
pub use cursor::Cursor;
pub use error::{KeyError, MissingPolicy};
pub use extract::{DEFAULT_SELECTOR, Extract, ExtractError, SelectorExtractor, clean};
pub use fetch::{DEFAULT_BASE_URL, Fetch, FetchError, HttpConfig, HttpFetcher};
pub use logging::{IndicatifLogger, default_level, init_logging};
pub use progress::{ProgressContext, ProgressMode, ProgressReporter, Ticker};
pub use runner::{Pipeline, Summary, run};
pub use shutdown::{CancelState, CancellationController, spawn_signal_listener};
pub use sink::{CSV_HEADER, Collector};
