//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: a single indicatif spinner line on stderr.
//! Non-TTY mode: log-based output every 10% (no spinner).
//!
//! Workers never wait on the reporter: completions are counted in an atomic,
//! and the reporter thread is woken through a small bounded channel whose
//! sends are dropped when it is full.

use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Capacity of the wake-up channel between workers and the reporter
const TICK_CHANNEL_CAPACITY: usize = 64;

/// Spinner redraw interval
const SPINNER_INTERVAL: Duration = Duration::from_millis(250);

/// How much progress to show
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgressMode {
    #[default]
    Off,
    /// Spinner and percentage
    Plain,
    /// Plain plus elapsed time and ETA
    Fancy,
}

impl ProgressMode {
    /// Map a repeated `-p` flag count: 0 = off, 1 = plain, 2+ = fancy
    pub fn from_count(n: u8) -> Self {
        match n {
            0 => Self::Off,
            1 => Self::Plain,
            _ => Self::Fancy,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Self::Off
    }
}

/// Snapshot of run progress
#[derive(Clone, Copy, Debug)]
pub struct ProgressState {
    pub total: u64,
    pub completed: u64,
    pub started: Instant,
}

impl ProgressState {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            completed: 0,
            started: Instant::now(),
        }
    }

    /// Raise the completion count; never moves backwards
    pub fn observe(&mut self, completed: u64) {
        self.completed = self.completed.max(completed);
    }

    /// Fraction done in `[0, 1]`
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }

    /// Linear extrapolation of the remaining time.
    ///
    /// `None` until at least one key completed and some time has passed.
    pub fn eta(&self, elapsed: Duration) -> Option<Duration> {
        let secs = elapsed.as_secs_f64();
        if self.completed == 0 || secs <= 0.0 {
            return None;
        }
        // (total - completed) / (completed / secs), rearranged to keep exact
        // results exact
        let left = self.total.saturating_sub(self.completed) as f64;
        Some(Duration::from_secs_f64(left * secs / self.completed as f64))
    }

    /// Status text for `mode` (without the spinner glyph)
    pub fn render(&self, mode: ProgressMode, elapsed: Duration) -> String {
        let pct = self.ratio() * 100.0;
        match mode {
            ProgressMode::Off | ProgressMode::Plain => format!("{pct:.2}% done"),
            ProgressMode::Fancy => {
                let eta = self
                    .eta(elapsed)
                    .map_or_else(|| "?".to_string(), fmt_duration);
                format!(
                    "{pct:.2}% done, elapsed {}, eta {eta}",
                    fmt_duration(elapsed)
                )
            }
        }
    }
}

/// Format whole seconds as `1h2m3s`, `2m3s` or `3s`.
pub fn fmt_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

/// Format number with thousand separators.
pub fn fmt_num(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Owns the terminal state shared by the spinner and the log bridge.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Context that never draws (tests, redirected stderr)
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            is_tty: false,
        }
    }

    /// Spinner line for the run status. Hidden when not on a TTY.
    fn status_line(&self) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::with_template("{spinner} {wide_msg}")
                .expect("invalid template")
                .tick_strings(&["|", "/", "-", "\\", " "]),
        );
        pb.enable_steady_tick(SPINNER_INTERVAL);
        pb
    }

    /// Whether running in TTY mode.
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker-side handle: counts completions and wakes the reporter.
#[derive(Clone, Debug, Default)]
pub struct Ticker {
    completed: Arc<AtomicU64>,
    wake: Option<SyncSender<()>>,
}

impl Ticker {
    /// Ticker that only counts (no reporter thread)
    pub fn counting() -> Self {
        Self::default()
    }

    /// Record one completed key. Never blocks.
    pub fn tick(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(tx) = &self.wake {
            // Full means the reporter already has a pending wake-up
            let _ = tx.try_send(());
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Background thread rendering progress from completion ticks.
pub struct ProgressReporter {
    ticker: Ticker,
    handle: Option<JoinHandle<ProgressState>>,
}

impl ProgressReporter {
    /// Start reporting on `ctx`. With [`ProgressMode::Off`] no thread is
    /// spawned and the ticker only counts.
    pub fn spawn(
        total: u64,
        mode: ProgressMode,
        ctx: &ProgressContext,
    ) -> std::io::Result<Self> {
        if !mode.is_enabled() {
            return Ok(Self {
                ticker: Ticker::counting(),
                handle: None,
            });
        }

        let (tx, rx) = std::sync::mpsc::sync_channel(TICK_CHANNEL_CAPACITY);
        let completed = Arc::new(AtomicU64::new(0));
        let ticker = Ticker {
            completed: completed.clone(),
            wake: Some(tx),
        };
        let pb = ctx.status_line();
        let log_fallback = !ctx.is_tty();

        let handle = std::thread::Builder::new()
            .name("progress".into())
            .spawn(move || report_loop(rx, &completed, total, mode, &pb, log_fallback))?;

        Ok(Self {
            ticker,
            handle: Some(handle),
        })
    }

    /// Handle to pass to workers
    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    /// Close the tick stream, wait for the final render, return completions.
    ///
    /// Clones of the ticker must be dropped first, or this waits for them.
    pub fn finish(self) -> u64 {
        let Self { ticker, handle } = self;
        let completed = ticker.completed();
        drop(ticker);
        match handle.map(JoinHandle::join) {
            Some(Ok(state)) => state.completed,
            Some(Err(_)) => {
                log::warn!("progress reporter panicked");
                completed
            }
            None => completed,
        }
    }
}

fn report_loop(
    rx: Receiver<()>,
    completed: &AtomicU64,
    total: u64,
    mode: ProgressMode,
    pb: &ProgressBar,
    log_fallback: bool,
) -> ProgressState {
    let mut state = ProgressState::new(total);
    let mut last_decile = 0u64;

    while rx.recv().is_ok() {
        state.observe(completed.load(Ordering::Relaxed));
        let msg = state.render(mode, state.started.elapsed());
        if log_fallback {
            let decile = (state.ratio() * 10.0) as u64;
            if decile > last_decile {
                last_decile = decile;
                log::info!("{msg}");
            }
        } else {
            pb.set_message(msg);
        }
    }

    state.observe(completed.load(Ordering::Relaxed));
    pb.finish_with_message(state.render(mode, state.started.elapsed()));
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(total: u64, completed: u64) -> ProgressState {
        let mut s = ProgressState::new(total);
        s.observe(completed);
        s
    }

    #[test]
    fn mode_from_count() {
        assert_eq!(ProgressMode::from_count(0), ProgressMode::Off);
        assert_eq!(ProgressMode::from_count(1), ProgressMode::Plain);
        assert_eq!(ProgressMode::from_count(2), ProgressMode::Fancy);
        assert_eq!(ProgressMode::from_count(5), ProgressMode::Fancy);
        assert!(!ProgressMode::Off.is_enabled());
        assert!(ProgressMode::Fancy > ProgressMode::Plain);
    }

    #[test]
    fn ratio_reaches_one_exactly() {
        assert_eq!(state(5, 5).ratio(), 1.0);
        assert_eq!(state(291_601, 291_601).ratio(), 1.0);
        assert!(state(5, 4).ratio() < 1.0);
    }

    #[test]
    fn ratio_monotonic() {
        let mut s = ProgressState::new(10);
        let mut last = s.ratio();
        for c in [1, 3, 2, 7, 7, 10] {
            s.observe(c);
            assert!(s.ratio() >= last);
            last = s.ratio();
        }
        assert_eq!(s.completed, 10);
    }

    #[test]
    fn eta_needs_progress_and_time() {
        assert_eq!(state(10, 0).eta(Duration::from_secs(5)), None);
        assert_eq!(state(10, 3).eta(Duration::ZERO), None);
    }

    #[test]
    fn eta_linear() {
        let eta = state(10, 5).eta(Duration::from_secs(10)).unwrap();
        assert_eq!(eta.as_secs(), 10);
        let eta = state(100, 25).eta(Duration::from_secs(5)).unwrap();
        assert_eq!(eta.as_secs(), 15);
        assert_eq!(state(4, 4).eta(Duration::from_secs(1)), Some(Duration::ZERO));
    }

    #[test]
    fn render_plain() {
        assert_eq!(
            state(8, 1).render(ProgressMode::Plain, Duration::from_secs(1)),
            "12.50% done"
        );
    }

    #[test]
    fn render_fancy() {
        assert_eq!(
            state(10, 5).render(ProgressMode::Fancy, Duration::from_secs(70)),
            "50.00% done, elapsed 1m10s, eta 1m10s"
        );
        assert_eq!(
            state(10, 0).render(ProgressMode::Fancy, Duration::from_secs(2)),
            "0.00% done, elapsed 2s, eta ?"
        );
    }

    #[test]
    fn fmt_duration_units() {
        assert_eq!(fmt_duration(Duration::ZERO), "0s");
        assert_eq!(fmt_duration(Duration::from_millis(59_900)), "59s");
        assert_eq!(fmt_duration(Duration::from_secs(61)), "1m1s");
        assert_eq!(fmt_duration(Duration::from_secs(3_600)), "1h0m0s");
        assert_eq!(fmt_duration(Duration::from_secs(3_723)), "1h2m3s");
    }

    #[test]
    fn fmt_num_thousands() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(123), "123");
        assert_eq!(fmt_num(1_234), "1,234");
        assert_eq!(fmt_num(291_601), "291,601");
        assert_eq!(fmt_num(1_234_567), "1,234,567");
    }

    #[test]
    fn counting_ticker() {
        let t = Ticker::counting();
        t.tick();
        t.tick();
        assert_eq!(t.completed(), 2);
    }

    #[test]
    fn off_mode_spawns_nothing() {
        let ctx = ProgressContext::hidden();
        let r = ProgressReporter::spawn(3, ProgressMode::Off, &ctx).unwrap();
        r.ticker().tick();
        assert_eq!(r.finish(), 1);
    }

    #[test]
    fn reporter_sees_every_completion() {
        let ctx = ProgressContext::hidden();
        let r = ProgressReporter::spawn(1_000, ProgressMode::Fancy, &ctx).unwrap();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..250 {
                        r.ticker().tick();
                    }
                });
            }
        });
        assert_eq!(r.finish(), 1_000);
    }
}
