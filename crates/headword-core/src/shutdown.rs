//! Two-stage interrupt handling: drain on the first signal, exit on the second

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::cursor::Cursor;

/// Exit code used when a second interrupt forces the process down
pub const FORCED_EXIT_CODE: i32 = 130;

/// Cancellation state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelState {
    /// Normal operation
    Running,
    /// Cursor closed; in-flight keys still finishing
    Draining,
    /// Second interrupt received; process must exit now
    Terminated,
}

impl CancelState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Terminated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Draining => 1,
            Self::Terminated => 2,
        }
    }
}

/// Drives the cursor through `Running → Draining → Terminated`.
#[derive(Debug)]
pub struct CancellationController {
    state: AtomicU8,
    cursor: Arc<Cursor>,
}

impl CancellationController {
    pub fn new(cursor: Arc<Cursor>) -> Self {
        Self {
            state: AtomicU8::new(CancelState::Running.as_u8()),
            cursor,
        }
    }

    pub fn state(&self) -> CancelState {
        CancelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Record one interrupt and return the state it moved to.
    ///
    /// The first call closes the cursor; any later call yields `Terminated`.
    pub fn interrupt(&self) -> CancelState {
        let advance = |s: u8| Some((s + 1).min(CancelState::Terminated.as_u8()));
        let (Ok(prev) | Err(prev)) =
            self.state
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, advance);
        match CancelState::from_u8(prev) {
            CancelState::Running => {
                let limit = self.cursor.close();
                log::warn!("interrupted, finishing {limit} claimed keys (interrupt again to abort)");
                CancelState::Draining
            }
            CancelState::Draining | CancelState::Terminated => CancelState::Terminated,
        }
    }

    pub fn is_draining(&self) -> bool {
        self.state() != CancelState::Running
    }
}

/// Spawn the listener thread for SIGINT/SIGTERM.
///
/// The listener stays alive for the whole process, including while draining,
/// so a second signal always reaches it. On `Terminated` it exits the process
/// without flushing.
pub fn spawn_signal_listener(
    controller: Arc<CancellationController>,
) -> std::io::Result<JoinHandle<()>> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::Builder::new()
        .name("signal-listener".into())
        .spawn(move || {
            for sig in signals.forever() {
                log::debug!("received signal {sig}");
                if controller.interrupt() == CancelState::Terminated {
                    // Move past a partially drawn progress line
                    eprint!("\r");
                    log::error!("user interrupted");
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let ctl = CancellationController::new(Arc::new(Cursor::new(5)));
        assert_eq!(ctl.state(), CancelState::Running);
        assert!(!ctl.is_draining());
    }

    #[test]
    fn first_interrupt_drains_and_closes_cursor() {
        let cursor = Arc::new(Cursor::new(20));
        cursor.claim();
        cursor.claim();
        let ctl = CancellationController::new(cursor.clone());

        assert_eq!(ctl.interrupt(), CancelState::Draining);
        assert_eq!(ctl.state(), CancelState::Draining);
        assert!(ctl.is_draining());
        assert_eq!(cursor.limit(), 2);
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn second_interrupt_terminates() {
        let ctl = CancellationController::new(Arc::new(Cursor::new(5)));
        ctl.interrupt();
        assert_eq!(ctl.interrupt(), CancelState::Terminated);
        assert_eq!(ctl.state(), CancelState::Terminated);
    }

    #[test]
    fn further_interrupts_stay_terminated() {
        let ctl = CancellationController::new(Arc::new(Cursor::new(5)));
        for _ in 0..2 {
            ctl.interrupt();
        }
        for _ in 0..300 {
            assert_eq!(ctl.interrupt(), CancelState::Terminated);
        }
        assert_eq!(ctl.state(), CancelState::Terminated);
    }

    #[test]
    fn concurrent_interrupts_drain_exactly_once() {
        let ctl = Arc::new(CancellationController::new(Arc::new(Cursor::new(5))));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ctl = ctl.clone();
                std::thread::spawn(move || ctl.interrupt())
            })
            .collect();
        let states: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let drained = states
            .iter()
            .filter(|s| **s == CancelState::Draining)
            .count();
        assert_eq!(drained, 1);
        assert_eq!(ctl.state(), CancelState::Terminated);
    }

    // Only one signal is ever raised in this process: a second would exit it.
    #[test]
    fn delivered_sigint_drains_through_listener() {
        let cursor = Arc::new(Cursor::new(10));
        assert_eq!(cursor.claim(), Some(1));
        let ctl = Arc::new(CancellationController::new(cursor.clone()));
        spawn_signal_listener(ctl.clone()).unwrap();

        signal_hook::low_level::raise(SIGINT).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while ctl.state() == CancelState::Running && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(ctl.state(), CancelState::Draining);
        assert_eq!(cursor.limit(), 1);
        assert_eq!(cursor.claim(), None);
    }
}
