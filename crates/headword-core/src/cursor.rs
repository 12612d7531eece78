//! Shared work cursor handing out keys 1..=N to parallel workers

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct CursorState {
    /// Next key to hand out
    next: u64,
    /// Highest key that may still be handed out
    limit: u64,
}

/// Mutex-guarded key allocator.
///
/// Workers call [`claim()`](Cursor::claim) to take the next key. Keys are
/// issued in strictly increasing order, each exactly once. Once the cursor
/// is exhausted it stays exhausted, even if `limit` would allow more.
///
/// [`close()`](Cursor::close) truncates the limit to the number of keys
/// already issued so no new work is handed out; claimed keys are unaffected.
#[derive(Debug)]
pub struct Cursor {
    total: u64,
    state: Mutex<CursorState>,
}

impl Cursor {
    /// Create a cursor over `1..=total`
    pub fn new(total: u64) -> Self {
        Self {
            total,
            state: Mutex::new(CursorState {
                next: 1,
                limit: total,
            }),
        }
    }

    // The state is two integers updated together; a panic elsewhere cannot
    // leave it half-written, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, CursorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the next key, or `None` once exhausted
    pub fn claim(&self) -> Option<u64> {
        let mut state = self.lock();
        if state.next > state.limit {
            return None;
        }
        let key = state.next;
        state.next += 1;
        Some(key)
    }

    /// Stop issuing keys. Returns the new limit (keys issued so far).
    pub fn close(&self) -> u64 {
        let mut state = self.lock();
        let issued = state.next - 1;
        if issued < state.limit {
            state.limit = issued;
            log::debug!("cursor closed at key {issued}");
        }
        state.limit
    }

    /// Number of keys handed out so far
    pub fn issued(&self) -> u64 {
        let state = self.lock();
        (state.next - 1).min(state.limit)
    }

    /// Current upper bound on keys that may be issued
    pub fn limit(&self) -> u64 {
        self.lock().limit
    }

    /// Total keys configured at startup (N)
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Whether the limit was truncated below N
    pub fn is_closed(&self) -> bool {
        self.limit() < self.total
    }
}
