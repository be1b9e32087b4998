//! Time-limited "recently created" markers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// How long a newly created appointment stays highlighted.
pub const DEFAULT_HIGHLIGHT_WINDOW: Duration = Duration::from_secs(5);

struct HighlightEntry {
    expires_at: Instant,
    token: u64,
    expiry: JoinHandle<()>,
}

#[derive(Default)]
struct HighlightState {
    entries: HashMap<String, HighlightEntry>,
    next_token: u64,
}

/// Set of identifiers flagged as recently created.
///
/// Each mark schedules its own expiry task; re-marking an identifier aborts
/// the previous task and restarts the window. Marking requires a Tokio
/// runtime.
#[derive(Clone)]
pub struct HighlightTracker {
    state: Arc<Mutex<HighlightState>>,
    window: Duration,
}

impl Default for HighlightTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_WINDOW)
    }
}

impl HighlightTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(HighlightState::default())),
            window,
        }
    }

    /// Highlight window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Flag `id` until now + window.
    pub fn mark(&self, id: &str) {
        let expires_at = Instant::now() + self.window;
        let mut state = lock(&self.state);
        state.next_token += 1;
        let token = state.next_token;

        let shared = Arc::clone(&self.state);
        let key = id.to_string();
        let expiry = tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let mut state = lock(&shared);
            if state.entries.get(&key).is_some_and(|e| e.token == token) {
                state.entries.remove(&key);
                debug!(appointment_id = %key, "Highlight expired");
            }
        });

        let entry = HighlightEntry {
            expires_at,
            token,
            expiry,
        };
        if let Some(previous) = state.entries.insert(id.to_string(), entry) {
            previous.expiry.abort();
        }
    }

    /// Drop the flag for `id` immediately.
    pub fn forget(&self, id: &str) {
        if let Some(entry) = lock(&self.state).entries.remove(id) {
            entry.expiry.abort();
        }
    }

    /// Check whether `id` is currently highlighted.
    pub fn is_highlighted(&self, id: &str) -> bool {
        lock(&self.state)
            .entries
            .get(id)
            .is_some_and(|e| e.expires_at > Instant::now())
    }

    /// Identifiers currently highlighted, in no particular order.
    pub fn highlighted_ids(&self) -> Vec<String> {
        let now = Instant::now();
        lock(&self.state)
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

// Entries are plain data, so a poisoned lock still holds a usable map.
fn lock(state: &Mutex<HighlightState>) -> MutexGuard<'_, HighlightState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
