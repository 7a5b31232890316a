//! Monotonic percent-complete progress reporting.
//!
//! Mirrors the original `progressWriter`: the callback fires only when the
//! integer percentage strictly increases, so a transfer never reports more
//! than 101 distinct values (0..=100) and never goes backwards.

use std::sync::Mutex;

/// A callback invoked with a percentage in `0..=100`.
pub type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;

/// Tracks bytes transferred against a known total and reports strictly
/// increasing integer percentages to an optional callback.
pub struct ProgressMeter {
    total: u64,
    state: Mutex<State>,
    callback: Option<ProgressCallback>,
}

struct State {
    complete: u64,
    last_percent: Option<u8>,
}

impl ProgressMeter {
    /// Creates a meter for a transfer of `total` bytes. `total == 0` is
    /// legal (an empty plaintext); no percent is ever reported for it since
    /// there is nothing to divide by, and `advance` becomes a no-op.
    #[must_use]
    pub fn new(total: u64, callback: Option<ProgressCallback>) -> Self {
        Self {
            total,
            state: Mutex::new(State {
                complete: 0,
                last_percent: None,
            }),
            callback,
        }
    }

    /// A meter with no callback, for call sites that do not care about
    /// progress but still need to route bytes through the same code path.
    #[must_use]
    pub fn silent(total: u64) -> Self {
        Self::new(total, None)
    }

    /// Records that `n` additional bytes have been transferred and invokes
    /// the callback if the integer percentage strictly increased.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, n: u64) {
        if self.total == 0 {
            return;
        }

        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.complete = (state.complete + n).min(self.total);
        let percent = ((100 * state.complete) / self.total) as u8;

        let should_fire = match state.last_percent {
            Some(last) => percent > last,
            None => true,
        };

        if should_fire {
            state.last_percent = Some(percent);
            if let Some(cb) = &self.callback {
                cb(percent);
            }
        }
    }

    /// The total byte count this meter was constructed with.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }
}
