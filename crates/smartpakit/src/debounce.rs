use embassy_time::{Duration, Instant};
use portable_atomic::{AtomicU64, Ordering};

/// Interrupt debounce window armed by every chip reset.
///
/// The window is stored as an absolute deadline in ticks, so re-arming
/// cancels the previous window and no expiry task is needed. Zero means
/// disarmed.
pub struct DebounceGate {
    deadline: AtomicU64,
}

impl DebounceGate {
    pub const fn new() -> Self {
        Self { deadline: AtomicU64::new(0) }
    }

    /// Open a window of `window` starting at `now`, replacing any armed one.
    ///
    /// A zero-length window leaves the gate disarmed.
    pub fn arm(&self, now: Instant, window: Duration) {
        if window.as_ticks() == 0 {
            return;
        }
        let deadline = now
            .checked_add(window)
            .unwrap_or(Instant::MAX)
            .as_ticks()
            .max(1);
        self.deadline.store(deadline, Ordering::Release);
    }

    pub fn disarm(&self) {
        self.deadline.store(0, Ordering::Release);
    }

    /// Whether a window has been armed and not yet observed as expired.
    ///
    /// Lets callers skip reading the clock when no window exists.
    pub fn has_deadline(&self) -> bool {
        self.deadline.load(Ordering::Acquire) != 0
    }

    /// True while `now` lies inside the armed window.
    pub fn is_armed(&self, now: Instant) -> bool {
        let deadline = self.deadline.load(Ordering::Acquire);
        if deadline == 0 {
            return false;
        }
        if now.as_ticks() < deadline {
            return true;
        }
        // Expired; clear it unless someone re-armed in between.
        let _ = self.deadline.compare_exchange(
            deadline,
            0,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
        false
    }
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new()
    }
}
