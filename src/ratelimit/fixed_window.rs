//! Fixed-window counter

use std::time::SystemTime;

/// Counter for one principal within non-overlapping windows. A window opens
/// with the first event after the previous one expired.
///
/// The count only grows inside a window and is zeroed when a chargeable
/// event arrives after `reset_at`. Two adjacent windows can therefore admit
/// up to twice the cap in a short burst around the boundary.
#[derive(Debug, Clone)]
pub struct FixedWindow {
    count: u32,
    /// Unix milliseconds after which the next event opens a fresh window
    reset_at: i64,
}

/// Outcome of charging one event against a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    Allowed { remaining: u32, reset_at: i64 },
    Denied { reset_at: i64 },
}

impl FixedWindow {
    pub fn new(now_ms: i64, window_ms: u64) -> Self {
        Self {
            count: 0,
            reset_at: now_ms + window_ms as i64,
        }
    }

    /// Get current time in milliseconds
    pub fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    /// Charge one event at `now_ms`.
    pub fn charge(&mut self, now_ms: i64, cap: u32, window_ms: u64) -> WindowDecision {
        if now_ms > self.reset_at {
            self.count = 0;
            self.reset_at = now_ms + window_ms as i64;
        }

        if self.count >= cap {
            return WindowDecision::Denied {
                reset_at: self.reset_at,
            };
        }

        self.count += 1;
        WindowDecision::Allowed {
            remaining: cap - self.count,
            reset_at: self.reset_at,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset_at(&self) -> i64 {
        self.reset_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 60_000;

    #[test]
    fn test_fixed_window_basic() {
        let mut window = FixedWindow::new(0, WINDOW);

        for i in 0..10 {
            assert_eq!(
                window.charge(i, 10, WINDOW),
                WindowDecision::Allowed {
                    remaining: 9 - i as u32,
                    reset_at: 60_000
                }
            );
        }

        assert_eq!(
            window.charge(100, 10, WINDOW),
            WindowDecision::Denied { reset_at: 60_000 }
        );
        assert_eq!(window.count(), 10);
    }

    #[test]
    fn test_reset_happens_strictly_after_boundary() {
        let mut window = FixedWindow::new(0, WINDOW);
        window.charge(0, 1, WINDOW);

        // Exactly at reset_at the old window still applies
        assert!(matches!(
            window.charge(60_000, 1, WINDOW),
            WindowDecision::Denied { .. }
        ));

        assert_eq!(
            window.charge(60_001, 1, WINDOW),
            WindowDecision::Allowed {
                remaining: 0,
                reset_at: 120_001
            }
        );
        assert_eq!(window.reset_at(), 120_001);
    }

    #[test]
    fn test_denied_does_not_advance_count() {
        let mut window = FixedWindow::new(0, WINDOW);
        window.charge(1, 2, WINDOW);
        window.charge(2, 2, WINDOW);
        for t in 3..50 {
            window.charge(t, 2, WINDOW);
        }
        assert_eq!(window.count(), 2);
    }
}
