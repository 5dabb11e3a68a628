//! Global safe mode. Once engaged it stays on until the process restarts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Server errors inside `ERROR_WINDOW` that engage safe mode.
pub const ERROR_THRESHOLD: usize = 20;
pub const ERROR_WINDOW: Duration = Duration::from_secs(60);

pub struct SafeMode {
    active: AtomicBool,
    reason: Mutex<Option<String>>,
    errors: Mutex<VecDeque<Instant>>,
    threshold: usize,
    window: Duration,
}

impl Default for SafeMode {
    fn default() -> Self {
        Self::new()
    }
}

impl SafeMode {
    pub fn new() -> Self {
        Self::with_limits(ERROR_THRESHOLD, ERROR_WINDOW)
    }

    pub fn with_limits(threshold: usize, window: Duration) -> Self {
        Self {
            active: AtomicBool::new(false),
            reason: Mutex::new(None),
            errors: Mutex::new(VecDeque::new()),
            threshold,
            window,
        }
    }

    /// Engage safe mode. The first reason given is kept.
    pub fn engage(&self, reason: &str) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.reason.lock() {
            *slot = Some(reason.to_string());
        }
        tracing::error!(reason = %reason, "Safe mode engaged, rejecting requests until restart");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    /// Count one server error. Engages safe mode when the window holds
    /// `threshold` errors.
    pub fn record_error(&self) {
        self.record_error_at(Instant::now());
    }

    fn record_error_at(&self, now: Instant) {
        let count = {
            let Ok(mut errors) = self.errors.lock() else {
                return;
            };
            while errors
                .front()
                .is_some_and(|t| now.duration_since(*t) > self.window)
            {
                errors.pop_front();
            }
            errors.push_back(now);
            errors.len()
        };
        if count >= self.threshold {
            self.engage(&format!("{count} server errors within {}s", self.window.as_secs()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_inactive() {
        let sm = SafeMode::new();
        assert!(!sm.is_active());
        assert!(sm.reason().is_none());
    }

    #[test]
    fn engage_keeps_first_reason() {
        let sm = SafeMode::new();
        sm.engage("integrity");
        sm.engage("other");
        assert!(sm.is_active());
        assert_eq!(sm.reason().as_deref(), Some("integrity"));
    }

    #[test]
    fn error_burst_engages() {
        let sm = SafeMode::new();
        for _ in 0..ERROR_THRESHOLD - 1 {
            sm.record_error();
        }
        assert!(!sm.is_active());
        sm.record_error();
        assert!(sm.is_active());
        assert!(sm.reason().unwrap().contains("server errors"));
    }

    #[test]
    fn old_errors_fall_out_of_window() {
        let sm = SafeMode::with_limits(3, Duration::from_secs(60));
        let start = Instant::now();
        sm.record_error_at(start);
        sm.record_error_at(start + Duration::from_secs(10));
        sm.record_error_at(start + Duration::from_secs(120));
        assert!(!sm.is_active());
        sm.record_error_at(start + Duration::from_secs(121));
        sm.record_error_at(start + Duration::from_secs(122));
        assert!(sm.is_active());
    }
}
