//! Log throttling for backend errors.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{trace, warn};

use crate::texture::BackendError;

/// Default number of backend errors logged per session.
pub const DEFAULT_MAX_BACKEND_ERRORS: u32 = 20;

/// Counts backend errors and stops logging them after a threshold.
#[derive(Debug)]
pub struct ErrorThrottle {
    max: u32,
    count: AtomicU32,
}

impl Default for ErrorThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BACKEND_ERRORS)
    }
}

impl ErrorThrottle {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            count: AtomicU32::new(0),
        }
    }

    /// Record an error. Returns true when it was logged.
    pub fn report(&self, source: &str, error: &BackendError) -> bool {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if n < self.max {
            warn!(source, error = %error, count = n, "Render backend error");
            true
        } else if n == self.max {
            warn!(
                source,
                error = %error,
                count = n,
                "Render backend error limit reached, suppressing further messages"
            );
            true
        } else {
            trace!(source, error = %error, count = n, "Suppressed render backend error");
            false
        }
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_until_limit() {
        let throttle = ErrorThrottle::new(3);
        let err = BackendError::Draw("lost context".to_string());

        assert!(throttle.report("step", &err));
        assert!(throttle.report("step", &err));
        assert!(throttle.report("step", &err));
        assert!(!throttle.report("step", &err));
        assert_eq!(throttle.count(), 4);
    }

    #[test]
    fn test_reset_resumes_logging() {
        let throttle = ErrorThrottle::new(1);
        let err = BackendError::Draw("x".to_string());
        throttle.report("a", &err);
        assert!(!throttle.report("a", &err));

        throttle.reset();
        assert!(throttle.report("a", &err));
    }
}
