use std::collections::VecDeque;

/// Sliding-window limiter for automatic connection attempts.
#[derive(Debug, Clone)]
pub struct AttemptLimiter {
    window_ms: u64,
    max_attempts: usize,
    attempts: VecDeque<u64>,
}

impl AttemptLimiter {
    pub fn new(window_ms: u64, max_attempts: usize) -> Self {
        Self {
            window_ms,
            max_attempts,
            attempts: VecDeque::new(),
        }
    }

    /// Evicts attempts older than the window and reports whether the limit
    /// is reached.
    pub fn should_skip(&mut self, now_ms: u64) -> bool {
        self.evict(now_ms);
        self.attempts.len() >= self.max_attempts
    }

    /// Records an attempt, evicting entries that left the window.
    pub fn note_attempt(&mut self, now_ms: u64) {
        self.evict(now_ms);
        self.attempts.push_back(now_ms);
    }

    fn evict(&mut self, now_ms: u64) {
        while let Some(&oldest) = self.attempts.front() {
            if now_ms.saturating_sub(oldest) > self.window_ms {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }

    /// Forgets the history; used after user or app initiated actions.
    pub fn clear(&mut self) {
        self.attempts.clear();
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_at_limit_until_window_rolls() {
        let mut limiter = AttemptLimiter::new(240_000, 6);
        for i in 0..6 {
            assert!(!limiter.should_skip(i * 1000));
            limiter.note_attempt(i * 1000);
        }
        assert!(limiter.should_skip(10_000));
        // The first attempt leaves the window.
        assert!(!limiter.should_skip(240_001));
        assert_eq!(limiter.len(), 5);
    }

    #[test]
    fn noting_attempts_drops_expired_history() {
        let mut limiter = AttemptLimiter::new(1000, 3);
        for now in [0, 100, 200, 5_000, 10_000] {
            limiter.note_attempt(now);
        }
        assert_eq!(limiter.len(), 1);
        limiter.note_attempt(10_500);
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn clear_resets_history() {
        let mut limiter = AttemptLimiter::new(1000, 1);
        limiter.note_attempt(0);
        assert!(limiter.should_skip(10));
        limiter.clear();
        assert!(!limiter.should_skip(10));
    }
}
