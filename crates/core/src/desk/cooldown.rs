use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::platform::UserId;

const PRUNE_THRESHOLD: usize = 1_024;

/// Per-user debounce for the "open a ticket" entry point.
///
/// A suppressed request does not extend the window; only accepted requests
/// record a timestamp.
#[derive(Debug)]
pub struct CooldownTracker {
    window: Duration,
    last_accepted: Mutex<HashMap<UserId, Instant>>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self { window, last_accepted: Mutex::new(HashMap::new()) }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` when the request may proceed.
    pub fn try_acquire(&self, user_id: &UserId, now: Instant) -> bool {
        let mut last_accepted = match self.last_accepted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(previous) = last_accepted.get(user_id) {
            if now.saturating_duration_since(*previous) < self.window {
                return false;
            }
        }

        if last_accepted.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            last_accepted.retain(|_, seen| now.saturating_duration_since(*seen) < window);
        }

        last_accepted.insert(user_id.clone(), now);
        true
    }

    pub fn tracked_users(&self) -> usize {
        match self.last_accepted.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::CooldownTracker;
    use crate::domain::platform::UserId;

    #[test]
    fn repeated_requests_inside_window_are_suppressed() {
        let tracker = CooldownTracker::new(Duration::from_secs(20));
        let user = UserId("U-1".to_owned());
        let start = Instant::now();

        assert!(tracker.try_acquire(&user, start));
        assert!(!tracker.try_acquire(&user, start + Duration::from_secs(1)));
        assert!(!tracker.try_acquire(&user, start + Duration::from_secs(19)));
        assert!(tracker.try_acquire(&user, start + Duration::from_secs(20)));
    }

    #[test]
    fn suppressed_requests_do_not_extend_the_window() {
        let tracker = CooldownTracker::new(Duration::from_secs(20));
        let user = UserId("U-1".to_owned());
        let start = Instant::now();

        assert!(tracker.try_acquire(&user, start));
        assert!(!tracker.try_acquire(&user, start + Duration::from_secs(15)));
        assert!(tracker.try_acquire(&user, start + Duration::from_secs(21)));
    }

    #[test]
    fn users_are_tracked_independently() {
        let tracker = CooldownTracker::new(Duration::from_secs(20));
        let start = Instant::now();

        assert!(tracker.try_acquire(&UserId("U-1".to_owned()), start));
        assert!(tracker.try_acquire(&UserId("U-2".to_owned()), start));
        assert_eq!(tracker.tracked_users(), 2);
    }

    #[test]
    fn expired_entries_are_pruned_once_the_map_grows() {
        let tracker = CooldownTracker::new(Duration::from_secs(1));
        let start = Instant::now();
        for index in 0..super::PRUNE_THRESHOLD {
            assert!(tracker.try_acquire(&UserId(format!("U-{index}")), start));
        }

        assert!(tracker.try_acquire(&UserId("U-late".to_owned()), start + Duration::from_secs(5)));
        assert_eq!(tracker.tracked_users(), 1);
    }
}
