use std::time::Duration;

use crate::config::SyncSettings;

/// Decides how long to wait between polls.  Each consecutive failure doubles the wait, up to a
/// ceiling; no wait is ever shorter than the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    interval: Duration,
    floor: Duration,
    ceiling: Duration,
}

impl Backoff {
    pub fn new(interval: Duration, floor: Duration, ceiling: Duration) -> Self {
        Self {
            interval,
            floor,
            ceiling: ceiling.max(floor),
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.poll_interval_secs),
            Duration::from_secs(settings.min_delay_secs),
            Duration::from_secs(settings.max_delay_secs),
        )
    }

    /// The shortest wait between any two polls.
    pub fn floor(&self) -> Duration {
        self.floor
    }

    /// The wait before the next poll, after `failures` consecutive failed polls.
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
        self.interval
            .checked_mul(factor)
            .unwrap_or(self.ceiling)
            .clamp(self.floor, self.ceiling)
    }
}
