//! Attempt timing
//!
//! Durations come from the tokio clock so paused-time tests stay exact;
//! record timestamps come from the wall clock.

use tokio::time::Instant;

/// Monotonic stopwatch for a single attempt
#[derive(Debug, Clone, Copy)]
pub struct AttemptClock {
    start: Instant,
}

impl AttemptClock {
    /// Start timing now
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the clock started
    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall-clock time in milliseconds since the Unix epoch
pub fn wall_clock_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_tracks_tokio_clock() {
        let clock = AttemptClock::start();
        tokio::time::sleep(Duration::from_millis(250)).await;
        let elapsed = clock.elapsed_ms();
        assert!((250..260).contains(&elapsed), "elapsed {}ms", elapsed);
    }

    #[test]
    fn test_wall_clock_is_after_2020() {
        assert!(wall_clock_ms() > 1_577_836_800_000);
    }
}
