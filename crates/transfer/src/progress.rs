//! Upload throughput over a sliding time window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default span of the throughput window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

const MAX_SAMPLES: usize = 64;

/// Rate of acknowledged chunk bytes over the last few seconds.
///
/// Owned by a session and only touched under the session registry lock,
/// so it has no interior locking.
#[derive(Debug, Clone)]
pub struct SpeedCalculator {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl SpeedCalculator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Records `bytes` acknowledged now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    /// Records `bytes` acknowledged at `at`. Samples older than the window,
    /// measured from `at`, are dropped.
    pub fn record_at(&mut self, at: Instant, bytes: u64) {
        self.samples.push_back((at, bytes));
        while let Some(&(t, _)) = self.samples.front() {
            if at.saturating_duration_since(t) <= self.window {
                break;
            }
            self.samples.pop_front();
        }
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    /// Bytes per second between the oldest and newest sample.
    ///
    /// The oldest sample only opens the interval, so its bytes are not
    /// counted. Zero until two samples at distinct instants exist.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(&(start, _)), Some(&(end, _))) = (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = end.saturating_duration_since(start);
        if elapsed.is_zero() {
            return 0.0;
        }
        let bytes: u64 = self.samples.iter().skip(1).map(|&(_, b)| b).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Time left for `remaining` bytes at the current rate; `None` while the
    /// rate is unknown.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        let rate = self.bytes_per_second();
        (rate > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn unknown_rate_without_two_samples() {
        let mut calc = SpeedCalculator::default();
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());

        calc.record(4096);
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert_eq!(calc.eta(0), Some(Duration::ZERO));
    }

    #[test]
    fn rate_excludes_opening_sample() {
        let t0 = Instant::now();
        let mut calc = SpeedCalculator::default();
        calc.record_at(t0, 1_000_000);
        calc.record_at(t0 + ms(500), 1000);
        calc.record_at(t0 + ms(1000), 1000);

        assert_eq!(calc.bytes_per_second(), 2000.0);
        assert_eq!(calc.eta(4000), Some(Duration::from_secs(2)));
    }

    #[test]
    fn old_samples_leave_the_window() {
        let t0 = Instant::now();
        let mut calc = SpeedCalculator::new(Duration::from_secs(1));
        calc.record_at(t0, 100);
        calc.record_at(t0 + ms(200), 100);
        calc.record_at(t0 + ms(2000), 500);
        calc.record_at(t0 + ms(2500), 500);

        // Only the last two samples remain.
        assert_eq!(calc.bytes_per_second(), 1000.0);
    }

    #[test]
    fn sample_count_is_bounded() {
        let t0 = Instant::now();
        let mut calc = SpeedCalculator::new(Duration::from_secs(60));
        for i in 0..(MAX_SAMPLES as u64 * 2) {
            calc.record_at(t0 + ms(i), 10);
        }
        assert_eq!(calc.samples.len(), MAX_SAMPLES);
    }

    #[test]
    fn same_instant_has_no_rate() {
        let t0 = Instant::now();
        let mut calc = SpeedCalculator::default();
        calc.record_at(t0, 10);
        calc.record_at(t0, 10);
        assert_eq!(calc.bytes_per_second(), 0.0);

        calc.clear();
        assert!(calc.eta(10).is_none());
    }
}
