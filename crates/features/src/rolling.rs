//! Rolling mean and standard deviation over a fixed-size window.
//!
//! Sliding-window Welford update: each push is O(1), and the accumulator is
//! rebuilt from the raw window every `window` evictions so rounding drift
//! cannot accumulate.

use std::collections::VecDeque;

/// Relative tolerance below which the window standard deviation counts as zero.
const ZERO_STD_TOLERANCE: f64 = 1e-9;

/// Sliding-window mean / sample variance accumulator.
#[derive(Debug, Clone)]
pub struct RollingStat {
    /// Window size in observations.
    window: usize,
    /// Observations currently in the window.
    values: VecDeque<f64>,
    /// Running mean.
    mean: f64,
    /// Running sum of squared deviations from the mean.
    m2: f64,
    /// Evictions since the last rebuild.
    evictions: usize,
}

impl RollingStat {
    /// Create a new accumulator.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            values: VecDeque::with_capacity(window.max(1)),
            mean: 0.0,
            m2: 0.0,
            evictions: 0,
        }
    }

    /// Add an observation, evicting the oldest once the window is full.
    pub fn push(&mut self, x: f64) {
        if self.values.len() < self.window {
            self.values.push_back(x);
            let n = self.values.len() as f64;
            let delta = x - self.mean;
            self.mean += delta / n;
            self.m2 += delta * (x - self.mean);
        } else if let Some(old) = self.values.pop_front() {
            self.values.push_back(x);
            let n = self.window as f64;
            let prev_mean = self.mean;
            self.mean = prev_mean + (x - old) / n;
            self.m2 += (x - old) * (x - self.mean + old - prev_mean);

            self.evictions += 1;
            if self.evictions >= self.window {
                self.rebuild();
            }
        }

        if self.m2 < 0.0 {
            self.m2 = 0.0;
        }
    }

    /// Recompute mean and m2 from the raw window (two-pass).
    fn rebuild(&mut self) {
        self.evictions = 0;
        let n = self.values.len();
        if n == 0 {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let mean = self.values.iter().sum::<f64>() / n as f64;
        self.m2 = self.values.iter().map(|v| (v - mean).powi(2)).sum();
        self.mean = mean;
    }

    /// Current mean, if any observations.
    pub fn mean(&self) -> Option<f64> {
        (!self.values.is_empty()).then_some(self.mean)
    }

    /// Sample variance (n - 1 denominator), if at least two observations.
    pub fn variance(&self) -> Option<f64> {
        let n = self.values.len();
        if n < 2 {
            return None;
        }
        Some(self.m2 / (n - 1) as f64)
    }

    /// Sample standard deviation.
    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Z-score of `x` against the window.
    ///
    /// `None` until the window is full, or when its standard deviation is zero
    /// relative to the magnitude of the mean.
    pub fn zscore(&self, x: f64) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }
        let std = self.std_dev()?;
        if std <= ZERO_STD_TOLERANCE * self.mean.abs().max(1.0) {
            return None;
        }
        Some((x - self.mean) / std)
    }

    /// Check if the window is full.
    pub fn is_ready(&self) -> bool {
        self.values.len() >= self.window
    }

    /// Get the number of observations.
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Window size.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Clear all data.
    pub fn clear(&mut self) {
        self.values.clear();
        self.mean = 0.0;
        self.m2 = 0.0;
        self.evictions = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use statrs::statistics::Statistics;

    #[test]
    fn test_not_ready() {
        let mut stat = RollingStat::new(3);
        assert!(stat.mean().is_none());
        stat.push(1.0);
        stat.push(2.0);
        assert!(!stat.is_ready());
        assert!(stat.zscore(5.0).is_none());
        assert!(stat.variance().is_some());
    }

    #[test]
    fn test_known_values() {
        let mut stat = RollingStat::new(4);
        for x in [2.0, 4.0, 4.0, 6.0] {
            stat.push(x);
        }
        // mean 4, squared deviations 4 + 0 + 0 + 4 = 8, sample var 8 / 3
        assert_relative_eq!(stat.mean().unwrap(), 4.0);
        assert_relative_eq!(stat.variance().unwrap(), 8.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(stat.zscore(6.0).unwrap(), 2.0 / (8.0_f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_rolling_window() {
        let mut stat = RollingStat::new(3);
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stat.push(x);
        }
        assert_eq!(stat.count(), 3);
        // Window is now [3, 4, 5]
        assert_relative_eq!(stat.mean().unwrap(), 4.0, epsilon = 1e-12);
        assert_relative_eq!(stat.variance().unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_window_has_no_zscore() {
        let mut stat = RollingStat::new(5);
        for _ in 0..20 {
            stat.push(10.0);
        }
        assert!(stat.is_ready());
        assert_relative_eq!(stat.variance().unwrap(), 0.0);
        assert!(stat.zscore(1000.0).is_none());
    }

    #[test]
    fn test_matches_raw_window_statistics() {
        let window = 50;
        let mut stat = RollingStat::new(window);
        let mut all = Vec::new();

        // Deterministic pseudo-random walk around a large offset
        let mut state: u64 = 42;
        let mut level = 2000.0;
        for _ in 0..1000 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let step = ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5;
            level += step;
            stat.push(level);
            all.push(level);

            if all.len() >= window {
                let raw = &all[all.len() - window..];
                let mean = raw.iter().copied().mean();
                let std = raw.iter().copied().std_dev();
                assert_relative_eq!(stat.mean().unwrap(), mean, epsilon = 1e-8);
                assert_relative_eq!(stat.std_dev().unwrap(), std, epsilon = 1e-8);
                assert_relative_eq!(stat.zscore(level).unwrap(), (level - mean) / std, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_clear() {
        let mut stat = RollingStat::new(2);
        stat.push(1.0);
        stat.push(3.0);
        stat.clear();
        assert_eq!(stat.count(), 0);
        assert!(stat.mean().is_none());
    }
}
