//! Random variance for clicks

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::StealthConfig;
use crate::vision::Point;

/// Humanizer for jittering click positions and delays
pub struct Humanizer {
    rng: StdRng,
    config: StealthConfig,
}

impl Humanizer {
    /// Create a new humanizer seeded from the OS
    pub fn new(config: StealthConfig) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            config,
        }
    }

    /// Create a humanizer with a fixed seed
    pub fn seeded(config: StealthConfig, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    /// Replace the active configuration
    pub fn set_config(&mut self, config: StealthConfig) {
        self.config = config;
    }

    /// Humanize a click position with a small offset
    pub fn point(&mut self, point: Point) -> Point {
        if !self.config.humanize_position || self.config.position_offset_max <= 0 {
            return point;
        }

        let max_offset = self.config.position_offset_max;
        point.offset(self.gaussian_offset(max_offset), self.gaussian_offset(max_offset))
    }

    /// Humanize a delay with variance
    pub fn delay(&mut self, base: Duration) -> Duration {
        let variance_percent = self.config.timing_variance_percent.min(100);
        if !self.config.humanize_timing || variance_percent == 0 || base.is_zero() {
            return base;
        }

        let base_ms = base.as_millis() as i64;
        let variance = base_ms * i64::from(variance_percent) / 100;
        let offset = self.rng.gen_range(-variance..=variance);

        Duration::from_millis((base_ms + offset).max(0) as u64)
    }

    /// Generate gaussian-distributed offset
    fn gaussian_offset(&mut self, max_offset: i32) -> i32 {
        // Simple approximation using sum of uniform randoms
        let sum: f32 = (0..3).map(|_| self.rng.gen::<f32>() - 0.5).sum();

        (sum * max_offset as f32 * 0.67) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_offset_bounded() {
        let mut humanizer = Humanizer::seeded(StealthConfig::default(), 7);
        let target = Point::new(500, 300);

        for _ in 0..200 {
            let p = humanizer.point(target);
            assert!((p.x - target.x).abs() <= 2);
            assert!((p.y - target.y).abs() <= 2);
        }
    }

    #[test]
    fn test_delay_variance() {
        let config = StealthConfig {
            timing_variance_percent: 30,
            ..StealthConfig::default()
        };
        let mut humanizer = Humanizer::seeded(config, 42);
        let base = Duration::from_millis(500);

        let mut min_seen = base;
        let mut max_seen = base;
        for _ in 0..1000 {
            let delay = humanizer.delay(base);
            min_seen = min_seen.min(delay);
            max_seen = max_seen.max(delay);
        }

        assert!(min_seen < base && min_seen >= Duration::from_millis(350));
        assert!(max_seen > base && max_seen <= Duration::from_millis(650));
    }

    #[test]
    fn test_disabled_is_identity() {
        let mut humanizer = Humanizer::seeded(StealthConfig::disabled(), 1);

        for _ in 0..10 {
            assert_eq!(humanizer.delay(Duration::from_millis(500)), Duration::from_millis(500));
            assert_eq!(humanizer.point(Point::new(3, 4)), Point::new(3, 4));
        }
    }
}
