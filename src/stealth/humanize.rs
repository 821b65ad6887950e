//! Human behavior simulation for synthetic input
//!
//! Adds realistic variance to clicks, drags and the pauses between them.

use std::time::Duration;

use rand::Rng;

/// Pre-click reaction time range in milliseconds
const MIN_REACTION_TIME_MS: u64 = 120;
const MAX_REACTION_TIME_MS: u64 = 220;

/// Settle time right before the press
const MIN_SETTLE_TIME_MS: u64 = 30;
const MAX_SETTLE_TIME_MS: u64 = 80;

/// Pointer travel time before a press
const MIN_TRAVEL_TIME_MS: u64 = 50;
const MAX_TRAVEL_TIME_MS: u64 = 100;

/// Gap between repeated clicks
const MIN_MULTI_CLICK_GAP_MS: u64 = 50;

/// Humanizer for generating realistic timing and positions
pub struct Humanizer {
    rng: rand::rngs::ThreadRng,
}

impl Default for Humanizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Humanizer {
    /// Create a new humanizer
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Reaction plus settle delay before a click
    pub fn pre_click_delay(&mut self) -> Duration {
        let reaction = self
            .rng
            .gen_range(MIN_REACTION_TIME_MS..=MAX_REACTION_TIME_MS);
        let settle = self.rng.gen_range(MIN_SETTLE_TIME_MS..=MAX_SETTLE_TIME_MS);
        Duration::from_millis(reaction + settle)
    }

    /// Pointer travel time for an organic move
    pub fn travel_time(&mut self) -> Duration {
        self.uniform_ms((MIN_TRAVEL_TIME_MS, MAX_TRAVEL_TIME_MS))
    }

    /// Gap between repeated clicks, never shorter than 50ms
    pub fn multi_click_gap(&mut self, base: Duration) -> Duration {
        base.max(Duration::from_millis(MIN_MULTI_CLICK_GAP_MS))
    }

    /// Uniform duration within an inclusive millisecond range
    pub fn uniform_ms(&mut self, range: (u64, u64)) -> Duration {
        let (lo, hi) = (range.0.min(range.1), range.0.max(range.1));
        if lo == hi {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(self.rng.gen_range(lo..=hi))
    }

    /// Uniform integer offset in `[-max_px, max_px]`
    pub fn jitter(&mut self, max_px: i32) -> i32 {
        if max_px <= 0 {
            return 0;
        }
        self.rng.gen_range(-max_px..=max_px)
    }

    /// Apply independent jitter to both axes
    pub fn jitter_point(&mut self, x: i32, y: i32, max_px: i32) -> (i32, i32) {
        (x + self.jitter(max_px), y + self.jitter(max_px))
    }

    /// Humanize tap position with slight offset
    /// Returns (offset_x, offset_y) to add to the target position
    pub fn humanize_position(&mut self, max_offset: i32) -> (i32, i32) {
        if max_offset == 0 {
            return (0, 0);
        }

        let offset_x = self.gaussian_offset(max_offset);
        let offset_y = self.gaussian_offset(max_offset);

        (offset_x, offset_y)
    }

    /// Generate gaussian-distributed offset
    fn gaussian_offset(&mut self, max_offset: i32) -> i32 {
        // Simple approximation using sum of uniform randoms
        let sum: f32 = (0..3).map(|_| self.rng.gen::<f32>() - 0.5).sum();

        (sum * max_offset as f32 * 0.67) as i32
    }
}

/// Ease-in-out interpolation parameter
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Intermediate points of an eased move from `from` to `to`, excluding the
/// start and including the end.
pub fn eased_path(from: (i32, i32), to: (i32, i32), steps: u32) -> Vec<(i32, i32)> {
    let steps = steps.max(1);
    (1..=steps)
        .map(|i| {
            let t = smoothstep(i as f32 / steps as f32);
            let x = from.0 as f32 + (to.0 - from.0) as f32 * t;
            let y = from.1 as f32 + (to.1 - from.1) as f32 * t;
            (x.round() as i32, y.round() as i32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_click_delay_range() {
        let mut humanizer = Humanizer::new();

        for _ in 0..100 {
            let delay = humanizer.pre_click_delay().as_millis() as u64;
            assert!(delay >= MIN_REACTION_TIME_MS + MIN_SETTLE_TIME_MS);
            assert!(delay <= MAX_REACTION_TIME_MS + MAX_SETTLE_TIME_MS);
        }
    }

    #[test]
    fn test_jitter_bounded() {
        let mut humanizer = Humanizer::new();

        for _ in 0..200 {
            let j = humanizer.jitter(6);
            assert!((-6..=6).contains(&j));
        }
        assert_eq!(humanizer.jitter(0), 0);
        assert_eq!(humanizer.jitter(-3), 0);
    }

    #[test]
    fn test_humanizer_position() {
        let mut humanizer = Humanizer::new();

        for _ in 0..100 {
            let (x, y) = humanizer.humanize_position(10);
            assert!((-10..=10).contains(&x));
            assert!((-10..=10).contains(&y));
        }
    }

    #[test]
    fn test_uniform_ms_handles_degenerate_ranges() {
        let mut humanizer = Humanizer::new();
        assert_eq!(humanizer.uniform_ms((0, 0)), Duration::ZERO);
        for _ in 0..50 {
            let d = humanizer.uniform_ms((260, 160)).as_millis();
            assert!((160..=260).contains(&d));
        }
    }

    #[test]
    fn test_multi_click_gap_floor() {
        let mut humanizer = Humanizer::new();
        assert_eq!(
            humanizer.multi_click_gap(Duration::from_millis(10)),
            Duration::from_millis(50)
        );
        assert_eq!(
            humanizer.multi_click_gap(Duration::from_millis(150)),
            Duration::from_millis(150)
        );
    }

    #[test]
    fn test_eased_path_ends_on_target() {
        let path = eased_path((0, 100), (0, 0), 8);
        assert_eq!(path.len(), 8);
        assert_eq!(*path.last().unwrap(), (0, 0));
        // monotonic towards the target
        for pair in path.windows(2) {
            assert!(pair[1].1 <= pair[0].1);
        }
    }

    #[test]
    fn test_smoothstep_endpoints() {
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(1.0), 1.0);
        assert!((smoothstep(0.5) - 0.5).abs() < 1e-6);
    }
}
