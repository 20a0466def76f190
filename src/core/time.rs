//! Host clock and frame timing utilities

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Read-only view of the host application's clock.
///
/// `time` is scaled game time and stops advancing while the time scale is 0;
/// `realtime` always tracks unscaled time since startup.
pub trait HostClock: Send + Sync {
    /// Scaled time since startup
    fn time(&self) -> Duration;

    /// Unscaled time since startup
    fn realtime(&self) -> Duration;

    /// Current time scale (1.0 = normal speed, 0.0 = paused)
    fn time_scale(&self) -> f32;

    /// Whether scaled time is currently frozen
    fn is_paused(&self) -> bool {
        self.time_scale() == 0.0
    }
}

struct ClockState {
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
    time: Duration,
    realtime: Duration,
    time_scale: f32,
}

/// Frame-driven host clock.
///
/// Call [`FrameClock::tick`] once per frame from the host loop, or
/// [`FrameClock::advance`] to step it by a fixed amount.
pub struct FrameClock {
    state: Mutex<ClockState>,
}

impl FrameClock {
    /// Create a new clock at time zero with a scale of 1.0
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                last_frame: Instant::now(),
                delta: Duration::ZERO,
                frame_count: 0,
                time: Duration::ZERO,
                realtime: Duration::ZERO,
                time_scale: 1.0,
            }),
        }
    }

    /// Call once per frame to update timing
    pub fn tick(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let delta = now - state.last_frame;
        state.last_frame = now;
        Self::step(&mut state, delta);
    }

    /// Advance the clock by a fixed unscaled delta
    pub fn advance(&self, delta: Duration) {
        let mut state = self.state.lock();
        state.last_frame = Instant::now();
        Self::step(&mut state, delta);
    }

    fn step(state: &mut ClockState, delta: Duration) {
        state.delta = delta;
        state.frame_count += 1;
        state.realtime += delta;
        state.time += delta.mul_f32(state.time_scale);
    }

    /// Set the time scale. Negative values clamp to 0.
    pub fn set_time_scale(&self, scale: f32) {
        self.state.lock().time_scale = if scale.is_finite() { scale.max(0.0) } else { 0.0 };
    }

    /// Get the unscaled delta of the last frame
    pub fn delta(&self) -> Duration {
        self.state.lock().delta
    }

    /// Get the last frame's delta in seconds
    pub fn delta_secs(&self) -> f32 {
        self.delta().as_secs_f32()
    }

    /// Get total frame count
    pub fn frame_count(&self) -> u64 {
        self.state.lock().frame_count
    }
}

impl HostClock for FrameClock {
    fn time(&self) -> Duration {
        self.state.lock().time
    }

    fn realtime(&self) -> Duration {
        self.state.lock().realtime
    }

    fn time_scale(&self) -> f32 {
        self.state.lock().time_scale
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert float seconds to a `Duration` without panicking.
///
/// Negative and NaN inputs become zero; values too large to represent
/// saturate at `Duration::MAX`.
pub fn duration_from_secs(secs: f32) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f32(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_scales_game_time() {
        let clock = FrameClock::new();
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.time(), Duration::from_secs(2));
        assert_eq!(clock.realtime(), Duration::from_secs(2));

        clock.set_time_scale(0.5);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.time(), Duration::from_secs(3));
        assert_eq!(clock.realtime(), Duration::from_secs(4));
        assert_eq!(clock.frame_count(), 2);
    }

    #[test]
    fn test_paused_clock_freezes_game_time() {
        let clock = FrameClock::new();
        clock.set_time_scale(0.0);
        assert!(clock.is_paused());

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.time(), Duration::ZERO);
        assert_eq!(clock.realtime(), Duration::from_secs(5));
    }

    #[test]
    fn test_negative_scale_clamps() {
        let clock = FrameClock::new();
        clock.set_time_scale(-3.0);
        assert_eq!(clock.time_scale(), 0.0);
    }

    #[test]
    fn test_tick_records_delta() {
        let clock = FrameClock::new();
        std::thread::sleep(Duration::from_millis(5));
        clock.tick();
        assert!(clock.delta() >= Duration::from_millis(5));
        assert_eq!(clock.frame_count(), 1);
        assert!(clock.realtime() >= Duration::from_millis(5));
    }

    #[test]
    fn test_duration_from_secs_saturates() {
        assert_eq!(duration_from_secs(1.5), Duration::from_millis(1500));
        assert_eq!(duration_from_secs(-0.5), Duration::ZERO);
        assert_eq!(duration_from_secs(f32::NAN), Duration::ZERO);
        assert_eq!(duration_from_secs(f32::NEG_INFINITY), Duration::ZERO);
        assert_eq!(duration_from_secs(f32::INFINITY), Duration::MAX);
        assert_eq!(duration_from_secs(1e30), Duration::MAX);
    }
}
