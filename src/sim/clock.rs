//! Fixed-step logical clock for simulated time.

use std::time::Duration;

/// A logical simulation clock that advances in fixed ticks.
///
/// Simulated time is a [`Duration`] since simulation start. Deadlines
/// elsewhere in the engine are absolute values on this clock, so failure
/// detection never depends on wall-clock timers.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use grid_sim::sim::clock::SimClock;
///
/// let mut clock = SimClock::new(Duration::from_secs(1));
/// let seen: Vec<(u64, u64)> = (0..3)
///     .map(|_| clock.advance())
///     .map(|(tick, now)| (tick, now.as_secs()))
///     .collect();
/// assert_eq!(seen, vec![(1, 1), (2, 2), (3, 3)]);
/// ```
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Number of ticks completed so far.
    ticks: u64,
    /// Simulated time elapsed since start.
    now: Duration,
    /// Simulated duration of one tick.
    tick: Duration,
}

impl SimClock {
    /// Creates a clock at time zero.
    ///
    /// # Arguments
    ///
    /// * `tick` - Simulated duration of one tick
    ///
    /// # Panics
    ///
    /// Panics if `tick` is zero.
    pub fn new(tick: Duration) -> Self {
        assert!(!tick.is_zero(), "tick duration must be > 0");
        Self {
            ticks: 0,
            now: Duration::ZERO,
            tick,
        }
    }

    /// Advances the clock by one tick.
    ///
    /// # Returns
    ///
    /// The tick number (starting from 1) and the simulated time after advancing.
    pub fn advance(&mut self) -> (u64, Duration) {
        self.ticks += 1;
        self.now += self.tick;
        (self.ticks, self.now)
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated duration of one tick.
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Tick duration in hours, for energy integration.
    pub fn tick_hours(&self) -> f64 {
        self.tick.as_secs_f64() / 3600.0
    }
}
