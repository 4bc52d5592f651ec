//! Simulated time-of-day and outdoor temperature.

use std::time::Duration;

use serde::Serialize;

use super::types::serialize_secs;

/// Lowest accepted temperature (°F).
pub const MIN_TEMPERATURE_F: f64 = 10.0;
/// Highest accepted temperature (°F).
pub const MAX_TEMPERATURE_F: f64 = 120.0;

const SECONDS_PER_DAY: u64 = 24 * 3600;

/// Time-of-day and temperature state container.
///
/// Plain state: it has no knowledge of scenario locks. Mutation from the
/// outside goes through [`crate::sim::arbiter::ScenarioArbiter`], which owns
/// the only instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeWeather {
    /// Position within the simulated day, always `< 24h`.
    #[serde(rename = "time_of_day_s", serialize_with = "serialize_secs")]
    time_of_day: Duration,
    /// Outdoor temperature (°F), within `[MIN_TEMPERATURE_F, MAX_TEMPERATURE_F]`.
    temperature_f: f64,
}

impl TimeWeather {
    /// Creates the context at the start of `hour` with the given temperature.
    ///
    /// Both inputs are clamped to their valid ranges.
    pub fn new(hour: i64, temperature_f: f64) -> Self {
        let mut tw = Self {
            time_of_day: Duration::ZERO,
            temperature_f: 70.0,
        };
        tw.set_hour(hour);
        tw.set_temperature_f(temperature_f);
        tw
    }

    /// Integer hour of day in `[0, 23]`.
    pub fn hour(&self) -> u8 {
        (self.time_of_day.as_secs() / 3600) as u8
    }

    /// Hour of day including the fractional part, in `[0.0, 24.0)`.
    pub fn fractional_hour(&self) -> f64 {
        self.time_of_day.as_secs_f64() / 3600.0
    }

    /// Current outdoor temperature (°F).
    pub fn temperature_f(&self) -> f64 {
        self.temperature_f
    }

    /// Moves the time of day to the start of `hour`, clamped to `[0, 23]`.
    pub fn set_hour(&mut self, hour: i64) {
        let hour = hour.clamp(0, 23) as u64;
        self.time_of_day = Duration::from_secs(hour * 3600);
    }

    /// Sets the temperature, clamped to the valid range.
    ///
    /// NaN leaves the temperature unchanged; infinities clamp like any other value.
    pub fn set_temperature_f(&mut self, temperature_f: f64) {
        if temperature_f.is_nan() {
            return;
        }
        self.temperature_f = temperature_f.clamp(MIN_TEMPERATURE_F, MAX_TEMPERATURE_F);
    }

    /// Advances the time of day by `elapsed`, wrapping at midnight.
    pub fn advance(&mut self, elapsed: Duration) {
        let day = Duration::from_secs(SECONDS_PER_DAY);
        let next = self.time_of_day + elapsed;
        self.time_of_day = Duration::from_nanos((next.as_nanos() % day.as_nanos()) as u64);
    }
}
