//! Substation demand from time of day, temperature, and EV charging.

use serde::{Deserialize, Serialize};

use super::substation::Substation;

/// Customer mix of a substation's service area, selecting its daily curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadProfile {
    Commercial,
    Residential,
    Mixed,
    Industrial,
}

// Hourly anchors as fractions of peak baseline demand, index = hour of day.
const COMMERCIAL_CURVE: [f64; 24] = [
    0.45, 0.43, 0.42, 0.42, 0.43, 0.48, 0.58, 0.72, 0.86, 0.94, 0.97, 0.99, //
    1.00, 1.00, 0.99, 0.98, 0.95, 0.88, 0.78, 0.70, 0.63, 0.57, 0.52, 0.48,
];
const RESIDENTIAL_CURVE: [f64; 24] = [
    0.55, 0.50, 0.47, 0.45, 0.45, 0.50, 0.62, 0.74, 0.72, 0.64, 0.60, 0.60, //
    0.62, 0.63, 0.65, 0.70, 0.78, 0.88, 0.96, 1.00, 0.98, 0.90, 0.78, 0.65,
];
const MIXED_CURVE: [f64; 24] = [
    0.500, 0.465, 0.445, 0.435, 0.440, 0.490, 0.600, 0.730, 0.790, 0.790, 0.785, 0.795, //
    0.810, 0.815, 0.820, 0.840, 0.865, 0.880, 0.870, 0.850, 0.805, 0.735, 0.650, 0.565,
];
const INDUSTRIAL_CURVE: [f64; 24] = [
    0.70, 0.68, 0.68, 0.68, 0.70, 0.75, 0.85, 0.92, 0.96, 0.98, 1.00, 1.00, //
    0.98, 0.99, 1.00, 0.98, 0.95, 0.90, 0.82, 0.78, 0.75, 0.73, 0.72, 0.71,
];

impl LoadProfile {
    fn curve(&self) -> &'static [f64; 24] {
        match self {
            Self::Commercial => &COMMERCIAL_CURVE,
            Self::Residential => &RESIDENTIAL_CURVE,
            Self::Mixed => &MIXED_CURVE,
            Self::Industrial => &INDUSTRIAL_CURVE,
        }
    }

    /// Fraction of peak baseline demand at `hour`, linearly interpolated
    /// between hourly anchors and wrapping from 23:00 back to 00:00.
    pub fn factor_at(&self, hour: f64) -> f64 {
        let curve = self.curve();
        let h = hour.rem_euclid(24.0);
        let i = h.floor() as usize % 24;
        let j = (i + 1) % 24;
        let frac = h - h.floor();
        curve[i] + (curve[j] - curve[i]) * frac
    }
}

/// Temperature and EV-charging coefficients of the load model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadParams {
    /// Temperature with no HVAC load (°F).
    pub comfort_f: f64,
    /// Cooling load per °F above comfort, as a fraction of base demand.
    pub cooling_slope: f64,
    /// Temperature where HVAC saturation makes the cooling term convex (°F).
    pub knee_f: f64,
    /// Quadratic coefficient applied above the knee (per °F²).
    pub knee_curvature: f64,
    /// Temperature below which heating load appears (°F).
    pub heating_threshold_f: f64,
    /// Heating load per °F below the threshold, as a fraction of base demand.
    pub heating_slope: f64,
    /// Average charging power of one actively charging vehicle (kW).
    pub ev_charge_kw: f64,
}

impl Default for LoadParams {
    fn default() -> Self {
        Self {
            comfort_f: 65.0,
            cooling_slope: 0.008,
            knee_f: 90.0,
            knee_curvature: 0.004,
            heating_threshold_f: 50.0,
            heating_slope: 0.004,
            ev_charge_kw: 7.2,
        }
    }
}

/// Deterministic demand model shared by every substation.
///
/// # Examples
///
/// ```
/// use grid_sim::sim::load_model::{LoadModel, LoadParams, LoadProfile};
/// use grid_sim::sim::substation::{Position, Substation};
///
/// let model = LoadModel::new(LoadParams::default());
/// let sub = Substation::new("s", "S", 100.0, 1.0, 50_000.0, LoadProfile::Commercial, Position::default());
///
/// let mild = model.compute_load_mw(&sub, 13.0, 65.0, 0);
/// let hot = model.compute_load_mw(&sub, 13.0, 98.0, 0);
/// assert!((mild - 50.0).abs() < 1e-9);
/// assert!(hot > mild);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoadModel {
    params: LoadParams,
}

impl LoadModel {
    pub fn new(params: LoadParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LoadParams {
        &self.params
    }

    /// HVAC load as a fraction of the time-of-day base demand.
    ///
    /// Linear in the cooling band up to the knee, with an added quadratic
    /// term above it; a separate linear heating term applies on cold days.
    pub fn temperature_factor(&self, temperature_f: f64) -> f64 {
        let p = &self.params;
        let cooling = p.cooling_slope * (temperature_f - p.comfort_f).max(0.0);
        let above_knee = (temperature_f - p.knee_f).max(0.0);
        let saturation = p.knee_curvature * above_knee * above_knee;
        let heating = p.heating_slope * (p.heating_threshold_f - temperature_f).max(0.0);
        cooling + saturation + heating
    }

    /// EV charging demand (MW) for `charging_vehicles` vehicles.
    pub fn ev_load_mw(&self, charging_vehicles: usize) -> f64 {
        charging_vehicles as f64 * self.params.ev_charge_kw / 1000.0
    }

    /// Demand (MW) of `substation` at `hour` and `temperature_f` with
    /// `charging_vehicles` vehicles charging in its service area.
    ///
    /// Clamped at zero from below; there is no upper clamp.
    pub fn compute_load_mw(
        &self,
        substation: &Substation,
        hour: f64,
        temperature_f: f64,
        charging_vehicles: usize,
    ) -> f64 {
        let base_mw = substation.base_load_kw / 1000.0 * substation.profile.factor_at(hour);
        let hvac_mw = base_mw * self.temperature_factor(temperature_f);
        (base_mw + hvac_mw + self.ev_load_mw(charging_vehicles)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::substation::Position;

    fn sub(profile: LoadProfile) -> Substation {
        Substation::new("s", "S", 100.0, 1.0, 60_000.0, profile, Position::default())
    }

    #[test]
    fn factor_hits_anchors_and_interpolates() {
        let p = LoadProfile::Commercial;
        assert_eq!(p.factor_at(12.0), 1.00);
        assert_eq!(p.factor_at(0.0), 0.45);
        let mid = p.factor_at(7.5);
        assert!((mid - (0.72 + 0.86) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn factor_wraps_past_midnight() {
        let p = LoadProfile::Residential;
        let late = p.factor_at(23.5);
        assert!((late - (0.65 + 0.55) / 2.0).abs() < 1e-12);
        assert_eq!(p.factor_at(24.0), p.factor_at(0.0));
    }

    #[test]
    fn profiles_differ() {
        let c = LoadProfile::Commercial.factor_at(19.0);
        let r = LoadProfile::Residential.factor_at(19.0);
        assert!(r > c);
    }

    #[test]
    fn temperature_term_is_linear_below_knee() {
        let m = LoadModel::default();
        let a = m.temperature_factor(70.0);
        let b = m.temperature_factor(80.0);
        let c = m.temperature_factor(90.0);
        assert!(((b - a) - (c - b)).abs() < 1e-12);
    }

    #[test]
    fn temperature_term_is_convex_above_knee() {
        let m = LoadModel::default();
        let d1 = m.temperature_factor(95.0) - m.temperature_factor(90.0);
        let d2 = m.temperature_factor(100.0) - m.temperature_factor(95.0);
        assert!(d2 > d1);
        // slope 0.008 * 30 + 0.004 * 25
        assert!((m.temperature_factor(95.0) - 0.34).abs() < 1e-12);
    }

    #[test]
    fn heating_applies_on_cold_days() {
        let m = LoadModel::default();
        assert_eq!(m.temperature_factor(60.0), 0.0);
        assert!((m.temperature_factor(20.0) - 0.12).abs() < 1e-12);
    }

    #[test]
    fn ev_term_adds_per_vehicle() {
        let m = LoadModel::default();
        let s = sub(LoadProfile::Mixed);
        let none = m.compute_load_mw(&s, 3.0, 65.0, 0);
        let some = m.compute_load_mw(&s, 3.0, 65.0, 1000);
        assert!((some - none - 7.2).abs() < 1e-9);
    }

    #[test]
    fn load_never_negative() {
        let m = LoadModel::new(LoadParams {
            heating_slope: -10.0,
            ..LoadParams::default()
        });
        let s = sub(LoadProfile::Industrial);
        assert_eq!(m.compute_load_mw(&s, 12.0, 10.0, 0), 0.0);
    }
}
