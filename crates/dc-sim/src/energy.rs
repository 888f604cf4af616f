//! Energy and green-energy accounting.
//!
//! Grounded on `dslab-iaas::core::energy_manager::EnergyManager`'s
//! `energy += (time - prev_time) * current_load` accumulation idiom,
//! extended to a datacenter-wide per-step Wh update with a green/brown
//! split.

use std::collections::HashMap;

use serde::Deserialize;

use crate::common::HostId;
use crate::error::SimError;
use crate::power_model::PowerModel;

/// Result of one `EnergyAccountant::step` call, folded into the info bag.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepEnergy {
    pub current_power_w: f64,
    pub current_green_power_w: f64,
    pub step_energy_wh: f64,
    pub green_wh: f64,
    pub brown_wh: f64,
    pub wasted_wh: f64,
}

/// Per-host power models plus cumulative energy counters.
pub struct EnergyAccountant {
    power_models: HashMap<HostId, Box<dyn PowerModel>>,
    max_total_power_w: f64,
    pub cumulative_energy_wh: f64,
    pub cumulative_green_energy_wh: f64,
    pub cumulative_brown_energy_wh: f64,
    pub total_wasted_green_wh: f64,
    green_provider: Option<GreenEnergyProvider>,
}

impl EnergyAccountant {
    pub fn new(power_models: HashMap<HostId, Box<dyn PowerModel>>, green_provider: Option<GreenEnergyProvider>) -> Self {
        let max_total_power_w = power_models.values().map(|m| m.max_power()).sum();
        Self {
            power_models,
            max_total_power_w,
            cumulative_energy_wh: 0.0,
            cumulative_green_energy_wh: 0.0,
            cumulative_brown_energy_wh: 0.0,
            total_wasted_green_wh: 0.0,
            green_provider,
        }
    }

    /// Cache computed once at reset: `Σ_host P_host(1.0)`.
    pub fn max_total_power_w(&self) -> f64 {
        self.max_total_power_w
    }

    /// Datacenter instantaneous power at the given per-host utilizations.
    pub fn total_power_w(&self, host_utils: &HashMap<HostId, f64>) -> f64 {
        self.power_models
            .iter()
            .map(|(id, model)| model.get_power(*host_utils.get(id).unwrap_or(&0.0)))
            .sum()
    }

    /// Per-step update given the new clock `t1` and the current per-host
    /// utilizations. `delta` is `t1 - t0` in seconds.
    pub fn step(&mut self, t1: f64, delta: f64, host_utils: &HashMap<HostId, f64>) -> StepEnergy {
        let delta_h = delta / 3600.0;
        let p_total = self.total_power_w(host_utils);
        let e_step = p_total * delta_h;

        let (green_wh, brown_wh, wasted_wh, current_green_power_w) = match &self.green_provider {
            Some(provider) => {
                let p_green = provider.power_at(t1);
                let green_wh = e_step.min(p_green * delta_h);
                let brown_wh = e_step - green_wh;
                let wasted_wh = (p_green * delta_h - green_wh).max(0.0);
                (green_wh, brown_wh, wasted_wh, p_green)
            }
            None => (0.0, e_step, 0.0, 0.0),
        };

        self.cumulative_energy_wh += e_step;
        self.cumulative_green_energy_wh += green_wh;
        self.cumulative_brown_energy_wh += brown_wh;
        self.total_wasted_green_wh += wasted_wh;

        StepEnergy {
            current_power_w: p_total,
            current_green_power_w,
            step_energy_wh: e_step,
            green_wh,
            brown_wh,
            wasted_wh,
        }
    }
}

/// One sample of a green-power time series, as read from the CSV file.
#[derive(Debug, Clone, Deserialize)]
struct GreenEnergySample {
    power_kw: f64,
}

/// Forecast over a rolling horizon of the green power time series.
#[derive(Debug, Clone, Copy)]
pub struct GreenForecast {
    pub mean_w: f64,
    pub trend_w_per_s: f64,
    pub time_to_peak_normalized: f64,
}

/// Holds a fixed-period time series of green power in watts, linearly
/// interpolated between samples; values before/after the series' span
/// hold at the first/last sample.
pub struct GreenEnergyProvider {
    samples_w: Vec<f64>,
    period_s: f64,
}

impl GreenEnergyProvider {
    pub const DEFAULT_PERIOD_S: f64 = 600.0;
    const SHORT_HORIZON_SAMPLES: usize = 3;
    const LONG_HORIZON_SAMPLES: usize = 144;

    pub fn from_csv(path: &str, period_s: f64) -> Result<Self, SimError> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| SimError::WorkloadLoadError(format!("can't open green energy file {}: {}", path, e)))?;
        let mut samples_w = Vec::new();
        for record in reader.deserialize() {
            let sample: GreenEnergySample =
                record.map_err(|e| SimError::WorkloadLoadError(format!("malformed green energy row: {}", e)))?;
            samples_w.push(sample.power_kw * 1000.0);
        }
        if samples_w.is_empty() {
            return Err(SimError::WorkloadLoadError(format!("green energy file {} has no samples", path)));
        }
        Ok(Self { samples_w, period_s })
    }

    fn index_and_frac(&self, time: f64) -> (usize, f64) {
        let scaled = (time / self.period_s).max(0.0);
        let idx = scaled.floor() as usize;
        if idx + 1 >= self.samples_w.len() {
            return (self.samples_w.len() - 1, 0.0);
        }
        (idx, scaled - idx as f64)
    }

    /// Linearly interpolated green power in watts at virtual time `time`.
    pub fn power_at(&self, time: f64) -> f64 {
        let (idx, frac) = self.index_and_frac(time);
        if frac == 0.0 {
            return self.samples_w[idx];
        }
        let a = self.samples_w[idx];
        let b = self.samples_w[idx + 1];
        a + (b - a) * frac
    }

    fn forecast(&self, time: f64, horizon_samples: usize) -> GreenForecast {
        let (idx, _) = self.index_and_frac(time);
        let end = (idx + horizon_samples).min(self.samples_w.len());
        let window = &self.samples_w[idx..end];
        if window.is_empty() {
            return GreenForecast {
                mean_w: 0.0,
                trend_w_per_s: 0.0,
                time_to_peak_normalized: 0.0,
            };
        }
        let mean_w = window.iter().sum::<f64>() / window.len() as f64;
        let trend_w_per_s = if window.len() > 1 {
            (window[window.len() - 1] - window[0]) / ((window.len() - 1) as f64 * self.period_s)
        } else {
            0.0
        };
        let (peak_offset, _) = window
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .unwrap();
        let time_to_peak_normalized = if window.len() > 1 {
            peak_offset as f64 / (window.len() - 1) as f64
        } else {
            0.0
        };
        GreenForecast {
            mean_w,
            trend_w_per_s,
            time_to_peak_normalized,
        }
    }

    /// ~30 minutes (3 samples at the default 600s period) forecast.
    pub fn forecast_short(&self, time: f64) -> GreenForecast {
        self.forecast(time, Self::SHORT_HORIZON_SAMPLES)
    }

    /// ~24 hours (144 samples at the default 600s period) forecast.
    pub fn forecast_long(&self, time: f64) -> GreenForecast {
        self.forecast(time, Self::LONG_HORIZON_SAMPLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power_model::LinearPowerModel;

    fn accountant(green: Option<GreenEnergyProvider>) -> EnergyAccountant {
        let mut models: HashMap<HostId, Box<dyn PowerModel>> = HashMap::new();
        models.insert(0, Box::new(LinearPowerModel::new(200.0, 0.7)));
        models.insert(1, Box::new(LinearPowerModel::new(400.0, 0.7)));
        EnergyAccountant::new(models, green)
    }

    #[test]
    fn max_total_power_matches_the_spec_scenario() {
        let acc = accountant(None);
        assert!((acc.max_total_power_w() - 600.0).abs() < 1e-9);
    }

    #[test]
    fn no_green_provider_means_all_energy_is_brown() {
        let mut acc = accountant(None);
        let mut utils = HashMap::new();
        utils.insert(0, 1.0);
        utils.insert(1, 1.0);
        let step = acc.step(1.0, 1.0, &utils);
        assert!((step.current_power_w - 600.0).abs() < 1e-9);
        assert!((step.brown_wh - step.step_energy_wh).abs() < 1e-9);
        assert_eq!(step.green_wh, 0.0);
        assert_eq!(step.wasted_wh, 0.0);
    }

    #[test]
    fn green_cap_scenario_splits_energy_as_in_the_spec() {
        let mut models: HashMap<HostId, Box<dyn PowerModel>> = HashMap::new();
        // single host whose power model always reports 500W regardless of utilization
        models.insert(0, Box::new(LinearPowerModel::new(500.0, 1.0)));
        let green = GreenEnergyProvider {
            samples_w: vec![100.0],
            period_s: 600.0,
        };
        let mut acc = EnergyAccountant::new(models, Some(green));
        let mut utils = HashMap::new();
        utils.insert(0, 1.0);
        for t in 1..=10 {
            acc.step(t as f64, 1.0, &utils);
        }
        let expected_green = 100.0 * 10.0 / 3600.0;
        let expected_brown = 400.0 * 10.0 / 3600.0;
        assert!((acc.cumulative_green_energy_wh - expected_green).abs() < 1e-6);
        assert!((acc.cumulative_brown_energy_wh - expected_brown).abs() < 1e-6);
        assert!((acc.total_wasted_green_wh - 0.0).abs() < 1e-6);
    }

    #[test]
    fn interpolation_is_linear_between_samples() {
        let provider = GreenEnergyProvider {
            samples_w: vec![100.0, 200.0, 150.0],
            period_s: 600.0,
        };
        assert_eq!(provider.power_at(0.0), 100.0);
        assert_eq!(provider.power_at(300.0), 150.0);
        assert_eq!(provider.power_at(600.0), 200.0);
    }
}
