//! Physical host power consumption models.

use dyn_clone::{clone_trait_object, DynClone};

/// Computes a physical host's instantaneous power draw from its current
/// CPU utilization.
pub trait PowerModel: DynClone {
    /// `u` is the host's CPU utilization in `[0, 1]`.
    fn get_power(&self, u: f64) -> f64;

    /// Power at full utilization; used to build the `maxTotalPowerW` cache.
    fn max_power(&self) -> f64;
}

clone_trait_object!(PowerModel);

/// `P(u) = P_idle + u * (P_max - P_idle)`, `P_idle = static_percent * P_max`.
///
/// Unlike a plain idle/busy toggle, this model reports `P_idle` even at
/// zero utilization — a host that is allocated but unused still draws
/// baseline power.
#[derive(Debug, Clone)]
pub struct LinearPowerModel {
    p_max: f64,
    p_idle: f64,
}

impl LinearPowerModel {
    pub fn new(p_max: f64, static_percent: f64) -> Self {
        Self {
            p_max,
            p_idle: static_percent * p_max,
        }
    }
}

impl PowerModel for LinearPowerModel {
    fn get_power(&self, u: f64) -> f64 {
        self.p_idle + u.clamp(0.0, 1.0) * (self.p_max - self.p_idle)
    }

    fn max_power(&self) -> f64 {
        self.p_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_power_is_static_percent_of_max() {
        let model = LinearPowerModel::new(400.0, 0.7);
        assert_eq!(model.get_power(0.0), 280.0);
        assert_eq!(model.get_power(1.0), 400.0);
    }

    #[test]
    fn heterogeneous_hosts_sum_as_in_the_spec_scenario() {
        let a = LinearPowerModel::new(200.0, 0.7);
        let b = LinearPowerModel::new(400.0, 0.7);
        let total_idle = a.get_power(0.0) + b.get_power(0.0);
        let total_full = a.get_power(1.0) + b.get_power(1.0);
        assert!((total_idle - 420.0).abs() < 1e-9);
        assert!((total_full - 600.0).abs() < 1e-9);
    }
}
