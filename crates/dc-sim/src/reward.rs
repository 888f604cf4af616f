//! Reward function: five independently-reported, coefficient-weighted
//! penalty components.
//!
//! All components except `invalid` are non-positive; the agent optimizes
//! by minimizing penalties. The energy term is computed from per-step
//! energy (Wh), not instantaneous power, so stretching execution at lower
//! power does not look free to the agent.

use crate::config::Configuration;

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RewardComponents {
    pub wait_time: f64,
    pub unutilization: f64,
    pub queue_penalty: f64,
    pub invalid_action: f64,
    pub energy: f64,
}

impl RewardComponents {
    pub fn total(&self) -> f64 {
        self.wait_time + self.unutilization + self.queue_penalty + self.invalid_action + self.energy
    }
}

/// Per-step inputs to the reward function, already computed by the
/// facade's pipeline.
pub struct RewardInputs<'a> {
    pub avg_finished_wait_time_last_step: f64,
    pub running_vm_cpu_utils: &'a [f64],
    pub waiting_count: u64,
    pub total_arrived_count: u64,
    pub was_invalid_action: bool,
    pub step_energy_wh: f64,
    pub max_total_power_w: f64,
    pub delta_h: f64,
}

pub fn compute(cfg: &Configuration, inputs: &RewardInputs) -> RewardComponents {
    let wait_time = -cfg.reward_wait_time_coef * (1.0 + inputs.avg_finished_wait_time_last_step).ln();

    let unutilization = if inputs.running_vm_cpu_utils.is_empty() {
        0.0
    } else {
        let n = inputs.running_vm_cpu_utils.len() as f64;
        let mean = inputs.running_vm_cpu_utils.iter().sum::<f64>() / n;
        let variance = inputs.running_vm_cpu_utils.iter().map(|u| (u - mean).powi(2)).sum::<f64>() / n;
        -cfg.reward_unutilization_coef * (variance.sqrt() + (mean - 0.95).abs())
    };

    let queue_penalty = if inputs.total_arrived_count == 0 {
        0.0
    } else {
        -cfg.reward_queue_penalty_coef * (inputs.waiting_count as f64 / inputs.total_arrived_count as f64)
    };

    let invalid_action = if inputs.was_invalid_action { -cfg.reward_invalid_action_coef } else { 0.0 };

    let energy = if cfg.reward_energy_coef == 0.0 || inputs.max_total_power_w <= 0.0 || inputs.delta_h <= 0.0 {
        0.0
    } else {
        -cfg.reward_energy_coef * (inputs.step_energy_wh / (inputs.max_total_power_w * inputs.delta_h))
    };

    RewardComponents {
        wait_time,
        unutilization,
        queue_penalty,
        invalid_action,
        energy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Configuration {
        Configuration::from_raw(crate::config::ConfigurationRaw::default()).unwrap()
    }

    #[test]
    fn no_wait_no_variance_yields_zero_wait_and_util_terms() {
        let mut c = cfg();
        c.reward_wait_time_coef = 1.0;
        c.reward_unutilization_coef = 1.0;
        let inputs = RewardInputs {
            avg_finished_wait_time_last_step: 0.0,
            running_vm_cpu_utils: &[],
            waiting_count: 0,
            total_arrived_count: 0,
            was_invalid_action: false,
            step_energy_wh: 0.0,
            max_total_power_w: 600.0,
            delta_h: 1.0 / 3600.0,
        };
        let r = compute(&c, &inputs);
        assert_eq!(r.wait_time, 0.0);
        assert_eq!(r.unutilization, 0.0);
        assert_eq!(r.queue_penalty, 0.0);
        assert_eq!(r.invalid_action, 0.0);
    }

    #[test]
    fn invalid_action_fires_the_full_coefficient_penalty() {
        let mut c = cfg();
        c.reward_invalid_action_coef = 2.5;
        let inputs = RewardInputs {
            avg_finished_wait_time_last_step: 0.0,
            running_vm_cpu_utils: &[],
            waiting_count: 0,
            total_arrived_count: 0,
            was_invalid_action: true,
            step_energy_wh: 0.0,
            max_total_power_w: 600.0,
            delta_h: 1.0 / 3600.0,
        };
        let r = compute(&c, &inputs);
        assert_eq!(r.invalid_action, -2.5);
    }

    #[test]
    fn zero_energy_coefficient_disables_the_energy_term() {
        let mut c = cfg();
        c.reward_energy_coef = 0.0;
        let inputs = RewardInputs {
            avg_finished_wait_time_last_step: 0.0,
            running_vm_cpu_utils: &[],
            waiting_count: 0,
            total_arrived_count: 0,
            was_invalid_action: false,
            step_energy_wh: 999.0,
            max_total_power_w: 600.0,
            delta_h: 1.0 / 3600.0,
        };
        let r = compute(&c, &inputs);
        assert_eq!(r.energy, 0.0);
    }

    #[test]
    fn full_power_for_a_full_hour_yields_the_full_energy_penalty() {
        let mut c = cfg();
        c.reward_energy_coef = 1.0;
        let inputs = RewardInputs {
            avg_finished_wait_time_last_step: 0.0,
            running_vm_cpu_utils: &[],
            waiting_count: 0,
            total_arrived_count: 0,
            was_invalid_action: false,
            step_energy_wh: 600.0,
            max_total_power_w: 600.0,
            delta_h: 1.0,
        };
        let r = compute(&c, &inputs);
        assert!((r.energy + 1.0).abs() < 1e-9);
    }
}
