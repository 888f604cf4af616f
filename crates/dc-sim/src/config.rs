//! Simulation configuration.
//!
//! Parsed the way `dslab-iaas` parses its `SimulationConfig`: a `Raw`
//! struct of `Option<T>` fields deserialized from YAML, defaulted into a
//! fully-populated `Configuration` by [`Configuration::from_raw`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Named physical-host profile used in heterogeneous-host mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostProfile {
    pub pes: u32,
    pub pe_mips: u64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
    pub p_max: f64,
    pub static_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum WorkloadMode {
    #[default]
    Swf,
    Csv,
}

/// Raw configuration as deserialized from YAML; every field optional so
/// a caller only needs to specify overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConfigurationRaw {
    pub hosts_count: Option<u32>,
    pub host_pes: Option<u32>,
    pub host_pe_mips: Option<u64>,
    pub host_ram: Option<u64>,
    pub host_bw: Option<u64>,
    pub host_storage: Option<u64>,
    pub host_p_max: Option<f64>,
    pub host_static_percent: Option<f64>,
    pub enable_heterogeneous_hosts: Option<bool>,
    pub host_profiles: Option<HashMap<String, (HostProfile, u32)>>,

    pub small_vm_pes: Option<u32>,
    pub small_vm_ram: Option<u64>,
    pub small_vm_bw: Option<u64>,
    pub small_vm_storage: Option<u64>,
    pub medium_vm_multiplier: Option<u32>,
    pub large_vm_multiplier: Option<u32>,
    pub initial_s_vm_count: Option<u32>,
    pub initial_m_vm_count: Option<u32>,
    pub initial_l_vm_count: Option<u32>,

    pub workload_mode: Option<WorkloadMode>,
    pub cloudlet_trace_file: Option<String>,
    pub max_cloudlets_to_create_from_workload_file: Option<u64>,
    pub workload_reader_mips: Option<u64>,
    pub split_large_cloudlets: Option<bool>,
    pub max_cloudlet_pes: Option<u32>,

    pub simulation_timestep: Option<f64>,
    pub min_time_between_events: Option<f64>,
    pub vm_startup_delay: Option<f64>,
    pub vm_shutdown_delay: Option<f64>,
    pub max_episode_length: Option<u64>,
    pub requeue_cloudlets_on_vm_destroy: Option<bool>,

    pub reward_wait_time_coef: Option<f64>,
    pub reward_unutilization_coef: Option<f64>,
    pub reward_queue_penalty_coef: Option<f64>,
    pub reward_invalid_action_coef: Option<f64>,
    pub reward_energy_coef: Option<f64>,

    pub green_energy_enabled: Option<bool>,
    pub turbine_id: Option<String>,
    pub wind_data_file: Option<String>,
    pub carbon_factor_brown: Option<f64>,
    pub carbon_factor_green: Option<f64>,

    pub vm_max_slots: Option<u32>,
}

/// Fully-populated configuration used throughout the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub hosts_count: u32,
    pub host_pes: u32,
    pub host_pe_mips: u64,
    pub host_ram: u64,
    pub host_bw: u64,
    pub host_storage: u64,
    pub host_p_max: f64,
    pub host_static_percent: f64,
    pub enable_heterogeneous_hosts: bool,
    pub host_profiles: HashMap<String, (HostProfile, u32)>,

    pub small_vm_pes: u32,
    pub small_vm_ram: u64,
    pub small_vm_bw: u64,
    pub small_vm_storage: u64,
    pub medium_vm_multiplier: u32,
    pub large_vm_multiplier: u32,
    pub initial_s_vm_count: u32,
    pub initial_m_vm_count: u32,
    pub initial_l_vm_count: u32,

    pub workload_mode: WorkloadMode,
    pub cloudlet_trace_file: Option<String>,
    pub max_cloudlets_to_create_from_workload_file: Option<u64>,
    pub workload_reader_mips: u64,
    pub split_large_cloudlets: bool,
    pub max_cloudlet_pes: u32,

    pub simulation_timestep: f64,
    pub min_time_between_events: f64,
    pub vm_startup_delay: f64,
    pub vm_shutdown_delay: f64,
    pub max_episode_length: u64,
    pub requeue_cloudlets_on_vm_destroy: bool,

    pub reward_wait_time_coef: f64,
    pub reward_unutilization_coef: f64,
    pub reward_queue_penalty_coef: f64,
    pub reward_invalid_action_coef: f64,
    pub reward_energy_coef: f64,

    pub green_energy_enabled: bool,
    pub turbine_id: Option<String>,
    pub wind_data_file: Option<String>,
    pub carbon_factor_brown: f64,
    pub carbon_factor_green: f64,

    pub vm_max_slots: Option<u32>,
}

impl Configuration {
    /// Defaults every field absent from `raw`, then validates cross-field
    /// invariants.
    pub fn from_raw(raw: ConfigurationRaw) -> Result<Self, SimError> {
        let cfg = Self {
            hosts_count: raw.hosts_count.unwrap_or(10),
            host_pes: raw.host_pes.unwrap_or(16),
            host_pe_mips: raw.host_pe_mips.unwrap_or(2000),
            host_ram: raw.host_ram.unwrap_or(65536),
            host_bw: raw.host_bw.unwrap_or(10000),
            host_storage: raw.host_storage.unwrap_or(1_000_000),
            host_p_max: raw.host_p_max.unwrap_or(300.0),
            host_static_percent: raw.host_static_percent.unwrap_or(0.7),
            enable_heterogeneous_hosts: raw.enable_heterogeneous_hosts.unwrap_or(false),
            host_profiles: raw.host_profiles.unwrap_or_default(),

            small_vm_pes: raw.small_vm_pes.unwrap_or(2),
            small_vm_ram: raw.small_vm_ram.unwrap_or(8192),
            small_vm_bw: raw.small_vm_bw.unwrap_or(1000),
            small_vm_storage: raw.small_vm_storage.unwrap_or(20000),
            medium_vm_multiplier: raw.medium_vm_multiplier.unwrap_or(2),
            large_vm_multiplier: raw.large_vm_multiplier.unwrap_or(4),
            initial_s_vm_count: raw.initial_s_vm_count.unwrap_or(0),
            initial_m_vm_count: raw.initial_m_vm_count.unwrap_or(0),
            initial_l_vm_count: raw.initial_l_vm_count.unwrap_or(0),

            workload_mode: raw.workload_mode.unwrap_or_default(),
            cloudlet_trace_file: raw.cloudlet_trace_file,
            max_cloudlets_to_create_from_workload_file: raw.max_cloudlets_to_create_from_workload_file,
            workload_reader_mips: raw.workload_reader_mips.unwrap_or(2000),
            split_large_cloudlets: raw.split_large_cloudlets.unwrap_or(true),
            max_cloudlet_pes: raw.max_cloudlet_pes.unwrap_or(16),

            simulation_timestep: raw.simulation_timestep.unwrap_or(1.0),
            min_time_between_events: raw.min_time_between_events.unwrap_or(0.1),
            vm_startup_delay: raw.vm_startup_delay.unwrap_or(56.0),
            vm_shutdown_delay: raw.vm_shutdown_delay.unwrap_or(10.0),
            max_episode_length: raw.max_episode_length.unwrap_or(1000),
            requeue_cloudlets_on_vm_destroy: raw.requeue_cloudlets_on_vm_destroy.unwrap_or(false),

            reward_wait_time_coef: raw.reward_wait_time_coef.unwrap_or(1.0),
            reward_unutilization_coef: raw.reward_unutilization_coef.unwrap_or(1.0),
            reward_queue_penalty_coef: raw.reward_queue_penalty_coef.unwrap_or(1.0),
            reward_invalid_action_coef: raw.reward_invalid_action_coef.unwrap_or(1.0),
            reward_energy_coef: raw.reward_energy_coef.unwrap_or(0.0),

            green_energy_enabled: raw.green_energy_enabled.unwrap_or(false),
            turbine_id: raw.turbine_id,
            wind_data_file: raw.wind_data_file,
            carbon_factor_brown: raw.carbon_factor_brown.unwrap_or(0.5),
            carbon_factor_green: raw.carbon_factor_green.unwrap_or(0.01),

            vm_max_slots: raw.vm_max_slots,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and parses a YAML configuration file, applying defaults for
    /// absent fields.
    pub fn from_file(path: &str) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::ConfigError(format!("can't read file {}: {}", path, e)))?;
        let raw: ConfigurationRaw =
            serde_yaml::from_str(&text).map_err(|e| SimError::ConfigError(format!("can't parse YAML: {}", e)))?;
        Self::from_raw(raw)
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.enable_heterogeneous_hosts {
            let total: u32 = self.host_profiles.values().map(|(_, count)| *count).sum();
            if total != self.hosts_count {
                return Err(SimError::ConfigError(format!(
                    "heterogeneous host profile counts ({}) do not sum to hosts_count ({})",
                    total, self.hosts_count
                )));
            }
        }
        if self.green_energy_enabled && self.wind_data_file.is_none() {
            return Err(SimError::ConfigError(
                "green_energy_enabled requires wind_data_file".to_string(),
            ));
        }
        if self.simulation_timestep <= 0.0 {
            return Err(SimError::ConfigError("simulation_timestep must be positive".to_string()));
        }
        Ok(())
    }

    /// `V_max`: the bound on VM observation slots — the max of the
    /// configured cap, the initial fleet size scaled by 1.1, and a floor
    /// of 10.
    pub fn vm_slot_bound(&self) -> u32 {
        let initial = self.initial_s_vm_count + self.initial_m_vm_count + self.initial_l_vm_count;
        let scaled = (initial as f64 * 1.1).ceil() as u32;
        self.vm_max_slots.unwrap_or(0).max(scaled).max(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_field() {
        let cfg = Configuration::from_raw(ConfigurationRaw::default()).unwrap();
        assert_eq!(cfg.hosts_count, 10);
        assert_eq!(cfg.simulation_timestep, 1.0);
        assert_eq!(cfg.max_episode_length, 1000);
    }

    #[test]
    fn heterogeneous_count_mismatch_is_rejected() {
        let mut raw = ConfigurationRaw {
            enable_heterogeneous_hosts: Some(true),
            hosts_count: Some(4),
            ..Default::default()
        };
        let mut profiles = HashMap::new();
        profiles.insert(
            "big".to_string(),
            (
                HostProfile {
                    pes: 32,
                    pe_mips: 3000,
                    ram: 131072,
                    bw: 20000,
                    storage: 2_000_000,
                    p_max: 400.0,
                    static_percent: 0.7,
                },
                2,
            ),
        );
        raw.host_profiles = Some(profiles);
        let err = Configuration::from_raw(raw).unwrap_err();
        assert!(matches!(err, SimError::ConfigError(_)));
    }

    #[test]
    fn vm_slot_bound_has_a_floor_of_ten() {
        let cfg = Configuration::from_raw(ConfigurationRaw::default()).unwrap();
        assert_eq!(cfg.vm_slot_bound(), 10);
    }

    #[test]
    fn vm_slot_bound_is_the_max_of_cap_scaled_fleet_and_floor() {
        let cfg = Configuration::from_raw(ConfigurationRaw {
            vm_max_slots: Some(5),
            initial_s_vm_count: Some(20),
            ..Default::default()
        })
        .unwrap();
        // scaled = ceil(20 * 1.1) = 22, which beats both the cap and the floor.
        assert_eq!(cfg.vm_slot_bound(), 22);
    }

    #[test]
    fn vm_slot_bound_honors_a_cap_above_the_scaled_fleet() {
        let cfg = Configuration::from_raw(ConfigurationRaw {
            vm_max_slots: Some(50),
            initial_s_vm_count: Some(2),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.vm_slot_bound(), 50);
    }
}
