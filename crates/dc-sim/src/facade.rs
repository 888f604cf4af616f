//! Gateway Facade: the single entry point consumed by the controller.
//!
//! Composes [`sim_core::Simulation`], [`Datacenter`], [`Broker`], [`VmPool`]
//! (registered as an event handler so cloudlet completions and VM lifecycle
//! transitions resolve during `run_for_duration`), and [`EnergyAccountant`]
//! into one episode. Grounded on `dslab-iaas::simulation::CloudSimulation`
//! as the composition root, using plain `Rc<RefCell<_>>` instead of the
//! teacher's `sugars` macros since `sim-core` carries no `sugars` dependency.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use serde::Serialize;

use crate::broker::Broker;
use crate::common::{HostId, ResourceDemand, VmId, VmType};
use crate::config::{Configuration, ConfigurationRaw};
use crate::energy::{EnergyAccountant, GreenEnergyProvider};
use crate::error::SimError;
use crate::host::{Datacenter, Host};
use crate::observation::{self, Observation};
use crate::power_model::LinearPowerModel;
use crate::reward::{self, RewardInputs};
use crate::vm::{VirtualMachine, VmPool, VmState};
use crate::vm_placement_algorithm::{self, VmAllocationPolicy};
use crate::workload::csv::CsvWorkloadSource;
use crate::workload::swf::SwfWorkloadSource;
use crate::workload::{EmptyWorkloadSource, WorkloadSource};

const COMPLETION_WINDOW: usize = 10;

/// Either action schema from the controller; both map to the same
/// internal pipeline.
#[derive(Debug, Clone, Copy)]
pub enum Action {
    /// `-1` means "no assignment this step"; any non-negative value
    /// assigns the waiting-queue head to that VM.
    Simple { target_vm_id: i64 },
    /// `action_type`: `0` no-op, `1` assign, `2` create-VM, `3` destroy-VM.
    Structured {
        action_type: u8,
        target_vm_id: i64,
        target_host_id: i64,
        vm_type_index: u32,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct StepInfo {
    pub assignment_success: bool,
    pub create_vm_attempted: bool,
    pub create_vm_success: bool,
    pub destroy_vm_attempted: bool,
    pub destroy_vm_success: bool,
    pub invalid_action_taken: bool,
    pub host_affected_id: Option<HostId>,
    pub cores_changed: i64,
    pub current_clock: f64,
    pub reward_wait_time: f64,
    pub reward_unutilization: f64,
    pub reward_queue_penalty: f64,
    pub reward_invalid_action: f64,
    pub reward_energy: f64,
    pub current_power_w: f64,
    pub cumulative_energy_wh: f64,
    pub average_host_utilization: f64,
    pub cumulative_green_energy_wh: f64,
    pub cumulative_brown_energy_wh: f64,
    pub total_wasted_green_wh: f64,
    pub current_green_power_w: f64,
    pub green_ratio: f64,
    pub episode_duration: f64,
    pub episode_completed_cloudlets: u64,
    pub episode_total_cloudlets: u64,
    pub episode_completion_rate: f64,
}

pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

struct EpisodeState {
    sim: sim_core::Simulation,
    datacenter: Datacenter,
    vm_pool: Rc<RefCell<VmPool>>,
    broker: Broker,
    energy: EnergyAccountant,
    workload: Box<dyn WorkloadSource>,
    allocation_policy: Box<dyn VmAllocationPolicy>,
    next_vm_id: VmId,
    current_step: u64,
    is_running: bool,
    episode_completed_cloudlets: u64,
    episode_total_cloudlets: u64,
    completed_last_10_steps: VecDeque<u64>,
}

pub struct Gateway {
    cfg: Configuration,
    state: Option<EpisodeState>,
    last_snapshot: Option<(Observation, StepInfo)>,
}

impl Gateway {
    pub fn new() -> Result<Self, SimError> {
        Ok(Self {
            cfg: Configuration::from_raw(ConfigurationRaw::default())?,
            state: None,
            last_snapshot: None,
        })
    }

    /// Idempotent setter for the configuration record. No simulation work.
    pub fn configure(&mut self, raw: ConfigurationRaw) -> Result<(), SimError> {
        self.cfg = Configuration::from_raw(raw)?;
        Ok(())
    }

    pub fn reset(&mut self, seed: u64) -> Result<(Observation, StepInfo), SimError> {
        let cfg = self.cfg.clone();
        let mut sim = sim_core::Simulation::new(seed);

        let hosts = build_hosts(&cfg)?;
        let mut datacenter = Datacenter::new(hosts);

        let vm_pool_ctx = sim.create_context("vm_pool");
        let vm_pool = Rc::new(RefCell::new(VmPool::new(vm_pool_ctx, cfg.requeue_cloudlets_on_vm_destroy)));
        sim.add_handler("vm_pool", vm_pool.clone());

        let allocation_policy = vm_placement_algorithm::resolver("FirstFit");
        let mut next_vm_id: VmId = 0;

        for (vm_type, count) in [
            (VmType::Small, cfg.initial_s_vm_count),
            (VmType::Medium, cfg.initial_m_vm_count),
            (VmType::Large, cfg.initial_l_vm_count),
        ] {
            for _ in 0..count {
                create_vm(&cfg, &mut datacenter, &vm_pool, allocation_policy.as_ref(), &mut next_vm_id, vm_type)?;
            }
        }

        // Resolve any zero-delay VM activations scheduled by the initial
        // fleet above, so a controller's very first action can already
        // target a Running VM instead of one still Pending until the
        // first step's time advance.
        sim.run_for_duration(0.0);

        let mut workload = build_workload(&cfg)?;

        let green_provider = if cfg.green_energy_enabled {
            let path = cfg
                .wind_data_file
                .as_ref()
                .ok_or_else(|| SimError::ConfigError("green_energy_enabled requires wind_data_file".to_string()))?;
            Some(GreenEnergyProvider::from_csv(path, GreenEnergyProvider::DEFAULT_PERIOD_S)?)
        } else {
            None
        };
        let power_models = datacenter
            .hosts
            .iter()
            .map(|h| (h.id, h.power_model.clone()))
            .collect::<HashMap<_, _>>();
        let energy = EnergyAccountant::new(power_models, green_provider);

        let mut broker = Broker::new();
        broker.poll_arrivals(0.0, workload.as_mut());

        self.state = Some(EpisodeState {
            sim,
            datacenter,
            vm_pool,
            broker,
            energy,
            workload,
            allocation_policy,
            next_vm_id,
            current_step: 0,
            is_running: true,
            episode_completed_cloudlets: 0,
            episode_total_cloudlets: 0,
            completed_last_10_steps: VecDeque::with_capacity(COMPLETION_WINDOW),
        });

        let v_max = cfg.vm_slot_bound();
        let state = self.state.as_ref().unwrap();
        let observation = observation::assemble(&state.datacenter, &state.vm_pool.borrow(), &state.broker, v_max, 0.0, 0);
        let info = StepInfo {
            current_clock: 0.0,
            cumulative_energy_wh: 0.0,
            ..Default::default()
        };
        self.last_snapshot = Some((observation.clone(), info));
        Ok((observation, info))
    }

    pub fn step(&mut self, action: Action) -> Result<StepResult, SimError> {
        let cfg = self.cfg.clone();
        let state = self.state.as_mut().ok_or_else(|| SimError::FatalSimulationError("step called before reset".to_string()))?;
        state.current_step += 1;

        // 1. Action execution.
        let outcome = execute_action(&cfg, action, &mut state.datacenter, &state.vm_pool, state.allocation_policy.as_ref(), &mut state.broker, &mut state.next_vm_id);

        // 2. Arrival poll.
        let now = state.sim.time();
        state.broker.poll_arrivals(now, state.workload.as_mut());

        // 3. Time advance.
        let delta = cfg.simulation_timestep;
        let sim = &mut state.sim;
        let panicked = catch_unwind(AssertUnwindSafe(|| sim.run_for_duration(delta))).is_err();
        if panicked {
            state.is_running = false;
        }
        let t1 = state.sim.time();

        // Release host residency for VMs whose destruction resolved this step,
        // and requeue any cloudlets freed by the destruction.
        {
            let mut pool = state.vm_pool.borrow_mut();
            for (vm_id, host_id, demand) in pool.drain_released_hosts() {
                if let Some(host) = state.datacenter.host_mut(host_id) {
                    host.release(vm_id, &demand);
                }
            }
            for cloudlet in pool.take_pending_requeues() {
                state.broker.requeue(cloudlet);
            }
        }

        // Record finished cloudlets for wait-time/energy bookkeeping.
        let finished_ids = {
            let mut pool = state.vm_pool.borrow_mut();
            std::mem::take(&mut pool.finished_since_last_poll)
        };
        {
            let pool = state.vm_pool.borrow();
            for id in &finished_ids {
                if let Some(cloudlet) = pool.cloudlet(*id) {
                    if let Some(wait) = cloudlet.wait_time() {
                        state.broker.record_finished_wait_time(wait);
                    }
                }
            }
        }
        let completed_this_step = finished_ids.len() as u64;
        state.episode_completed_cloudlets += completed_this_step;
        state.episode_total_cloudlets = state.broker.total_arrived_count();
        if state.completed_last_10_steps.len() == COMPLETION_WINDOW {
            state.completed_last_10_steps.pop_front();
        }
        state.completed_last_10_steps.push_back(completed_this_step);
        let completed_last_10: u64 = state.completed_last_10_steps.iter().sum();

        // 4. Energy update.
        let delta_h = (t1 - now) / 3600.0;
        let host_utils: HashMap<HostId, f64> = state
            .datacenter
            .hosts
            .iter()
            .filter(|h| h.active)
            .map(|h| (h.id, h.cpu_load()))
            .collect();
        let step_energy = state.energy.step(t1, t1 - now, &host_utils);

        // 5. Observation assembly.
        let v_max = cfg.vm_slot_bound();
        let observation = {
            let pool = state.vm_pool.borrow();
            observation::assemble(&state.datacenter, &pool, &state.broker, v_max, t1, completed_last_10)
        };

        // 6. Reward computation.
        let finished_wait_times = state.broker.take_finished_wait_times();
        let avg_wait = if finished_wait_times.is_empty() {
            0.0
        } else {
            finished_wait_times.iter().sum::<f64>() / finished_wait_times.len() as f64
        };
        let running_utils: Vec<f64> = {
            let pool = state.vm_pool.borrow();
            pool.vms().iter().filter(|v| v.state == VmState::Running).map(|v| v.cpu_percent()).collect()
        };
        let reward_components = reward::compute(
            &cfg,
            &RewardInputs {
                avg_finished_wait_time_last_step: avg_wait,
                running_vm_cpu_utils: &running_utils,
                waiting_count: state.broker.waiting_count() as u64,
                total_arrived_count: state.broker.total_arrived_count(),
                was_invalid_action: outcome.invalid_action_taken,
                step_energy_wh: step_energy.step_energy_wh,
                max_total_power_w: state.energy.max_total_power_w(),
                delta_h,
            },
        );

        // 7. Termination tests.
        let no_work_remaining = {
            let pool = state.vm_pool.borrow();
            state.workload.is_exhausted()
                && !state.broker.has_waiting()
                && pool.vms().iter().all(|v| v.running_cloudlets().next().is_none() && v.waiting_cloudlets().next().is_none())
        };
        let terminated = !state.is_running || no_work_remaining;
        let truncated = !terminated && state.current_step >= cfg.max_episode_length;

        // 8. Info bag.
        let cumulative_energy_wh = state.energy.cumulative_energy_wh;
        let green_ratio = if cumulative_energy_wh > 0.0 {
            state.energy.cumulative_green_energy_wh / cumulative_energy_wh
        } else {
            0.0
        };
        let episode_completion_rate = if state.episode_total_cloudlets > 0 {
            state.episode_completed_cloudlets as f64 / state.episode_total_cloudlets as f64
        } else {
            0.0
        };
        let average_host_utilization = if host_utils.is_empty() {
            0.0
        } else {
            host_utils.values().sum::<f64>() / host_utils.len() as f64
        };

        let info = StepInfo {
            assignment_success: outcome.assignment_success,
            create_vm_attempted: outcome.create_vm_attempted,
            create_vm_success: outcome.create_vm_success,
            destroy_vm_attempted: outcome.destroy_vm_attempted,
            destroy_vm_success: outcome.destroy_vm_success,
            invalid_action_taken: outcome.invalid_action_taken,
            host_affected_id: outcome.host_affected_id,
            cores_changed: outcome.cores_changed,
            current_clock: t1,
            reward_wait_time: reward_components.wait_time,
            reward_unutilization: reward_components.unutilization,
            reward_queue_penalty: reward_components.queue_penalty,
            reward_invalid_action: reward_components.invalid_action,
            reward_energy: reward_components.energy,
            current_power_w: step_energy.current_power_w,
            cumulative_energy_wh,
            average_host_utilization,
            cumulative_green_energy_wh: state.energy.cumulative_green_energy_wh,
            cumulative_brown_energy_wh: state.energy.cumulative_brown_energy_wh,
            total_wasted_green_wh: state.energy.total_wasted_green_wh,
            current_green_power_w: step_energy.current_green_power_w,
            green_ratio,
            episode_duration: t1,
            episode_completed_cloudlets: state.episode_completed_cloudlets,
            episode_total_cloudlets: state.episode_total_cloudlets,
            episode_completion_rate,
        };

        self.last_snapshot = Some((observation.clone(), info));

        Ok(StepResult {
            observation,
            reward: reward_components.total(),
            terminated,
            truncated,
            info,
        })
    }

    /// Human-readable rendering of the last observation/info snapshot.
    pub fn render(&self) -> String {
        match &self.last_snapshot {
            Some((obs, info)) => format!(
                "clock={:.1} hosts={} vms={} waiting={} power={:.1}W energy={:.4}Wh",
                info.current_clock, obs.actual_host_count, obs.actual_vm_count, obs.waiting_cloudlets, info.current_power_w, info.cumulative_energy_wh
            ),
            None => "(no episode running)".to_string(),
        }
    }

    pub fn render_json(&self) -> Result<String, SimError> {
        match &self.last_snapshot {
            Some((obs, info)) => serde_json::to_string(&(obs, info)).map_err(|e| SimError::FatalSimulationError(e.to_string())),
            None => Ok("null".to_string()),
        }
    }

    pub fn close(&mut self) {
        self.state = None;
        self.last_snapshot = None;
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new().expect("default configuration must validate")
    }
}

struct ActionOutcome {
    assignment_success: bool,
    create_vm_attempted: bool,
    create_vm_success: bool,
    destroy_vm_attempted: bool,
    destroy_vm_success: bool,
    invalid_action_taken: bool,
    host_affected_id: Option<HostId>,
    cores_changed: i64,
}

impl Default for ActionOutcome {
    fn default() -> Self {
        Self {
            assignment_success: false,
            create_vm_attempted: false,
            create_vm_success: false,
            destroy_vm_attempted: false,
            destroy_vm_success: false,
            invalid_action_taken: false,
            host_affected_id: None,
            cores_changed: 0,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn execute_action(
    cfg: &Configuration,
    action: Action,
    datacenter: &mut Datacenter,
    vm_pool: &Rc<RefCell<VmPool>>,
    allocation_policy: &dyn VmAllocationPolicy,
    broker: &mut Broker,
    next_vm_id: &mut VmId,
) -> ActionOutcome {
    match action {
        Action::Simple { target_vm_id } => {
            if target_vm_id < 0 {
                ActionOutcome::default()
            } else {
                try_assign(target_vm_id as VmId, vm_pool, broker)
            }
        }
        Action::Structured {
            action_type,
            target_vm_id,
            target_host_id: _,
            vm_type_index,
        } => match action_type {
            1 if target_vm_id >= 0 => try_assign(target_vm_id as VmId, vm_pool, broker),
            1 => ActionOutcome {
                invalid_action_taken: true,
                ..ActionOutcome::default()
            },
            2 => try_create(cfg, datacenter, vm_pool, allocation_policy, next_vm_id, vm_type_index),
            3 => try_destroy(target_vm_id, vm_pool),
            _ => ActionOutcome::default(),
        },
    }
}

fn try_assign(vm_id: VmId, vm_pool: &Rc<RefCell<VmPool>>, broker: &mut Broker) -> ActionOutcome {
    let mut pool = vm_pool.borrow_mut();
    match broker.assign_cloudlet_to_vm(vm_id, &mut pool) {
        Ok(()) => ActionOutcome {
            assignment_success: true,
            ..ActionOutcome::default()
        },
        Err(_) => ActionOutcome {
            invalid_action_taken: true,
            ..ActionOutcome::default()
        },
    }
}

fn try_create(
    cfg: &Configuration,
    datacenter: &mut Datacenter,
    vm_pool: &Rc<RefCell<VmPool>>,
    allocation_policy: &dyn VmAllocationPolicy,
    next_vm_id: &mut VmId,
    vm_type_index: u32,
) -> ActionOutcome {
    let Some(vm_type) = VmType::from_index(vm_type_index) else {
        return ActionOutcome {
            invalid_action_taken: true,
            create_vm_attempted: true,
            ..ActionOutcome::default()
        };
    };
    match create_vm(cfg, datacenter, vm_pool, allocation_policy, next_vm_id, vm_type) {
        Ok((host_id, pes)) => ActionOutcome {
            create_vm_attempted: true,
            create_vm_success: true,
            host_affected_id: Some(host_id),
            cores_changed: pes as i64,
            ..ActionOutcome::default()
        },
        Err(_) => ActionOutcome {
            create_vm_attempted: true,
            invalid_action_taken: true,
            ..ActionOutcome::default()
        },
    }
}

fn try_destroy(target_vm_id: i64, vm_pool: &Rc<RefCell<VmPool>>) -> ActionOutcome {
    if target_vm_id < 0 {
        return ActionOutcome {
            destroy_vm_attempted: true,
            invalid_action_taken: true,
            ..ActionOutcome::default()
        };
    }
    let vm_id = target_vm_id as VmId;
    let mut pool = vm_pool.borrow_mut();
    let Some(vm) = pool.vm(vm_id) else {
        return ActionOutcome {
            destroy_vm_attempted: true,
            invalid_action_taken: true,
            ..ActionOutcome::default()
        };
    };
    if vm.state != VmState::Running {
        return ActionOutcome {
            destroy_vm_attempted: true,
            invalid_action_taken: true,
            ..ActionOutcome::default()
        };
    }
    let host_id = vm.host_id;
    let pes = vm.pes;
    pool.destroy_vm(vm_id);
    ActionOutcome {
        destroy_vm_attempted: true,
        destroy_vm_success: true,
        host_affected_id: host_id,
        cores_changed: -(pes as i64),
        ..ActionOutcome::default()
    }
}

fn vm_dims(cfg: &Configuration, vm_type: VmType) -> (u32, u64, u64, u64) {
    let mult = match vm_type {
        VmType::Small => 1,
        VmType::Medium => cfg.medium_vm_multiplier,
        VmType::Large => cfg.large_vm_multiplier,
    };
    (cfg.small_vm_pes * mult, cfg.small_vm_ram * mult, cfg.small_vm_bw * mult, cfg.small_vm_storage * mult)
}

/// Shared by reset's initial fleet and the create-VM action: finds a host
/// via the allocation policy, reserves its resources, and registers the
/// VM with the pool (which schedules its `submissionDelay` activation).
#[allow(clippy::too_many_arguments)]
fn create_vm(
    cfg: &Configuration,
    datacenter: &mut Datacenter,
    vm_pool: &Rc<RefCell<VmPool>>,
    allocation_policy: &dyn VmAllocationPolicy,
    next_vm_id: &mut VmId,
    vm_type: VmType,
) -> Result<(HostId, u32), SimError> {
    let (pes, ram, bw, storage) = vm_dims(cfg, vm_type);
    let demand = ResourceDemand { pes, ram, bw, storage };
    let host_id = allocation_policy
        .find_host(&demand, &datacenter.hosts)
        .ok_or(SimError::AllocationFailed { vm_id: *next_vm_id as u64 })?;
    let host = datacenter.host_mut(host_id).unwrap();
    let pe_mips = host.pe_mips;
    host.allocate(*next_vm_id, &demand);

    let vm_id = *next_vm_id;
    *next_vm_id += 1;
    let mut vm = VirtualMachine::new(vm_id, pes, pe_mips, ram, bw, storage, vm_type, cfg.vm_startup_delay, cfg.vm_shutdown_delay);
    vm.host_id = Some(host_id);
    vm_pool.borrow_mut().add_vm(vm);
    Ok((host_id, pes))
}

fn build_hosts(cfg: &Configuration) -> Result<Vec<Host>, SimError> {
    let mut hosts = Vec::new();
    let mut id: HostId = 0;
    if cfg.enable_heterogeneous_hosts {
        for (profile, count) in cfg.host_profiles.values() {
            for _ in 0..*count {
                hosts.push(Host::new(
                    id,
                    profile.pes,
                    profile.pe_mips,
                    profile.ram,
                    profile.bw,
                    profile.storage,
                    Box::new(LinearPowerModel::new(profile.p_max, profile.static_percent)),
                ));
                id += 1;
            }
        }
    } else {
        for _ in 0..cfg.hosts_count {
            hosts.push(Host::new(
                id,
                cfg.host_pes,
                cfg.host_pe_mips,
                cfg.host_ram,
                cfg.host_bw,
                cfg.host_storage,
                Box::new(LinearPowerModel::new(cfg.host_p_max, cfg.host_static_percent)),
            ));
            id += 1;
        }
    }
    Ok(hosts)
}

fn build_workload(cfg: &Configuration) -> Result<Box<dyn WorkloadSource>, SimError> {
    let Some(path) = cfg.cloudlet_trace_file.as_ref() else {
        return Ok(Box::new(EmptyWorkloadSource));
    };
    match cfg.workload_mode {
        crate::config::WorkloadMode::Swf => Ok(Box::new(SwfWorkloadSource::from_path(
            path,
            cfg.workload_reader_mips,
            cfg.max_cloudlets_to_create_from_workload_file,
            cfg.max_cloudlet_pes,
            cfg.split_large_cloudlets,
        )?)),
        crate::config::WorkloadMode::Csv => Ok(Box::new(CsvWorkloadSource::from_path(path)?)),
    }
}
