//! End-to-end episode scenarios exercised through the `Gateway` facade.
//! All use `simulation_timestep=1`.

use std::collections::HashMap;
use std::io::Write;

use dc_sim::facade::{Action, Gateway};
use dc_sim::config::{ConfigurationRaw, HostProfile, WorkloadMode};

fn noop() -> Action {
    Action::Structured {
        action_type: 0,
        target_vm_id: -1,
        target_host_id: -1,
        vm_type_index: 0,
    }
}

#[test]
fn empty_run_energy_reward_is_constant_and_termination_follows_the_formula() {
    let mut gateway = Gateway::new().unwrap();
    gateway
        .configure(ConfigurationRaw {
            hosts_count: Some(4),
            simulation_timestep: Some(1.0),
            reward_energy_coef: Some(1.0),
            ..Default::default()
        })
        .unwrap();
    gateway.reset(1).unwrap();

    let first = gateway.step(noop()).unwrap();
    assert!((first.reward - first.info.reward_energy).abs() < 1e-9, "only the energy term should be non-zero");
    assert!(first.info.reward_energy < 0.0);

    let second = gateway.step(noop()).unwrap();
    assert!((second.info.reward_energy - first.info.reward_energy).abs() < 1e-9, "idle energy penalty is constant per step");

    // With 0 initial VMs and an empty workload, the termination formula
    // (workload exhausted && no waiting && no running) is already
    // satisfied from the first step; see DESIGN.md for why this differs
    // from the scenario's illustrative "ten steps then terminate" framing.
    assert!(first.terminated);
}

#[test]
fn single_assign_completes_the_cloudlet_within_the_step() {
    let mut gateway = Gateway::new().unwrap();
    let mut trace_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(trace_file, "cloudlet_id,arrival_time,length,pes_required,file_size,output_size").unwrap();
    writeln!(trace_file, "0,0.0,2000,1,0,0").unwrap();

    gateway
        .configure(ConfigurationRaw {
            hosts_count: Some(1),
            host_pes: Some(16),
            host_pe_mips: Some(2000),
            initial_s_vm_count: Some(1),
            small_vm_pes: Some(2),
            vm_startup_delay: Some(0.0),
            workload_mode: Some(WorkloadMode::Csv),
            cloudlet_trace_file: Some(trace_file.path().to_str().unwrap().to_string()),
            simulation_timestep: Some(1.0),
            ..Default::default()
        })
        .unwrap();
    let (reset_obs, _) = gateway.reset(1).unwrap();
    assert_eq!(reset_obs.waiting_cloudlets, 1, "the t=0 arrival must be admitted to the queue by reset");

    let result = gateway.step(Action::Simple { target_vm_id: 0 }).unwrap();
    assert!(result.info.assignment_success);
    assert!(!result.info.invalid_action_taken);
    assert_eq!(result.info.episode_completed_cloudlets, 1);
    assert_eq!(result.observation.waiting_cloudlets, 0);
}

#[test]
fn invalid_assign_leaves_the_queue_untouched() {
    let mut gateway = Gateway::new().unwrap();
    let mut trace_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(trace_file, "cloudlet_id,arrival_time,length,pes_required,file_size,output_size").unwrap();
    writeln!(trace_file, "0,0.0,2000,1,0,0").unwrap();

    gateway
        .configure(ConfigurationRaw {
            hosts_count: Some(1),
            initial_s_vm_count: Some(1),
            workload_mode: Some(WorkloadMode::Csv),
            cloudlet_trace_file: Some(trace_file.path().to_str().unwrap().to_string()),
            simulation_timestep: Some(1.0),
            reward_invalid_action_coef: Some(1.0),
            ..Default::default()
        })
        .unwrap();
    gateway.reset(1).unwrap();

    let result = gateway.step(Action::Simple { target_vm_id: 99 }).unwrap();
    assert!(!result.info.assignment_success);
    assert!(result.info.invalid_action_taken);
    assert_eq!(result.info.reward_invalid_action, -1.0);
    assert_eq!(result.observation.waiting_cloudlets, 1);
}

#[test]
fn green_cap_splits_energy_as_in_the_spec_scenario() {
    let mut green_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(green_file, "power_kw").unwrap();
    writeln!(green_file, "0.1").unwrap();

    let mut over_capacity = Gateway::new().unwrap();
    over_capacity
        .configure(ConfigurationRaw {
            hosts_count: Some(1),
            host_p_max: Some(500.0),
            host_static_percent: Some(1.0),
            simulation_timestep: Some(1.0),
            green_energy_enabled: Some(true),
            wind_data_file: Some(green_file.path().to_str().unwrap().to_string()),
            ..Default::default()
        })
        .unwrap();
    over_capacity.reset(1).unwrap();
    let mut last = None;
    for _ in 0..10 {
        last = Some(over_capacity.step(noop()).unwrap());
    }
    let info = last.unwrap().info;
    assert!((info.cumulative_green_energy_wh - 100.0 * 10.0 / 3600.0).abs() < 1e-6);
    assert!((info.cumulative_brown_energy_wh - 400.0 * 10.0 / 3600.0).abs() < 1e-6);
    assert!(info.total_wasted_green_wh.abs() < 1e-6);

    let mut under_capacity = Gateway::new().unwrap();
    under_capacity
        .configure(ConfigurationRaw {
            hosts_count: Some(1),
            host_p_max: Some(50.0),
            host_static_percent: Some(1.0),
            simulation_timestep: Some(1.0),
            green_energy_enabled: Some(true),
            wind_data_file: Some(green_file.path().to_str().unwrap().to_string()),
            ..Default::default()
        })
        .unwrap();
    under_capacity.reset(1).unwrap();
    let mut last = None;
    for _ in 0..10 {
        last = Some(under_capacity.step(noop()).unwrap());
    }
    let info = last.unwrap().info;
    assert!((info.cumulative_green_energy_wh - 50.0 * 10.0 / 3600.0).abs() < 1e-6);
    assert!((info.total_wasted_green_wh - 50.0 * 10.0 / 3600.0).abs() < 1e-6);
}

#[test]
fn heterogeneous_hosts_report_the_spec_scenarios_max_and_idle_power() {
    let mut profiles = HashMap::new();
    profiles.insert(
        "small".to_string(),
        (
            HostProfile {
                pes: 16,
                pe_mips: 2000,
                ram: 65536,
                bw: 10000,
                storage: 1_000_000,
                p_max: 200.0,
                static_percent: 0.7,
            },
            1,
        ),
    );
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
            1,
        ),
    );

    let mut gateway = Gateway::new().unwrap();
    gateway
        .configure(ConfigurationRaw {
            enable_heterogeneous_hosts: Some(true),
            hosts_count: Some(2),
            host_profiles: Some(profiles),
            simulation_timestep: Some(1.0),
            ..Default::default()
        })
        .unwrap();
    gateway.reset(1).unwrap();

    let idle = gateway.step(noop()).unwrap();
    assert!((idle.info.current_power_w - 420.0).abs() < 1e-6);
}

#[test]
fn destroying_a_vm_cancels_its_running_cloudlets_completion_event() {
    let mut gateway = Gateway::new().unwrap();
    let mut trace_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(trace_file, "cloudlet_id,arrival_time,length,pes_required,file_size,output_size").unwrap();
    // length=10000, pe_mips=2000, pes_required=1 -> completion 5s after it starts running.
    writeln!(trace_file, "0,0.0,10000,1,0,0").unwrap();

    gateway
        .configure(ConfigurationRaw {
            hosts_count: Some(1),
            host_pes: Some(16),
            host_pe_mips: Some(2000),
            initial_s_vm_count: Some(1),
            small_vm_pes: Some(2),
            vm_startup_delay: Some(0.0),
            vm_shutdown_delay: Some(0.0),
            workload_mode: Some(WorkloadMode::Csv),
            cloudlet_trace_file: Some(trace_file.path().to_str().unwrap().to_string()),
            simulation_timestep: Some(1.0),
            ..Default::default()
        })
        .unwrap();
    gateway.reset(1).unwrap();

    // Step 1 (t: 0 -> 1): assign the cloudlet, which starts running with a
    // completion scheduled for t=5.
    let step1 = gateway
        .step(Action::Structured {
            action_type: 1,
            target_vm_id: 0,
            target_host_id: -1,
            vm_type_index: 0,
        })
        .unwrap();
    assert!(step1.info.assignment_success);

    // Step 2 (t: 1 -> 2): destroy the VM before the cloudlet finishes. With
    // vm_shutdown_delay=0.0 the destruction resolves immediately, which must
    // cancel the pending completion event rather than leave it scheduled.
    let step2 = gateway
        .step(Action::Structured {
            action_type: 3,
            target_vm_id: 0,
            target_host_id: -1,
            vm_type_index: 0,
        })
        .unwrap();
    assert!(step2.info.destroy_vm_success);
    assert_eq!(step2.info.episode_completed_cloudlets, 0);

    // Steps 3-7 (t: 2 -> 7) step past the original t=5 completion time. If
    // the stale `CloudletFinished` event weren't cancelled, it would fire
    // here and double-count the cloudlet as completed despite having
    // already failed at destruction.
    let mut last = step2;
    for _ in 0..5 {
        last = gateway.step(noop()).unwrap();
    }
    assert_eq!(last.info.episode_completed_cloudlets, 0, "a destroyed VM's stale completion must not resurrect its cloudlet");
}

#[test]
fn truncation_fires_at_max_episode_length_with_work_still_pending() {
    let mut trace_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(trace_file, "cloudlet_id,arrival_time,length,pes_required,file_size,output_size").unwrap();
    for id in 0..1000u64 {
        writeln!(trace_file, "{},0.0,1000000,1,0,0", id).unwrap();
    }

    let mut gateway = Gateway::new().unwrap();
    gateway
        .configure(ConfigurationRaw {
            hosts_count: Some(4),
            max_episode_length: Some(5),
            workload_mode: Some(WorkloadMode::Csv),
            cloudlet_trace_file: Some(trace_file.path().to_str().unwrap().to_string()),
            simulation_timestep: Some(1.0),
            ..Default::default()
        })
        .unwrap();
    gateway.reset(1).unwrap();

    let mut last = None;
    for _ in 0..5 {
        last = Some(gateway.step(noop()).unwrap());
    }
    let result = last.unwrap();
    assert!(result.truncated);
    assert!(!result.terminated);
    assert!(result.info.episode_completed_cloudlets < 1000);
}
