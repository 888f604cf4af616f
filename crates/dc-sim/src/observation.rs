//! Fixed-shape observation assembly.
//!
//! Sized to `V_max` ([`crate::config::Configuration::vm_slot_bound`]) so the
//! controller's tensor shape never changes across steps, regardless of the
//! current VM count.

use serde::Serialize;

use crate::broker::Broker;
use crate::host::Datacenter;
use crate::vm::VmPool;

#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub host_loads: Vec<f64>,
    pub host_ram_usage_ratio: Vec<f64>,
    pub vm_loads: Vec<f64>,
    pub vm_types: Vec<i32>,
    pub vm_host_map: Vec<i64>,
    pub vm_available_pes: Vec<u32>,
    pub waiting_cloudlets: u64,
    pub next_cloudlet_pes: u32,
    pub next_cloudlet_mi: u64,
    pub next_cloudlet_wait_time: f64,
    pub queue_pes_distribution: [u64; 3],
    pub completed_cloudlets_last_10_steps: u64,
    pub infrastructure_tree: Vec<i64>,
    pub actual_vm_count: u64,
    pub actual_host_count: u64,
}

/// Assembles the observation. VM ids `>= v_max` are silently omitted from
/// the padded arrays (logged by the caller) but keep running normally.
pub fn assemble(
    datacenter: &Datacenter,
    vm_pool: &VmPool,
    broker: &Broker,
    v_max: u32,
    now: f64,
    completed_last_10_steps: u64,
) -> Observation {
    let h = datacenter.hosts.len();
    let mut host_loads = vec![0.0; h];
    let mut host_ram_usage_ratio = vec![0.0; h];
    for (i, host) in datacenter.hosts.iter().enumerate() {
        if host.active {
            host_loads[i] = host.cpu_load();
            host_ram_usage_ratio[i] = host.ram_load();
        }
    }

    let v_max = v_max as usize;
    let mut vm_loads = vec![0.0; v_max];
    let mut vm_types = vec![0; v_max];
    let mut vm_host_map = vec![-1i64; v_max];
    let mut vm_available_pes = vec![0u32; v_max];
    let mut actual_vm_count = 0u64;
    for vm in vm_pool.vms() {
        actual_vm_count += 1;
        let slot = vm.id as usize;
        if slot >= v_max {
            log::warn!("vm {} exceeds v_max={}, omitted from observation", vm.id, v_max);
            continue;
        }
        vm_loads[slot] = vm.cpu_percent();
        vm_types[slot] = vm.vm_type.as_code();
        vm_host_map[slot] = vm.host_id.map(|id| id as i64).unwrap_or(-1);
        vm_available_pes[slot] = vm.free_pes();
    }

    let waiting_cloudlets = broker.waiting_count() as u64;
    let (next_cloudlet_pes, next_cloudlet_mi, next_cloudlet_wait_time) = match broker.peek_waiting() {
        Some(c) => (c.pes_required, c.length_mi, now - c.arrival_time),
        None => (0, 0, 0.0),
    };

    let mut queue_pes_distribution = [0u64; 3];
    for offset in 0..broker.waiting_count() {
        if let Some(c) = broker.waiting_nth(offset) {
            let bucket = match c.pes_required {
                1..=2 => 0,
                3..=4 => 1,
                _ => 2,
            };
            queue_pes_distribution[bucket] += 1;
        }
    }

    let infrastructure_tree = build_infrastructure_tree(datacenter, vm_pool);

    Observation {
        host_loads,
        host_ram_usage_ratio,
        vm_loads,
        vm_types,
        vm_host_map,
        vm_available_pes,
        waiting_cloudlets,
        next_cloudlet_pes,
        next_cloudlet_mi,
        next_cloudlet_wait_time,
        queue_pes_distribution,
        completed_cloudlets_last_10_steps: completed_last_10_steps,
        infrastructure_tree,
        actual_vm_count,
        actual_host_count: h as u64,
    }
}

/// `[total_pes, H, (host_pes, vm_count, (vm_pes, cloudlet_count, (cloudlet_pes, 0)*)*)*]`.
fn build_infrastructure_tree(datacenter: &Datacenter, vm_pool: &VmPool) -> Vec<i64> {
    let total_pes: i64 = datacenter.hosts.iter().map(|h| h.pes as i64).sum();
    let mut tree = vec![total_pes, datacenter.hosts.len() as i64];
    for host in &datacenter.hosts {
        let vms_on_host: Vec<_> = vm_pool.vms().iter().filter(|v| v.host_id == Some(host.id)).collect();
        tree.push(host.pes as i64);
        tree.push(vms_on_host.len() as i64);
        for vm in vms_on_host {
            let running: Vec<_> = vm.running_cloudlets().collect();
            tree.push(vm.pes as i64);
            tree.push(running.len() as i64);
            for cloudlet_id in running {
                if let Some(cloudlet) = vm_pool.cloudlet(cloudlet_id) {
                    tree.push(cloudlet.pes_required as i64);
                    tree.push(0);
                }
            }
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power_model::LinearPowerModel;
    use crate::host::Host;
    use crate::workload::csv::CsvWorkloadSource;

    #[test]
    fn empty_datacenter_yields_zeroed_arrays() {
        let dc = Datacenter::new(vec![Host::new(0, 16, 2000, 65536, 10000, 1_000_000, Box::new(LinearPowerModel::new(300.0, 0.5)))]);
        let mut sim = sim_core::Simulation::new(1);
        let ctx = sim.create_context("vm_pool");
        let vm_pool = VmPool::new(ctx, false);
        let broker = Broker::new();
        let obs = assemble(&dc, &vm_pool, &broker, 10, 0.0, 0);
        assert_eq!(obs.host_loads, vec![0.0]);
        assert_eq!(obs.vm_loads.len(), 10);
        assert_eq!(obs.actual_vm_count, 0);
        assert_eq!(obs.actual_host_count, 1);
    }

    #[test]
    fn waiting_queue_head_features_reflect_the_oldest_cloudlet() {
        let dc = Datacenter::new(vec![]);
        let mut sim = sim_core::Simulation::new(1);
        let ctx = sim.create_context("vm_pool");
        let vm_pool = VmPool::new(ctx, false);
        let mut broker = Broker::new();
        let mut source = CsvWorkloadSource::from_reader(
            "cloudlet_id,arrival_time,length,pes_required,file_size,output_size\n0,0.0,1000,2,100,100\n".as_bytes(),
        )
        .unwrap();
        broker.poll_arrivals(0.0, &mut source);
        let obs = assemble(&dc, &vm_pool, &broker, 10, 5.0, 0);
        assert_eq!(obs.waiting_cloudlets, 1);
        assert_eq!(obs.next_cloudlet_pes, 2);
        assert_eq!(obs.next_cloudlet_mi, 1000);
        assert_eq!(obs.next_cloudlet_wait_time, 5.0);
        assert_eq!(obs.queue_pes_distribution, [1, 0, 0]);
    }
}
