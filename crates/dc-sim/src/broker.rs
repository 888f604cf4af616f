//! Broker: owns the waiting queue and executes the agent's per-step
//! assignment action.

use std::collections::{HashMap, VecDeque};

use crate::cloudlet::Cloudlet;
use crate::common::{CloudletId, VmId};
use crate::error::SimError;
use crate::vm::VmPool;
use crate::workload::WorkloadSource;

pub struct Broker {
    waiting_queue: VecDeque<Cloudlet>,
    arrival_time_by_cloudlet_id: HashMap<CloudletId, f64>,
    finished_wait_times_last_step: Vec<f64>,
    total_arrived_count: u64,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            waiting_queue: VecDeque::new(),
            arrival_time_by_cloudlet_id: HashMap::new(),
            finished_wait_times_last_step: Vec::new(),
            total_arrived_count: 0,
        }
    }

    /// Moves every workload-source item with `arrival_time <= now` into the
    /// waiting queue.
    pub fn poll_arrivals(&mut self, now: f64, source: &mut dyn WorkloadSource) {
        while let Some(cloudlet) = source.next_arriving_by(now) {
            self.arrival_time_by_cloudlet_id.insert(cloudlet.id, cloudlet.arrival_time);
            self.total_arrived_count += 1;
            self.waiting_queue.push_back(cloudlet);
        }
    }

    /// Re-admits a cloudlet freed by a VM destruction (requeue-on-destroy
    /// policy) at the front of the queue, preserving its original arrival
    /// time for wait-time accounting.
    pub fn requeue(&mut self, cloudlet: Cloudlet) {
        self.waiting_queue.push_front(cloudlet);
    }

    pub fn peek_waiting(&self) -> Option<&Cloudlet> {
        self.waiting_queue.front()
    }

    /// Read-only access to the waiting queue by position, for observation
    /// assembly (e.g. the queue's pes distribution).
    pub fn waiting_nth(&self, index: usize) -> Option<&Cloudlet> {
        self.waiting_queue.get(index)
    }

    pub fn has_waiting(&self) -> bool {
        !self.waiting_queue.is_empty()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting_queue.len()
    }

    pub fn total_arrived_count(&self) -> u64 {
        self.total_arrived_count
    }

    /// Dispatches the head of the waiting queue to `vm_id`. Validates the
    /// VM before removing anything from the queue, so a failed assignment
    /// never mutates broker or VM-pool state (invariant 8).
    pub fn assign_cloudlet_to_vm(&mut self, vm_id: VmId, vm_pool: &mut VmPool) -> Result<(), SimError> {
        let Some(head) = self.waiting_queue.front() else {
            return Err(SimError::InvalidAssignment("waiting queue is empty".to_string()));
        };
        let Some(vm) = vm_pool.vm(vm_id) else {
            return Err(SimError::InvalidAssignment(format!("vm {} does not exist", vm_id)));
        };
        if vm.state != crate::vm::VmState::Running {
            return Err(SimError::InvalidAssignment(format!("vm {} is not running", vm_id)));
        }
        if head.pes_required > vm.pes {
            return Err(SimError::InvalidAssignment(format!(
                "vm {} has only {} pes, cloudlet needs {}",
                vm_id, vm.pes, head.pes_required
            )));
        }

        let cloudlet = self.waiting_queue.pop_front().unwrap();
        let dispatched = vm_pool.dispatch(vm_id, cloudlet);
        debug_assert!(dispatched, "validated assignment must dispatch successfully");
        Ok(())
    }

    pub fn record_finished_wait_time(&mut self, wait_time: f64) {
        self.finished_wait_times_last_step.push(wait_time);
    }

    /// Drains the transient per-step wait-time list (cleared on read).
    pub fn take_finished_wait_times(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.finished_wait_times_last_step)
    }

    pub fn arrival_time_of(&self, cloudlet_id: CloudletId) -> Option<f64> {
        self.arrival_time_by_cloudlet_id.get(&cloudlet_id).copied()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::csv::CsvWorkloadSource;

    fn csv_source(rows: &str) -> CsvWorkloadSource {
        CsvWorkloadSource::from_reader(rows.as_bytes()).unwrap()
    }

    #[test]
    fn poll_arrivals_only_admits_cloudlets_at_or_before_now() {
        let mut broker = Broker::new();
        let mut source = csv_source("cloudlet_id,arrival_time,length,pes_required,file_size,output_size\n0,0.5,1000,1,100,100\n1,5.0,1000,1,100,100\n");
        broker.poll_arrivals(1.0, &mut source);
        assert_eq!(broker.waiting_count(), 1);
        broker.poll_arrivals(10.0, &mut source);
        assert_eq!(broker.waiting_count(), 2);
    }

    #[test]
    fn empty_queue_assignment_is_invalid_assignment() {
        let mut sim = sim_core::Simulation::new(1);
        let ctx = sim.create_context("vm_pool");
        let mut vm_pool = VmPool::new(ctx, false);
        let mut broker = Broker::new();
        let err = broker.assign_cloudlet_to_vm(0, &mut vm_pool).unwrap_err();
        assert!(matches!(err, SimError::InvalidAssignment(_)));
    }
}
