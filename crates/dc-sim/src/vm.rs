//! Virtual machines and the space-shared cloudlet scheduler.
//!
//! A cloudlet's finish time is computed once at admission, as a closed
//! form `remaining_mi / (pe_speed * allocated_pes)`, and scheduled as a
//! single future event — grounded on
//! `dslab-compute::multicore::Compute::run`'s `CompFinished` scheduling,
//! which is valid here because space-shared admission never preempts a
//! running cloudlet's allocated pes.

use std::collections::{HashMap, VecDeque};

use sim_core::cast;
use sim_core::event::EventId;
use sim_core::{Event, EventHandler, SimulationContext};

use crate::cloudlet::{Cloudlet, CloudletState};
use crate::common::{CloudletId, HostId, ResourceDemand, VmId, VmType};
use crate::events::cloudlet::CloudletFinished;
use crate::events::vm::{VmDestroyed, VmStarted};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Pending,
    Running,
    Failed,
    Destroyed,
}

/// A running cloudlet's allocation on its VM, tracked so the VM knows its
/// free pes while cloudlets are in flight.
struct RunningCloudlet {
    cloudlet_id: CloudletId,
    allocated_pes: u32,
    /// The scheduled `CloudletFinished` event, cancelled if the VM is
    /// destroyed before the cloudlet completes.
    completion_event: EventId,
}

pub struct VirtualMachine {
    pub id: VmId,
    pub host_id: Option<HostId>,
    pub pes: u32,
    pub pe_mips: u64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
    pub vm_type: VmType,
    pub submission_delay: f64,
    pub shutdown_delay: f64,
    pub state: VmState,
    running: Vec<RunningCloudlet>,
    waiting: VecDeque<CloudletId>,
}

impl VirtualMachine {
    pub fn new(id: VmId, pes: u32, pe_mips: u64, ram: u64, bw: u64, storage: u64, vm_type: VmType, submission_delay: f64, shutdown_delay: f64) -> Self {
        Self {
            id,
            host_id: None,
            pes,
            pe_mips,
            ram,
            bw,
            storage,
            vm_type,
            submission_delay,
            shutdown_delay,
            state: VmState::Pending,
            running: Vec::new(),
            waiting: VecDeque::new(),
        }
    }

    pub fn free_pes(&self) -> u32 {
        self.pes - self.running.iter().map(|r| r.allocated_pes).sum::<u32>()
    }

    pub fn cpu_percent(&self) -> f64 {
        if self.pes == 0 {
            0.0
        } else {
            self.running.iter().map(|r| r.allocated_pes).sum::<u32>() as f64 / self.pes as f64
        }
    }

    pub fn running_cloudlets(&self) -> impl Iterator<Item = CloudletId> + '_ {
        self.running.iter().map(|r| r.cloudlet_id)
    }

    pub fn waiting_cloudlets(&self) -> impl Iterator<Item = CloudletId> + '_ {
        self.waiting.iter().copied()
    }
}

/// Owns every VM and cloudlet in the episode, and is registered as a
/// [`sim_core`] event handler so cloudlet completions and delayed VM
/// lifecycle transitions are resolved during `runOneTimestep`.
pub struct VmPool {
    ctx: SimulationContext,
    vms: Vec<VirtualMachine>,
    cloudlets: HashMap<CloudletId, Cloudlet>,
    pub finished_since_last_poll: Vec<CloudletId>,
    pub requeue_on_destroy: bool,
    /// Cloudlets freed by a VM destruction that must be handed back to the
    /// broker's waiting queue; drained by [`Self::take_pending_requeues`].
    pending_requeues: Vec<Cloudlet>,
}

impl VmPool {
    pub fn new(ctx: SimulationContext, requeue_on_destroy: bool) -> Self {
        Self {
            ctx,
            vms: Vec::new(),
            cloudlets: HashMap::new(),
            finished_since_last_poll: Vec::new(),
            requeue_on_destroy,
            pending_requeues: Vec::new(),
        }
    }

    pub fn take_pending_requeues(&mut self) -> Vec<Cloudlet> {
        std::mem::take(&mut self.pending_requeues)
    }

    /// Drains host residency for every VM that reached `Destroyed` state
    /// since the last call, so the facade can release the corresponding
    /// host resources exactly once. Idempotent: a VM's `host_id` is taken
    /// (set to `None`) as it's reported.
    pub fn drain_released_hosts(&mut self) -> Vec<(VmId, HostId, ResourceDemand)> {
        let mut released = Vec::new();
        for vm in self.vms.iter_mut() {
            if vm.state == VmState::Destroyed {
                if let Some(host_id) = vm.host_id.take() {
                    released.push((
                        vm.id,
                        host_id,
                        ResourceDemand {
                            pes: vm.pes,
                            ram: vm.ram,
                            bw: vm.bw,
                            storage: vm.storage,
                        },
                    ));
                }
            }
        }
        released
    }

    pub fn vm(&self, id: VmId) -> Option<&VirtualMachine> {
        self.vms.iter().find(|v| v.id == id)
    }

    pub fn vm_mut(&mut self, id: VmId) -> Option<&mut VirtualMachine> {
        self.vms.iter_mut().find(|v| v.id == id)
    }

    pub fn vms(&self) -> &[VirtualMachine] {
        &self.vms
    }

    pub fn cloudlet(&self, id: CloudletId) -> Option<&Cloudlet> {
        self.cloudlets.get(&id)
    }

    /// Registers a newly-allocated VM (host already assigned by the
    /// caller) and schedules its transition to `Running` after
    /// `submissionDelay`.
    pub fn add_vm(&mut self, vm: VirtualMachine) {
        let id = vm.id;
        self.vms.push(vm);
        let delay = self.vm(id).unwrap().submission_delay;
        self.ctx.emit_self(VmStarted { vm_id: id }, delay);
    }

    /// Marks a VM for destruction; running cloudlets are failed (or
    /// requeued, if configured) once `shutdownDelay` elapses.
    pub fn destroy_vm(&mut self, id: VmId) {
        if let Some(vm) = self.vm(id) {
            let delay = vm.shutdown_delay;
            self.ctx.emit_self(VmDestroyed { vm_id: id }, delay);
        }
    }

    /// Dispatches a cloudlet to `vm_id`. Starts immediately if the VM has
    /// enough free pes, otherwise buffers it locally in FIFO order.
    /// Returns `false` if the VM is missing, not running, or the
    /// cloudlet's pes requirement exceeds the VM's total pes.
    pub fn dispatch(&mut self, vm_id: VmId, mut cloudlet: Cloudlet) -> bool {
        let now = self.ctx.time();
        let Some(vm) = self.vm_mut(vm_id) else { return false };
        if vm.state != VmState::Running || cloudlet.pes_required > vm.pes {
            return false;
        }
        cloudlet.vm_id = Some(vm_id);
        cloudlet.submission_time = Some(now);
        let cloudlet_id = cloudlet.id;

        if vm.free_pes() >= cloudlet.pes_required {
            self.start_cloudlet(vm_id, cloudlet);
        } else {
            cloudlet.state = CloudletState::Waiting;
            self.cloudlets.insert(cloudlet_id, cloudlet);
            self.vm_mut(vm_id).unwrap().waiting.push_back(cloudlet_id);
        }
        true
    }

    fn start_cloudlet(&mut self, vm_id: VmId, mut cloudlet: Cloudlet) {
        let now = self.ctx.time();
        let vm = self.vm_mut(vm_id).unwrap();
        let allocated_pes = cloudlet.pes_required;
        let duration = cloudlet.remaining_mi as f64 / (vm.pe_mips as f64 * allocated_pes as f64);
        cloudlet.state = CloudletState::Running;
        cloudlet.start_time = Some(now);
        let cloudlet_id = cloudlet.id;
        let completion_event = self.ctx.emit_self(CloudletFinished { cloudlet_id }, duration.max(0.0));
        let vm = self.vm_mut(vm_id).unwrap();
        vm.running.push(RunningCloudlet { cloudlet_id, allocated_pes, completion_event });
        self.cloudlets.insert(cloudlet_id, cloudlet);
    }

    fn finish_cloudlet(&mut self, cloudlet_id: CloudletId) {
        let now = self.ctx.time();
        let Some(cloudlet) = self.cloudlets.get_mut(&cloudlet_id) else { return };
        let vm_id = cloudlet.vm_id.unwrap();
        cloudlet.remaining_mi = 0;
        cloudlet.state = CloudletState::Finished;
        cloudlet.finish_time = Some(now);
        self.finished_since_last_poll.push(cloudlet_id);

        let vm = self.vm_mut(vm_id).unwrap();
        vm.running.retain(|r| r.cloudlet_id != cloudlet_id);
        self.promote_waiting(vm_id);
    }

    /// Promotes locally-buffered cloudlets onto freed pes, in FIFO order.
    fn promote_waiting(&mut self, vm_id: VmId) {
        loop {
            let vm = self.vm_mut(vm_id).unwrap();
            let Some(&head_id) = vm.waiting.front() else { return };
            let head_pes = self.cloudlets.get(&head_id).unwrap().pes_required;
            if vm.free_pes() < head_pes {
                return;
            }
            vm.waiting.pop_front();
            let cloudlet = self.cloudlets.remove(&head_id).unwrap();
            self.start_cloudlet(vm_id, cloudlet);
        }
    }

    fn activate_vm(&mut self, vm_id: VmId) {
        if let Some(vm) = self.vm_mut(vm_id) {
            vm.state = VmState::Running;
        }
    }

    /// Resolves a pending VM destruction: any cloudlet still running on it
    /// is failed, unless `requeue_on_destroy` is set, in which case it is
    /// returned to the caller so it can be re-queued at the broker.
    fn resolve_destroy(&mut self, vm_id: VmId) -> Vec<Cloudlet> {
        let Some(vm) = self.vm_mut(vm_id) else { return Vec::new() };
        vm.state = VmState::Destroyed;
        let running: Vec<CloudletId> = vm.running.iter().map(|r| r.cloudlet_id).collect();
        let completion_events: Vec<EventId> = vm.running.iter().map(|r| r.completion_event).collect();
        let waiting: Vec<CloudletId> = vm.waiting.drain(..).collect();
        vm.running.clear();

        // Cancel the scheduled `CloudletFinished` events so a stale
        // completion can't fire later and clobber a failed/requeued
        // cloudlet (or a live one that reuses the same id after reassignment).
        for event_id in completion_events {
            self.ctx.cancel_event(event_id);
        }

        let mut requeued = Vec::new();
        for id in running.into_iter().chain(waiting) {
            if let Some(mut cloudlet) = self.cloudlets.remove(&id) {
                if self.requeue_on_destroy {
                    cloudlet.vm_id = None;
                    cloudlet.state = CloudletState::Arrived;
                    cloudlet.start_time = None;
                    cloudlet.submission_time = None;
                    requeued.push(cloudlet);
                } else {
                    cloudlet.state = CloudletState::Failed;
                    cloudlet.finish_time = Some(self.ctx.time());
                    self.cloudlets.insert(id, cloudlet);
                }
            }
        }
        requeued
    }
}

impl EventHandler for VmPool {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            CloudletFinished { cloudlet_id } => {
                self.finish_cloudlet(cloudlet_id);
            }
            VmStarted { vm_id } => {
                self.activate_vm(vm_id);
            }
            VmDestroyed { vm_id } => {
                let requeued = self.resolve_destroy(vm_id);
                if !requeued.is_empty() {
                    log::debug!("{} cloudlet(s) requeued after vm {} destroyed", requeued.len(), vm_id);
                }
                self.pending_requeues.extend(requeued);
            }
        })
    }
}
