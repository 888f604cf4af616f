//! Physical hosts and the datacenter that owns them.
//!
//! Grounded on `dslab-iaas::core::host_manager::HostManager` for the
//! allocate/release bookkeeping, simplified to a synchronous arena owner
//! instead of an event-driven actor: within a single `runOneTimestep`
//! there is no network delay between the broker and the hosts, so no
//! message-passing round trip is needed here.

use crate::common::{AllocationVerdict, HostId, ResourceDemand, VmId};
use crate::power_model::PowerModel;

/// A physical server. Owns zero or more resident VMs during their
/// residency (§3 ownership rule).
pub struct Host {
    pub id: HostId,
    pub pes: u32,
    pub pe_mips: u64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
    pub power_model: Box<dyn PowerModel>,
    pub active: bool,
    resident_vms: Vec<VmId>,
    used_pes: u32,
    used_ram: u64,
    used_bw: u64,
    used_storage: u64,
}

impl Host {
    pub fn new(id: HostId, pes: u32, pe_mips: u64, ram: u64, bw: u64, storage: u64, power_model: Box<dyn PowerModel>) -> Self {
        Self {
            id,
            pes,
            pe_mips,
            ram,
            bw,
            storage,
            power_model,
            active: true,
            resident_vms: Vec::new(),
            used_pes: 0,
            used_ram: 0,
            used_bw: 0,
            used_storage: 0,
        }
    }

    pub fn free_pes(&self) -> u32 {
        self.pes - self.used_pes
    }

    pub fn free_ram(&self) -> u64 {
        self.ram - self.used_ram
    }

    pub fn free_bw(&self) -> u64 {
        self.bw - self.used_bw
    }

    pub fn free_storage(&self) -> u64 {
        self.storage - self.used_storage
    }

    pub fn cpu_load(&self) -> f64 {
        if self.pes == 0 {
            0.0
        } else {
            self.used_pes as f64 / self.pes as f64
        }
    }

    pub fn ram_load(&self) -> f64 {
        if self.ram == 0 {
            0.0
        } else {
            self.used_ram as f64 / self.ram as f64
        }
    }

    pub fn resident_vms(&self) -> &[VmId] {
        &self.resident_vms
    }

    pub fn can_allocate(&self, demand: &ResourceDemand) -> AllocationVerdict {
        if demand.pes > self.free_pes() {
            return AllocationVerdict::NotEnoughPes;
        }
        if demand.ram > self.free_ram() {
            return AllocationVerdict::NotEnoughRam;
        }
        if demand.bw > self.free_bw() {
            return AllocationVerdict::NotEnoughBw;
        }
        if demand.storage > self.free_storage() {
            return AllocationVerdict::NotEnoughStorage;
        }
        AllocationVerdict::Success
    }

    /// Reserves resources for `vm_id`. Caller must have checked
    /// [`Self::can_allocate`] first.
    pub fn allocate(&mut self, vm_id: VmId, demand: &ResourceDemand) {
        self.used_pes += demand.pes;
        self.used_ram += demand.ram;
        self.used_bw += demand.bw;
        self.used_storage += demand.storage;
        self.resident_vms.push(vm_id);
    }

    /// Releases resources held by `vm_id`.
    pub fn release(&mut self, vm_id: VmId, demand: &ResourceDemand) {
        self.used_pes = self.used_pes.saturating_sub(demand.pes);
        self.used_ram = self.used_ram.saturating_sub(demand.ram);
        self.used_bw = self.used_bw.saturating_sub(demand.bw);
        self.used_storage = self.used_storage.saturating_sub(demand.storage);
        self.resident_vms.retain(|&id| id != vm_id);
    }
}

/// Container of hosts with a cost record and the allocation policy bound
/// to it. Owns the scheduler's clock only indirectly (through
/// [`sim_core::Simulation`] held by the facade).
pub struct Datacenter {
    pub hosts: Vec<Host>,
}

impl Datacenter {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }

    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.iter().find(|h| h.id == id)
    }

    pub fn host_mut(&mut self, id: HostId) -> Option<&mut Host> {
        self.hosts.iter_mut().find(|h| h.id == id)
    }

    pub fn max_total_power_w(&self) -> f64 {
        self.hosts.iter().map(|h| h.power_model.max_power()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power_model::LinearPowerModel;

    fn host(id: HostId, pes: u32, ram: u64) -> Host {
        Host::new(id, pes, 2000, ram, 10000, 1_000_000, Box::new(LinearPowerModel::new(300.0, 0.5)))
    }

    #[test]
    fn allocate_and_release_round_trip_leaves_host_empty() {
        let mut h = host(0, 16, 65536);
        let demand = ResourceDemand {
            pes: 4,
            ram: 8192,
            bw: 1000,
            storage: 20000,
        };
        assert_eq!(h.can_allocate(&demand), AllocationVerdict::Success);
        h.allocate(5, &demand);
        assert_eq!(h.free_pes(), 12);
        assert_eq!(h.resident_vms(), &[5]);
        h.release(5, &demand);
        assert_eq!(h.free_pes(), 16);
        assert!(h.resident_vms().is_empty());
    }

    #[test]
    fn oversized_demand_is_rejected() {
        let h = host(0, 4, 8192);
        let demand = ResourceDemand {
            pes: 8,
            ram: 1024,
            bw: 100,
            storage: 100,
        };
        assert_eq!(h.can_allocate(&demand), AllocationVerdict::NotEnoughPes);
    }
}
