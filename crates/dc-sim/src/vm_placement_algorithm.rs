//! VM allocation policy: where a newly-created VM lands.
//!
//! Grounded on `dslab-iaas::core::vm_placement_algorithm::VMPlacementAlgorithm`,
//! generalized from "monitoring-service-aware" to a plain synchronous
//! `&[Host]` view since this engine has no network delay between the
//! scheduler and the hosts within a timestep.

use crate::common::{AllocationVerdict, HostId, ResourceDemand};
use crate::host::Host;

pub mod best_fit;
pub mod worst_fit;

/// Capability for selecting a host for a VM. The default is
/// [`FirstFitSmallestRemainingRam`]; alternate tagged variants live in
/// [`best_fit`] and [`worst_fit`].
pub trait VmAllocationPolicy {
    /// Returns the chosen host's id, or `None` if no host can accommodate
    /// the demand (the caller raises `AllocationFailed`).
    fn find_host(&self, demand: &ResourceDemand, hosts: &[Host]) -> Option<HostId>;
}

/// Default policy: among hosts with enough free pes, prefer the one with
/// the most free pes (spreads load rather than packing tightly); ties
/// broken by the smallest remaining RAM.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFitSmallestRemainingRam;

impl VmAllocationPolicy for FirstFitSmallestRemainingRam {
    fn find_host(&self, demand: &ResourceDemand, hosts: &[Host]) -> Option<HostId> {
        hosts
            .iter()
            .filter(|h| h.can_allocate(demand) == AllocationVerdict::Success)
            .max_by(|a, b| {
                a.free_pes()
                    .cmp(&b.free_pes())
                    .then_with(|| b.free_ram().cmp(&a.free_ram()))
            })
            .map(|h| h.id)
    }
}

/// Resolves a policy by name, mirroring
/// `dslab-iaas::core::vm_placement_algorithm::placement_algorithm_resolver`.
pub fn resolver(name: &str) -> Box<dyn VmAllocationPolicy> {
    match name {
        "FirstFit" | "" => Box::new(FirstFitSmallestRemainingRam),
        "BestFit" => Box::new(best_fit::BestFit),
        "WorstFit" => Box::new(worst_fit::WorstFit),
        other => panic!("unknown vm allocation policy: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power_model::LinearPowerModel;

    fn demand(pes: u32) -> ResourceDemand {
        ResourceDemand {
            pes,
            ram: 1024,
            bw: 100,
            storage: 100,
        }
    }

    fn host(id: HostId, pes: u32) -> Host {
        Host::new(id, pes, 2000, 65536, 10000, 1_000_000, Box::new(LinearPowerModel::new(300.0, 0.5)))
    }

    #[test]
    fn picks_the_host_with_the_most_free_pes() {
        let hosts = vec![host(0, 4), host(1, 16), host(2, 8)];
        let chosen = FirstFitSmallestRemainingRam.find_host(&demand(2), &hosts).unwrap();
        assert_eq!(chosen, 1);
    }

    #[test]
    fn returns_none_when_no_host_fits() {
        let hosts = vec![host(0, 2)];
        assert!(FirstFitSmallestRemainingRam.find_host(&demand(4), &hosts).is_none());
    }

    #[test]
    fn ties_on_free_pes_break_by_smallest_remaining_ram() {
        let mut a = host(0, 8);
        let b = host(1, 8);
        a.allocate(99, &ResourceDemand { pes: 0, ram: 1000, bw: 0, storage: 0 });
        let hosts = vec![a, b];
        let chosen = FirstFitSmallestRemainingRam.find_host(&demand(2), &hosts).unwrap();
        assert_eq!(chosen, 0);
    }
}
