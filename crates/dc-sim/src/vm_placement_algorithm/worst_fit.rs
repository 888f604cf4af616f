//! Worst-fit: spread load onto the most-spare-capacity host.

use crate::common::{AllocationVerdict, HostId, ResourceDemand};
use crate::host::Host;
use crate::vm_placement_algorithm::VmAllocationPolicy;

#[derive(Debug, Clone, Copy, Default)]
pub struct WorstFit;

impl VmAllocationPolicy for WorstFit {
    fn find_host(&self, demand: &ResourceDemand, hosts: &[Host]) -> Option<HostId> {
        hosts
            .iter()
            .filter(|h| h.can_allocate(demand) == AllocationVerdict::Success)
            .max_by_key(|h| h.free_pes())
            .map(|h| h.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power_model::LinearPowerModel;

    fn host(id: HostId, pes: u32) -> Host {
        Host::new(id, pes, 2000, 65536, 10000, 1_000_000, Box::new(LinearPowerModel::new(300.0, 0.5)))
    }

    #[test]
    fn picks_the_roomiest_host() {
        let hosts = vec![host(0, 16), host(1, 4), host(2, 8)];
        let demand = ResourceDemand {
            pes: 2,
            ram: 100,
            bw: 100,
            storage: 100,
        };
        assert_eq!(WorstFit.find_host(&demand, &hosts), Some(0));
    }
}
