//! Arena ids and small shared data structures.
//!
//! Entities live in arena vectors owned by their respective components
//! ([`crate::host::Datacenter`], [`crate::broker::Broker`],
//! [`crate::vm::VmPool`]) and are referred to by these stable integer ids
//! rather than back-pointers, so components never hold cyclic references
//! to one another.

use serde::Serialize;

/// Identifier of a physical host, stable for the lifetime of the episode.
pub type HostId = u32;

/// Identifier of a virtual machine, monotonic within an episode.
pub type VmId = u32;

/// Identifier of a cloudlet, monotonic within an episode.
pub type CloudletId = u64;

/// VM size tag. Medium and Large are integer multiples of Small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub enum VmType {
    Small,
    Medium,
    Large,
}

impl VmType {
    /// Observation encoding: `0=empty, 1=S, 2=M, 3=L`.
    pub fn as_code(&self) -> i32 {
        match self {
            VmType::Small => 1,
            VmType::Medium => 2,
            VmType::Large => 3,
        }
    }

    pub fn from_index(i: u32) -> Option<Self> {
        match i {
            0 => Some(VmType::Small),
            1 => Some(VmType::Medium),
            2 => Some(VmType::Large),
            _ => None,
        }
    }
}

/// A resource demand to be checked against a host's free capacity.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDemand {
    pub pes: u32,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
}

/// Result of checking whether a [`ResourceDemand`] fits on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationVerdict {
    Success,
    NotEnoughPes,
    NotEnoughRam,
    NotEnoughBw,
    NotEnoughStorage,
    HostNotFound,
}
