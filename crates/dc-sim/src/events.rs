//! Typed events exchanged through the in-process message bus
//! ([`sim_core::Simulation`]'s event queue), grouped by subject the way
//! `dslab-iaas::core::events` groups `allocation`/`vm`/`monitoring` events
//! into submodules.

pub mod cloudlet {
    use serde::Serialize;

    use crate::common::CloudletId;

    /// Emitted by [`crate::vm::VmPool`] to itself when a running cloudlet's
    /// remaining MI reaches zero.
    #[derive(Serialize, Clone)]
    pub struct CloudletFinished {
        pub cloudlet_id: CloudletId,
    }
}

pub mod vm {
    use serde::Serialize;

    use crate::common::VmId;

    /// Emitted by [`crate::vm::VmPool`] to itself after `submissionDelay`
    /// elapses for a newly-created VM.
    #[derive(Serialize, Clone)]
    pub struct VmStarted {
        pub vm_id: VmId,
    }

    /// Emitted by [`crate::vm::VmPool`] to itself after `shutdownDelay`
    /// elapses for a VM marked for destruction.
    #[derive(Serialize, Clone)]
    pub struct VmDestroyed {
        pub vm_id: VmId,
    }
}
