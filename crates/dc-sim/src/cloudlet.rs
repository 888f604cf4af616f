//! Cloudlets: units of compute work.

use crate::common::{CloudletId, VmId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudletState {
    Arrived,
    Waiting,
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Cloudlet {
    pub id: CloudletId,
    pub arrival_time: f64,
    pub length_mi: u64,
    pub remaining_mi: u64,
    pub pes_required: u32,
    pub file_size: u64,
    pub output_size: u64,
    pub vm_id: Option<VmId>,
    pub state: CloudletState,
    pub submission_time: Option<f64>,
    pub start_time: Option<f64>,
    pub finish_time: Option<f64>,
}

impl Cloudlet {
    pub fn new(id: CloudletId, arrival_time: f64, length_mi: u64, pes_required: u32, file_size: u64, output_size: u64) -> Self {
        Self {
            id,
            arrival_time,
            length_mi,
            remaining_mi: length_mi,
            pes_required,
            file_size,
            output_size,
            vm_id: None,
            state: CloudletState::Arrived,
            submission_time: None,
            start_time: None,
            finish_time: None,
        }
    }

    pub fn wait_time(&self) -> Option<f64> {
        self.start_time.map(|s| s - self.arrival_time)
    }
}
