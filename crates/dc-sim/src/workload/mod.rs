//! Workload sources: materialize the sequence of cloudlets whose arrivals
//! drive an episode.
//!
//! Grounded on `dslab-iaas::extensions::dataset_reader::DatasetReader`'s
//! `get_next_*` style and `standard_dataset_reader.rs`'s
//! `csv::Reader::from_reader(...).deserialize()` idiom, generalized from
//! "VM dataset" to "cloudlet workload."

pub mod csv;
pub mod swf;

use crate::cloudlet::Cloudlet;

/// A finite, sorted-by-arrival-time, lazy, non-restartable sequence of
/// cloudlets.
pub trait WorkloadSource {
    /// Returns and removes the next cloudlet if its arrival time is `<= now`.
    fn next_arriving_by(&mut self, now: f64) -> Option<Cloudlet>;

    /// True once every cloudlet in the source has been consumed.
    fn is_exhausted(&self) -> bool;
}

/// A workload source with no cloudlets, for episodes configured without a
/// trace file.
#[derive(Default)]
pub struct EmptyWorkloadSource;

impl WorkloadSource for EmptyWorkloadSource {
    fn next_arriving_by(&mut self, _now: f64) -> Option<Cloudlet> {
        None
    }

    fn is_exhausted(&self) -> bool {
        true
    }
}

/// Splits an oversized job into sibling cloudlets that each fit within
/// `max_pes`, sharing the original id's prefix via `(original_id * 1000) + index`,
/// or returns `None` to signal "drop" when `split` is false.
pub(crate) fn split_or_drop(
    id: u64,
    arrival_time: f64,
    length_mi: u64,
    pes_required: u32,
    file_size: u64,
    output_size: u64,
    max_pes: u32,
    split: bool,
) -> Vec<Cloudlet> {
    if pes_required <= max_pes {
        return vec![Cloudlet::new(id, arrival_time, length_mi, pes_required, file_size, output_size)];
    }
    if !split {
        return Vec::new();
    }
    let mut remaining = pes_required;
    let mut siblings = Vec::new();
    let mut index = 0u64;
    while remaining > 0 {
        let pes = remaining.min(max_pes);
        let sibling_id = id * 1000 + index;
        siblings.push(Cloudlet::new(sibling_id, arrival_time, length_mi, pes, file_size, output_size));
        remaining -= pes;
        index += 1;
    }
    siblings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_job_splits_into_siblings_that_fit() {
        let siblings = split_or_drop(7, 0.0, 1000, 10, 0, 0, 4, true);
        assert_eq!(siblings.len(), 3);
        assert_eq!(siblings.iter().map(|c| c.pes_required).collect::<Vec<_>>(), vec![4, 4, 2]);
    }

    #[test]
    fn oversized_job_is_dropped_when_split_disabled() {
        let siblings = split_or_drop(7, 0.0, 1000, 10, 0, 0, 4, false);
        assert!(siblings.is_empty());
    }
}
