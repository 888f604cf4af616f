//! Standard Workload Format (SWF) trace replay.
//!
//! Each non-comment line is whitespace-separated:
//! `job_number submit_time wait_time run_time alloc_pes ... req_pes ...`
//! (the Parallel Workloads Archive's field layout). Comment lines start
//! with `;`. A job's length is `run_time_seconds * reference_mips`,
//! rounded to the nearest integer MI.

use std::io::{BufRead, BufReader, Read};

use crate::cloudlet::Cloudlet;
use crate::error::SimError;

use super::{split_or_drop, WorkloadSource};

pub struct SwfWorkloadSource {
    rows: Vec<Cloudlet>,
    cursor: usize,
}

impl SwfWorkloadSource {
    pub fn from_path(
        path: &str,
        reference_mips: u64,
        max_cloudlets_to_create: Option<u64>,
        max_cloudlet_pes: u32,
        split_large_cloudlets: bool,
    ) -> Result<Self, SimError> {
        let file = std::fs::File::open(path)
            .map_err(|e| SimError::WorkloadLoadError(format!("can't open {}: {}", path, e)))?;
        Self::from_reader(file, reference_mips, max_cloudlets_to_create, max_cloudlet_pes, split_large_cloudlets)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        reference_mips: u64,
        max_cloudlets_to_create: Option<u64>,
        max_cloudlet_pes: u32,
        split_large_cloudlets: bool,
    ) -> Result<Self, SimError> {
        let buffered = BufReader::new(reader);
        let mut rows = Vec::new();
        let mut last_arrival = f64::MIN;
        let mut created = 0u64;

        for (line_no, line) in buffered.lines().enumerate() {
            let line = line.map_err(|e| SimError::WorkloadLoadError(format!("I/O error at line {}: {}", line_no, e)))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') {
                continue;
            }
            if let Some(limit) = max_cloudlets_to_create {
                if created >= limit {
                    break;
                }
            }

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() < 8 {
                return Err(SimError::WorkloadLoadError(format!("malformed SWF row at line {}", line_no)));
            }
            let job_id: u64 = parse_field(&fields, 0, line_no)?;
            let submit_time: f64 = parse_field(&fields, 1, line_no)?;
            let run_time: f64 = parse_field(&fields, 3, line_no)?;
            let alloc_pes: i64 = parse_field(&fields, 4, line_no)?;
            let req_pes: i64 = parse_field(&fields, 7, line_no)?;

            if run_time < 0.0 {
                continue;
            }
            let pes_required = if alloc_pes > 0 { alloc_pes } else { req_pes };
            if pes_required <= 0 {
                continue;
            }

            if submit_time < last_arrival {
                return Err(SimError::WorkloadLoadError(format!(
                    "SWF trace is not sorted by submit time: {} follows {}",
                    submit_time, last_arrival
                )));
            }
            last_arrival = submit_time;

            let length_mi = (run_time * reference_mips as f64).round() as u64;
            let siblings = split_or_drop(job_id, submit_time, length_mi, pes_required as u32, 0, 0, max_cloudlet_pes, split_large_cloudlets);
            created += 1;
            rows.extend(siblings);
        }

        Ok(Self { rows, cursor: 0 })
    }
}

fn parse_field<T: std::str::FromStr>(fields: &[&str], index: usize, line_no: usize) -> Result<T, SimError> {
    fields
        .get(index)
        .ok_or_else(|| SimError::WorkloadLoadError(format!("missing field {} at line {}", index, line_no)))?
        .parse::<T>()
        .map_err(|_| SimError::WorkloadLoadError(format!("unparsable field {} at line {}", index, line_no)))
}

impl WorkloadSource for SwfWorkloadSource {
    fn next_arriving_by(&mut self, now: f64) -> Option<Cloudlet> {
        if self.cursor >= self.rows.len() {
            return None;
        }
        if self.rows[self.cursor].arrival_time > now {
            return None;
        }
        let cloudlet = self.rows[self.cursor].clone();
        self.cursor += 1;
        Some(cloudlet)
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "\
; comment line, ignored
1 0 5 100 4 1000 2000 4 200 4000 1 1 1 1 1 -1 0
2 10 5 200 8 1000 2000 8 200 4000 1 1 1 1 1 -1 0
";

    #[test]
    fn parses_and_computes_length_from_reference_mips() {
        let mut source = SwfWorkloadSource::from_reader(TRACE.as_bytes(), 1000, None, 16, true).unwrap();
        let first = source.next_arriving_by(0.0).unwrap();
        assert_eq!(first.length_mi, 100_000);
        assert_eq!(first.pes_required, 4);
    }

    #[test]
    fn max_cloudlets_to_create_caps_the_stream() {
        let mut source = SwfWorkloadSource::from_reader(TRACE.as_bytes(), 1000, Some(1), 16, true).unwrap();
        assert!(source.next_arriving_by(100.0).is_some());
        assert!(source.next_arriving_by(100.0).is_none());
    }

    #[test]
    fn oversized_jobs_split_when_configured() {
        let mut source = SwfWorkloadSource::from_reader(TRACE.as_bytes(), 1000, None, 4, true).unwrap();
        // job 2 requests 8 pes against a cap of 4: splits into two siblings of 4 pes each.
        let first = source.next_arriving_by(0.0).unwrap();
        assert_eq!(first.pes_required, 4);
        let second = source.next_arriving_by(100.0).unwrap();
        assert_eq!(second.pes_required, 4);
        let third = source.next_arriving_by(100.0).unwrap();
        assert_eq!(third.pes_required, 4);
    }
}
