//! CSV workload replay.
//!
//! Column header: `cloudlet_id,arrival_time,length,pes_required,file_size,output_size`.
//! Rows must be sorted by `arrival_time`; duplicate ids are rejected.

use std::collections::HashSet;
use std::io::Read;

use serde::Deserialize;

use crate::cloudlet::Cloudlet;
use crate::common::CloudletId;
use crate::error::SimError;

use super::WorkloadSource;

#[derive(Debug, Deserialize)]
struct CsvRow {
    cloudlet_id: CloudletId,
    arrival_time: f64,
    length: u64,
    pes_required: u32,
    file_size: u64,
    output_size: u64,
}

pub struct CsvWorkloadSource {
    rows: Vec<Cloudlet>,
    cursor: usize,
}

impl CsvWorkloadSource {
    pub fn from_path(path: &str) -> Result<Self, SimError> {
        let file = std::fs::File::open(path)
            .map_err(|e| SimError::WorkloadLoadError(format!("can't open {}: {}", path, e)))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SimError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut rows = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut last_arrival = f64::MIN;

        for record in csv_reader.deserialize() {
            let row: CsvRow = record.map_err(|e| SimError::WorkloadLoadError(format!("malformed workload row: {}", e)))?;
            if !seen_ids.insert(row.cloudlet_id) {
                return Err(SimError::WorkloadLoadError(format!("duplicate cloudlet id {}", row.cloudlet_id)));
            }
            if row.arrival_time < last_arrival {
                return Err(SimError::WorkloadLoadError(format!(
                    "workload is not sorted by arrival_time: {} follows {}",
                    row.arrival_time, last_arrival
                )));
            }
            last_arrival = row.arrival_time;
            rows.push(Cloudlet::new(
                row.cloudlet_id,
                row.arrival_time,
                row.length,
                row.pes_required,
                row.file_size,
                row.output_size,
            ));
        }

        Ok(Self { rows, cursor: 0 })
    }
}

impl WorkloadSource for CsvWorkloadSource {
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

    #[test]
    fn parses_rows_in_order() {
        let csv_text = "cloudlet_id,arrival_time,length,pes_required,file_size,output_size\n\
                         0,0.0,1000,1,100,100\n\
                         1,2.5,2000,2,200,200\n";
        let mut source = CsvWorkloadSource::from_reader(csv_text.as_bytes()).unwrap();
        assert!(source.next_arriving_by(0.0).is_some());
        assert!(source.next_arriving_by(1.0).is_none());
        assert!(source.next_arriving_by(2.5).is_some());
        assert!(source.is_exhausted());
    }

    #[test]
    fn non_monotonic_arrival_times_are_rejected() {
        let csv_text = "cloudlet_id,arrival_time,length,pes_required,file_size,output_size\n\
                         0,5.0,1000,1,100,100\n\
                         1,2.5,2000,2,200,200\n";
        let err = CsvWorkloadSource::from_reader(csv_text.as_bytes()).unwrap_err();
        assert!(matches!(err, SimError::WorkloadLoadError(_)));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let csv_text = "cloudlet_id,arrival_time,length,pes_required,file_size,output_size\n\
                         0,0.0,1000,1,100,100\n\
                         0,2.5,2000,2,200,200\n";
        let err = CsvWorkloadSource::from_reader(csv_text.as_bytes()).unwrap_err();
        assert!(matches!(err, SimError::WorkloadLoadError(_)));
    }
}
