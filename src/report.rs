use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::batch::{BatchReport, RunSummary};
use crate::config::{BatchPolicy, CgConfig};
use crate::domain::id::ServiceSetId;
use crate::domain::network::Network;
use crate::error::Result;

/// Target of the structured `tracing` events emitted per iteration and per batch.
pub const ANALYTICS_TARGET: &str = "analytics";

/// One line of the result table, one per run.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResultRow {
    pub network_id: usize,
    pub service_set_id: usize,
    pub vnf_count: usize,

    /// Smallest link capacity in the network, 0 without links.
    pub link_capacity: i64,
    pub service_count: usize,
    pub batch_policy: &'static str,

    /// Services per batch, or slots per window.
    pub batch_size: u64,

    /// Wall time in seconds.
    pub execution_time: f64,
    pub admitted: usize,
    pub admission_rate: f64,
}

impl ResultRow {
    pub fn new(network: &Network, service_set: ServiceSetId, config: &CgConfig, summary: &RunSummary) -> Self {
        let (batch_policy, batch_size) = match config.batch_policy {
            BatchPolicy::FixedSize { services } => ("fixedSize", services as u64),
            BatchPolicy::TimeWindow { slots } => ("timeWindow", u64::from(slots)),
        };

        Self {
            network_id: network.id.index(),
            service_set_id: service_set.index(),
            vnf_count: network.vnfs().len(),
            link_capacity: network.min_link_capacity().unwrap_or(0),
            service_count: summary.services,
            batch_policy,
            batch_size,
            execution_time: summary.elapsed.as_secs_f64(),
            admitted: summary.admitted,
            admission_rate: summary.admission_rate(),
        }
    }
}

/// One line of the per-batch table.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct BatchRow {
    pub batch_id: usize,
    pub window_start: u32,
    pub window_end: u32,
    pub services: usize,
    pub iterations: usize,
    pub columns: usize,
    pub lp_objective: Option<f64>,
    pub ilp_objective: Option<f64>,
    pub lp_time: f64,
    pub ilp_time: f64,
    pub termination: String,
    pub admitted: usize,
    pub excluded: usize,
    pub discarded_columns: usize,
    pub error: String,
}

impl From<&BatchReport> for BatchRow {
    fn from(report: &BatchReport) -> Self {
        Self {
            batch_id: report.batch.index(),
            window_start: report.window_start,
            window_end: report.window_end,
            services: report.services,
            iterations: report.iterations,
            columns: report.columns,
            lp_objective: report.lp_objective,
            ilp_objective: report.ilp_objective,
            lp_time: report.lp_time.as_secs_f64(),
            ilp_time: report.ilp_time.as_secs_f64(),
            termination: report.termination.to_string(),
            admitted: report.admitted.len(),
            excluded: report.excluded.len(),
            discarded_columns: report.discarded_columns,
            error: report.error.clone().unwrap_or_default(),
        }
    }
}

/// Writes `rows` as a `;`-separated table with a header line.
pub fn write_rows<W: Write, R: Serialize>(writer: W, rows: &[R], header: bool) -> Result<()> {
    let mut csv_wtr = csv::WriterBuilder::new().delimiter(b';').has_headers(header).from_writer(writer);
    for row in rows {
        csv_wtr.serialize(row)?;
    }
    csv_wtr.flush()?;
    Ok(())
}

/// Appends `row` to the result table at `path`. The header is only written into a new or empty file.
pub fn append_result(path: &Path, row: &ResultRow) -> Result<()> {
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    write_rows(file, std::slice::from_ref(row), is_new)?;

    log::info!("Result written to '{}'", path.display());
    Ok(())
}

/// Replaces the per-batch table at `path`.
pub fn write_batch_table(path: &Path, reports: &[BatchReport]) -> Result<()> {
    let rows: Vec<BatchRow> = reports.iter().map(BatchRow::from).collect();
    let file = std::fs::File::create(path)?;
    write_rows(file, &rows, true)?;

    log::info!("Batch table with {} rows written to '{}'", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_generation::driver::Termination;
    use crate::domain::id::{BatchId, MachineId, NetworkId, ServiceId};
    use crate::domain::network::VnfType;
    use std::time::Duration;

    fn report() -> BatchReport {
        BatchReport {
            batch: BatchId::new(3),
            window_start: 0,
            window_end: 5,
            services: 2,
            iterations: 4,
            columns: 6,
            lp_objective: Some(1.5),
            ilp_objective: Some(1.0),
            lp_time: Duration::from_millis(20),
            ilp_time: Duration::from_millis(5),
            termination: Termination::Converged,
            admitted: vec![ServiceId::new(0)],
            excluded: Vec::new(),
            discarded_columns: 0,
            error: None,
            elapsed: Duration::from_millis(30),
        }
    }

    #[test]
    fn test_batch_table_uses_semicolons() {
        let mut buffer = Vec::new();
        write_rows(&mut buffer, &[BatchRow::from(&report())], true).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next(),
            Some("BatchId;WindowStart;WindowEnd;Services;Iterations;Columns;LpObjective;IlpObjective;LpTime;IlpTime;Termination;Admitted;Excluded;DiscardedColumns;Error")
        );
        assert_eq!(lines.next(), Some("3;0;5;2;4;6;1.5;1.0;0.02;0.005;Converged;1;0;0;"));
    }

    #[test]
    fn test_result_row_describes_run() {
        let mut network = Network::new(NetworkId::new(2), 2, false);
        network.add_vnf(MachineId::new(0), VnfType(0)).unwrap();
        network.add_link(MachineId::new(0), MachineId::new(1), 7, 1.0).unwrap();
        let summary = RunSummary { batches: vec![report()], services: 4, admitted: 3, elapsed: Duration::from_secs(2) };

        let row = ResultRow::new(&network, ServiceSetId::new(9), &CgConfig::default(), &summary);

        assert_eq!(row.network_id, 2);
        assert_eq!(row.service_set_id, 9);
        assert_eq!(row.link_capacity, 7);
        assert_eq!(row.batch_policy, "fixedSize");
        assert_eq!(row.batch_size, 10);
        assert_eq!(row.admission_rate, 0.75);
    }
}
