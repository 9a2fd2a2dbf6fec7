use std::time::{Duration, Instant};

use crate::column_generation::driver::{CgOutcome, ColumnGeneration, Termination};
use crate::config::{BatchPolicy, CgConfig};
use crate::domain::id::{BatchId, IdGenerator, ServiceId};
use crate::domain::network::Network;
use crate::domain::service::{Service, ensure_unique_ids};
use crate::error::ModelError;
use crate::report::ANALYTICS_TARGET;
use crate::solver::Solver;

/// A group of services planned together from `window_start` on.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,

    /// Arrival window `[window_start, window_end)` the services were taken from.
    pub window_start: u32,
    pub window_end: u32,

    /// Indices into the service list handed to the manager.
    pub services: Vec<usize>,
}

impl Batch {
    /// Slots planned for the batch: Δ slots past its last possible arrival, so every service
    /// of the window gets a full horizon.
    pub fn planning_horizon(&self, horizon: usize) -> usize {
        self.window_end.saturating_sub(self.window_start).saturating_sub(1) as usize + horizon
    }
}

/// Metrics of one finished batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch: BatchId,
    pub window_start: u32,
    pub window_end: u32,
    pub services: usize,
    pub iterations: usize,
    pub columns: usize,
    pub lp_objective: Option<f64>,
    pub ilp_objective: Option<f64>,
    pub lp_time: Duration,
    pub ilp_time: Duration,
    pub termination: Termination,
    pub admitted: Vec<ServiceId>,
    pub excluded: Vec<ServiceId>,
    pub discarded_columns: usize,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl BatchReport {
    fn new(batch: &Batch, outcome: &CgOutcome, admitted: Vec<ServiceId>) -> Self {
        Self {
            batch: batch.id,
            window_start: batch.window_start,
            window_end: batch.window_end,
            services: batch.services.len(),
            iterations: outcome.iterations,
            columns: outcome.pools.total_columns(),
            lp_objective: outcome.lp_objective(),
            ilp_objective: outcome.ilp_objective,
            lp_time: outcome.lp_time,
            ilp_time: outcome.ilp_time,
            termination: outcome.termination,
            admitted,
            excluded: outcome.excluded.clone(),
            discarded_columns: outcome.discarded_columns,
            error: outcome.error.clone(),
            elapsed: outcome.elapsed,
        }
    }
}

/// Result of scheduling a whole service list.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub batches: Vec<BatchReport>,
    pub services: usize,
    pub admitted: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Share of admitted services, 0 for an empty run.
    pub fn admission_rate(&self) -> f64 {
        if self.services == 0 {
            return 0.0;
        }
        self.admitted as f64 / self.services as f64
    }
}

/// Cuts the service list into batches, runs column generation per batch and commits the admitted
/// schedules onto the network before the next batch is planned.
pub struct BatchManager<S: Solver> {
    network: Network,
    config: CgConfig,
    solver: S,
    ids: IdGenerator,
}

impl<S: Solver> BatchManager<S> {
    pub fn new(network: Network, config: CgConfig, solver: S) -> Self {
        Self { network, config, solver, ids: IdGenerator::new() }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn config(&self) -> &CgConfig {
        &self.config
    }

    /// Drops all committed reservations and restarts the id counters.
    pub fn reset(&mut self) {
        self.network.reset_schedules();
        self.ids.reset();
    }

    /// Groups `services` by arrival, ties broken by service id.
    ///
    /// # Returns
    /// The batches in the order they have to be planned. Empty time windows are skipped.
    pub fn partition(&mut self, services: &[Service]) -> Vec<Batch> {
        let mut order: Vec<usize> = (0..services.len()).collect();
        order.sort_by_key(|&i| (services[i].arrival, services[i].id));

        let groups: Vec<Vec<usize>> = match self.config.batch_policy {
            BatchPolicy::FixedSize { services: size } => order.chunks(size.max(1)).map(<[usize]>::to_vec).collect(),
            BatchPolicy::TimeWindow { slots } => {
                let slots = slots.max(1);
                let mut groups: Vec<Vec<usize>> = Vec::new();
                let mut current_window = None;

                for i in order {
                    let window = services[i].arrival / slots;
                    if current_window != Some(window) {
                        groups.push(Vec::new());
                        current_window = Some(window);
                    }
                    if let Some(group) = groups.last_mut() {
                        group.push(i);
                    }
                }
                groups
            }
        };

        groups
            .into_iter()
            .filter(|group| !group.is_empty())
            .map(|group| {
                let (window_start, window_end) = match self.config.batch_policy {
                    BatchPolicy::TimeWindow { slots } => {
                        let slots = slots.max(1);
                        let start = services[group[0]].arrival / slots * slots;
                        (start, start + slots)
                    }
                    BatchPolicy::FixedSize { .. } => {
                        let first = services[group[0]].arrival;
                        let last = group.iter().map(|&i| services[i].arrival).max().unwrap_or(first);
                        (first, last + 1)
                    }
                };
                Batch { id: self.ids.next_batch_id(), window_start, window_end, services: group }
            })
            .collect()
    }

    /// Schedules all services batch by batch and writes the assignments back onto them.
    ///
    /// # Errors
    /// `ModelError::InvalidService` if two services share an id.
    pub fn run(&mut self, services: &mut [Service]) -> Result<RunSummary, ModelError> {
        ensure_unique_ids(services)?;
        let start = Instant::now();
        let batches = self.partition(services);
        log::info!("Scheduling {} services in {} batches (horizon {} slots)", services.len(), batches.len(), self.config.horizon);

        let mut summary = RunSummary { services: services.len(), ..RunSummary::default() };

        for batch in &batches {
            let report = self.run_batch(batch, services);
            summary.admitted += report.admitted.len();
            summary.batches.push(report);
        }

        summary.elapsed = start.elapsed();
        log::info!(
            "Admitted {} of {} services ({:.1}%) in {:.3}s",
            summary.admitted,
            summary.services,
            summary.admission_rate() * 100.0,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    fn run_batch(&mut self, batch: &Batch, services: &mut [Service]) -> BatchReport {
        let batch_services: Vec<Service> = batch.services.iter().map(|&i| services[i].clone()).collect();
        let planning_horizon = batch.planning_horizon(self.config.horizon);
        let snapshot = self.network.snapshot(batch.window_start, planning_horizon);

        log::info!(
            "Batch {}: {} services, arrivals [{}, {}), horizon [{}, {})",
            batch.id,
            batch_services.len(),
            batch.window_start,
            batch.window_end,
            batch.window_start,
            batch.window_start as usize + planning_horizon
        );

        let outcome = ColumnGeneration::new(batch.id, &self.network, &snapshot, &self.config, &self.solver).run(&batch_services, &mut self.ids);

        for &i in &batch.services {
            services[i].clear_assignment();
        }

        let mut admitted = Vec::new();
        for configuration in outcome.selected_configurations() {
            if let Err(e) = self.network.commit(configuration, batch.window_start) {
                log::error!("Batch {}: could not commit {} of service {}: {}", batch.id, configuration.id(), configuration.service(), e);
                continue;
            }

            if let Some(i) = batch.services.iter().copied().find(|&i| services[i].id == configuration.service()) {
                services[i].apply_plan(configuration.plan(), batch.window_start);
                admitted.push(services[i].id);
            }
        }

        let report = BatchReport::new(batch, &outcome, admitted);

        tracing::info!(
            target: ANALYTICS_TARGET,
            LogDescription = "Batch committed",
            Batch = %batch.id,
            WindowStart = batch.window_start,
            Services = report.services,
            Admitted = report.admitted.len(),
            Termination = %report.termination,
            ProcessingTime = report.elapsed.as_millis() as u64,
        );

        report
    }
}
