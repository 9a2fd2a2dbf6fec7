use std::collections::BTreeMap;
use std::time::Duration;

use crate::column_generation::column_pool::ColumnPools;
use crate::config::CgConfig;
use crate::domain::id::{BatchId, LinkId, ServiceId, VnfId};
use crate::domain::network::SubstrateSnapshot;
use crate::domain::time_matrix::TimeMatrix;
use crate::error::CgError;
use crate::solver::{Cmp, ConstrId, LinExpr, Model, Sense, SolveStatus, Solver, VarId, VarKind};

/// Dual prices handed from the master to pricing: one per service row, per VNF-slot row and per
/// link-slot row. Rows the master did not build have price zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DualPrices {
    services: BTreeMap<ServiceId, f64>,
    vnf: TimeMatrix<f64>,
    link: TimeMatrix<f64>,
}

impl DualPrices {
    pub fn zero(vnf_count: usize, link_count: usize, horizon: usize) -> Self {
        Self { services: BTreeMap::new(), vnf: TimeMatrix::new(vnf_count, horizon), link: TimeMatrix::new(link_count, horizon) }
    }

    pub fn service(&self, service: ServiceId) -> f64 {
        self.services.get(&service).copied().unwrap_or(0.0)
    }

    pub fn vnf(&self, vnf: VnfId, slot: usize) -> f64 {
        self.vnf.get(vnf.index(), slot)
    }

    pub fn link(&self, link: LinkId, slot: usize) -> f64 {
        self.link.get(link.index(), slot)
    }

    pub fn set_service(&mut self, service: ServiceId, price: f64) {
        self.services.insert(service, price);
    }

    pub fn set_vnf(&mut self, vnf: VnfId, slot: usize, price: f64) {
        self.vnf.set(vnf.index(), slot, price);
    }

    pub fn set_link(&mut self, link: LinkId, slot: usize, price: f64) {
        self.link.set(link.index(), slot, price);
    }
}

/// Result of one master solve.
#[derive(Debug, Clone)]
pub struct MasterSolution {
    pub status: SolveStatus,
    pub objective: f64,
    pub elapsed: Duration,

    /// `(service, id_per_service, λ)` for every column with a positive value.
    pub selection: Vec<(ServiceId, usize, f64)>,

    /// Only present for the relaxation.
    pub duals: Option<DualPrices>,
}

impl MasterSolution {
    /// Columns chosen by the integer solve, at most one per service.
    pub fn selected(&self) -> impl Iterator<Item = (ServiceId, usize)> + '_ {
        self.selection.iter().filter(|(_, _, value)| *value > 0.5).map(|(service, index, _)| (*service, *index))
    }
}

/// Rows of the built master model, kept to read duals back.
#[derive(Debug, Default)]
struct MasterRows {
    services: Vec<(ServiceId, ConstrId)>,
    vnf: Vec<(VnfId, usize, ConstrId)>,
    link: Vec<(LinkId, usize, ConstrId)>,
}

/// Restricted master problem over the column pools of one batch.
///
/// ```text
/// max  Σ profit_k · λ_k
/// s.t. Σ_{k of s} λ_k            ≤ 1                    for every service s
///      Σ_k r_k[f][δ] · λ_k       ≤ available(f, δ)      for every used VNF slot
///      Σ_k o_k[l][δ] · λ_k       ≤ residual(l, δ)       for every used link slot
/// ```
pub struct RestrictedMaster<'a> {
    batch: BatchId,
    pools: &'a ColumnPools,
    snapshot: &'a SubstrateSnapshot,
    config: &'a CgConfig,
}

impl<'a> RestrictedMaster<'a> {
    pub fn new(batch: BatchId, pools: &'a ColumnPools, snapshot: &'a SubstrateSnapshot, config: &'a CgConfig) -> Self {
        Self { batch, pools, snapshot, config }
    }

    fn build(&self, integer: bool) -> (Model, Vec<(ServiceId, usize, VarId)>, MasterRows) {
        let name = format!("master-batch-{}-{}", self.batch, if integer { "ilp" } else { "lp" });
        let mut model = Model::new(name, Sense::Maximize);
        let mut lambdas = Vec::new();
        let mut rows = MasterRows::default();

        let mut vnf_rows: BTreeMap<(usize, usize), LinExpr> = BTreeMap::new();
        let mut link_rows: BTreeMap<(usize, usize), LinExpr> = BTreeMap::new();

        for (service, pool) in self.pools.iter() {
            let mut cover = LinExpr::new();

            for (index, column) in pool.columns().iter().enumerate() {
                let var_name = format!("lambda_{}_{}", service, index);
                let var = if integer {
                    model.add_binary(var_name, column.profit())
                } else {
                    model.add_var(var_name, VarKind::Continuous, 0.0, f64::INFINITY, column.profit())
                };
                cover.add(var, 1.0);
                lambdas.push((service, index, var));

                for (f, slot, used) in column.vnf_usage().nonzero() {
                    vnf_rows.entry((f, slot)).or_default().add(var, f64::from(used));
                }
                for (l, slot, carried) in column.link_usage().nonzero() {
                    link_rows.entry((l, slot)).or_default().add(var, carried as f64);
                }
            }

            if !cover.is_empty() {
                let row = model.add_constraint(format!("cover_{}", service), cover, Cmp::Le, 1.0);
                rows.services.push((service, row));
            }
        }

        for ((f, slot), expr) in vnf_rows {
            let vnf = VnfId::new(f);
            let available = if self.snapshot.vnf_available(vnf, slot) { 1.0 } else { 0.0 };
            let row = model.add_constraint(format!("vnf_{}_{}", f, slot), expr, Cmp::Le, available);
            rows.vnf.push((vnf, slot, row));
        }
        for ((l, slot), expr) in link_rows {
            let link = LinkId::new(l);
            let residual = self.snapshot.link_residual(link, slot).max(0) as f64;
            let row = model.add_constraint(format!("link_{}_{}", l, slot), expr, Cmp::Le, residual);
            rows.link.push((link, slot, row));
        }

        (model, lambdas, rows)
    }

    /// Solves the LP relaxation and extracts the duals.
    pub fn solve_relaxation<S: Solver>(&self, solver: &S) -> Result<MasterSolution, CgError> {
        let (model, lambdas, rows) = self.build(false);
        let solution = solver.solve(&model, &self.config.master_control())?;
        self.check_status(solution.status)?;

        let vnf_count = self.snapshot.vnf_availability().rows();
        let link_count = self.snapshot.link_residuals().rows();
        let mut duals = DualPrices::zero(vnf_count, link_count, self.snapshot.horizon());

        // Clamp solver noise, prices of `<=` rows in a maximisation are non-negative.
        let price = |row: ConstrId| solution.dual(row).unwrap_or(0.0).max(0.0);
        for &(service, row) in &rows.services {
            duals.set_service(service, price(row));
        }
        for &(vnf, slot, row) in &rows.vnf {
            duals.set_vnf(vnf, slot, price(row));
        }
        for &(link, slot, row) in &rows.link {
            duals.set_link(link, slot, price(row));
        }

        Ok(MasterSolution {
            status: solution.status,
            objective: solution.objective,
            elapsed: solution.elapsed,
            selection: Self::selection(&lambdas, |var| solution.value(var)),
            duals: Some(duals),
        })
    }

    /// Solves the master with binary column choices.
    pub fn solve_integer<S: Solver>(&self, solver: &S) -> Result<MasterSolution, CgError> {
        let (model, lambdas, _) = self.build(true);
        let solution = solver.solve(&model, &self.config.master_control())?;
        self.check_status(solution.status)?;

        Ok(MasterSolution {
            status: solution.status,
            objective: solution.objective,
            elapsed: solution.elapsed,
            selection: Self::selection(&lambdas, |var| solution.value(var)),
            duals: None,
        })
    }

    fn check_status(&self, status: SolveStatus) -> Result<(), CgError> {
        match status {
            SolveStatus::Optimal | SolveStatus::Feasible => Ok(()),
            SolveStatus::Infeasible => Err(CgError::MasterInfeasible { batch: self.batch }),
            other => Err(CgError::MasterFailed { batch: self.batch, status: format!("{:?}", other) }),
        }
    }

    fn selection(lambdas: &[(ServiceId, usize, VarId)], value: impl Fn(VarId) -> f64) -> Vec<(ServiceId, usize, f64)> {
        lambdas.iter().map(|&(service, index, var)| (service, index, value(var))).filter(|(_, _, v)| *v > 1e-9).collect()
    }
}
