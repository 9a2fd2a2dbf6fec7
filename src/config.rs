use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::solver::SolveControl;

/// What the restricted master optimises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MasterObjective {
    /// Number of admitted services, ties broken towards early completion and cheap routes.
    #[default]
    MaxAdmitted,

    /// Admission first, then total completion time.
    MinCompletionTime,
}

/// How the first column of every service is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SeedStrategy {
    /// Pricing with all duals at zero.
    #[default]
    ZeroDualPricing,

    /// Earliest-fit placement with shortest-path routing, falls back to pricing.
    Greedy,
}

/// How the arrival-ordered service list is cut into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum BatchPolicy {
    FixedSize { services: usize },
    TimeWindow { slots: u32 },
}

impl Default for BatchPolicy {
    fn default() -> Self {
        BatchPolicy::FixedSize { services: 10 }
    }
}

/// Early-termination policy of the pricing MIP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingControl {
    pub gap_tolerance: Option<f64>,

    /// Stop at the first incumbent whose value exceeds the reduced-cost epsilon.
    pub abort_on_improving_incumbent: bool,

    pub node_limit: usize,

    /// Wall-clock limit of one pricing solve in seconds.
    pub time_limit: Option<f64>,
}

impl Default for PricingControl {
    fn default() -> Self {
        Self { gap_tolerance: Some(1e-6), abort_on_improving_incumbent: false, node_limit: 20_000, time_limit: None }
    }
}

/// Parameters of a column-generation run. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CgConfig {
    /// Planning horizon Δ in slots. A batch plans Δ slots past its last possible arrival.
    pub horizon: usize,
    pub max_iterations: usize,
    pub objective: MasterObjective,

    /// A pricing value above this counts as an improving column.
    pub reduced_cost_epsilon: f64,
    pub completion_weight: f64,
    pub routing_weight: f64,
    pub pricing: PricingControl,

    /// Run the consistency checker on every priced column.
    pub verify_columns: bool,
    pub seed: SeedStrategy,
    pub batch_policy: BatchPolicy,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            horizon: 20,
            max_iterations: 50,
            objective: MasterObjective::MaxAdmitted,
            reduced_cost_epsilon: 1e-6,
            completion_weight: 1e-3,
            routing_weight: 1e-3,
            pricing: PricingControl::default(),
            verify_columns: true,
            seed: SeedStrategy::ZeroDualPricing,
            batch_policy: BatchPolicy::default(),
        }
    }
}

impl CgConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(Error::ConfigError(reason.to_string()));

        if self.horizon == 0 {
            return invalid("horizon must be at least one slot");
        }
        if self.max_iterations == 0 {
            return invalid("maxIterations must be at least one");
        }
        if !(self.reduced_cost_epsilon >= 0.0) {
            return invalid("reducedCostEpsilon must be non-negative");
        }
        if !(self.completion_weight >= 0.0 && self.routing_weight >= 0.0) {
            return invalid("completion and routing weights must be non-negative");
        }
        if self.completion_weight + self.routing_weight >= 0.5 {
            return invalid("completion and routing weights must stay well below the admission reward");
        }
        match self.batch_policy {
            BatchPolicy::FixedSize { services: 0 } => invalid("batch size must be at least one"),
            BatchPolicy::TimeWindow { slots: 0 } => invalid("batch window must be at least one slot"),
            _ => Ok(()),
        }
    }

    /// Solver control for one pricing solve.
    pub fn pricing_control(&self) -> SolveControl {
        let mut control = SolveControl { node_limit: self.pricing.node_limit, time_limit: self.pricing.time_limit, ..SolveControl::default() };

        if let Some(gap) = self.pricing.gap_tolerance {
            control = control.with_gap_tolerance(gap);
        }
        if self.pricing.abort_on_improving_incumbent {
            control = control.with_incumbent_threshold(self.reduced_cost_epsilon);
        }
        control
    }

    /// Solver control for the restricted master. The master is always solved to optimality.
    pub fn master_control(&self) -> SolveControl {
        SolveControl { node_limit: usize::MAX, ..SolveControl::default() }
    }

    /// Reward for admitting a service before completion and routing penalties.
    pub fn admission_reward(&self) -> f64 {
        match self.objective {
            MasterObjective::MaxAdmitted => 1.0,
            MasterObjective::MinCompletionTime => 2.0,
        }
    }

    /// Penalty per slot of completion time in a plan of `planning_horizon` slots.
    pub fn completion_penalty(&self, planning_horizon: usize) -> f64 {
        let per_horizon = match self.objective {
            MasterObjective::MaxAdmitted => self.completion_weight,
            MasterObjective::MinCompletionTime => 1.0,
        };
        per_horizon / planning_horizon.max(1) as f64
    }

    /// Intrinsic profit of a column completing at relative slot `completion_time` of a plan
    /// covering `planning_horizon` slots.
    pub fn column_profit(&self, completion_time: u32, route_weight: f64, planning_horizon: usize) -> f64 {
        self.admission_reward() - self.completion_penalty(planning_horizon) * f64::from(completion_time) - self.routing_weight * route_weight
    }
}
