/// Index of a variable inside a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a constraint inside a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstrId(pub(crate) usize);

impl ConstrId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Integer,
    Binary,
}

impl VarKind {
    pub fn is_integral(self) -> bool {
        !matches!(self, VarKind::Continuous)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Le,
    Ge,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Maximize,
    Minimize,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
    /// Coefficient of the variable in the objective function.
    pub objective: f64,
}

/// A sparse linear expression `Σ coef · var`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
}

impl LinExpr {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    pub fn term(mut self, var: VarId, coef: f64) -> Self {
        self.add(var, coef);
        self
    }

    pub fn add(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl FromIterator<(VarId, f64)> for LinExpr {
    fn from_iter<I: IntoIterator<Item = (VarId, f64)>>(iter: I) -> Self {
        let mut expr = LinExpr::new();
        for (var, coef) in iter {
            expr.add(var, coef);
        }
        expr
    }
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub expr: LinExpr,
    pub cmp: Cmp,
    pub rhs: f64,
}

/// Solver-independent description of a linear or mixed-integer program.
///
/// Models are built once per solve by the pricing subproblem and the restricted master and
/// handed to a [`Solver`](super::Solver) together with a [`SolveControl`](super::SolveControl).
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    sense: Sense,
    objective_constant: f64,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
}

impl Model {
    pub fn new(name: impl Into<String>, sense: Sense) -> Self {
        Self { name: name.into(), sense, objective_constant: 0.0, variables: Vec::new(), constraints: Vec::new() }
    }

    pub fn add_var(&mut self, name: impl Into<String>, kind: VarKind, lower: f64, upper: f64, objective: f64) -> VarId {
        let (lower, upper) = match kind {
            VarKind::Binary => (lower.max(0.0), upper.min(1.0)),
            _ => (lower, upper),
        };

        self.variables.push(Variable { name: name.into(), kind, lower, upper, objective });
        VarId(self.variables.len() - 1)
    }

    pub fn add_binary(&mut self, name: impl Into<String>, objective: f64) -> VarId {
        self.add_var(name, VarKind::Binary, 0.0, 1.0, objective)
    }

    pub fn add_continuous(&mut self, name: impl Into<String>, lower: f64, upper: f64, objective: f64) -> VarId {
        self.add_var(name, VarKind::Continuous, lower, upper, objective)
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, expr: LinExpr, cmp: Cmp, rhs: f64) -> ConstrId {
        self.constraints.push(Constraint { name: name.into(), expr, cmp, rhs });
        ConstrId(self.constraints.len() - 1)
    }

    pub fn set_objective_constant(&mut self, constant: f64) {
        self.objective_constant = constant;
    }

    pub fn objective_constant(&self) -> f64 {
        self.objective_constant
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, var: VarId) -> &Variable {
        &self.variables[var.0]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_mip(&self) -> bool {
        self.variables.iter().any(|v| v.kind.is_integral())
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective_constant + self.variables.iter().zip(values).map(|(v, x)| v.objective * x).sum::<f64>()
    }
}
