/// The result of solving an LP problem
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Solution {
    /// Solution status
    pub status: SolutionStatus,
    /// Optimal values for each variable
    pub values: Vec<f64>,
    /// Optimal objective value
    pub objective_value: f64,
    /// Detailed analysis
    pub analysis: Analysis,
    /// Simplex pivots performed across both phases
    pub iterations: usize,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    /// An optimal solution was found
    Optimal,
    /// The problem is infeasible (no solution exists)
    Infeasible,
    /// The problem is unbounded
    Unbounded,
    /// The pivot limit was reached before optimality was proven
    IterationLimit,
    /// The wall-clock limit was reached before optimality was proven
    TimeLimit,
}

impl std::fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolutionStatus::Optimal => write!(f, "optimal"),
            SolutionStatus::Infeasible => write!(f, "infeasible"),
            SolutionStatus::Unbounded => write!(f, "unbounded"),
            SolutionStatus::IterationLimit => write!(f, "iteration_limit"),
            SolutionStatus::TimeLimit => write!(f, "time_limit"),
        }
    }
}

/// Dual information at the optimal basis
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Shadow prices (dual values), one per constraint in problem order.
    ///
    /// Each value is the derivative of the optimal objective with respect to
    /// the constraint's right-hand side, in the problem's own sense.
    pub shadow_prices: Vec<ShadowPrice>,

    /// Reduced costs for each variable
    pub reduced_costs: Vec<ReducedCost>,

    /// Which constraints are binding (nonzero dual) at optimum
    pub binding_constraints: Vec<String>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ShadowPrice {
    /// Constraint name
    pub constraint: String,
    /// Shadow price value
    pub value: f64,
    /// Interpretation
    pub interpretation: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ReducedCost {
    /// Variable name
    pub variable: String,
    /// Current value in solution
    pub value: f64,
    /// Reduced cost
    pub reduced_cost: f64,
    /// Is this variable in the basis?
    pub is_basic: bool,
}

/// Information about a violated constraint or variable bound
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ConstraintViolation {
    /// Constraint name, or the variable name for a bound violation
    pub constraint: String,
    /// Whether this is a variable bound rather than a constraint row
    pub is_bound: bool,
    /// Required value (constraint RHS or the violated bound)
    pub required: f64,
    /// Actual value achieved
    pub actual: f64,
    /// Signed violation: positive above an upper limit, negative below a lower limit
    pub violation_amount: f64,
    /// Human-readable description of what's wrong
    pub description: String,
}

impl Solution {
    pub fn infeasible() -> Self {
        Self::with_status(SolutionStatus::Infeasible, f64::INFINITY)
    }

    pub fn unbounded() -> Self {
        Self::with_status(SolutionStatus::Unbounded, f64::NEG_INFINITY)
    }

    pub fn iteration_limit() -> Self {
        Self::with_status(SolutionStatus::IterationLimit, f64::NAN)
    }

    pub fn time_limit() -> Self {
        Self::with_status(SolutionStatus::TimeLimit, f64::NAN)
    }

    fn with_status(status: SolutionStatus, objective_value: f64) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective_value,
            analysis: Analysis::empty(),
            iterations: 0,
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolutionStatus::Optimal
    }

    /// Dual value of the constraint at `row`, if the solve produced one
    pub fn dual(&self, row: usize) -> Option<f64> {
        self.analysis.shadow_prices.get(row).map(|sp| sp.value)
    }

    /// Dual values of all constraints, in problem order
    pub fn duals(&self) -> Vec<f64> {
        self.analysis.shadow_prices.iter().map(|sp| sp.value).collect()
    }
}

impl Analysis {
    pub fn empty() -> Self {
        Self::default()
    }
}

impl ConstraintViolation {
    pub fn magnitude(&self) -> f64 {
        self.violation_amount.abs()
    }
}
