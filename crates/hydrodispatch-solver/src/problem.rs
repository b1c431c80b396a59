/// Represents a linear or mixed-integer linear programming problem
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct LpProblem {
    /// Variable names
    pub variables: Vec<String>,
    /// Lower and upper bound of each variable
    pub bounds: Vec<Bounds>,
    /// Integrality flag of each variable
    pub integer: Vec<bool>,
    /// Objective function coefficients (costs)
    pub objective: Objective,
    /// Constraints
    pub constraints: Vec<Constraint>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub const NON_NEGATIVE: Bounds = Bounds {
        lower: 0.0,
        upper: f64::INFINITY,
    };

    pub const FREE: Bounds = Bounds {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };

    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn fixed(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    pub fn is_fixed(&self, tolerance: f64) -> bool {
        self.lower.is_finite() && self.upper.is_finite() && (self.upper - self.lower).abs() <= tolerance
    }

    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        value >= self.lower - tolerance && value <= self.upper + tolerance
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::NON_NEGATIVE
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Objective {
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Whether to minimize or maximize
    pub minimize: bool,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Name/label for the constraint (for diagnostics)
    pub name: String,
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Comparison operator
    pub op: ConstraintOp,
    /// Right-hand side value
    pub rhs: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

impl ConstraintOp {
    pub fn flipped(self) -> Self {
        match self {
            ConstraintOp::Le => ConstraintOp::Ge,
            ConstraintOp::Ge => ConstraintOp::Le,
            ConstraintOp::Eq => ConstraintOp::Eq,
        }
    }
}

impl Constraint {
    /// Left-hand side value at the given point
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(values)
            .map(|(coef, value)| coef * value)
            .sum()
    }
}

impl LpProblem {
    /// Create a problem whose variables are all continuous and non-negative
    pub fn new(variables: Vec<String>) -> Self {
        let n = variables.len();
        Self {
            variables,
            bounds: vec![Bounds::NON_NEGATIVE; n],
            integer: vec![false; n],
            objective: Objective {
                coefficients: vec![0.0; n],
                minimize: true,
            },
            constraints: Vec::new(),
        }
    }

    /// Append a variable and return its column index.
    ///
    /// Existing constraints are padded with a zero coefficient.
    pub fn add_variable(&mut self, name: impl Into<String>, bounds: Bounds, cost: f64) -> usize {
        self.variables.push(name.into());
        self.bounds.push(bounds);
        self.integer.push(false);
        self.objective.coefficients.push(cost);
        for c in &mut self.constraints {
            c.coefficients.push(0.0);
        }
        self.variables.len() - 1
    }

    pub fn set_integer(&mut self, index: usize, integer: bool) {
        self.integer[index] = integer;
    }

    pub fn set_bounds(&mut self, index: usize, bounds: Bounds) {
        self.bounds[index] = bounds;
    }

    pub fn set_objective(&mut self, coefficients: Vec<f64>, minimize: bool) {
        self.objective = Objective { coefficients, minimize };
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, coefficients: Vec<f64>, op: ConstraintOp, rhs: f64) {
        self.constraints.push(Constraint {
            name: name.into(),
            coefficients,
            op,
            rhs,
        });
    }

    /// Add a constraint from `(variable index, coefficient)` terms.
    ///
    /// Repeated indices are summed. Returns the constraint's row index.
    pub fn add_sparse_constraint(
        &mut self,
        name: impl Into<String>,
        terms: &[(usize, f64)],
        op: ConstraintOp,
        rhs: f64,
    ) -> usize {
        let mut coefficients = vec![0.0; self.num_variables()];
        for &(index, coef) in terms {
            coefficients[index] += coef;
        }
        self.add_constraint(name, coefficients, op, rhs);
        self.constraints.len() - 1
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_mixed_integer(&self) -> bool {
        self.integer.iter().any(|&i| i)
    }

    pub fn integer_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.integer
            .iter()
            .enumerate()
            .filter(|(_, is_int)| **is_int)
            .map(|(j, _)| j)
    }

    /// Objective value at the given point
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .coefficients
            .iter()
            .zip(values)
            .map(|(c, v)| c * v)
            .sum()
    }

    /// Left-hand side of every constraint at the given point
    pub fn evaluate(&self, values: &[f64]) -> Vec<f64> {
        self.constraints.iter().map(|c| c.lhs(values)).collect()
    }

    /// Independent linear copy with every integer variable made continuous
    /// and fixed to the supplied value.
    ///
    /// `fixed` holds `(variable index, value)` pairs; integer variables that
    /// are not listed keep their bounds but lose integrality.
    pub fn fixed_relaxation(&self, fixed: &[(usize, f64)]) -> LpProblem {
        let mut relaxed = self.clone();
        for &(index, value) in fixed {
            relaxed.bounds[index] = Bounds::fixed(value);
        }
        relaxed.integer.iter_mut().for_each(|i| *i = false);
        relaxed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_variable_pads_constraints() {
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.add_constraint("c", vec![1.0], ConstraintOp::Le, 2.0);
        let y = problem.add_variable("y", Bounds::new(0.0, 5.0), 3.0);

        assert_eq!(y, 1);
        assert_eq!(problem.constraints[0].coefficients, vec![1.0, 0.0]);
        assert_eq!(problem.objective.coefficients, vec![0.0, 3.0]);
    }

    #[test]
    fn test_sparse_constraint_sums_repeated_terms() {
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        let row = problem.add_sparse_constraint("c", &[(0, 1.0), (1, 2.0), (0, 0.5)], ConstraintOp::Eq, 4.0);

        assert_eq!(row, 0);
        assert_eq!(problem.constraints[0].coefficients, vec![1.5, 2.0]);
        assert_eq!(problem.evaluate(&[2.0, 1.0]), vec![5.0]);
    }

    #[test]
    fn test_fixed_relaxation_leaves_original_untouched() {
        let mut problem = LpProblem::new(vec!["u".to_string(), "g".to_string()]);
        problem.set_bounds(0, Bounds::new(0.0, 1.0));
        problem.set_integer(0, true);

        let relaxed = problem.fixed_relaxation(&[(0, 1.0)]);

        assert!(!relaxed.is_mixed_integer());
        assert_eq!(relaxed.bounds[0], Bounds::fixed(1.0));
        assert!(problem.is_mixed_integer());
        assert_eq!(problem.bounds[0], Bounds::new(0.0, 1.0));
    }
}
