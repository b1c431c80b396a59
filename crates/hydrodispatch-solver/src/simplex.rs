use std::time::{Duration, Instant};

use crate::problem::{Bounds, ConstraintOp, LpProblem};
use crate::solution::{Analysis, ReducedCost, ShadowPrice, Solution, SolutionStatus};

/// Consecutive degenerate pivots tolerated before switching to Bland's rule
const DEGENERATE_RUN_LIMIT: usize = 50;

/// Simplex solver for linear programming problems.
///
/// Integrality flags on the problem are ignored; this always solves the
/// continuous relaxation.
#[derive(Debug, Clone)]
pub struct Solver {
    /// Maximum iterations before giving up
    max_iterations: usize,
    /// Tolerance for pivot and reduced-cost comparisons
    tolerance: f64,
    /// Residual artificial mass accepted as feasible after phase 1
    feasibility_tolerance: f64,
    /// Wall-clock limit per solve
    time_limit: Option<Duration>,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: 10000,
            tolerance: 1e-9,
            feasibility_tolerance: 1e-7,
            time_limit: None,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Give up with [`SolutionStatus::TimeLimit`] once a solve has run this long
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Solve the LP problem using the two-phase simplex method
    pub fn solve(&self, problem: &LpProblem) -> Solution {
        self.solve_with_bounds(problem, &problem.bounds)
    }

    /// Solve the problem with `bounds` replacing the problem's own variable bounds.
    ///
    /// Branch-and-bound uses this to tighten bounds per node without cloning
    /// the constraint matrix.
    pub fn solve_with_bounds(&self, problem: &LpProblem, bounds: &[Bounds]) -> Solution {
        let Some(form) = StandardForm::build(problem, bounds, self.tolerance) else {
            return Solution::infeasible();
        };
        let mut tableau = Tableau::new(&form);
        let mut run = Run {
            iterations: 0,
            deadline: self.time_limit.map(|limit| Instant::now() + limit),
        };

        // Phase 1: Find initial basic feasible solution
        if tableau.has_artificial {
            match self.phase1(&mut tableau, &mut run) {
                SimplexResult::Optimal => {}
                SimplexResult::Infeasible | SimplexResult::Unbounded => return Solution::infeasible(),
                SimplexResult::IterationLimit => return Solution::iteration_limit(),
                SimplexResult::TimeLimit => return Solution::time_limit(),
            }
        }

        // Phase 2: Optimize
        let exclude_from = tableau.n_cols + tableau.n_slack;
        match self.iterate(&mut tableau, exclude_from, &mut run) {
            SimplexResult::Optimal => {}
            SimplexResult::Unbounded => return Solution::unbounded(),
            SimplexResult::Infeasible => return Solution::infeasible(),
            SimplexResult::IterationLimit => return Solution::iteration_limit(),
            SimplexResult::TimeLimit => return Solution::time_limit(),
        }

        let mut solution = self.extract_solution(&tableau, &form, problem);
        solution.iterations = run.iterations;
        solution
    }

    fn phase1(&self, tableau: &mut Tableau, run: &mut Run) -> SimplexResult {
        // Create auxiliary objective: minimize sum of artificial variables
        // We negate to turn it into maximization (maximize -sum = minimize sum)
        let obj_row = tableau.obj_row();
        let n_cols = tableau.width();
        let art_start = tableau.art_start();

        // Save original objective
        let orig_obj = tableau.data[obj_row].clone();

        tableau.data[obj_row].iter_mut().for_each(|v| *v = 0.0);
        for j in art_start..(art_start + tableau.n_artificial) {
            tableau.data[obj_row][j] = -1.0;
        }

        // Make objective row consistent with basic artificial variables
        for i in 0..obj_row {
            if tableau.basic_vars[i] >= art_start {
                for j in 0..n_cols {
                    tableau.data[obj_row][j] += tableau.data[i][j];
                }
            }
        }

        match self.iterate(tableau, n_cols - 1, run) {
            SimplexResult::Optimal => {}
            // Unbounded is impossible here: the auxiliary objective is bounded by zero
            SimplexResult::Unbounded | SimplexResult::Infeasible => return SimplexResult::Infeasible,
            limit @ (SimplexResult::IterationLimit | SimplexResult::TimeLimit) => return limit,
        }

        let rhs_col = n_cols - 1;
        for i in 0..obj_row {
            if tableau.basic_vars[i] >= art_start && tableau.data[i][rhs_col].abs() > self.feasibility_tolerance {
                return SimplexResult::Infeasible;
            }
        }

        self.drive_out_artificials(tableau);

        // Restore original objective and adjust for basic variables
        tableau.data[obj_row] = orig_obj;
        for i in 0..obj_row {
            let basic = tableau.basic_vars[i];
            let ratio = tableau.data[obj_row][basic];
            if ratio.abs() > self.tolerance {
                for j in 0..n_cols {
                    tableau.data[obj_row][j] -= ratio * tableau.data[i][j];
                }
            }
        }

        SimplexResult::Optimal
    }

    /// Pivot zero-level artificials out of the basis so phase 2 cannot
    /// reintroduce them. Rows with no usable pivot are redundant and left alone.
    fn drive_out_artificials(&self, tableau: &mut Tableau) {
        let art_start = tableau.art_start();
        for i in 0..tableau.obj_row() {
            if tableau.basic_vars[i] < art_start {
                continue;
            }
            let pivot_col = (0..art_start).find(|&j| tableau.data[i][j].abs() > self.tolerance);
            if let Some(col) = pivot_col {
                tableau.pivot(i, col);
            }
        }
    }

    /// Run primal simplex pivots, entering only columns below `limit`
    fn iterate(&self, tableau: &mut Tableau, limit: usize, run: &mut Run) -> SimplexResult {
        let rhs_col = tableau.width() - 1;
        let mut degenerate_run = 0;

        for _ in 0..self.max_iterations {
            let bland = degenerate_run > DEGENERATE_RUN_LIMIT;
            let Some(pivot_col) = self.find_pivot_column(tableau, limit, bland) else {
                return SimplexResult::Optimal;
            };
            if run.deadline.is_some_and(|d| Instant::now() >= d) {
                return SimplexResult::TimeLimit;
            }
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col, bland) else {
                return SimplexResult::Unbounded;
            };

            if tableau.data[pivot_row][rhs_col].abs() <= self.tolerance {
                degenerate_run += 1;
            } else {
                degenerate_run = 0;
            }

            tableau.pivot(pivot_row, pivot_col);
            run.iterations += 1;
        }
        SimplexResult::IterationLimit
    }

    fn find_pivot_column(&self, tableau: &Tableau, limit: usize, bland: bool) -> Option<usize> {
        let obj = &tableau.data[tableau.obj_row()];

        if bland {
            return (0..limit).find(|&j| obj[j] > self.tolerance);
        }

        // Look for the most positive reduced cost (can improve objective)
        let mut max_val = self.tolerance;
        let mut max_col = None;
        for (j, &value) in obj.iter().enumerate().take(limit) {
            if value > max_val {
                max_val = value;
                max_col = Some(j);
            }
        }
        max_col
    }

    fn find_pivot_row(&self, tableau: &Tableau, col: usize, bland: bool) -> Option<usize> {
        let rhs_col = tableau.width() - 1;

        let mut min_ratio = f64::INFINITY;
        let mut min_row: Option<usize> = None;

        for i in 0..tableau.obj_row() {
            let val = tableau.data[i][col];
            if val <= self.tolerance {
                continue;
            }
            let ratio = (tableau.data[i][rhs_col] / val).max(0.0);
            let better = match min_row {
                None => true,
                Some(current) => {
                    if ratio < min_ratio - self.tolerance {
                        true
                    } else if (ratio - min_ratio).abs() <= self.tolerance {
                        // Ties: Bland picks the smallest basic index, otherwise the larger pivot
                        if bland {
                            tableau.basic_vars[i] < tableau.basic_vars[current]
                        } else {
                            val > tableau.data[current][col]
                        }
                    } else {
                        false
                    }
                }
            };
            if better {
                min_ratio = ratio;
                min_row = Some(i);
            }
        }

        min_row
    }

    fn extract_solution(&self, tableau: &Tableau, form: &StandardForm, problem: &LpProblem) -> Solution {
        let rhs_col = tableau.width() - 1;
        let obj_row = tableau.obj_row();

        // Standard-form column values
        let mut x = vec![0.0; form.n_cols];
        for (i, &basic) in tableau.basic_vars.iter().enumerate() {
            if basic < form.n_cols {
                x[basic] = tableau.data[i][rhs_col];
            }
        }

        let values: Vec<f64> = form.columns.iter().map(|column| column.value(&x)).collect();
        let objective_value = problem.objective_value(&values);

        // Shadow prices from the identity column each row started with.
        // The objective row holds c - c_B B^-1 A in maximisation form, so the
        // entry under an identity column is the negated dual of that row.
        let sense = if problem.objective.minimize { 1.0 } else { -1.0 };
        let mut shadow_prices = Vec::with_capacity(form.n_original_rows);
        let mut duals = Vec::with_capacity(form.n_original_rows);
        for (i, constraint) in problem.constraints.iter().enumerate() {
            let row = &form.rows[i];
            let flip = if row.flipped { -1.0 } else { 1.0 };
            let raw = tableau.data[obj_row][tableau.identity_cols[i]];
            let value = clean(sense * flip * raw, self.tolerance);
            duals.push(value);

            let interpretation = if value.abs() < self.tolerance {
                "Non-binding constraint".to_string()
            } else if value > 0.0 {
                format!("Increasing RHS by 1 unit would increase the objective by {:.4}", value)
            } else {
                format!("Increasing RHS by 1 unit would decrease the objective by {:.4}", -value)
            };
            shadow_prices.push(ShadowPrice {
                constraint: constraint.name.clone(),
                value,
                interpretation,
            });
        }

        // Reduced costs: c_j - sum_i dual_i * a_ij over the user's rows
        let basic_cols: Vec<bool> = {
            let mut flags = vec![false; tableau.width()];
            for &b in &tableau.basic_vars {
                flags[b] = true;
            }
            flags
        };
        let reduced_costs = problem
            .variables
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let priced: f64 = problem
                    .constraints
                    .iter()
                    .zip(&duals)
                    .map(|(c, dual)| dual * c.coefficients[j])
                    .sum();
                ReducedCost {
                    variable: name.clone(),
                    value: values[j],
                    reduced_cost: clean(problem.objective.coefficients[j] - priced, self.tolerance),
                    is_basic: form.columns[j].is_basic(&basic_cols),
                }
            })
            .collect();

        let binding_constraints = shadow_prices
            .iter()
            .filter(|sp| sp.value.abs() > self.tolerance)
            .map(|sp| sp.constraint.clone())
            .collect();

        Solution {
            status: SolutionStatus::Optimal,
            values,
            objective_value,
            analysis: Analysis {
                shadow_prices,
                reduced_costs,
                binding_constraints,
            },
            iterations: 0,
        }
    }
}

fn clean(value: f64, tolerance: f64) -> f64 {
    if value.abs() < tolerance { 0.0 } else { value }
}

/// How an original variable maps onto non-negative standard-form columns
#[derive(Debug, Clone, Copy)]
enum Column {
    /// Lower equals upper; the variable is a constant folded into the rhs
    Fixed(f64),
    /// x = lower + x'
    Shifted { col: usize, lower: f64 },
    /// x = upper - x'
    Mirrored { col: usize, upper: f64 },
    /// x = x+ - x-
    Split { pos: usize, neg: usize },
}

impl Column {
    fn value(&self, x: &[f64]) -> f64 {
        match *self {
            Column::Fixed(v) => v,
            Column::Shifted { col, lower } => lower + x[col],
            Column::Mirrored { col, upper } => upper - x[col],
            Column::Split { pos, neg } => x[pos] - x[neg],
        }
    }

    fn is_basic(&self, basic_cols: &[bool]) -> bool {
        match *self {
            Column::Fixed(_) => false,
            Column::Shifted { col, .. } | Column::Mirrored { col, .. } => basic_cols[col],
            Column::Split { pos, neg } => basic_cols[pos] || basic_cols[neg],
        }
    }

    /// Add `coef * x` to a row, returning the constant moved to the rhs
    fn scatter(&self, coef: f64, row: &mut [f64]) -> f64 {
        match *self {
            Column::Fixed(v) => coef * v,
            Column::Shifted { col, lower } => {
                row[col] += coef;
                coef * lower
            }
            Column::Mirrored { col, upper } => {
                row[col] -= coef;
                coef * upper
            }
            Column::Split { pos, neg } => {
                row[pos] += coef;
                row[neg] -= coef;
                0.0
            }
        }
    }
}

#[derive(Debug)]
struct Row {
    coefficients: Vec<f64>,
    op: ConstraintOp,
    rhs: f64,
    /// Row was negated to make the rhs non-negative
    flipped: bool,
}

/// Bounded LP rewritten over non-negative columns with non-negative rhs
#[derive(Debug)]
struct StandardForm {
    columns: Vec<Column>,
    n_cols: usize,
    /// User rows first, then internal upper-bound rows
    rows: Vec<Row>,
    n_original_rows: usize,
    /// Objective coefficients over standard-form columns
    objective: Vec<f64>,
    minimize: bool,
}

impl StandardForm {
    /// Returns `None` when some variable has lower > upper
    fn build(problem: &LpProblem, bounds: &[Bounds], tolerance: f64) -> Option<Self> {
        let mut columns = Vec::with_capacity(bounds.len());
        let mut upper_rows = Vec::new();
        let mut n_cols = 0;

        for b in bounds {
            if b.lower > b.upper + tolerance {
                return None;
            }
            let column = if b.is_fixed(tolerance) {
                Column::Fixed(b.lower)
            } else if b.lower.is_finite() {
                let col = n_cols;
                n_cols += 1;
                if b.upper.is_finite() {
                    upper_rows.push((col, b.upper - b.lower));
                }
                Column::Shifted { col, lower: b.lower }
            } else if b.upper.is_finite() {
                let col = n_cols;
                n_cols += 1;
                Column::Mirrored { col, upper: b.upper }
            } else {
                let pos = n_cols;
                n_cols += 2;
                Column::Split { pos, neg: pos + 1 }
            };
            columns.push(column);
        }

        let mut rows = Vec::with_capacity(problem.num_constraints() + upper_rows.len());
        for c in &problem.constraints {
            let mut coefficients = vec![0.0; n_cols];
            let mut rhs = c.rhs;
            for (j, &coef) in c.coefficients.iter().enumerate() {
                if coef != 0.0 {
                    rhs -= columns[j].scatter(coef, &mut coefficients);
                }
            }
            rows.push(Row::normalized(coefficients, c.op, rhs));
        }
        let n_original_rows = rows.len();

        for (col, width) in upper_rows {
            let mut coefficients = vec![0.0; n_cols];
            coefficients[col] = 1.0;
            rows.push(Row::normalized(coefficients, ConstraintOp::Le, width));
        }

        let mut objective = vec![0.0; n_cols];
        for (j, &coef) in problem.objective.coefficients.iter().enumerate() {
            if coef != 0.0 {
                columns[j].scatter(coef, &mut objective);
            }
        }

        Some(Self {
            columns,
            n_cols,
            rows,
            n_original_rows,
            objective,
            minimize: problem.objective.minimize,
        })
    }
}

impl Row {
    fn normalized(mut coefficients: Vec<f64>, op: ConstraintOp, rhs: f64) -> Self {
        if rhs < 0.0 {
            coefficients.iter_mut().for_each(|v| *v = -*v);
            Self {
                coefficients,
                op: op.flipped(),
                rhs: -rhs,
                flipped: true,
            }
        } else {
            Self {
                coefficients,
                op,
                rhs,
                flipped: false,
            }
        }
    }
}

struct Tableau {
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    /// Column that formed the initial identity for each row (slack or artificial)
    identity_cols: Vec<usize>,
    n_cols: usize,
    n_slack: usize,
    n_artificial: usize,
    has_artificial: bool,
}

impl Tableau {
    fn new(form: &StandardForm) -> Self {
        let n_rows = form.rows.len();
        let n_slack = form.rows.iter().filter(|r| r.op != ConstraintOp::Eq).count();
        let n_artificial = form.rows.iter().filter(|r| r.op != ConstraintOp::Le).count();

        let total_cols = form.n_cols + n_slack + n_artificial + 1; // +1 for RHS

        let mut tableau = Tableau {
            data: vec![vec![0.0; total_cols]; n_rows + 1],
            basic_vars: vec![0; n_rows],
            identity_cols: vec![0; n_rows],
            n_cols: form.n_cols,
            n_slack,
            n_artificial,
            has_artificial: n_artificial > 0,
        };

        let mut slack_idx = form.n_cols;
        let mut artificial_idx = form.n_cols + n_slack;

        for (i, row) in form.rows.iter().enumerate() {
            tableau.data[i][..form.n_cols].copy_from_slice(&row.coefficients);
            tableau.data[i][total_cols - 1] = row.rhs;

            match row.op {
                ConstraintOp::Le => {
                    tableau.data[i][slack_idx] = 1.0;
                    tableau.basic_vars[i] = slack_idx;
                    tableau.identity_cols[i] = slack_idx;
                    slack_idx += 1;
                }
                ConstraintOp::Ge => {
                    tableau.data[i][slack_idx] = -1.0; // surplus
                    slack_idx += 1;
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    tableau.identity_cols[i] = artificial_idx;
                    artificial_idx += 1;
                }
                ConstraintOp::Eq => {
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    tableau.identity_cols[i] = artificial_idx;
                    artificial_idx += 1;
                }
            }
        }

        // Objective row (last row)
        // Simplex maximizes, so for minimization we negate the coefficients
        for (j, &coef) in form.objective.iter().enumerate() {
            tableau.data[n_rows][j] = if form.minimize { -coef } else { coef };
        }

        tableau
    }

    fn obj_row(&self) -> usize {
        self.data.len() - 1
    }

    fn width(&self) -> usize {
        self.data[0].len()
    }

    fn art_start(&self) -> usize {
        self.n_cols + self.n_slack
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let n_rows = self.data.len();
        let n_cols = self.width();

        self.basic_vars[row] = col;

        let pivot_val = self.data[row][col];
        for j in 0..n_cols {
            self.data[row][j] /= pivot_val;
        }

        let pivot_row = self.data[row].clone();
        for i in 0..n_rows {
            if i != row {
                let factor = self.data[i][col];
                if factor != 0.0 {
                    for j in 0..n_cols {
                        self.data[i][j] -= factor * pivot_row[j];
                    }
                }
            }
        }
    }
}

enum SimplexResult {
    Optimal,
    Unbounded,
    Infeasible,
    IterationLimit,
    TimeLimit,
}

/// Pivot count and deadline shared by both phases of one solve
struct Run {
    iterations: usize,
    deadline: Option<Instant>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::LpProblem;

    #[test]
    fn test_simple_maximization() {
        // Maximize: 3x + 2y
        // Subject to:
        //   x + y <= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=11
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![3.0, 2.0], false);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Le, 4.0);
        problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0);
        problem.add_constraint("y_max", vec![0.0, 1.0], ConstraintOp::Le, 3.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
        assert!((solution.objective_value - 11.0).abs() < 1e-6, "obj = {} (expected 11)", solution.objective_value);

        // Raising `sum` lets y grow: +2 per unit. Raising x_max trades y for x: +1.
        assert!((solution.duals()[0] - 2.0).abs() < 1e-6, "sum dual = {}", solution.duals()[0]);
        assert!((solution.duals()[1] - 1.0).abs() < 1e-6, "x_max dual = {}", solution.duals()[1]);
        assert!(solution.duals()[2].abs() < 1e-6);
    }

    #[test]
    fn test_minimization_with_ge() {
        // Minimize: 2x + 3y
        // Subject to:
        //   x + y >= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=9
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![2.0, 3.0], true);
        problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Ge, 4.0);
        problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0);
        problem.add_constraint("y_max", vec![0.0, 1.0], ConstraintOp::Le, 3.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", solution.values[0]);
        assert!((solution.values[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", solution.values[1]);
        assert!((solution.objective_value - 9.0).abs() < 1e-6, "obj = {} (expected 9)", solution.objective_value);

        // One more unit of demand is served by y at 3; one more unit of x capacity saves 1
        assert!((solution.duals()[0] - 3.0).abs() < 1e-6, "sum dual = {}", solution.duals()[0]);
        assert!((solution.duals()[1] + 1.0).abs() < 1e-6, "x_max dual = {}", solution.duals()[1]);
        assert_eq!(solution.analysis.binding_constraints, vec!["sum".to_string(), "x_max".to_string()]);
    }

    #[test]
    fn test_infeasible() {
        // x >= 5
        // x <= 3
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], true);
        problem.add_constraint("lower", vec![1.0], ConstraintOp::Ge, 5.0);
        problem.add_constraint("upper", vec![1.0], ConstraintOp::Le, 3.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Infeasible);
    }

    #[test]
    fn test_unbounded() {
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![1.0], false);
        problem.add_constraint("floor", vec![1.0], ConstraintOp::Ge, 1.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Unbounded);
    }

    #[test]
    fn test_equality_dual_is_marginal_cost() {
        // Two units serving a fixed demand of 150 through an equality row.
        // The cheap unit is capped by its bound, the expensive one sets the price.
        let mut problem = LpProblem::new(Vec::new());
        problem.add_variable("cheap", Bounds::new(0.0, 100.0), 10.0);
        problem.add_variable("expensive", Bounds::new(0.0, 100.0), 50.0);
        problem.add_constraint("balance", vec![1.0, 1.0], ConstraintOp::Eq, 150.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 100.0).abs() < 1e-6);
        assert!((solution.values[1] - 50.0).abs() < 1e-6);
        assert!((solution.objective_value - 3500.0).abs() < 1e-6);
        assert!((solution.dual(0).unwrap() - 50.0).abs() < 1e-6, "balance dual = {:?}", solution.dual(0));

        // The capped unit would lower cost by 40 per extra MW of capacity
        let cheap = &solution.analysis.reduced_costs[0];
        assert!((cheap.reduced_cost + 40.0).abs() < 1e-6, "rc = {}", cheap.reduced_cost);
    }

    #[test]
    fn test_flipped_row_keeps_dual_sign() {
        // -x <= -2 is x >= 2 written with a negative rhs
        let mut problem = LpProblem::new(vec!["x".to_string()]);
        problem.set_objective(vec![4.0], true);
        problem.add_constraint("neg_floor", vec![-1.0], ConstraintOp::Le, -2.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[0] - 2.0).abs() < 1e-6);
        // Raising the rhs to -1 relaxes the floor to 1 and saves 4
        assert!((solution.dual(0).unwrap() + 4.0).abs() < 1e-6, "dual = {:?}", solution.dual(0));
    }

    #[test]
    fn test_free_and_fixed_variables() {
        // y is free and pinned by an equality to a fixed x
        let mut problem = LpProblem::new(Vec::new());
        let x = problem.add_variable("x", Bounds::fixed(3.0), 1.0);
        let y = problem.add_variable("y", Bounds::FREE, 1.0);
        problem.add_sparse_constraint("link", &[(y, 1.0), (x, 2.0)], ConstraintOp::Eq, 1.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.values[x] - 3.0).abs() < 1e-6);
        assert!((solution.values[y] + 5.0).abs() < 1e-6, "y = {}", solution.values[y]);
        assert!((solution.objective_value + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_contradictory_fixed_bounds_are_infeasible() {
        let mut problem = LpProblem::new(Vec::new());
        problem.add_variable("a", Bounds::fixed(0.0), 1.0);
        problem.add_variable("b", Bounds::fixed(0.0), 1.0);
        problem.add_constraint("balance", vec![1.0, 1.0], ConstraintOp::Eq, 10.0);

        assert_eq!(Solver::new().solve(&problem).status, SolutionStatus::Infeasible);

        problem.set_bounds(0, Bounds::new(2.0, 1.0));
        assert_eq!(Solver::new().solve(&problem).status, SolutionStatus::Infeasible);
    }

    #[test]
    fn test_time_limit_stops_pivoting() {
        let mut problem = LpProblem::new(Vec::new());
        problem.add_variable("cheap", Bounds::new(0.0, 100.0), 10.0);
        problem.add_variable("expensive", Bounds::new(0.0, 100.0), 50.0);
        problem.add_constraint("balance", vec![1.0, 1.0], ConstraintOp::Eq, 150.0);

        let solution = Solver::new().with_time_limit(Duration::ZERO).solve(&problem);

        assert_eq!(solution.status, SolutionStatus::TimeLimit);
        assert!(solution.values.is_empty());
        assert!(solution.dual(0).is_none());

        // Already optimal at the starting basis: no pivot, no deadline check
        let mut trivial = LpProblem::new(Vec::new());
        trivial.add_variable("x", Bounds::new(0.0, 4.0), 1.0);
        let solution = Solver::new().with_time_limit(Duration::ZERO).solve(&trivial);
        assert_eq!(solution.status, SolutionStatus::Optimal);
    }

    #[test]
    fn test_redundant_equalities() {
        // Duplicate equality rows leave a zero-level artificial after phase 1
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_objective(vec![1.0, 2.0], true);
        problem.add_constraint("a", vec![1.0, 1.0], ConstraintOp::Eq, 5.0);
        problem.add_constraint("b", vec![2.0, 2.0], ConstraintOp::Eq, 10.0);

        let solution = Solver::new().solve(&problem);

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((solution.objective_value - 5.0).abs() < 1e-6);
        assert!((solution.values[0] - 5.0).abs() < 1e-6);
    }
}
