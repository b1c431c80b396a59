use crate::problem::{ConstraintOp, LpProblem};
use crate::solution::ConstraintViolation;

/// Check a point against every constraint row and variable bound.
///
/// Violation amounts are signed: positive when the value sits above an upper
/// limit, negative when it sits below a lower limit. Results are ordered worst
/// first by absolute amount.
pub fn primal_violations(problem: &LpProblem, values: &[f64], tolerance: f64) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();

    for c in &problem.constraints {
        let lhs = c.lhs(values);

        let excess = match c.op {
            ConstraintOp::Le if lhs > c.rhs + tolerance => Some(lhs - c.rhs),
            ConstraintOp::Ge if lhs < c.rhs - tolerance => Some(lhs - c.rhs),
            ConstraintOp::Eq if (lhs - c.rhs).abs() > tolerance => Some(lhs - c.rhs),
            _ => None,
        };

        if let Some(amount) = excess {
            let description = match c.op {
                ConstraintOp::Le => format!("{} exceeds maximum of {:.2} by {:.2}", c.name, c.rhs, amount),
                ConstraintOp::Ge => format!("{} is below minimum of {:.2} by {:.2}", c.name, c.rhs, -amount),
                ConstraintOp::Eq => format!("{} requires exactly {:.2} but got {:.2}", c.name, c.rhs, lhs),
            };
            violations.push(ConstraintViolation {
                constraint: c.name.clone(),
                is_bound: false,
                required: c.rhs,
                actual: lhs,
                violation_amount: amount,
                description,
            });
        }
    }

    for ((name, bounds), &value) in problem.variables.iter().zip(&problem.bounds).zip(values) {
        let (required, description) = if value > bounds.upper + tolerance {
            (bounds.upper, format!("{} exceeds upper bound {:.2}", name, bounds.upper))
        } else if value < bounds.lower - tolerance {
            (bounds.lower, format!("{} is below lower bound {:.2}", name, bounds.lower))
        } else {
            continue;
        };
        violations.push(ConstraintViolation {
            constraint: name.clone(),
            is_bound: true,
            required,
            actual: value,
            violation_amount: value - required,
            description,
        });
    }

    // Worst first
    violations.sort_by(|a, b| b.magnitude().total_cmp(&a.magnitude()));

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Bounds;

    fn two_var_problem() -> LpProblem {
        let mut problem = LpProblem::new(vec!["x".to_string(), "y".to_string()]);
        problem.set_bounds(1, Bounds::new(0.0, 10.0));
        problem.add_constraint("cap", vec![1.0, 1.0], ConstraintOp::Le, 5.0);
        problem.add_constraint("floor", vec![1.0, 0.0], ConstraintOp::Ge, 2.0);
        problem.add_constraint("balance", vec![1.0, -1.0], ConstraintOp::Eq, 0.0);
        problem
    }

    #[test]
    fn test_feasible_point_has_no_violations() {
        let problem = two_var_problem();
        assert!(primal_violations(&problem, &[2.5, 2.5], 1e-6).is_empty());
    }

    #[test]
    fn test_signed_amounts() {
        let problem = two_var_problem();
        // cap: 1 + 7 = 8 > 5 (+3); floor: 1 < 2 (-1); balance: 1 - 7 = -6
        let violations = primal_violations(&problem, &[1.0, 7.0], 1e-6);

        assert_eq!(violations.len(), 3);
        assert_eq!(violations[0].constraint, "balance");
        assert!((violations[0].violation_amount + 6.0).abs() < 1e-9);
        assert_eq!(violations[1].constraint, "cap");
        assert!((violations[1].violation_amount - 3.0).abs() < 1e-9);
        assert_eq!(violations[2].constraint, "floor");
        assert!((violations[2].violation_amount + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bound_violations_are_reported() {
        let problem = two_var_problem();
        let violations = primal_violations(&problem, &[12.0, 12.0], 1e-6);

        let bound = violations
            .iter()
            .find(|v| v.is_bound)
            .expect("upper bound of y should be violated");
        assert_eq!(bound.constraint, "y");
        assert!((bound.required - 10.0).abs() < 1e-9);
        assert!((bound.violation_amount - 2.0).abs() < 1e-9);
        // cap is the largest: 24 - 5 = 19
        assert_eq!(violations[0].constraint, "cap");
    }

    #[test]
    fn test_tolerance_absorbs_small_excess() {
        let problem = two_var_problem();
        assert!(primal_violations(&problem, &[2.5, 2.5000001], 1e-3).is_empty());
    }
}
