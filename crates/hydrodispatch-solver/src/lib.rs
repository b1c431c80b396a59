mod branch;
mod feasibility;
mod problem;
mod simplex;
mod solution;

pub use branch::{MipOptions, MipSolution, MipSolver, MipStatus};
pub use feasibility::primal_violations;
pub use problem::{Bounds, Constraint, ConstraintOp, LpProblem, Objective};
pub use simplex::Solver;
pub use solution::{Analysis, ConstraintViolation, ReducedCost, ShadowPrice, Solution, SolutionStatus};
