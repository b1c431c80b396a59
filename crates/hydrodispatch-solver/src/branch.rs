use std::time::{Duration, Instant};

use crate::problem::{Bounds, LpProblem};
use crate::simplex::Solver;
use crate::solution::SolutionStatus;

/// Options for mixed-integer solves
#[derive(Debug, Clone)]
pub struct MipOptions {
    /// Maximum number of nodes to explore in branch-and-bound
    pub max_nodes: usize,
    /// Tolerance for integer feasibility
    pub int_tol: f64,
    /// Relative optimality gap at which the search stops
    pub gap_tol: f64,
    /// Wall-clock limit for the whole search
    pub time_limit: Option<Duration>,
}

impl Default for MipOptions {
    fn default() -> Self {
        Self {
            max_nodes: 10000,
            int_tol: 1e-6,
            gap_tol: 1e-4,
            time_limit: None,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipStatus {
    /// Search tree exhausted; the incumbent is optimal
    Optimal,
    /// Incumbent proven within `gap_tol` of the best bound
    WithinGap,
    /// Time limit hit with an incumbent
    TimeLimit,
    /// Node limit hit with an incumbent
    NodeLimit,
    /// A limit was hit before any integer-feasible point was found
    NoSolution,
    /// No integer-feasible point exists
    Infeasible,
    /// The relaxation is unbounded
    Unbounded,
    /// LP subproblems failed on their iteration or time limit
    Error,
}

impl MipStatus {
    /// Whether an integer-feasible incumbent is available
    pub fn has_solution(&self) -> bool {
        matches!(
            self,
            MipStatus::Optimal | MipStatus::WithinGap | MipStatus::TimeLimit | MipStatus::NodeLimit
        )
    }

    /// Whether the search finished without hitting a limit
    pub fn is_proven(&self) -> bool {
        matches!(self, MipStatus::Optimal | MipStatus::WithinGap)
    }
}

impl std::fmt::Display for MipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MipStatus::Optimal => write!(f, "optimal"),
            MipStatus::WithinGap => write!(f, "within_gap"),
            MipStatus::TimeLimit => write!(f, "time_limit"),
            MipStatus::NodeLimit => write!(f, "node_limit"),
            MipStatus::NoSolution => write!(f, "no_solution"),
            MipStatus::Infeasible => write!(f, "infeasible"),
            MipStatus::Unbounded => write!(f, "unbounded"),
            MipStatus::Error => write!(f, "error"),
        }
    }
}

/// Result of a branch-and-bound search
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct MipSolution {
    pub status: MipStatus,
    /// Incumbent values (empty when there is none)
    pub values: Vec<f64>,
    /// Incumbent objective in the problem's own sense
    pub objective_value: f64,
    /// Best proven bound on the objective, in the problem's own sense
    pub best_bound: f64,
    /// Relative gap between incumbent and bound, when both are finite
    pub gap: Option<f64>,
    /// Nodes whose relaxation was solved
    pub nodes: usize,
    pub elapsed: Duration,
}

impl MipSolution {
    fn without_incumbent(status: MipStatus, nodes: usize, elapsed: Duration) -> Self {
        Self {
            status,
            values: Vec::new(),
            objective_value: f64::NAN,
            best_bound: f64::NAN,
            gap: None,
            nodes,
            elapsed,
        }
    }
}

struct Node {
    bounds: Vec<Bounds>,
    /// Relaxation objective of the parent, in minimisation form
    bound: f64,
    depth: usize,
}

/// Branch-and-bound over LP relaxations solved by [`Solver`]
#[derive(Debug, Clone, Default)]
pub struct MipSolver {
    options: MipOptions,
    lp: Solver,
}

impl MipSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: MipOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_lp_solver(mut self, lp: Solver) -> Self {
        self.lp = lp;
        self
    }

    /// Solve the problem honouring its integrality flags.
    ///
    /// The search dives depth-first, rounding up, until it holds an
    /// incumbent, so a limit hit early still leaves a usable point. After
    /// that nodes are explored best-bound first. Branching is on the most
    /// fractional integer variable. Nodes whose relaxation hits an LP limit
    /// are pruned.
    pub fn solve(&self, problem: &LpProblem) -> MipSolution {
        let start = Instant::now();
        let sense = if problem.objective.minimize { 1.0 } else { -1.0 };
        let int_tol = self.options.int_tol;

        let mut root_bounds = problem.bounds.clone();
        for j in problem.integer_indices() {
            let b = &mut root_bounds[j];
            b.lower = (b.lower - int_tol).ceil();
            b.upper = (b.upper + int_tol).floor();
        }

        let mut open = vec![Node {
            bounds: root_bounds,
            bound: f64::NEG_INFINITY,
            depth: 0,
        }];
        let mut incumbent: Option<(Vec<f64>, f64)> = None;
        let mut nodes = 0;
        let mut limit_hit = None;
        let mut stopped_at_gap = false;
        let mut unbounded = false;
        let mut lp_failures = 0;

        while !open.is_empty() {
            let best_open = open.iter().map(|n| n.bound).fold(f64::INFINITY, f64::min);
            if let Some((_, key)) = &incumbent {
                if relative_gap(*key, best_open.min(*key)) <= self.options.gap_tol {
                    stopped_at_gap = true;
                    break;
                }
            }
            if nodes >= self.options.max_nodes {
                limit_hit = Some(MipStatus::NodeLimit);
                break;
            }
            if self.options.time_limit.is_some_and(|limit| start.elapsed() >= limit) {
                limit_hit = Some(MipStatus::TimeLimit);
                break;
            }

            // Plunge on the newest node until there is an incumbent, then best bound
            let pick = if incumbent.is_none() {
                open.len() - 1
            } else {
                open.iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.bound.total_cmp(&b.bound).then(b.depth.cmp(&a.depth)))
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            };
            let node = open.swap_remove(pick);

            if let Some((_, key)) = &incumbent {
                if node.bound >= *key - self.lp.tolerance() {
                    continue;
                }
            }

            nodes += 1;
            let relaxed = self.lp.solve_with_bounds(problem, &node.bounds);
            match relaxed.status {
                SolutionStatus::Optimal => {}
                SolutionStatus::Infeasible => continue,
                SolutionStatus::Unbounded => {
                    unbounded = true;
                    continue;
                }
                SolutionStatus::IterationLimit | SolutionStatus::TimeLimit => {
                    lp_failures += 1;
                    continue;
                }
            }

            let key = sense * relaxed.objective_value;
            if let Some((_, best)) = &incumbent {
                if key >= *best - self.lp.tolerance() {
                    continue;
                }
            }

            match most_fractional(problem, &relaxed.values, int_tol) {
                None => {
                    let mut values = relaxed.values;
                    for j in problem.integer_indices() {
                        values[j] = values[j].round();
                    }
                    let key = sense * problem.objective_value(&values);
                    let tol = self.lp.tolerance();
                    open.retain(|n| n.bound < key - tol);
                    incumbent = Some((values, key));
                }
                Some(j) => {
                    let value = relaxed.values[j];
                    let mut down = node.bounds.clone();
                    down[j].upper = value.floor();
                    let mut up = node.bounds;
                    up[j].lower = value.ceil();
                    // Up is pushed last so the plunge commits first
                    open.push(Node {
                        bounds: down,
                        bound: key,
                        depth: node.depth + 1,
                    });
                    open.push(Node {
                        bounds: up,
                        bound: key,
                        depth: node.depth + 1,
                    });
                }
            }
        }

        let elapsed = start.elapsed();
        let Some((values, key)) = incumbent else {
            let status = if limit_hit.is_some() {
                MipStatus::NoSolution
            } else if unbounded {
                MipStatus::Unbounded
            } else if lp_failures > 0 {
                MipStatus::Error
            } else {
                MipStatus::Infeasible
            };
            return MipSolution::without_incumbent(status, nodes, elapsed);
        };

        let status = match limit_hit {
            Some(limit) => limit,
            None if stopped_at_gap => MipStatus::WithinGap,
            None => MipStatus::Optimal,
        };

        let bound_key = if matches!(status, MipStatus::Optimal) {
            key
        } else {
            open.iter().map(|n| n.bound).fold(key, f64::min)
        };
        let gap = if bound_key.is_finite() {
            Some(relative_gap(key, bound_key))
        } else {
            None
        };

        MipSolution {
            status,
            objective_value: sense * key,
            best_bound: sense * bound_key,
            gap,
            values,
            nodes,
            elapsed,
        }
    }
}

/// Integer variable furthest from integrality, if any
fn most_fractional(problem: &LpProblem, values: &[f64], int_tol: f64) -> Option<usize> {
    let mut best = None;
    let mut best_distance = int_tol;
    for j in problem.integer_indices() {
        let frac = values[j] - values[j].floor();
        let distance = frac.min(1.0 - frac);
        if distance > best_distance {
            best_distance = distance;
            best = Some(j);
        }
    }
    best
}

fn relative_gap(incumbent: f64, bound: f64) -> f64 {
    (incumbent - bound).abs() / incumbent.abs().max(1e-10)
}
