use std::time::{Duration, Instant};

use hydrodispatch_solver::{MipOptions, MipSolver, MipStatus, Solution, SolutionStatus, Solver};
use tracing::{debug, info, warn};

use crate::config::SolveConfig;
use crate::model::{DispatchModel, SolveKind};

/// Fractional part at or above which an integer value rounds up
pub const ROUNDING_THRESHOLD: f64 = 0.5;

/// Phases of one solve invocation
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvePhase {
    NotStarted,
    Stage1Running,
    /// Terminal: stage 1 found no usable solution
    Stage1Infeasible,
    Stage1Ok,
    Stage2Running,
    /// Linear re-solve optimal, duals available
    Stage2Ok,
    /// Linear re-solve failed, stage-1 primal kept
    Stage2Degenerate,
    Extracted,
}

impl SolvePhase {
    pub fn can_advance_to(self, next: SolvePhase) -> bool {
        use SolvePhase::*;
        matches!(
            (self, next),
            (NotStarted, Stage1Running)
                | (Stage1Running, Stage1Infeasible)
                | (Stage1Running, Stage1Ok)
                | (Stage1Ok, Stage2Running)
                | (Stage2Running, Stage2Ok)
                | (Stage2Running, Stage2Degenerate)
                | (Stage2Ok, Extracted)
                | (Stage2Degenerate, Extracted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SolvePhase::Stage1Infeasible | SolvePhase::Extracted)
    }

    fn advance(&mut self, next: SolvePhase) {
        debug_assert!(self.can_advance_to(next), "{:?} -> {:?}", self, next);
        let from = *self;
        debug!(?from, to = ?next, "solve phase");
        *self = next;
    }
}

/// Overall outcome of a solve
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Optimal,
    /// Integer search stopped on a limit with an incumbent
    FeasibleTimeLimit,
    Infeasible,
    SolverError,
}

impl DispatchStatus {
    pub fn has_solution(self) -> bool {
        matches!(self, DispatchStatus::Optimal | DispatchStatus::FeasibleTimeLimit)
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStatus::Optimal => write!(f, "optimal"),
            DispatchStatus::FeasibleTimeLimit => write!(f, "feasible_time_limit"),
            DispatchStatus::Infeasible => write!(f, "infeasible"),
            DispatchStatus::SolverError => write!(f, "solver_error"),
        }
    }
}

/// Wall-clock seconds spent in each stage
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timing {
    pub stage1_seconds: f64,
    pub stage2_seconds: f64,
}

/// Result of the mixed-integer stage. Integrality makes row duals
/// meaningless here, so none are exposed.
#[derive(Debug, Clone)]
pub struct IntegerStage {
    status: MipStatus,
    values: Vec<f64>,
    objective_value: f64,
    best_bound: f64,
    gap: Option<f64>,
    nodes: usize,
    elapsed: Duration,
}

impl IntegerStage {
    pub fn status(&self) -> MipStatus {
        self.status
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.status.has_solution().then_some(self.objective_value)
    }

    pub fn best_bound(&self) -> f64 {
        self.best_bound
    }

    pub fn gap(&self) -> Option<f64> {
        self.gap
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Result of the fixed-commitment linear stage, the only source of duals
#[derive(Debug, Clone)]
pub struct LinearStage {
    model: DispatchModel,
    solution: Solution,
    elapsed: Duration,
}

impl LinearStage {
    pub fn status(&self) -> SolutionStatus {
        self.solution.status
    }

    pub fn is_optimal(&self) -> bool {
        self.solution.is_optimal()
    }

    /// The fixed linear copy that was solved
    pub fn model(&self) -> &DispatchModel {
        &self.model
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.is_optimal().then_some(self.solution.objective_value)
    }

    /// Dual of row `row`, only when the re-solve is optimal
    pub fn dual(&self, row: usize) -> Option<f64> {
        if self.is_optimal() {
            self.solution.dual(row)
        } else {
            None
        }
    }

    /// Dual of `group[entity,period]`
    pub fn dual_of(&self, group: &str, entity: &str, period: usize) -> Option<f64> {
        self.dual(self.model.constraint(group, entity, period)?)
    }

    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Everything a solve invocation produced. Owns the stage-1 model so it
/// stays available for diagnostics.
#[derive(Debug, Clone)]
pub struct RawOutcome {
    model: DispatchModel,
    status: DispatchStatus,
    phase: SolvePhase,
    stage1: IntegerStage,
    stage2: Option<LinearStage>,
    committed: Vec<(usize, f64)>,
    gap_exceeded: bool,
}

impl RawOutcome {
    pub fn status(&self) -> DispatchStatus {
        self.status
    }

    pub fn phase(&self) -> SolvePhase {
        self.phase
    }

    /// Stage-1 model, carrying the recorded integer solution when one exists
    pub fn model(&self) -> &DispatchModel {
        &self.model
    }

    pub fn into_model(self) -> DispatchModel {
        self.model
    }

    pub fn integer_stage(&self) -> &IntegerStage {
        &self.stage1
    }

    pub fn linear_stage(&self) -> Option<&LinearStage> {
        self.stage2.as_ref()
    }

    /// `None` when stage 2 never ran
    pub fn has_duals(&self) -> Option<bool> {
        self.stage2.as_ref().map(LinearStage::is_optimal)
    }

    /// Stage-1 objective, the authoritative cost
    pub fn objective_value(&self) -> Option<f64> {
        if self.status.has_solution() {
            self.stage1.objective_value()
        } else {
            None
        }
    }

    /// Stage-1 value of `group[entity,period]`
    pub fn primal(&self, group: &str, entity: &str, period: usize) -> Option<f64> {
        self.stage1.value(self.model.variable(group, entity, period)?)
    }

    /// Integer variables and the values they were fixed to in stage 2
    pub fn committed(&self) -> &[(usize, f64)] {
        &self.committed
    }

    pub fn committed_value(&self, index: usize) -> Option<f64> {
        self.committed
            .iter()
            .find(|(j, _)| *j == index)
            .map(|&(_, value)| value)
    }

    pub fn gap(&self) -> Option<f64> {
        self.stage1.gap
    }

    pub fn gap_exceeded(&self) -> bool {
        self.gap_exceeded
    }

    pub fn timing(&self) -> Timing {
        Timing {
            stage1_seconds: self.stage1.seconds(),
            stage2_seconds: self.stage2.as_ref().map_or(0.0, LinearStage::seconds),
        }
    }
}

/// Round to the nearest whole number within `[lower, upper]`
pub fn round_commitment(value: f64, lower: f64, upper: f64) -> f64 {
    let floor = value.floor();
    let rounded = if value - floor >= ROUNDING_THRESHOLD {
        floor + 1.0
    } else {
        floor
    };
    rounded.max(lower.ceil()).min(upper.floor())
}

/// Solve `model` in two stages: integer commitment first, then a linear
/// re-solve with every integer variable fixed to its rounded value.
///
/// Failures are reported through the outcome's status and phase, never as
/// errors.
pub fn solve(mut model: DispatchModel, config: &SolveConfig) -> RawOutcome {
    let mut phase = SolvePhase::NotStarted;
    let lp = Solver::new()
        .with_max_iterations(config.max_lp_iterations)
        .with_tolerance(config.lp_tolerance);

    phase.advance(SolvePhase::Stage1Running);
    let mip = MipSolver::new()
        .with_options(MipOptions {
            max_nodes: config.node_limit,
            gap_tol: config.mip_gap,
            time_limit: config.time_limit(),
            ..MipOptions::default()
        })
        .with_lp_solver(lp.clone());
    let mip_solution = mip.solve(model.problem());

    let stage1 = IntegerStage {
        status: mip_solution.status,
        objective_value: mip_solution.objective_value,
        best_bound: mip_solution.best_bound,
        gap: mip_solution.gap,
        nodes: mip_solution.nodes,
        elapsed: mip_solution.elapsed,
        values: mip_solution.values,
    };

    let (status, gap_exceeded) = match stage1.status {
        MipStatus::Optimal | MipStatus::WithinGap => (DispatchStatus::Optimal, false),
        MipStatus::TimeLimit | MipStatus::NodeLimit => {
            let exceeded = stage1.gap.is_none_or(|g| g > config.gap_warning_threshold);
            if exceeded {
                warn!(
                    status = %stage1.status,
                    gap = ?stage1.gap,
                    threshold = config.gap_warning_threshold,
                    "Stage 1 stopped on a limit with a gap above the warning threshold"
                );
            }
            (DispatchStatus::FeasibleTimeLimit, exceeded)
        }
        MipStatus::Infeasible => (DispatchStatus::Infeasible, false),
        MipStatus::NoSolution | MipStatus::Unbounded | MipStatus::Error => (DispatchStatus::SolverError, false),
    };

    if !status.has_solution() {
        phase.advance(SolvePhase::Stage1Infeasible);
        info!(
            model = model.name(),
            status = %stage1.status,
            seconds = stage1.seconds(),
            "Stage 1 finished without a solution"
        );
        return RawOutcome {
            model,
            status,
            phase,
            stage1,
            stage2: None,
            committed: Vec::new(),
            gap_exceeded,
        };
    }

    model.record_solution(SolveKind::Mip, stage1.values.clone());
    phase.advance(SolvePhase::Stage1Ok);
    info!(
        model = model.name(),
        status = %stage1.status,
        objective = stage1.objective_value,
        nodes = stage1.nodes,
        seconds = stage1.seconds(),
        "Stage 1 complete"
    );

    let committed = commitment(&model, &stage1.values, config);

    phase.advance(SolvePhase::Stage2Running);
    let start = Instant::now();
    let mut relaxed = model.fixed_relaxation(&committed);
    let lp = match config.linear_time_limit() {
        Some(limit) => lp.with_time_limit(limit),
        None => lp,
    };
    let solution = lp.solve(relaxed.problem());
    let elapsed = start.elapsed();

    if solution.is_optimal() {
        relaxed.record_solution(SolveKind::Lp, solution.values.clone());
        phase.advance(SolvePhase::Stage2Ok);
        let drift = (solution.objective_value - stage1.objective_value).abs();
        if drift > 1e-6 * (1.0 + stage1.objective_value.abs()) {
            debug!(
                stage1 = stage1.objective_value,
                stage2 = solution.objective_value,
                "Stage-2 objective differs from stage 1"
            );
        }
        info!(
            objective = solution.objective_value,
            iterations = solution.iterations,
            seconds = elapsed.as_secs_f64(),
            "Stage 2 complete"
        );
    } else {
        phase.advance(SolvePhase::Stage2Degenerate);
        warn!(
            status = %solution.status,
            "Fixed-commitment re-solve failed; keeping stage-1 dispatch without duals"
        );
    }

    RawOutcome {
        model,
        status,
        phase,
        stage1,
        stage2: Some(LinearStage {
            model: relaxed,
            solution,
            elapsed,
        }),
        committed,
        gap_exceeded,
    }
}

/// Rounded stage-1 value of every integer variable, with overrides applied
fn commitment(model: &DispatchModel, values: &[f64], config: &SolveConfig) -> Vec<(usize, f64)> {
    let problem = model.problem();
    let mut committed: Vec<(usize, f64)> = problem
        .integer_indices()
        .map(|j| {
            let b = problem.bounds[j];
            (j, round_commitment(values[j], b.lower, b.upper))
        })
        .collect();

    for o in &config.commitment_overrides {
        let slot = model
            .variable(&o.group, &o.entity, o.period)
            .and_then(|index| committed.iter_mut().find(|(j, _)| *j == index));
        match slot {
            Some(slot) => {
                debug!(group = %o.group, entity = %o.entity, period = o.period, value = o.value, "Commitment override");
                slot.1 = o.value;
            }
            None => warn!(
                group = %o.group,
                entity = %o.entity,
                period = o.period,
                "Override does not name an integer variable; ignored"
            ),
        }
    }

    committed
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydrodispatch_solver::{Bounds, ConstraintOp};

    /// One zone, two units with no-load costs, optional deficit
    fn two_unit_model(demand: f64, with_deficit: bool) -> DispatchModel {
        let mut m = DispatchModel::new("test");
        let u1 = m
            .add_integer_variable("thermal_commitment", "T1", 0, Bounds::new(0.0, 1.0), 100.0)
            .unwrap();
        let g1 = m
            .add_variable("thermal_generation", "T1", 0, Bounds::new(0.0, 80.0), 1.0)
            .unwrap();
        let u2 = m
            .add_integer_variable("thermal_commitment", "T2", 0, Bounds::new(0.0, 1.0), 10.0)
            .unwrap();
        let g2 = m
            .add_variable("thermal_generation", "T2", 0, Bounds::new(0.0, 80.0), 5.0)
            .unwrap();
        m.add_constraint("thermal_max_gen", "T1", 0, &[(g1, 1.0), (u1, -80.0)], ConstraintOp::Le, 0.0)
            .unwrap();
        m.add_constraint("thermal_max_gen", "T2", 0, &[(g2, 1.0), (u2, -80.0)], ConstraintOp::Le, 0.0)
            .unwrap();
        let mut balance = vec![(g1, 1.0), (g2, 1.0)];
        if with_deficit {
            let d = m.add_variable("deficit", "Z", 0, Bounds::NON_NEGATIVE, 1000.0).unwrap();
            balance.push((d, 1.0));
        }
        m.add_constraint("submarket_balance", "Z", 0, &balance, ConstraintOp::Eq, demand)
            .unwrap();
        m
    }

    #[test]
    fn test_round_commitment() {
        assert_eq!(round_commitment(0.49, 0.0, 1.0), 0.0);
        assert_eq!(round_commitment(0.5, 0.0, 1.0), 1.0);
        assert_eq!(round_commitment(0.999_999, 0.0, 1.0), 1.0);
        assert_eq!(round_commitment(1.7, 0.0, 1.0), 1.0);
        assert_eq!(round_commitment(-0.2, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_phase_transitions() {
        assert!(SolvePhase::NotStarted.can_advance_to(SolvePhase::Stage1Running));
        assert!(SolvePhase::Stage2Degenerate.can_advance_to(SolvePhase::Extracted));
        assert!(!SolvePhase::Stage1Infeasible.can_advance_to(SolvePhase::Stage2Running));
        assert!(!SolvePhase::NotStarted.can_advance_to(SolvePhase::Stage2Running));
        assert!(SolvePhase::Extracted.is_terminal());
    }

    #[test]
    fn test_two_stage_gives_marginal_price() {
        let outcome = solve(two_unit_model(120.0, false), &SolveConfig::default());

        assert_eq!(outcome.status(), DispatchStatus::Optimal);
        assert_eq!(outcome.phase(), SolvePhase::Stage2Ok);
        assert_eq!(outcome.has_duals(), Some(true));

        // 100 + 10 + 80 * 1 + 40 * 5
        let objective = outcome.objective_value().unwrap();
        assert!((objective - 390.0).abs() < 1e-6, "objective = {} (expected 390)", objective);

        let stage2 = outcome.linear_stage().unwrap();
        let price = stage2.dual_of("submarket_balance", "Z", 0).unwrap();
        assert!((price - 5.0).abs() < 1e-6, "price = {} (expected 5)", price);
        assert!(outcome.model().solved().is_some());
        assert!(!outcome.model().problem().bounds[0].is_fixed(1e-9));
    }

    #[test]
    fn test_infeasible_stage1_skips_stage2() {
        let outcome = solve(two_unit_model(500.0, false), &SolveConfig::default());

        assert_eq!(outcome.status(), DispatchStatus::Infeasible);
        assert_eq!(outcome.phase(), SolvePhase::Stage1Infeasible);
        assert_eq!(outcome.has_duals(), None);
        assert!(outcome.linear_stage().is_none());
        assert!(outcome.objective_value().is_none());
        assert!(outcome.model().solved().is_none());
    }

    #[test]
    fn test_override_makes_stage2_degenerate() {
        let config = SolveConfig::default()
            .with_override("thermal_commitment", "T1", 0, 0.0)
            .with_override("thermal_commitment", "T2", 0, 0.0);
        let outcome = solve(two_unit_model(120.0, false), &config);

        assert_eq!(outcome.status(), DispatchStatus::Optimal);
        assert_eq!(outcome.phase(), SolvePhase::Stage2Degenerate);
        assert_eq!(outcome.has_duals(), Some(false));
        assert!((outcome.objective_value().unwrap() - 390.0).abs() < 1e-6);
        assert_eq!(outcome.linear_stage().unwrap().dual(0), None);
        let g1 = outcome.primal("thermal_generation", "T1", 0).unwrap();
        assert!((g1 - 80.0).abs() < 1e-6, "g1 = {} (expected 80)", g1);
    }

    #[test]
    fn test_linear_stage_time_limit_keeps_stage1() {
        let config = SolveConfig::default().with_linear_time_limit(0.0);
        let outcome = solve(two_unit_model(120.0, false), &config);

        assert_eq!(outcome.status(), DispatchStatus::Optimal);
        assert_eq!(outcome.phase(), SolvePhase::Stage2Degenerate);
        assert_eq!(outcome.has_duals(), Some(false));
        assert_eq!(outcome.linear_stage().unwrap().status(), SolutionStatus::TimeLimit);
        assert!((outcome.objective_value().unwrap() - 390.0).abs() < 1e-6);
    }

    #[test]
    fn test_node_limit_with_incumbent_is_flagged() {
        // The dive finds u1 = 1 (150) at node 2 against a root bound of 112.5
        let config = SolveConfig::default().with_node_limit(2);
        let outcome = solve(two_unit_model(50.0, true), &config);

        assert_eq!(outcome.status(), DispatchStatus::FeasibleTimeLimit);
        assert!(outcome.gap_exceeded());
        let gap = outcome.gap().unwrap();
        assert!((gap - 0.25).abs() < 1e-9, "gap = {}", gap);
        assert!((outcome.objective_value().unwrap() - 150.0).abs() < 1e-6);

        assert_eq!(outcome.has_duals(), Some(true));
        let price = outcome.linear_stage().unwrap().dual_of("submarket_balance", "Z", 0).unwrap();
        assert!((price - 1.0).abs() < 1e-6, "price = {} (expected 1)", price);
    }

    #[test]
    fn test_unknown_override_is_ignored() {
        let config = SolveConfig::default().with_override("thermal_commitment", "T9", 0, 0.0);
        let outcome = solve(two_unit_model(50.0, true), &config);

        assert_eq!(outcome.has_duals(), Some(true));
        assert_eq!(outcome.committed_value(0), Some(1.0));
    }

    #[test]
    fn test_node_limit_without_incumbent_is_solver_error() {
        let outcome = solve(two_unit_model(50.0, true), &SolveConfig::default().with_node_limit(0));

        assert_eq!(outcome.status(), DispatchStatus::SolverError);
        assert_eq!(outcome.phase(), SolvePhase::Stage1Infeasible);
    }
}
