use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use hydrodispatch_solver::primal_violations;
use tracing::debug;

use crate::error::DiagnosticError;
use crate::model::DispatchModel;

/// Subsystem a constraint belongs to
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintCategory {
    Thermal,
    Hydro,
    Balance,
    Network,
    Ramp,
    Unknown,
}

/// Name fragments tried in order; the first match wins
const RULES: [(&str, ConstraintCategory); 5] = [
    ("thermal", ConstraintCategory::Thermal),
    ("hydro", ConstraintCategory::Hydro),
    ("balance", ConstraintCategory::Balance),
    ("network", ConstraintCategory::Network),
    ("ramp", ConstraintCategory::Ramp),
];

/// Only consulted when no rule matches
const SYNONYMS: [(&str, ConstraintCategory); 5] = [
    ("reservoir", ConstraintCategory::Hydro),
    ("water", ConstraintCategory::Hydro),
    ("line_flow", ConstraintCategory::Network),
    ("branch", ConstraintCategory::Network),
    ("angle", ConstraintCategory::Network),
];

impl ConstraintCategory {
    /// Classify an untagged constraint by its name
    pub fn classify(name: &str) -> Self {
        let name = name.to_lowercase();
        RULES
            .iter()
            .chain(SYNONYMS.iter())
            .find(|(needle, _)| name.contains(needle))
            .map_or(ConstraintCategory::Unknown, |&(_, category)| category)
    }
}

impl std::fmt::Display for ConstraintCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConstraintCategory::Thermal => "thermal",
            ConstraintCategory::Hydro => "hydro",
            ConstraintCategory::Balance => "balance",
            ConstraintCategory::Network => "network",
            ConstraintCategory::Ramp => "ramp",
            ConstraintCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintViolation {
    pub constraint: String,
    pub category: ConstraintCategory,
    /// Positive above an upper limit, negative below a lower limit
    pub magnitude: f64,
    pub tolerance: f64,
}

/// Violations found by one feasibility check, worst first
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationReport {
    violations: Vec<ConstraintViolation>,
    counts: BTreeMap<ConstraintCategory, usize>,
    max_violation: f64,
    tolerance: f64,
}

impl ViolationReport {
    fn new(mut violations: Vec<ConstraintViolation>, tolerance: f64) -> Self {
        violations.sort_by(|a, b| b.magnitude.abs().total_cmp(&a.magnitude.abs()));
        let mut counts = BTreeMap::new();
        for v in &violations {
            *counts.entry(v.category).or_insert(0) += 1;
        }
        let max_violation = violations.first().map_or(0.0, |v| v.magnitude.abs());
        Self {
            violations,
            counts,
            max_violation,
            tolerance,
        }
    }

    pub fn violations(&self) -> &[ConstraintViolation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, category: ConstraintCategory) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<ConstraintCategory, usize> {
        &self.counts
    }

    /// Largest absolute violation, 0 when there are none
    pub fn max_violation(&self) -> f64 {
        self.max_violation
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Text summary of the report
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.is_empty() {
            let _ = writeln!(out, "No constraint violations (tolerance {:e})", self.tolerance);
            return out;
        }

        let _ = writeln!(
            out,
            "{} constraint violation(s), max {:.6} (tolerance {:e})",
            self.len(),
            self.max_violation,
            self.tolerance
        );
        let _ = writeln!(out, "By category:");
        for (category, count) in &self.counts {
            let _ = writeln!(out, "  {:10} {}", category.to_string(), count);
        }
        let _ = writeln!(out, "Violations:");
        for v in &self.violations {
            let _ = writeln!(out, "  {:40} {:>10} {:+.6}", v.constraint, v.category.to_string(), v.magnitude);
        }
        out
    }
}

impl std::fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Check the model's recorded solution against every constraint and
/// variable bound.
///
/// Works on integer or linear solutions alike. Fails only when the model
/// has nothing to check or the tolerance is unusable.
pub fn check_violations(model: &DispatchModel, tolerance: f64) -> Result<ViolationReport, DiagnosticError> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(DiagnosticError::ToleranceOutOfRange(tolerance));
    }
    let solved = model.solved().ok_or_else(|| DiagnosticError::Unsolved {
        model: model.name().to_string(),
    })?;

    let problem = model.problem();
    let tagged: HashMap<&str, _> = problem
        .constraints
        .iter()
        .enumerate()
        .filter_map(|(row, c)| model.row_category(row).map(|cat| (c.name.as_str(), cat)))
        .collect();

    let violations: Vec<_> = primal_violations(problem, &solved.values, tolerance)
        .into_iter()
        .map(|v| ConstraintViolation {
            category: tagged
                .get(v.constraint.as_str())
                .filter(|_| !v.is_bound)
                .copied()
                .unwrap_or_else(|| ConstraintCategory::classify(&v.constraint)),
            constraint: v.constraint,
            magnitude: v.violation_amount,
            tolerance,
        })
        .collect();

    debug!(model = model.name(), kind = ?solved.kind, violations = violations.len(), "Feasibility check");
    Ok(ViolationReport::new(violations, tolerance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SolveKind;
    use hydrodispatch_solver::{Bounds, ConstraintOp};

    #[test]
    fn test_classification_rules() {
        assert_eq!(ConstraintCategory::classify("thermal_max_gen_T001"), ConstraintCategory::Thermal);
        assert_eq!(ConstraintCategory::classify("hydro_storage_limit_H002"), ConstraintCategory::Hydro);
        assert_eq!(ConstraintCategory::classify("submarket_balance_SE"), ConstraintCategory::Balance);
        assert_eq!(ConstraintCategory::classify("unrecognized_xyz"), ConstraintCategory::Unknown);
        assert_eq!(ConstraintCategory::classify("Reservoir_Min"), ConstraintCategory::Hydro);
        assert_eq!(ConstraintCategory::classify("line_flow[L1,0]"), ConstraintCategory::Network);
        // Earlier rules win on overlap
        assert_eq!(ConstraintCategory::classify("thermal_ramp_up"), ConstraintCategory::Thermal);
        assert_eq!(ConstraintCategory::classify("ramp_up[T1,1]"), ConstraintCategory::Ramp);
    }

    #[test]
    fn test_synonyms_never_override_rules() {
        assert_eq!(ConstraintCategory::classify("reservoir_balance"), ConstraintCategory::Balance);
        assert_eq!(ConstraintCategory::classify("water_ramp_limit"), ConstraintCategory::Ramp);
        assert_eq!(ConstraintCategory::classify("branch_ramp"), ConstraintCategory::Ramp);
        assert_eq!(ConstraintCategory::classify("angle_network_ref"), ConstraintCategory::Network);
        assert_eq!(ConstraintCategory::classify("THERMAL_WATER_use"), ConstraintCategory::Thermal);

        for (needle, category) in RULES {
            for synonym in SYNONYMS.map(|(s, _)| s) {
                let name = format!("{}_{}", synonym, needle);
                assert_eq!(ConstraintCategory::classify(&name), category, "{}", name);
            }
        }
    }

    fn model_with_point(values: Vec<f64>) -> DispatchModel {
        let mut m = DispatchModel::new("diag");
        let g = m
            .add_variable("thermal_generation", "T1", 0, Bounds::new(0.0, 100.0), 1.0)
            .unwrap();
        let h = m.add_variable("hydro_generation", "H1", 0, Bounds::new(0.0, 50.0), 0.0).unwrap();
        m.add_constraint("max_output", "T1", 0, &[(g, 1.0)], ConstraintOp::Le, 80.0)
            .unwrap();
        m.add_constraint("submarket_balance", "SE", 0, &[(g, 1.0), (h, 1.0)], ConstraintOp::Eq, 100.0)
            .unwrap();
        m.tag_constraint_group("max_output", ConstraintCategory::Thermal);
        m.record_solution(SolveKind::Lp, values);
        m
    }

    #[test]
    fn test_tagged_and_fallback_categories() {
        // max_output: 90 > 80 (+10); balance: 90 < 100 (-10)
        let model = model_with_point(vec![90.0, 0.0]);
        let report = check_violations(&model, 1e-6).unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(report.count(ConstraintCategory::Thermal), 1);
        assert_eq!(report.count(ConstraintCategory::Balance), 1);
        assert!((report.max_violation() - 10.0).abs() < 1e-9);
        let balance = report
            .violations()
            .iter()
            .find(|v| v.category == ConstraintCategory::Balance)
            .unwrap();
        assert!((balance.magnitude + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_report() {
        let model = model_with_point(vec![80.0, 20.0]);
        let report = check_violations(&model, 1e-6).unwrap();

        assert!(report.is_empty());
        assert_eq!(report.max_violation(), 0.0);
        assert!(report.render().starts_with("No constraint violations"));
    }

    #[test]
    fn test_bound_violation_is_classified_by_name() {
        let model = model_with_point(vec![40.0, 60.0]);
        let report = check_violations(&model, 1e-6).unwrap();

        assert_eq!(report.len(), 1);
        assert_eq!(report.violations()[0].constraint, "hydro_generation[H1,0]");
        assert_eq!(report.violations()[0].category, ConstraintCategory::Hydro);
    }

    #[test]
    fn test_unsolved_model_is_an_error() {
        let model = DispatchModel::new("fresh");
        assert_eq!(
            check_violations(&model, 1e-6),
            Err(DiagnosticError::Unsolved {
                model: "fresh".to_string()
            })
        );
        let solved = model_with_point(vec![80.0, 20.0]);
        assert_eq!(
            check_violations(&solved, -1.0),
            Err(DiagnosticError::ToleranceOutOfRange(-1.0))
        );
    }

    #[test]
    fn test_render_lists_worst_first() {
        let model = model_with_point(vec![95.0, 0.0]);
        let text = check_violations(&model, 1e-6).unwrap().render();

        let thermal = text.find("max_output[T1,0]").unwrap();
        let balance = text.find("submarket_balance[SE,0]").unwrap();
        assert!(thermal < balance, "{}", text);
    }
}
