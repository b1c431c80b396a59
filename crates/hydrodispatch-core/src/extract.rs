use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::result::{DispatchResult, IndexedValues};
use crate::two_stage::{RawOutcome, SolvePhase};

/// Which groups to pull out of a solved model
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionRequest {
    /// Variable groups whose stage-1 values are reported
    pub variable_groups: Vec<String>,
    /// Constraint groups whose linear-stage duals are reported
    pub dual_groups: Vec<String>,
    /// Restrict to these periods; `None` keeps all
    pub periods: Option<Vec<usize>>,
}

impl ExtractionRequest {
    pub fn new<V, D>(variable_groups: V, dual_groups: D) -> Self
    where
        V: IntoIterator,
        V::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            variable_groups: variable_groups.into_iter().map(Into::into).collect(),
            dual_groups: dual_groups.into_iter().map(Into::into).collect(),
            periods: None,
        }
    }

    pub fn with_periods(mut self, periods: Vec<usize>) -> Self {
        self.periods = Some(periods);
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Variable,
    Constraint,
}

/// A requested group that the model does not contain
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionWarning {
    pub kind: GroupKind,
    pub group: String,
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            GroupKind::Variable => write!(f, "variable group '{}' not in model; skipped", self.group),
            GroupKind::Constraint => write!(f, "constraint group '{}' not in model; skipped", self.group),
        }
    }
}

/// Values pulled from an outcome plus the groups that were missing
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub values: BTreeMap<String, IndexedValues>,
    pub warnings: Vec<ExtractionWarning>,
}

fn in_periods(periods: Option<&[usize]>, period: usize) -> bool {
    periods.is_none_or(|p| p.contains(&period))
}

/// Stage-1 values of the requested variable groups.
///
/// Only entries present in the model are read. Missing groups are recorded
/// as warnings and skipped.
pub fn extract_primal(outcome: &RawOutcome, groups: &[String], periods: Option<&[usize]>) -> Extraction {
    let mut extraction = Extraction::default();
    let model = outcome.model();
    let stage1 = outcome.integer_stage();
    if stage1.values().is_empty() {
        return extraction;
    }

    for name in groups {
        let Some(group) = model.variable_group(name) else {
            warn!(group = %name, "Variable group not in model; skipping");
            extraction.warnings.push(ExtractionWarning {
                kind: GroupKind::Variable,
                group: name.clone(),
            });
            continue;
        };

        let mut values = IndexedValues::new();
        for (entity, period, index) in group.iter() {
            if !in_periods(periods, period) {
                continue;
            }
            if let Some(value) = stage1.value(index) {
                values.insert(entity, period, value);
            }
        }
        debug!(group = %name, entries = values.len(), "Extracted primal values");
        extraction.values.insert(name.clone(), values);
    }

    extraction
}

/// Linear-stage duals of the requested constraint groups.
///
/// Returns nothing when the linear stage is absent or not optimal; dual
/// values are never read from the integer stage.
pub fn extract_dual(outcome: &RawOutcome, groups: &[String], periods: Option<&[usize]>) -> Extraction {
    let mut extraction = Extraction::default();
    let Some(stage2) = outcome.linear_stage().filter(|s| s.is_optimal()) else {
        return extraction;
    };
    let model = stage2.model();

    for name in groups {
        let Some(group) = model.constraint_group(name) else {
            warn!(group = %name, "Constraint group not in model; skipping");
            extraction.warnings.push(ExtractionWarning {
                kind: GroupKind::Constraint,
                group: name.clone(),
            });
            continue;
        };

        let mut values = IndexedValues::new();
        for (entity, period, row) in group.iter() {
            if !in_periods(periods, period) {
                continue;
            }
            if let Some(dual) = stage2.dual(row) {
                values.insert(entity, period, dual);
            }
        }
        debug!(group = %name, entries = values.len(), "Extracted dual values");
        extraction.values.insert(name.clone(), values);
    }

    extraction
}

/// Build the result container for `outcome`
pub fn extract(outcome: &RawOutcome, request: &ExtractionRequest) -> DispatchResult {
    let mut result = DispatchResult::new(outcome.status(), outcome.phase());
    result.timing = outcome.timing();
    result.gap = outcome.gap();
    result.gap_exceeded = outcome.gap_exceeded();
    result.has_duals = outcome.has_duals();
    result.objective_value = outcome.objective_value();
    result.stage2_objective = outcome.linear_stage().and_then(|s| s.objective_value());

    if outcome.phase() == SolvePhase::Stage1Infeasible {
        return result;
    }

    let periods = request.periods.as_deref();
    let primal = extract_primal(outcome, &request.variable_groups, periods);
    let dual = extract_dual(outcome, &request.dual_groups, periods);

    result.primal_values = primal.values;
    result.dual_values = dual.values;
    result.warnings = primal.warnings;
    result.warnings.extend(dual.warnings);
    result.phase = SolvePhase::Extracted;
    result
}
