use std::collections::BTreeMap;

use hydrodispatch_solver::{Bounds, ConstraintOp, LpProblem};

use crate::error::ModelError;
use crate::violations::ConstraintCategory;

/// `(entity id, period)` index of a group entry
pub type EntryKey = (String, usize);

/// Named family of model columns or rows indexed by `(entity, period)`
#[derive(Debug, Clone, Default)]
pub struct Group {
    name: String,
    entries: BTreeMap<EntryKey, usize>,
}

impl Group {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, entity: &str, period: usize) -> Option<usize> {
        self.entries.get(&(entity.to_string(), period)).copied()
    }

    /// Entries ordered by entity then period
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize, usize)> {
        self.entries
            .iter()
            .map(|((entity, period), &index)| (entity.as_str(), *period, index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveKind {
    Mip,
    Lp,
}

/// Point recorded on a model after a solve
#[derive(Debug, Clone)]
pub struct SolvedState {
    pub kind: SolveKind,
    pub values: Vec<f64>,
}

/// A built optimization model with named, indexed variable and constraint
/// groups.
#[derive(Debug, Clone)]
pub struct DispatchModel {
    name: String,
    problem: LpProblem,
    variable_groups: BTreeMap<String, Group>,
    constraint_groups: BTreeMap<String, Group>,
    categories: BTreeMap<String, ConstraintCategory>,
    /// Owning constraint group of each row
    row_groups: Vec<String>,
    solved: Option<SolvedState>,
}

impl DispatchModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            problem: LpProblem::new(Vec::new()),
            variable_groups: BTreeMap::new(),
            constraint_groups: BTreeMap::new(),
            categories: BTreeMap::new(),
            row_groups: Vec::new(),
            solved: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn problem(&self) -> &LpProblem {
        &self.problem
    }

    /// Add a continuous variable `group[entity,period]` with the given
    /// bounds and objective cost. Returns its column index.
    pub fn add_variable(
        &mut self,
        group: &str,
        entity: &str,
        period: usize,
        bounds: Bounds,
        cost: f64,
    ) -> Result<usize, ModelError> {
        let key = checked_key(&self.variable_groups, group, entity, period)?;
        let name = entry_name(group, entity, period);
        if bounds.lower > bounds.upper {
            return Err(ModelError::InvertedBounds {
                name,
                lower: bounds.lower,
                upper: bounds.upper,
            });
        }
        let index = self.problem.add_variable(name, bounds, cost);
        self.variable_groups
            .entry(group.to_string())
            .or_insert_with(|| Group::new(group))
            .entries
            .insert(key, index);
        self.solved = None;
        Ok(index)
    }

    /// Add a variable restricted to whole numbers within `bounds`
    pub fn add_integer_variable(
        &mut self,
        group: &str,
        entity: &str,
        period: usize,
        bounds: Bounds,
        cost: f64,
    ) -> Result<usize, ModelError> {
        let index = self.add_variable(group, entity, period, bounds, cost)?;
        self.problem.set_integer(index, true);
        Ok(index)
    }

    /// Add the row `group[entity,period]: Σ coef·x op rhs`. Returns its row index.
    pub fn add_constraint(
        &mut self,
        group: &str,
        entity: &str,
        period: usize,
        terms: &[(usize, f64)],
        op: ConstraintOp,
        rhs: f64,
    ) -> Result<usize, ModelError> {
        let key = checked_key(&self.constraint_groups, group, entity, period)?;
        if let Some(&(bad, _)) = terms.iter().find(|(index, _)| *index >= self.problem.num_variables()) {
            return Err(ModelError::UnknownVariable(bad));
        }
        let row = self
            .problem
            .add_sparse_constraint(entry_name(group, entity, period), terms, op, rhs);
        self.constraint_groups
            .entry(group.to_string())
            .or_insert_with(|| Group::new(group))
            .entries
            .insert(key, row);
        self.row_groups.push(group.to_string());
        self.solved = None;
        Ok(row)
    }

    /// Attach a violation category to every row of `group`, present or future
    pub fn tag_constraint_group(&mut self, group: &str, category: ConstraintCategory) {
        self.categories.insert(group.to_string(), category);
    }

    pub fn variable_group(&self, name: &str) -> Option<&Group> {
        self.variable_groups.get(name)
    }

    pub fn constraint_group(&self, name: &str) -> Option<&Group> {
        self.constraint_groups.get(name)
    }

    pub fn variable_groups(&self) -> impl Iterator<Item = &Group> {
        self.variable_groups.values()
    }

    pub fn constraint_groups(&self) -> impl Iterator<Item = &Group> {
        self.constraint_groups.values()
    }

    pub fn variable(&self, group: &str, entity: &str, period: usize) -> Option<usize> {
        self.variable_groups.get(group)?.get(entity, period)
    }

    pub fn constraint(&self, group: &str, entity: &str, period: usize) -> Option<usize> {
        self.constraint_groups.get(group)?.get(entity, period)
    }

    pub fn group_category(&self, group: &str) -> Option<ConstraintCategory> {
        self.categories.get(group).copied()
    }

    /// Category tag of the row's group, if the builder assigned one
    pub fn row_category(&self, row: usize) -> Option<ConstraintCategory> {
        self.row_groups.get(row).and_then(|g| self.group_category(g))
    }

    pub fn num_variables(&self) -> usize {
        self.problem.num_variables()
    }

    pub fn num_constraints(&self) -> usize {
        self.problem.num_constraints()
    }

    pub fn record_solution(&mut self, kind: SolveKind, values: Vec<f64>) {
        self.solved = Some(SolvedState { kind, values });
    }

    pub fn solved(&self) -> Option<&SolvedState> {
        self.solved.as_ref()
    }

    /// Independent linear copy with the listed integer variables fixed.
    ///
    /// Groups and tags are carried over; the copy has no recorded solution.
    pub fn fixed_relaxation(&self, fixed: &[(usize, f64)]) -> DispatchModel {
        DispatchModel {
            name: format!("{}_fixed", self.name),
            problem: self.problem.fixed_relaxation(fixed),
            variable_groups: self.variable_groups.clone(),
            constraint_groups: self.constraint_groups.clone(),
            categories: self.categories.clone(),
            row_groups: self.row_groups.clone(),
            solved: None,
        }
    }
}

fn checked_key(
    groups: &BTreeMap<String, Group>,
    group: &str,
    entity: &str,
    period: usize,
) -> Result<EntryKey, ModelError> {
    if group.is_empty() {
        return Err(ModelError::EmptyGroupName);
    }
    let key = (entity.to_string(), period);
    if groups.get(group).is_some_and(|g| g.entries.contains_key(&key)) {
        return Err(ModelError::DuplicateKey {
            group: group.to_string(),
            entity: entity.to_string(),
            period,
        });
    }
    Ok(key)
}

fn entry_name(group: &str, entity: &str, period: usize) -> String {
    format!("{}[{},{}]", group, entity, period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_lookup() {
        let mut model = DispatchModel::new("m");
        let g = model
            .add_variable("thermal_generation", "T1", 0, Bounds::new(0.0, 100.0), 10.0)
            .unwrap();
        let row = model
            .add_constraint("submarket_balance", "SE", 0, &[(g, 1.0)], ConstraintOp::Eq, 50.0)
            .unwrap();

        assert_eq!(model.problem().variables[g], "thermal_generation[T1,0]");
        assert_eq!(model.problem().constraints[row].name, "submarket_balance[SE,0]");
        assert_eq!(model.variable("thermal_generation", "T1", 0), Some(g));
        assert_eq!(model.constraint("submarket_balance", "SE", 0), Some(row));
        assert_eq!(model.variable("thermal_generation", "T1", 1), None);
        assert!(model.variable_group("hydro_generation").is_none());
    }

    #[test]
    fn test_duplicate_and_invalid_references() {
        let mut model = DispatchModel::new("m");
        model.add_variable("deficit", "SE", 0, Bounds::NON_NEGATIVE, 1.0).unwrap();

        assert_eq!(
            model.add_variable("deficit", "SE", 0, Bounds::NON_NEGATIVE, 1.0),
            Err(ModelError::DuplicateKey {
                group: "deficit".to_string(),
                entity: "SE".to_string(),
                period: 0
            })
        );
        assert_eq!(
            model.add_constraint("c", "SE", 0, &[(3, 1.0)], ConstraintOp::Le, 1.0),
            Err(ModelError::UnknownVariable(3))
        );
        assert_eq!(
            model.add_variable("", "SE", 1, Bounds::NON_NEGATIVE, 0.0),
            Err(ModelError::EmptyGroupName)
        );
        assert!(matches!(
            model.add_variable("x", "SE", 0, Bounds::new(2.0, 1.0), 0.0),
            Err(ModelError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn test_row_category_follows_group_tag() {
        let mut model = DispatchModel::new("m");
        let g = model.add_variable("g", "T1", 0, Bounds::NON_NEGATIVE, 0.0).unwrap();
        let row = model
            .add_constraint("thermal_max_gen", "T1", 0, &[(g, 1.0)], ConstraintOp::Le, 1.0)
            .unwrap();
        assert_eq!(model.row_category(row), None);

        model.tag_constraint_group("thermal_max_gen", ConstraintCategory::Thermal);
        assert_eq!(model.row_category(row), Some(ConstraintCategory::Thermal));
    }

    #[test]
    fn test_fixed_relaxation_is_independent() {
        let mut model = DispatchModel::new("m");
        let u = model
            .add_integer_variable("thermal_commitment", "T1", 0, Bounds::new(0.0, 1.0), 0.0)
            .unwrap();
        model.record_solution(SolveKind::Mip, vec![1.0]);

        let relaxed = model.fixed_relaxation(&[(u, 1.0)]);

        assert!(!relaxed.problem().is_mixed_integer());
        assert!(relaxed.solved().is_none());
        assert_eq!(relaxed.variable("thermal_commitment", "T1", 0), Some(u));
        assert!(model.problem().is_mixed_integer());
        assert!(model.solved().is_some());
    }
}
