use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::extract::ExtractionWarning;
use crate::two_stage::{DispatchStatus, SolvePhase, Timing};

/// Sparse `entity -> period -> value` map
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedValues(BTreeMap<String, BTreeMap<usize, f64>>);

impl IndexedValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: &str, period: usize, value: f64) {
        self.0.entry(entity.to_string()).or_default().insert(period, value);
    }

    pub fn get(&self, entity: &str, period: usize) -> Option<f64> {
        self.0.get(entity)?.get(&period).copied()
    }

    /// Values ordered by entity then period
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize, f64)> {
        self.0.iter().flat_map(|(entity, periods)| {
            periods
                .iter()
                .map(move |(&period, &value)| (entity.as_str(), period, value))
        })
    }

    /// Number of `(entity, period)` entries
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total(&self) -> f64 {
        self.iter().map(|(_, _, v)| v).sum()
    }
}

/// Whether bus-level prices were produced for this solve
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "state", content = "reason", rename_all = "snake_case"))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodalStatus {
    #[default]
    NotRequested,
    Computed,
    Failed(String),
}

/// Everything one solve hands to downstream consumers
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub status: DispatchStatus,
    /// Total cost from the mixed-integer stage
    pub objective_value: Option<f64>,
    /// Variable group -> values
    pub primal_values: BTreeMap<String, IndexedValues>,
    /// Zonal constraint group -> duals, from the linear stage only
    pub dual_values: BTreeMap<String, IndexedValues>,
    /// `None` when stage 2 never ran
    pub has_duals: Option<bool>,
    pub timing: Timing,
    pub gap: Option<f64>,
    pub gap_exceeded: bool,
    pub phase: SolvePhase,
    pub warnings: Vec<ExtractionWarning>,
    pub nodal_status: NodalStatus,
    pub stage2_objective: Option<f64>,
    nodal_prices: Option<IndexedValues>,
}

impl DispatchResult {
    pub(crate) fn new(status: DispatchStatus, phase: SolvePhase) -> Self {
        Self {
            status,
            objective_value: None,
            primal_values: BTreeMap::new(),
            dual_values: BTreeMap::new(),
            has_duals: None,
            timing: Timing::default(),
            gap: None,
            gap_exceeded: false,
            phase,
            warnings: Vec::new(),
            nodal_status: NodalStatus::NotRequested,
            stage2_objective: None,
            nodal_prices: None,
        }
    }

    /// True only when the linear re-solve finished optimally
    pub fn duals_available(&self) -> bool {
        self.has_duals == Some(true)
    }

    pub fn primal(&self, group: &str) -> Option<&IndexedValues> {
        self.primal_values.get(group)
    }

    pub fn dual(&self, group: &str) -> Option<&IndexedValues> {
        self.dual_values.get(group)
    }

    /// Bus-level prices, `None` until a network sub-solve attached them
    pub fn nodal_prices(&self) -> Option<&IndexedValues> {
        self.nodal_prices.as_ref()
    }

    /// Populate the nodal cache. Only the first call has an effect; returns
    /// whether the prices were stored.
    pub fn attach_nodal_prices(&mut self, prices: IndexedValues) -> bool {
        if self.nodal_prices.is_some() {
            warn!("Nodal prices already attached to this result; ignoring");
            return false;
        }
        info!(entries = prices.len(), "Nodal prices attached");
        self.nodal_prices = Some(prices);
        self.nodal_status = NodalStatus::Computed;
        true
    }

    /// Record why the nodal sub-solve produced nothing
    pub fn record_nodal_failure(&mut self, reason: impl Into<String>) {
        if self.nodal_prices.is_none() {
            self.nodal_status = NodalStatus::Failed(reason.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_values_iteration_order() {
        let mut values = IndexedValues::new();
        values.insert("T2", 1, 3.0);
        values.insert("T1", 1, 2.0);
        values.insert("T1", 0, 1.0);

        let entries: Vec<_> = values.iter().collect();
        assert_eq!(entries, vec![("T1", 0, 1.0), ("T1", 1, 2.0), ("T2", 1, 3.0)]);
        assert_eq!(values.len(), 3);
        assert_eq!(values.get("T2", 1), Some(3.0));
        assert_eq!(values.get("T2", 0), None);
        assert!((values.total() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_nodal_prices_attach_once() {
        let mut result = DispatchResult::new(DispatchStatus::Optimal, SolvePhase::Extracted);
        assert!(result.nodal_prices().is_none());

        let mut first = IndexedValues::new();
        first.insert("B1", 0, 10.0);
        let mut second = IndexedValues::new();
        second.insert("B1", 0, 99.0);

        assert!(result.attach_nodal_prices(first));
        assert!(!result.attach_nodal_prices(second));
        assert_eq!(result.nodal_prices().unwrap().get("B1", 0), Some(10.0));
        assert_eq!(result.nodal_status, NodalStatus::Computed);

        result.record_nodal_failure("late failure");
        assert_eq!(result.nodal_status, NodalStatus::Computed);
    }
}
