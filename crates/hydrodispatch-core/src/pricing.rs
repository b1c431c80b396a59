use std::collections::BTreeMap;
use std::str::FromStr;

use tracing::debug;

use crate::error::PricingError;
use crate::result::{DispatchResult, IndexedValues};
use crate::topology::SystemTopology;

/// Constraint group whose duals are the zonal prices
pub const ZONAL_BALANCE_GROUP: &str = "submarket_balance";

/// Requested price resolution
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// Nodal when available, zonal otherwise
    #[default]
    Auto,
    Nodal,
    Zonal,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Auto => write!(f, "auto"),
            Granularity::Nodal => write!(f, "nodal"),
            Granularity::Zonal => write!(f, "zonal"),
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Granularity::Auto),
            "nodal" => Ok(Granularity::Nodal),
            "zonal" => Ok(Granularity::Zonal),
            other => Err(format!("unknown granularity '{}' (expected auto, nodal or zonal)", other)),
        }
    }
}

/// One price at one location and period
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PricingRecord {
    /// Bus id for nodal rows, zone id for zonal rows
    pub location: String,
    pub period: usize,
    /// Always `Nodal` or `Zonal`
    pub granularity: Granularity,
    pub price: f64,
    /// Owning zone of a nodal location; `None` for zonal rows and unmapped buses
    pub zone: Option<String>,
}

/// Flat `(location, period, granularity, price, zone)` row
pub type PricingRow = (String, usize, String, f64, Option<String>);

impl PricingRecord {
    pub const HEADER: [&'static str; 5] = ["location", "period", "granularity", "price", "zone"];

    pub fn to_row(&self) -> PricingRow {
        (
            self.location.clone(),
            self.period,
            self.granularity.to_string(),
            self.price,
            self.zone.clone(),
        )
    }
}

/// Resolves price series from a result container.
///
/// The bus-to-zone map is built once, when the resolver is created. Resolving
/// only reads the container.
#[derive(Debug, Clone)]
pub struct PricingResolver {
    bus_zone: BTreeMap<String, String>,
    zonal_group: String,
}

impl PricingResolver {
    pub fn new(topology: &SystemTopology) -> Self {
        Self {
            bus_zone: topology.bus_zone_map(),
            zonal_group: ZONAL_BALANCE_GROUP.to_string(),
        }
    }

    pub fn with_zonal_group(mut self, group: &str) -> Self {
        self.zonal_group = group.to_string();
        self
    }

    pub fn zone_of(&self, bus: &str) -> Option<&str> {
        self.bus_zone.get(bus).map(String::as_str)
    }

    pub fn resolve(
        &self,
        result: &DispatchResult,
        granularity: Granularity,
        periods: Option<&[usize]>,
    ) -> Result<Vec<PricingRecord>, PricingError> {
        match granularity {
            Granularity::Nodal => self.nodal(result, periods),
            Granularity::Zonal => self.zonal(result, periods),
            Granularity::Auto => {
                if result.nodal_prices().is_some_and(|p| !p.is_empty()) {
                    self.nodal(result, periods)
                } else {
                    debug!("No nodal prices on result; using zonal");
                    self.zonal(result, periods)
                }
            }
        }
    }

    fn nodal(&self, result: &DispatchResult, periods: Option<&[usize]>) -> Result<Vec<PricingRecord>, PricingError> {
        let prices = result
            .nodal_prices()
            .filter(|p| !p.is_empty())
            .ok_or(PricingError::NodalUnavailable)?;
        Ok(rows(prices, periods, |bus, period, price| PricingRecord {
            location: bus.to_string(),
            period,
            granularity: Granularity::Nodal,
            price,
            zone: self.zone_of(bus).map(str::to_string),
        }))
    }

    fn zonal(&self, result: &DispatchResult, periods: Option<&[usize]>) -> Result<Vec<PricingRecord>, PricingError> {
        let duals = result
            .dual(&self.zonal_group)
            .filter(|_| result.duals_available())
            .ok_or_else(|| PricingError::ZonalUnavailable {
                group: self.zonal_group.clone(),
            })?;
        Ok(rows(duals, periods, |zone, period, price| PricingRecord {
            location: zone.to_string(),
            period,
            granularity: Granularity::Zonal,
            price,
            zone: None,
        }))
    }
}

fn rows(
    values: &IndexedValues,
    periods: Option<&[usize]>,
    record: impl Fn(&str, usize, f64) -> PricingRecord,
) -> Vec<PricingRecord> {
    values
        .iter()
        .filter(|(_, period, _)| periods.is_none_or(|p| p.contains(period)))
        .map(|(location, period, price)| record(location, period, price))
        .collect()
}

/// Price rows for `result` at the requested granularity.
///
/// Convenience for one-off lookups; it derives the bus-to-zone map on every
/// call. Hold a [`PricingResolver`] when pricing several results of one system.
pub fn get_pricing(
    result: &DispatchResult,
    topology: &SystemTopology,
    granularity: Granularity,
    periods: Option<&[usize]>,
) -> Result<Vec<PricingRecord>, PricingError> {
    PricingResolver::new(topology).resolve(result, granularity, periods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::two_stage::{DispatchStatus, SolvePhase};

    fn zonal_result() -> DispatchResult {
        let mut result = DispatchResult::new(DispatchStatus::Optimal, SolvePhase::Extracted);
        let mut duals = IndexedValues::new();
        duals.insert("SE", 0, 50.0);
        duals.insert("SE", 1, 55.0);
        result.dual_values.insert(ZONAL_BALANCE_GROUP.to_string(), duals);
        result.has_duals = Some(true);
        result
    }

    fn nodal() -> IndexedValues {
        let mut prices = IndexedValues::new();
        prices.insert("B1", 0, 48.0);
        prices.insert("B9", 0, 61.0);
        prices
    }

    fn topology() -> SystemTopology {
        SystemTopology::default().with_placement("T1", "B1", "SE")
    }

    #[test]
    fn test_parse_granularity() {
        assert_eq!("NODAL".parse::<Granularity>(), Ok(Granularity::Nodal));
        assert!("regional".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_nodal_requires_cache() {
        let result = zonal_result();
        assert_eq!(
            get_pricing(&result, &topology(), Granularity::Nodal, None),
            Err(PricingError::NodalUnavailable)
        );
    }

    #[test]
    fn test_auto_falls_back_to_zonal() {
        let rows = get_pricing(&zonal_result(), &topology(), Granularity::Auto, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.granularity == Granularity::Zonal && r.zone.is_none()));
    }

    #[test]
    fn test_nodal_rows_are_enriched() {
        let mut result = zonal_result();
        result.attach_nodal_prices(nodal());

        let rows = get_pricing(&result, &topology(), Granularity::Auto, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].location, "B1");
        assert_eq!(rows[0].zone.as_deref(), Some("SE"));
        // Unmapped buses are kept with no zone
        assert_eq!(rows[1].location, "B9");
        assert_eq!(rows[1].zone, None);

        let zonal = get_pricing(&result, &topology(), Granularity::Zonal, None).unwrap();
        assert!(zonal.iter().all(|r| r.granularity == Granularity::Zonal));
    }

    #[test]
    fn test_zonal_without_duals_is_unavailable() {
        let mut result = zonal_result();
        result.has_duals = Some(false);
        assert_eq!(
            get_pricing(&result, &topology(), Granularity::Zonal, None),
            Err(PricingError::ZonalUnavailable {
                group: ZONAL_BALANCE_GROUP.to_string()
            })
        );
    }

    #[test]
    fn test_resolver_keeps_zone_map_from_creation() {
        let mut topology = topology();
        let resolver = PricingResolver::new(&topology);
        topology = topology.with_placement("T9", "B9", "NE");

        let mut result = zonal_result();
        result.attach_nodal_prices(nodal());
        let rows = resolver.resolve(&result, Granularity::Nodal, None).unwrap();
        assert_eq!(rows[1].location, "B9");
        assert_eq!(rows[1].zone, None);
        assert_eq!(topology.bus_zone_map()["B9"], "NE");
    }

    #[test]
    fn test_period_filter_and_row() {
        let rows = get_pricing(&zonal_result(), &topology(), Granularity::Zonal, Some(&[1][..])).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].to_row(),
            ("SE".to_string(), 1, "zonal".to_string(), 55.0, None)
        );
    }
}
