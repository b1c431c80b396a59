//! Hydrothermal case data and the model builder
//!
//! Builds one period-indexed MILP with these groups:
//!
//! | group | kind | index |
//! |-------|------|-------|
//! | `thermal_commitment` | binary | plant, period |
//! | `thermal_generation` | MW | plant, period |
//! | `hydro_generation` | MW | plant, period |
//! | `hydro_storage` | volume at end of period | plant, period |
//! | `hydro_spillage` | volume | plant, period |
//! | `deficit` | MW | submarket, period |
//!
//! Groups with no entries are left out of the model.

use std::collections::{BTreeMap, BTreeSet};

use hydrodispatch_solver::{Bounds, ConstraintOp};
use tracing::info;

use crate::error::CaseError;
use crate::extract::ExtractionRequest;
use crate::model::DispatchModel;
use crate::network::{DcNetworkSubSolve, NetworkUnit};
use crate::pricing::ZONAL_BALANCE_GROUP;
use crate::topology::{Placement, SystemTopology};
use crate::violations::ConstraintCategory;

pub const THERMAL_COMMITMENT: &str = "thermal_commitment";
pub const THERMAL_GENERATION: &str = "thermal_generation";
pub const HYDRO_GENERATION: &str = "hydro_generation";
pub const HYDRO_STORAGE: &str = "hydro_storage";
pub const HYDRO_SPILLAGE: &str = "hydro_spillage";
pub const DEFICIT: &str = "deficit";

const CONSTRAINT_TAGS: [(&str, ConstraintCategory); 6] = [
    ("thermal_max_gen", ConstraintCategory::Thermal),
    ("thermal_min_gen", ConstraintCategory::Thermal),
    ("thermal_ramp_up", ConstraintCategory::Ramp),
    ("thermal_ramp_down", ConstraintCategory::Ramp),
    ("hydro_water_balance", ConstraintCategory::Hydro),
    (ZONAL_BALANCE_GROUP, ConstraintCategory::Balance),
];

#[cfg(feature = "serde")]
fn default_name() -> String {
    "case".to_string()
}

#[cfg(feature = "serde")]
fn default_shed_cost() -> f64 {
    10_000.0
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Submarket {
    pub id: String,
    /// Demand per period (MW)
    pub demand: Vec<f64>,
    /// Cost of unserved energy; no deficit variable when absent
    #[cfg_attr(feature = "serde", serde(default))]
    pub deficit_cost: Option<f64>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalPlant {
    pub id: String,
    pub submarket: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bus: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub pmin: f64,
    pub pmax: f64,
    /// Cost per MW generated
    pub cost: f64,
    /// Cost per period committed
    #[cfg_attr(feature = "serde", serde(default))]
    pub no_load_cost: f64,
    /// Maximum change in output between consecutive periods
    #[cfg_attr(feature = "serde", serde(default))]
    pub ramp: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub must_run: bool,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct HydroPlant {
    pub id: String,
    pub submarket: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bus: Option<String>,
    pub max_generation: f64,
    /// MW produced per unit of turbined volume
    pub productivity: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub min_storage: f64,
    pub max_storage: f64,
    pub initial_storage: f64,
    /// Natural inflow per period
    pub inflows: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub spill_penalty: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BusData {
    pub id: String,
    pub submarket: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct LineData {
    pub id: String,
    pub from: String,
    pub to: String,
    pub reactance: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub limit: Option<f64>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkData {
    /// The first bus is the angle reference
    pub buses: Vec<BusData>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lines: Vec<LineData>,
    /// Bus id -> load per period
    #[cfg_attr(feature = "serde", serde(default))]
    pub loads: BTreeMap<String, Vec<f64>>,
    /// Shed cost for buses whose submarket has no deficit cost
    #[cfg_attr(feature = "serde", serde(default = "default_shed_cost"))]
    pub shed_cost: f64,
}

/// Input data of one hydrothermal dispatch study
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct HydrothermalCase {
    #[cfg_attr(feature = "serde", serde(default = "default_name"))]
    pub name: String,
    pub periods: usize,
    pub submarkets: Vec<Submarket>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub thermal: Vec<ThermalPlant>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub hydro: Vec<HydroPlant>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub network: Option<NetworkData>,
}

/// Everything the pipeline needs for one case
#[derive(Debug, Clone)]
pub struct BuiltCase {
    pub model: DispatchModel,
    pub topology: SystemTopology,
    pub request: ExtractionRequest,
    pub network: Option<DcNetworkSubSolve>,
}

impl HydrothermalCase {
    pub fn new(name: &str, periods: usize) -> Self {
        Self {
            name: name.to_string(),
            periods,
            submarkets: Vec::new(),
            thermal: Vec::new(),
            hydro: Vec::new(),
            network: None,
        }
    }

    fn submarket(&self, id: &str) -> Option<&Submarket> {
        self.submarkets.iter().find(|s| s.id == id)
    }

    pub fn validate(&self) -> Result<(), CaseError> {
        if self.periods == 0 {
            return Err(CaseError::NoPeriods);
        }

        let mut ids = BTreeSet::new();
        let mut unique = |id: &str| {
            if ids.insert(id.to_string()) {
                Ok(())
            } else {
                Err(CaseError::DuplicateId(id.to_string()))
            }
        };

        for s in &self.submarkets {
            unique(&s.id)?;
            self.check_series(&s.id, "demand", &s.demand)?;
            if s.deficit_cost.is_some_and(|c| c < 0.0) {
                return Err(invalid(&s.id, "deficit cost must be non-negative"));
            }
        }

        let buses: Option<BTreeSet<&str>> = self
            .network
            .as_ref()
            .map(|n| n.buses.iter().map(|b| b.id.as_str()).collect());
        let check_location = |entity: &str, submarket: &str, bus: Option<&String>| -> Result<(), CaseError> {
            if self.submarket(submarket).is_none() {
                return Err(CaseError::UnknownSubmarket {
                    entity: entity.to_string(),
                    submarket: submarket.to_string(),
                });
            }
            match (&buses, bus) {
                (Some(_), None) => Err(invalid(entity, "plants need a bus when a network is given")),
                (Some(known), Some(bus)) if !known.contains(bus.as_str()) => Err(CaseError::UnknownBus {
                    entity: entity.to_string(),
                    bus: bus.clone(),
                }),
                _ => Ok(()),
            }
        };

        for t in &self.thermal {
            unique(&t.id)?;
            check_location(&t.id, &t.submarket, t.bus.as_ref())?;
            if t.pmin < 0.0 || t.pmax < 0.0 {
                return Err(capacity(&t.id, "pmin and pmax must be non-negative"));
            }
            if t.pmin > t.pmax {
                return Err(capacity(&t.id, format!("pmin {} exceeds pmax {}", t.pmin, t.pmax)));
            }
            if t.ramp.is_some_and(|r| r <= 0.0) {
                return Err(invalid(&t.id, "ramp limit must be positive"));
            }
        }

        for h in &self.hydro {
            unique(&h.id)?;
            check_location(&h.id, &h.submarket, h.bus.as_ref())?;
            if h.max_generation < 0.0 {
                return Err(capacity(&h.id, "max_generation must be non-negative"));
            }
            if h.productivity <= 0.0 {
                return Err(invalid(&h.id, "productivity must be positive"));
            }
            if h.min_storage > h.max_storage {
                return Err(invalid(&h.id, "min_storage exceeds max_storage"));
            }
            if h.initial_storage < h.min_storage || h.initial_storage > h.max_storage {
                return Err(invalid(&h.id, "initial_storage outside storage bounds"));
            }
            self.check_series(&h.id, "inflows", &h.inflows)?;
        }

        if let Some(network) = &self.network {
            let Some(known) = &buses else {
                return Ok(());
            };
            for bus in &network.buses {
                if self.submarket(&bus.submarket).is_none() {
                    return Err(CaseError::UnknownSubmarket {
                        entity: bus.id.clone(),
                        submarket: bus.submarket.clone(),
                    });
                }
            }
            for line in &network.lines {
                for bus in [&line.from, &line.to] {
                    if !known.contains(bus.as_str()) {
                        return Err(CaseError::UnknownBus {
                            entity: line.id.clone(),
                            bus: bus.clone(),
                        });
                    }
                }
                if line.reactance == 0.0 {
                    return Err(invalid(&line.id, "reactance must be non-zero"));
                }
            }
            for (bus, load) in &network.loads {
                if !known.contains(bus.as_str()) {
                    return Err(CaseError::UnknownBus {
                        entity: "loads".to_string(),
                        bus: bus.clone(),
                    });
                }
                self.check_series(bus, "load", load)?;
            }
        }

        Ok(())
    }

    fn check_series(&self, entity: &str, series: &str, values: &[f64]) -> Result<(), CaseError> {
        if values.len() != self.periods {
            return Err(CaseError::SeriesLength {
                entity: entity.to_string(),
                series: series.to_string(),
                expected: self.periods,
                actual: values.len(),
            });
        }
        Ok(())
    }
}

fn invalid(entity: &str, reason: impl Into<String>) -> CaseError {
    CaseError::InvalidParameter {
        entity: entity.to_string(),
        reason: reason.into(),
    }
}

fn capacity(entity: &str, reason: impl Into<String>) -> CaseError {
    CaseError::InvalidCapacity {
        entity: entity.to_string(),
        reason: reason.into(),
    }
}

/// Validate `case` and build its model, topology, extraction request and,
/// when the case has a network, the DC sub-solve.
pub fn build_model(case: &HydrothermalCase) -> Result<BuiltCase, CaseError> {
    case.validate()?;

    let mut model = DispatchModel::new(case.name.clone());
    for (group, category) in CONSTRAINT_TAGS {
        model.tag_constraint_group(group, category);
    }

    for t in 0..case.periods {
        // Supply terms per submarket
        let mut supply: BTreeMap<&str, Vec<(usize, f64)>> = BTreeMap::new();

        for p in &case.thermal {
            let commitment = if p.must_run {
                Bounds::fixed(1.0)
            } else {
                Bounds::new(0.0, 1.0)
            };
            let u = model.add_integer_variable(THERMAL_COMMITMENT, &p.id, t, commitment, p.no_load_cost)?;
            let g = model.add_variable(THERMAL_GENERATION, &p.id, t, Bounds::new(0.0, p.pmax), p.cost)?;

            model.add_constraint("thermal_max_gen", &p.id, t, &[(g, 1.0), (u, -p.pmax)], ConstraintOp::Le, 0.0)?;
            if p.pmin > 0.0 {
                model.add_constraint("thermal_min_gen", &p.id, t, &[(g, 1.0), (u, -p.pmin)], ConstraintOp::Ge, 0.0)?;
            }
            if let (Some(ramp), Some(prev)) = (p.ramp, t.checked_sub(1)) {
                if let Some(g_prev) = model.variable(THERMAL_GENERATION, &p.id, prev) {
                    model.add_constraint("thermal_ramp_up", &p.id, t, &[(g, 1.0), (g_prev, -1.0)], ConstraintOp::Le, ramp)?;
                    model.add_constraint("thermal_ramp_down", &p.id, t, &[(g_prev, 1.0), (g, -1.0)], ConstraintOp::Le, ramp)?;
                }
            }
            supply.entry(p.submarket.as_str()).or_default().push((g, 1.0));
        }

        for p in &case.hydro {
            let h = model.add_variable(HYDRO_GENERATION, &p.id, t, Bounds::new(0.0, p.max_generation), 0.0)?;
            let s = model.add_variable(HYDRO_STORAGE, &p.id, t, Bounds::new(p.min_storage, p.max_storage), 0.0)?;
            let spill = model.add_variable(HYDRO_SPILLAGE, &p.id, t, Bounds::NON_NEGATIVE, p.spill_penalty)?;

            // storage[t] - storage[t-1] + generation / productivity + spill = inflow
            let mut terms = vec![(s, 1.0), (h, 1.0 / p.productivity), (spill, 1.0)];
            let mut rhs = p.inflows[t];
            match t.checked_sub(1).and_then(|prev| model.variable(HYDRO_STORAGE, &p.id, prev)) {
                Some(s_prev) => terms.push((s_prev, -1.0)),
                None => rhs += p.initial_storage,
            }
            model.add_constraint("hydro_water_balance", &p.id, t, &terms, ConstraintOp::Eq, rhs)?;
            supply.entry(p.submarket.as_str()).or_default().push((h, 1.0));
        }

        for s in &case.submarkets {
            let mut terms = supply.remove(s.id.as_str()).unwrap_or_default();
            if let Some(cost) = s.deficit_cost {
                terms.push((model.add_variable(DEFICIT, &s.id, t, Bounds::NON_NEGATIVE, cost)?, 1.0));
            }
            model.add_constraint(ZONAL_BALANCE_GROUP, &s.id, t, &terms, ConstraintOp::Eq, s.demand[t])?;
        }
    }

    let topology = SystemTopology::new(
        case.thermal
            .iter()
            .map(|p| (&p.id, &p.bus, &p.submarket))
            .chain(case.hydro.iter().map(|p| (&p.id, &p.bus, &p.submarket)))
            .filter_map(|(entity, bus, zone)| {
                bus.as_ref().map(|bus| Placement {
                    entity: entity.clone(),
                    bus: bus.clone(),
                    zone: zone.clone(),
                })
            })
            .collect(),
    );

    let request = ExtractionRequest::new(
        [
            THERMAL_COMMITMENT,
            THERMAL_GENERATION,
            HYDRO_GENERATION,
            HYDRO_STORAGE,
            HYDRO_SPILLAGE,
            DEFICIT,
        ],
        [ZONAL_BALANCE_GROUP],
    );

    let network = case.network.as_ref().map(|n| network_sub_solve(case, n));

    info!(
        case = %case.name,
        periods = case.periods,
        variables = model.num_variables(),
        constraints = model.num_constraints(),
        "Model built"
    );

    Ok(BuiltCase {
        model,
        topology,
        request,
        network,
    })
}

fn network_sub_solve(case: &HydrothermalCase, network: &NetworkData) -> DcNetworkSubSolve {
    let mut sub = DcNetworkSubSolve::new(case.periods);
    for bus in &network.buses {
        let load = network
            .loads
            .get(&bus.id)
            .cloned()
            .unwrap_or_else(|| vec![0.0; case.periods]);
        let shed_cost = case
            .submarket(&bus.submarket)
            .and_then(|s| s.deficit_cost)
            .unwrap_or(network.shed_cost);
        sub = sub.with_bus(&bus.id, load, shed_cost);
    }
    for line in &network.lines {
        sub = sub.with_line(&line.id, &line.from, &line.to, line.reactance, line.limit);
    }
    for p in &case.thermal {
        if let Some(bus) = &p.bus {
            sub = sub.with_unit(NetworkUnit::thermal(&p.id, bus, p.pmin, p.pmax, p.cost));
        }
    }
    for p in &case.hydro {
        if let Some(bus) = &p.bus {
            sub = sub.with_unit(NetworkUnit::fixed(&p.id, bus, HYDRO_GENERATION));
        }
    }
    sub
}
