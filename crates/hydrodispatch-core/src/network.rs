//! DC power flow re-dispatch for bus-level prices
//!
//! Linearised network model:
//! - Line flows: `f = (θ_from − θ_to) / x`, optionally limited
//! - Reference bus angle fixed at zero
//! - Bus balance: generation + shed + inflows − outflows = load
//!
//! Nodal prices are the duals of the `bus_balance` rows.

use std::collections::BTreeSet;

use hydrodispatch_solver::{Bounds, ConstraintOp, Solver};
use tracing::{debug, info};

use crate::error::NetworkError;
use crate::model::DispatchModel;
use crate::result::IndexedValues;
use crate::two_stage::RawOutcome;
use crate::violations::ConstraintCategory;

/// Constraint group holding the bus energy balances
pub const BUS_BALANCE_GROUP: &str = "bus_balance";

/// Produces bus-level prices for a solved dispatch
pub trait NodalSubSolve {
    fn nodal_prices(&self, outcome: &RawOutcome) -> Result<IndexedValues, NetworkError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkBus {
    pub id: String,
    /// Load per period
    pub load: Vec<f64>,
    /// Cost of unserved load at this bus
    pub shed_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkLine {
    pub id: String,
    pub from: String,
    pub to: String,
    /// Series reactance (per unit)
    pub reactance: f64,
    /// Thermal limit in either direction
    pub limit: Option<f64>,
}

/// A generating entity as seen by the network model
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkUnit {
    pub entity: String,
    pub bus: String,
    /// Variable group of the entity's stage-1 output
    pub output_group: String,
    /// Re-dispatched within its commitment when true, held at stage-1 output otherwise
    pub dispatchable: bool,
    pub commitment_group: Option<String>,
    pub pmin: f64,
    pub pmax: f64,
    pub cost: f64,
}

impl NetworkUnit {
    /// Committed unit re-dispatched between `pmin·u` and `pmax·u`
    pub fn thermal(entity: &str, bus: &str, pmin: f64, pmax: f64, cost: f64) -> Self {
        Self {
            entity: entity.to_string(),
            bus: bus.to_string(),
            output_group: "thermal_generation".to_string(),
            dispatchable: true,
            commitment_group: Some("thermal_commitment".to_string()),
            pmin,
            pmax,
            cost,
        }
    }

    /// Unit held at its stage-1 output from `output_group`
    pub fn fixed(entity: &str, bus: &str, output_group: &str) -> Self {
        Self {
            entity: entity.to_string(),
            bus: bus.to_string(),
            output_group: output_group.to_string(),
            dispatchable: false,
            commitment_group: None,
            pmin: 0.0,
            pmax: 0.0,
            cost: 0.0,
        }
    }
}

/// DC power flow LP over the whole horizon
#[derive(Debug, Clone)]
pub struct DcNetworkSubSolve {
    periods: usize,
    buses: Vec<NetworkBus>,
    lines: Vec<NetworkLine>,
    units: Vec<NetworkUnit>,
    lp: Solver,
}

impl DcNetworkSubSolve {
    pub fn new(periods: usize) -> Self {
        Self {
            periods,
            buses: Vec::new(),
            lines: Vec::new(),
            units: Vec::new(),
            lp: Solver::new(),
        }
    }

    /// Add a bus; the first bus added is the angle reference
    pub fn with_bus(mut self, id: &str, load: Vec<f64>, shed_cost: f64) -> Self {
        self.buses.push(NetworkBus {
            id: id.to_string(),
            load,
            shed_cost,
        });
        self
    }

    pub fn with_line(mut self, id: &str, from: &str, to: &str, reactance: f64, limit: Option<f64>) -> Self {
        self.lines.push(NetworkLine {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            reactance,
            limit,
        });
        self
    }

    pub fn with_unit(mut self, unit: NetworkUnit) -> Self {
        self.units.push(unit);
        self
    }

    pub fn with_lp_solver(mut self, lp: Solver) -> Self {
        self.lp = lp;
        self
    }

    pub fn buses(&self) -> &[NetworkBus] {
        &self.buses
    }

    fn validate(&self) -> Result<(), NetworkError> {
        if self.buses.is_empty() {
            return Err(NetworkError::NoBuses);
        }
        let known: BTreeSet<&str> = self.buses.iter().map(|b| b.id.as_str()).collect();
        let unknown = |element: &str, bus: &str| NetworkError::UnknownBus {
            element: element.to_string(),
            bus: bus.to_string(),
        };
        for line in &self.lines {
            for bus in [&line.from, &line.to] {
                if !known.contains(bus.as_str()) {
                    return Err(unknown(&line.id, bus));
                }
            }
            if line.reactance.abs() < 1e-12 {
                return Err(NetworkError::ZeroReactance(line.id.clone()));
            }
        }
        for unit in &self.units {
            if !known.contains(unit.bus.as_str()) {
                return Err(unknown(&unit.entity, &unit.bus));
            }
        }
        Ok(())
    }

    /// Build the network LP for the dispatch in `outcome`
    pub fn build(&self, outcome: &RawOutcome) -> Result<DispatchModel, NetworkError> {
        self.validate()?;
        let mut model = DispatchModel::new("dc_network");
        model.tag_constraint_group("line_flow", ConstraintCategory::Network);
        model.tag_constraint_group(BUS_BALANCE_GROUP, ConstraintCategory::Balance);
        let reference = &self.buses[0].id;

        for t in 0..self.periods {
            for bus in &self.buses {
                let bounds = if bus.id == *reference {
                    Bounds::fixed(0.0)
                } else {
                    Bounds::FREE
                };
                model.add_variable("bus_angle", &bus.id, t, bounds, 0.0)?;
            }

            for line in &self.lines {
                let bounds = line.limit.map_or(Bounds::FREE, |l| Bounds::new(-l.abs(), l.abs()));
                let f = model.add_variable("flow", &line.id, t, bounds, 0.0)?;
                let b = 1.0 / line.reactance;
                let theta = |bus: &str| model.variable("bus_angle", bus, t);
                let (Some(from), Some(to)) = (theta(&line.from), theta(&line.to)) else {
                    return Err(NetworkError::UnknownBus {
                        element: line.id.clone(),
                        bus: line.from.clone(),
                    });
                };
                model.add_constraint("line_flow", &line.id, t, &[(f, 1.0), (from, -b), (to, b)], ConstraintOp::Eq, 0.0)?;
            }

            for unit in &self.units {
                let (bounds, cost) = self.unit_bounds(unit, outcome, t)?;
                model.add_variable("unit_output", &unit.entity, t, bounds, cost)?;
            }

            for bus in &self.buses {
                let load = bus.load.get(t).copied().unwrap_or(0.0);
                let shed = model.add_variable("load_shed", &bus.id, t, Bounds::new(0.0, load.max(0.0)), bus.shed_cost)?;

                let mut terms = vec![(shed, 1.0)];
                for unit in self.units.iter().filter(|u| u.bus == bus.id) {
                    terms.extend(model.variable("unit_output", &unit.entity, t).map(|j| (j, 1.0)));
                }
                for line in &self.lines {
                    if let Some(f) = model.variable("flow", &line.id, t) {
                        if line.to == bus.id {
                            terms.push((f, 1.0));
                        }
                        if line.from == bus.id {
                            terms.push((f, -1.0));
                        }
                    }
                }
                model.add_constraint(BUS_BALANCE_GROUP, &bus.id, t, &terms, ConstraintOp::Eq, load)?;
            }
        }

        Ok(model)
    }

    fn unit_bounds(&self, unit: &NetworkUnit, outcome: &RawOutcome, period: usize) -> Result<(Bounds, f64), NetworkError> {
        let missing = |group: &str| NetworkError::MissingValue {
            group: group.to_string(),
            entity: unit.entity.clone(),
            period,
        };

        if !unit.dispatchable {
            let output = outcome
                .primal(&unit.output_group, &unit.entity, period)
                .ok_or_else(|| missing(&unit.output_group))?;
            return Ok((Bounds::fixed(output), 0.0));
        }

        let on = match &unit.commitment_group {
            Some(group) => outcome
                .model()
                .variable(group, &unit.entity, period)
                .and_then(|j| outcome.committed_value(j))
                .ok_or_else(|| missing(group))?,
            None => 1.0,
        };
        Ok((Bounds::new(unit.pmin * on, unit.pmax * on), unit.cost))
    }
}

impl NodalSubSolve for DcNetworkSubSolve {
    fn nodal_prices(&self, outcome: &RawOutcome) -> Result<IndexedValues, NetworkError> {
        let model = self.build(outcome)?;
        let solution = self.lp.solve(model.problem());
        if !solution.is_optimal() {
            return Err(NetworkError::NotOptimal(solution.status.to_string()));
        }
        debug!(
            buses = self.buses.len(),
            lines = self.lines.len(),
            iterations = solution.iterations,
            "DC network LP solved"
        );

        let mut prices = IndexedValues::new();
        if let Some(group) = model.constraint_group(BUS_BALANCE_GROUP) {
            for (bus, period, row) in group.iter() {
                if let Some(dual) = solution.dual(row) {
                    prices.insert(bus, period, dual);
                }
            }
        }
        info!(entries = prices.len(), cost = solution.objective_value, "Nodal prices computed");
        Ok(prices)
    }
}
