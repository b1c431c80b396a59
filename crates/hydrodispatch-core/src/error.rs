use thiserror::Error;

/// Invalid references while building a dispatch model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Group name must not be empty")]
    EmptyGroupName,
    #[error("Duplicate entry {group}[{entity},{period}]")]
    DuplicateKey {
        group: String,
        entity: String,
        period: usize,
    },
    #[error("Unknown variable index {0}")]
    UnknownVariable(usize),
    #[error("Bounds of {name} are inverted: lower {lower} > upper {upper}")]
    InvertedBounds { name: String, lower: f64, upper: f64 },
}

/// Requested prices are not available on the result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("Nodal prices were not computed for this solve")]
    NodalUnavailable,
    #[error("No zonal duals available for constraint group '{group}'")]
    ZonalUnavailable { group: String },
}

/// The feasibility check itself could not run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosticError {
    #[error("Model '{model}' has no recorded solution to check")]
    Unsolved { model: String },
    #[error("Violation tolerance must be finite and non-negative, got {0}")]
    ToleranceOutOfRange(f64),
}

/// Failures of the bus-level network sub-solve
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("Network has no buses")]
    NoBuses,
    #[error("{element} references unknown bus '{bus}'")]
    UnknownBus { element: String, bus: String },
    #[error("Line {0} has zero reactance")]
    ZeroReactance(String),
    #[error("Stage-1 solution has no value for {group}[{entity},{period}]")]
    MissingValue {
        group: String,
        entity: String,
        period: usize,
    },
    #[error("Network LP ended with status {0}")]
    NotOptimal(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Invalid case data handed to the model builder
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaseError {
    #[error("Case has no periods")]
    NoPeriods,
    #[error("Duplicate id '{0}'")]
    DuplicateId(String),
    #[error("{entity} references unknown submarket '{submarket}'")]
    UnknownSubmarket { entity: String, submarket: String },
    #[error("{entity} references unknown bus '{bus}'")]
    UnknownBus { entity: String, bus: String },
    #[error("{entity} has invalid capacity: {reason}")]
    InvalidCapacity { entity: String, reason: String },
    #[error("{entity}: {series} has {actual} values, expected {expected}")]
    SeriesLength {
        entity: String,
        series: String,
        expected: usize,
        actual: usize,
    },
    #[error("{entity}: {reason}")]
    InvalidParameter { entity: String, reason: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}
