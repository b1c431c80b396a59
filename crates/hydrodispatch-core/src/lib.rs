pub mod case;
mod config;
mod error;
mod extract;
mod model;
pub mod network;
mod pipeline;
mod pricing;
mod result;
mod topology;
mod two_stage;
mod violations;

pub use case::{BuiltCase, HydrothermalCase, build_model};
pub use config::{CommitmentOverride, SolveConfig};
pub use error::{CaseError, DiagnosticError, ModelError, NetworkError, PricingError};
pub use extract::{Extraction, ExtractionRequest, ExtractionWarning, GroupKind, extract, extract_dual, extract_primal};
pub use model::{DispatchModel, EntryKey, Group, SolveKind, SolvedState};
pub use network::{BUS_BALANCE_GROUP, DcNetworkSubSolve, NetworkUnit, NodalSubSolve};
pub use pipeline::DispatchPipeline;
pub use pricing::{Granularity, PricingRecord, PricingResolver, PricingRow, ZONAL_BALANCE_GROUP, get_pricing};
pub use result::{DispatchResult, IndexedValues, NodalStatus};
pub use topology::{Placement, SystemTopology};
pub use two_stage::{
    DispatchStatus, IntegerStage, LinearStage, ROUNDING_THRESHOLD, RawOutcome, SolvePhase, Timing, round_commitment,
    solve,
};
pub use violations::{ConstraintCategory, ConstraintViolation, ViolationReport, check_violations};
