use tracing::{info, warn};

use crate::config::SolveConfig;
use crate::extract::{ExtractionRequest, extract};
use crate::model::DispatchModel;
use crate::network::NodalSubSolve;
use crate::result::DispatchResult;
use crate::two_stage::{RawOutcome, solve};

/// Solve, extract and optionally price the network for one model
pub struct DispatchPipeline {
    config: SolveConfig,
    network: Option<Box<dyn NodalSubSolve>>,
}

impl DispatchPipeline {
    pub fn new(config: SolveConfig) -> Self {
        Self { config, network: None }
    }

    /// Run `sub_solve` after extraction to fill the nodal price cache
    pub fn with_network(mut self, sub_solve: impl NodalSubSolve + 'static) -> Self {
        self.network = Some(Box::new(sub_solve));
        self
    }

    pub fn config(&self) -> &SolveConfig {
        &self.config
    }

    /// Run one solve invocation.
    ///
    /// Always returns a result; solve failures show up in its status and
    /// phase. The outcome keeps the stage-1 model for later diagnostics.
    pub fn run(&self, model: DispatchModel, request: &ExtractionRequest) -> (DispatchResult, RawOutcome) {
        let outcome = solve(model, &self.config);
        let mut result = extract(&outcome, request);

        if let Some(network) = &self.network {
            match outcome.has_duals() {
                Some(true) => match network.nodal_prices(&outcome) {
                    Ok(prices) => {
                        result.attach_nodal_prices(prices);
                    }
                    Err(e) => {
                        warn!(error = %e, "Nodal sub-solve failed; zonal prices only");
                        result.record_nodal_failure(e.to_string());
                    }
                },
                // The fixed commitment did not solve, so pricing it would be meaningless
                Some(false) => result.record_nodal_failure("linear stage not optimal"),
                None => result.record_nodal_failure("no stage-1 solution to price"),
            }
        }

        info!(
            status = %result.status,
            objective = ?result.objective_value,
            has_duals = ?result.has_duals,
            stage1_seconds = result.timing.stage1_seconds,
            stage2_seconds = result.timing.stage2_seconds,
            "Dispatch finished"
        );
        (result, outcome)
    }
}
