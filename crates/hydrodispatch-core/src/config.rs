use std::time::Duration;

/// Replaces the rounded stage-1 value of one integer variable when the
/// linear stage is fixed.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CommitmentOverride {
    pub group: String,
    pub entity: String,
    pub period: usize,
    pub value: f64,
}

/// Settings for one two-stage solve
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct SolveConfig {
    /// Wall-clock limit applied to each stage, in seconds
    pub time_limit_secs: f64,
    /// Replaces `time_limit_secs` for the linear stage when set
    pub linear_time_limit_secs: Option<f64>,
    /// Relative optimality gap at which the integer search stops
    pub mip_gap: f64,
    /// Time-limited results whose gap exceeds this are flagged
    pub gap_warning_threshold: f64,
    /// Maximum branch-and-bound nodes
    pub node_limit: usize,
    /// Pivot tolerance of the simplex
    pub lp_tolerance: f64,
    /// Pivot limit per LP solve
    pub max_lp_iterations: usize,
    /// Default tolerance for violation checks
    pub violation_tolerance: f64,
    /// Forced commitment values for the linear stage
    pub commitment_overrides: Vec<CommitmentOverride>,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 300.0,
            linear_time_limit_secs: None,
            mip_gap: 0.01,
            gap_warning_threshold: 0.05,
            node_limit: 10000,
            lp_tolerance: 1e-9,
            max_lp_iterations: 50000,
            violation_tolerance: 1e-6,
            commitment_overrides: Vec::new(),
        }
    }
}

impl SolveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_limit(mut self, secs: f64) -> Self {
        self.time_limit_secs = secs;
        self
    }

    pub fn with_linear_time_limit(mut self, secs: f64) -> Self {
        self.linear_time_limit_secs = Some(secs);
        self
    }

    pub fn with_mip_gap(mut self, gap: f64) -> Self {
        self.mip_gap = gap;
        self
    }

    pub fn with_gap_warning_threshold(mut self, threshold: f64) -> Self {
        self.gap_warning_threshold = threshold;
        self
    }

    pub fn with_node_limit(mut self, nodes: usize) -> Self {
        self.node_limit = nodes;
        self
    }

    pub fn with_lp_tolerance(mut self, tol: f64) -> Self {
        self.lp_tolerance = tol;
        self
    }

    pub fn with_max_lp_iterations(mut self, max: usize) -> Self {
        self.max_lp_iterations = max;
        self
    }

    pub fn with_violation_tolerance(mut self, tol: f64) -> Self {
        self.violation_tolerance = tol;
        self
    }

    pub fn with_override(mut self, group: &str, entity: &str, period: usize, value: f64) -> Self {
        self.commitment_overrides.push(CommitmentOverride {
            group: group.to_string(),
            entity: entity.to_string(),
            period,
            value,
        });
        self
    }

    /// Per-stage time limit; non-finite or negative values mean no limit
    pub fn time_limit(&self) -> Option<Duration> {
        limit(self.time_limit_secs)
    }

    /// Time limit of the fixed-commitment re-solve
    pub fn linear_time_limit(&self) -> Option<Duration> {
        limit(self.linear_time_limit_secs.unwrap_or(self.time_limit_secs))
    }
}

fn limit(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = SolveConfig::new()
            .with_mip_gap(0.0)
            .with_node_limit(5)
            .with_override("thermal_commitment", "T1", 0, 1.0);

        assert_eq!(config.mip_gap, 0.0);
        assert_eq!(config.node_limit, 5);
        assert_eq!(config.commitment_overrides.len(), 1);
        assert_eq!(config.time_limit(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_infinite_time_limit_is_unlimited() {
        let config = SolveConfig::new().with_time_limit(f64::INFINITY);
        assert_eq!(config.time_limit(), None);
        assert_eq!(config.linear_time_limit(), None);
    }

    #[test]
    fn test_linear_time_limit_falls_back_to_stage_limit() {
        let config = SolveConfig::new().with_time_limit(60.0);
        assert_eq!(config.linear_time_limit(), Some(Duration::from_secs(60)));

        let config = config.with_linear_time_limit(0.5);
        assert_eq!(config.linear_time_limit(), Some(Duration::from_millis(500)));
        assert_eq!(config.time_limit(), Some(Duration::from_secs(60)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SolveConfig = serde_json::from_str(r#"{"mip_gap": 0.001}"#).unwrap();
        assert_eq!(config.mip_gap, 0.001);
        assert_eq!(config.node_limit, 10000);
    }
}
