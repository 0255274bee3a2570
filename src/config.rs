use super::*;

/// Default branching factor.
pub const DEFAULT_BRANCHING: usize = 50;
/// Default absorption threshold.
pub const DEFAULT_THRESHOLD: Scalar = 0.3;
/// Default insertion period between rebuild checks.
pub const DEFAULT_REBUILD_PERIOD: usize = 100;

/// Construction parameters for a clustering tree.
///
/// Validation happens here, once, so [`Tree`] construction itself is
/// infallible: an invalid branching factor or threshold is rejected up
/// front instead of silently clamped, and the closed [`Metric`] enum
/// makes an out-of-range distance function unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    branching: usize,
    threshold: Scalar,
    metric: Metric,
    refinement: bool,
}

impl Config {
    /// Validates and assembles a configuration.
    ///
    /// `branching` is the maximum entries a node may hold; `threshold`
    /// is the absorption distance for leaf subclusters; `refinement`
    /// enables the post-split merging refinement pass.
    pub fn new(
        branching: usize,
        threshold: Scalar,
        metric: Metric,
        refinement: bool,
    ) -> Result<Self> {
        if branching == 0 {
            return Err(Error::Config(format!(
                "branching factor must be positive, got {}",
                branching
            )));
        }
        if !threshold.is_finite() || threshold < 0. {
            return Err(Error::Config(format!(
                "threshold must be finite and non-negative, got {}",
                threshold
            )));
        }
        Ok(Self {
            branching,
            threshold,
            metric,
            refinement,
        })
    }

    /// Maximum entries per node.
    pub fn branching(&self) -> usize {
        self.branching
    }

    /// Absorption threshold for leaf subclusters.
    pub fn threshold(&self) -> Scalar {
        self.threshold
    }

    /// Ground distance function.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Whether merging refinement runs after interior splits.
    pub fn refinement(&self) -> bool {
        self.refinement
    }

    /// The same configuration under an enlarged threshold; rebuilds
    /// bypass `new` because the inputs are already validated.
    pub(crate) fn with_threshold(&self, threshold: Scalar) -> Self {
        Self {
            threshold,
            ..self.clone()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            branching: DEFAULT_BRANCHING,
            threshold: DEFAULT_THRESHOLD,
            metric: Metric::D0,
            refinement: false,
        }
    }
}
