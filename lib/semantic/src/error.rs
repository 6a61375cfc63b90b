use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] nestfind_core::Error),

    /// A neighborhood paired with two different groups in the corpus.
    #[error("Neighborhood '{neighborhood}' appears under groups '{first_group}' and '{second_group}'")]
    InconsistentGeography {
        neighborhood: String,
        first_group: String,
        second_group: String,
    },

    #[error("Invalid engine configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Query cannot be empty")]
    EmptyQuery,
}

impl Error {
    /// Build-time and data-contract faults; these must reach the caller.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            Error::Core(nestfind_core::Error::Configuration(_))
                | Error::InconsistentGeography { .. }
                | Error::Config(_)
        )
    }
}

/// Errors raised while validating [`crate::EngineConfig`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Weight '{0}' is negative")]
    NegativeWeight(&'static str),

    #[error("Rank weights sum to zero")]
    ZeroTotalWeight,

    #[error("Threshold '{0}' must lie in [-1, 1]")]
    ThresholdOutOfRange(&'static str),

    #[error("Rating scale must be positive")]
    NonPositiveRatingScale,

    #[error("Cluster bounds are inverted: min {min} > max {max}")]
    InvertedClusterBounds { min: usize, max: usize },
}
