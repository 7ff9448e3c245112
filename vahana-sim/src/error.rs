//! Error types for VahanaSim

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// VahanaSim error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// World file could not be parsed
    #[error("World file parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid or missing configuration parameter
    #[error("Configuration error: {0}")]
    Config(String),

    /// Entity `type` tag with no registered factory
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Sensor `type` tag with no registered factory
    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(String),

    /// A single entity or sensor callback failed during a sub-step
    #[error("Step error in '{name}': {reason}")]
    Step {
        /// Entity or sensor name
        name: String,
        /// Failure description
        reason: String,
    },

    /// No depth renderer available (headless context)
    #[error("Depth renderer unavailable: {0}")]
    RenderUnavailable(String),

    /// Physics integration failed; the run cannot continue
    #[error("Physics solver failure: {0}")]
    Solver(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a per-entity step failure
    pub fn step(name: &str, reason: impl Into<String>) -> Self {
        Self::Step {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error must stop the simulation run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Step { .. } | Self::RenderUnavailable(_))
    }
}
