use thiserror::Error;

/// Failures inside the pluggable statistical models
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("insufficient data: got {got} points, need {needed}")]
    InsufficientData { got: usize, needed: usize },

    #[error("non-finite value in model input")]
    NonFiniteInput,

    #[error("singular system while fitting model")]
    Singular,

    #[error("model produced a non-finite result")]
    NonFiniteOutput,
}

/// Samples rejected at ingestion
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("invalid price {0}: must be finite and > 0")]
    InvalidPrice(f64),

    #[error("invalid volume {0}: must be finite and >= 0")]
    InvalidVolume(f64),
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting: {0}")]
    Invalid(String),
}
