use thiserror::Error;

/// Errors raised while building, densifying, validating, or emitting waveforms.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SynthError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("requested {requested} points is outside the supported point range {min}-{max}")]
    PointsExceeded {
        requested: usize,
        min: usize,
        max: usize,
    },
    #[error("effective sample rate {rate:.3e} Sa/s exceeds the device maximum {max:.3e} Sa/s")]
    RateExceeded { rate: f64, max: f64 },
    #[error("waveform demands {demanded:.3e} V/s, device slew rate is {max:.3e} V/s")]
    SlewRateExceeded { demanded: f64, max: f64 },
    #[error("waveform name '{0}' is already registered")]
    DuplicateName(String),
    #[error("no waveform named '{0}' is registered")]
    UnknownWaveform(String),
    #[error("device adapter error: {0}")]
    Adapter(String),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Errors raised while encoding a scalar set-point into a source command.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EncodeError {
    #[error("cannot encode non-finite value {0}")]
    TypeMismatch(f64),
    #[error("mode {0} has no usable range table")]
    InvalidMode(String),
    #[error("value {value} exceeds the top permitted range of {limit}")]
    OutOfRange { value: f64, limit: f64 },
}
