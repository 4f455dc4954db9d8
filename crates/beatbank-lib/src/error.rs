use thiserror::Error;

pub type BeatResult<T> = Result<T, BeatError>;

/// Hard failures of a beat extraction call. Beats dropped at the signal
/// edges are not errors; they are simply absent from the output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BeatError {
    /// Malformed arguments.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No RR interval fell strictly inside the limits, so the mean RR is undefined.
    #[error("no RR interval inside ({low}, {high}) samples; mean RR is undefined")]
    InsufficientData { low: usize, high: usize },

    /// Too few samples for forward-backward filtering.
    #[error("signal of {len} samples is too short to filter; at least {min} are needed")]
    TooShort { len: usize, min: usize },
}

impl BeatError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        BeatError::InvalidInput(msg.into())
    }
}
