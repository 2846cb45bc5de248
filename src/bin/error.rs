use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SacError {
    #[error("environment failure: {0}")]
    Environment(String),

    #[error("observation has {got} features, expected {expected} (at least {min})")]
    InvalidObservation { got: usize, expected: usize, min: usize },

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot sample an action: {0}")]
    Sampling(String),

    #[error("replay buffer holds {len} transitions, batch of {batch} requested")]
    BufferUnderfilled { len: usize, batch: usize },

    #[error("could not write checkpoint {path:?}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },

    #[error("metrics sink failure: {0}")]
    Metrics(String),

    #[error("trial log io on {path:?}: {source}")]
    TrialLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed trial log record: {0}")]
    TrialLogFormat(#[from] serde_json::Error),

    #[error("parameter {name} = {value} outside [{low}, {high}]")]
    OutOfBounds { name: String, value: f64, low: f64, high: f64 },

    #[error("search failure: {0}")]
    Search(String),
}

impl From<csv::Error> for SacError {
    fn from(e: csv::Error) -> Self {
        SacError::Metrics(e.to_string())
    }
}
