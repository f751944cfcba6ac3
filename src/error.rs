use std::{fmt, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum RadioError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("device unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("malformed response line: {0:?}")]
    Parse(String),
}

/// Raised while setting up a device: the front end rejects the configuration
/// and shows `reason` to the user.
#[derive(Debug, Error)]
#[error("cannot configure radio at {url}: {reason}")]
pub(crate) struct ConfigurationError {
    pub(crate) url: String,
    pub(crate) reason: SetupFailure,
}

impl ConfigurationError {
    pub(crate) fn new(url: &str, err: RadioError) -> Self {
        Self {
            url: url.to_owned(),
            reason: err.into(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SetupFailure {
    Timeout,
    Other(String),
}

impl fmt::Display for SetupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupFailure::Timeout => f.write_str("timed out"),
            SetupFailure::Other(reason) => f.write_str(reason),
        }
    }
}

impl From<RadioError> for SetupFailure {
    fn from(err: RadioError) -> Self {
        match err {
            RadioError::Timeout(_) => SetupFailure::Timeout,
            other => SetupFailure::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum PlayerError {
    #[error("unknown source {0:?}")]
    UnknownSource(String),
}
