//! Unified error type for schedulerd.
//!
//! One variant family per failure domain, in the style the rest of the
//! workspace expects: a message plus an optional boxed source.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("dispatch error: {message}")]
    Dispatch { message: String },

    #[error("control plane error: {message}")]
    Control {
        kind: ControlErrorKind,
        message: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Distinguishes the two ways a control-plane request can be rejected, so
/// `status_code()` can answer with the response code spec.md §4.E requires
/// for each (400 vs 403) instead of collapsing both to one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlErrorKind {
    BadRequest,
    Forbidden,
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Error::Store {
            message: message.into(),
            source: None,
        }
    }

    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn dispatch(message: impl Into<String>) -> Self {
        Error::Dispatch {
            message: message.into(),
        }
    }

    pub fn control_bad_request(message: impl Into<String>) -> Self {
        Error::Control {
            kind: ControlErrorKind::BadRequest,
            message: message.into(),
        }
    }

    pub fn control_forbidden(message: impl Into<String>) -> Self {
        Error::Control {
            kind: ControlErrorKind::Forbidden,
            message: message.into(),
        }
    }

    /// HTTP status code for errors the control plane surfaces directly.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Control {
                kind: ControlErrorKind::BadRequest,
                ..
            } => 400,
            Error::Control {
                kind: ControlErrorKind::Forbidden,
                ..
            } => 403,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_distinguishes_bad_request_from_forbidden() {
        assert_eq!(Error::control_bad_request("missing job_id").status_code(), 400);
        assert_eq!(Error::control_forbidden("bad token").status_code(), 403);
        assert_eq!(Error::dispatch("boom").status_code(), 500);
    }
}
