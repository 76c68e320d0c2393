//! Error taxonomy for the judging pipeline.
//!
//! Verdicts are not errors: the six terminal failure kinds travel on the
//! testing message stream as [`crate::model::Verdict`] values. Everything in
//! this module is either a caller mistake (bad input, missing entity, missing
//! permission) or an infrastructure failure that aborts a submission without
//! producing a verdict.

use thiserror::Error;

/// Operational errors raised by the pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("no permission")]
    NoPermission,

    #[error("bad input: {0}")]
    BadInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Infrastructure failure: container runtime, filesystem, storage,
    /// parser. Logged and reported, never translated into a solution state.
    #[error("{op}: {message}")]
    Internal {
        op: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Build an internal error tagged with the failing operation.
    pub fn internal(op: &'static str, message: impl Into<String>) -> Self {
        Error::Internal {
            op,
            message: message.into(),
            source: None,
        }
    }

    /// Build an internal error preserving the underlying cause.
    pub fn wrap(
        op: &'static str,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Internal {
            op,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Error::BadInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal { .. })
    }

    /// HTTP status the outer surface maps this error onto.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Unauthenticated => 401,
            Error::NoPermission => 403,
            Error::BadInput(_) => 400,
            Error::NotFound(_) => 404,
            Error::Internal { .. } => 500,
        }
    }
}
