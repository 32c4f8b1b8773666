//! Error taxonomy for the resolution pipeline
//!
//! Ambiguous input is not represented here: it is a normal outcome carried by
//! `ResolutionResult::needs_clarification`.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResolverError>;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("model call exceeded deadline of {0:?}")]
    ModelTimeout(Duration),

    #[error("model call failed: {0}")]
    ModelTransport(String),

    #[error("model response violated schema: {0}")]
    ModelSchema(String),

    #[error("candidate rejected: {0}")]
    InvalidCandidate(String),

    #[error("malformed correction code: {0:?}")]
    MalformedCorrection(String),

    #[error("code validator unavailable: {0}")]
    ValidatorUnavailable(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ResolverError {
    /// Timeout, transport failure and schema violation are all handled the
    /// same way: fall through to clarification.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(
            self,
            ResolverError::ModelTimeout(_)
                | ResolverError::ModelTransport(_)
                | ResolverError::ModelSchema(_)
        )
    }
}
