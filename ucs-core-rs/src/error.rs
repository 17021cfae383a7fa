//! Errors returned by the use case layer

use thiserror::Error;

use crate::types::{FeatureType, FunctionType, MsgCounter};

/// Errors in use case and feature channel handling
#[derive(Debug, Error)]
pub enum UseCaseError {
    #[error("no compatible entity")]
    NoCompatibleEntity,

    #[error("remote entity has no {0:?} server feature")]
    RemoteFeatureMissing(FeatureType),

    #[error("data not available")]
    DataNotAvailable,

    #[error("data is not valid")]
    DataInvalid,

    #[error("function {0} is not supported by the remote feature")]
    FunctionNotSupported(FunctionType),

    #[error("local entity is missing")]
    LocalEntityMissing,

    #[error("local entity has no {0:?} client feature")]
    LocalFeatureMissing(FeatureType),

    #[error("request could not be sent: {0}")]
    SendFailed(String),

    #[error("a response callback is already registered for counter {0}")]
    CallbackExists(MsgCounter),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UseCaseError {
    /// Whether the error belongs to the incompatible-entity class
    pub fn is_incompatible(&self) -> bool {
        matches!(
            self,
            UseCaseError::NoCompatibleEntity | UseCaseError::RemoteFeatureMissing(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, UseCaseError>;
