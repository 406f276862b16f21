use crate::host::Characteristic;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid value for {characteristic}: expected {expected}")]
    InvalidValue {
        characteristic: Characteristic,
        expected: &'static str,
    },

    #[error("No handler bound for characteristic {0}")]
    HandlerNotBound(Characteristic),

    #[error("Unrecognized topic: {0}")]
    UnknownTopic(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
