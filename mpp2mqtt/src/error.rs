use std::path::PathBuf;

use thiserror::Error;

/// Why a transaction produced no usable bytes. Only used for logging, callers
/// treat every cause the same way.
#[derive(Debug, Error)]
pub enum NoResponseCause {
    #[error("device not found")]
    DeviceNotFound,
    #[error("inverter did not answer within {0} ms")]
    Timeout(u128),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("command {0:?} is empty or not plain ASCII")]
    FramingPrecondition(String),
    #[error("no response: {0}")]
    NoResponse(#[from] NoResponseCause),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("field {field} has unparsable value {value:?}")]
    FieldParseFailure { field: &'static str, value: String },
    #[error("device {} disappeared", .0.display())]
    DeviceDisappeared(PathBuf),
}

impl ProtocolError {
    pub(crate) fn io(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProtocolError::NoResponse(NoResponseCause::DeviceNotFound)
        } else {
            ProtocolError::NoResponse(NoResponseCause::Io(e))
        }
    }
}
