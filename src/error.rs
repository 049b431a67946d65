use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures opening or writing the hidraw device.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("unable to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error sending command: {0}")]
    Write(#[source] std::io::Error),

    #[error("device is not open")]
    NotOpen,
}

/// Failures while waiting for a reply frame.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("no complete frame after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("error reading data: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("wrong field count: expected {expected}, got {actual}")]
    WrongFieldCount { expected: usize, actual: usize },

    #[error("reply does not start with '('")]
    MissingStart,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("field {index} has unparseable value {raw_value:?}")]
    FieldParse { index: usize, raw_value: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Deliberate exit so that the process supervisor restarts the bridge.
    #[error("{count} consecutive failed poll cycles, giving up")]
    FailureThreshold { count: u32 },
}
