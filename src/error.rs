//! Error types for the niimprint protocol core.

use thiserror::Error;

use crate::printer::PrintStage;

/// A framed packet could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Header or footer markers are missing, or the frame is too short to hold them.
    #[error("bad packet framing")]
    Frame,

    /// The trailing checksum does not match the packet contents.
    #[error("checksum mismatch: packet says {message:#04x}, computed {computed:#04x}")]
    Checksum { message: u8, computed: u8 },

    /// Declared payload length does not match the bytes present.
    #[error("length mismatch: declared {declared} bytes, found {actual}")]
    Length { declared: usize, actual: usize },
}

/// Main error type for printer operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// No notification arrived before the deadline.
    #[error("timed out after {timeout_ms}ms waiting for a response")]
    Timeout { timeout_ms: u64 },

    /// The printer answered with the error command (0xDB).
    #[error("printer reported an error (payload {payload:02x?})")]
    Device { payload: Vec<u8> },

    /// The printer answered with command 0: it does not know the request.
    /// `expected` is the response code the request was waiting for.
    #[error("printer does not implement the request answered by {expected:#04x}")]
    Unimplemented { expected: u8 },

    /// Caller supplied an out-of-range value. Raised before any I/O.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Raster width does not match the fixed printer row width.
    #[error("unsupported raster width {width}, printer rows are {expected} pixels wide")]
    UnsupportedWidth { width: usize, expected: usize },

    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    /// Connection-level failure (closed channel, missing characteristic, ...).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// A print job step failed; `stage` names the step.
    #[error("print job failed at {stage:?}: {source}")]
    Stage {
        stage: PrintStage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Strips any [`Error::Stage`] wrappers and returns the underlying error.
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// The failed print stage, if this error came out of a print job.
    pub fn stage(&self) -> Option<PrintStage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
