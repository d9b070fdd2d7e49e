use thiserror::Error;

use crate::video::types::{CodecKind, ContainerKind};

/// Main error type for the movie generator
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Image decoding error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed requests, detected before any I/O happens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("the image sequence is empty")]
    EmptySequence,

    #[error("invalid movie dimensions: {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },

    #[error("invalid frame rate: {fps}")]
    InvalidFrameRate { fps: i64 },

    #[error("no destination given")]
    MissingDestination,
}

/// Failures while acquiring the output file or the encoder session
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("cannot write destination {path}: {source}")]
    DestinationUnwritable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{codec} cannot be stored in a {container}")]
    UnsupportedPairing {
        codec: CodecKind,
        container: ContainerKind,
    },

    #[error("{codec} cannot encode a {width}x{height} frame")]
    UnsupportedDimensions {
        codec: CodecKind,
        width: u32,
        height: u32,
    },

    #[error("encoder '{encoder}' is not available: {reason}")]
    EncoderUnavailable { encoder: String, reason: String },

    #[error("failed to start encoder session: {reason}")]
    SessionFailed { reason: String },
}

/// Per-image failures, escalated to a whole-run failure by the encoder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("{path} is not a recognised image format")]
    UnknownFormat { path: String },

    #[error("{path} could not be decoded: {reason}")]
    Malformed { path: String, reason: String },
}

impl DecodeError {
    /// The image that failed
    pub fn path(&self) -> &str {
        match self {
            Self::Unreadable { path, .. } | Self::UnknownFormat { path } | Self::Malformed { path, .. } => path,
        }
    }
}

/// Failures of the media-writing session after it has been opened
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("frame {frame} could not be appended: {reason}")]
    AppendFailed { frame: u64, reason: String },

    #[error("frame timestamp out of sequence: expected {expected}, got {got}")]
    OutOfOrder { expected: String, got: String },

    #[error("pixel buffer is {got_width}x{got_height}, session expects {width}x{height}")]
    GeometryMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },

    #[error("finalizing the movie failed: {reason}")]
    FinalizeFailed { reason: String },

    #[error("encoding worker stopped unexpectedly: {reason}")]
    WorkerPanicked { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using GeneratorError
pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Coarse classification of a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Resource,
    Decode,
    Encode,
    Config,
    Io,
}

impl GeneratorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::Resource(_) => FailureKind::Resource,
            Self::Decode(_) => FailureKind::Decode,
            Self::Encode(_) => FailureKind::Encode,
            Self::Config(_) => FailureKind::Config,
            Self::Io(_) => FailureKind::Io,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::EmptySequence) => {
                "The selected folder does not contain any image.".to_string()
            }
            Self::Validation(ValidationError::InvalidDimensions { .. }) => {
                "Invalid movie dimensions.".to_string()
            }
            Self::Validation(ValidationError::InvalidFrameRate { .. }) => {
                "Invalid frame rate.".to_string()
            }
            Self::Decode(e) => {
                format!("An image could not be read ({}). No movie was generated.", e)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => format!("An error occured while generating the movie: {}", self),
        }
    }
}
