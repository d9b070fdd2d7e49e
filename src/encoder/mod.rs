//! # Encoder Module
//!
//! Drives an encoding session from a validated request to a finished movie
//! file, through one of the available backends.

pub mod engine;
pub mod process;
pub mod request;
pub mod session;

#[cfg(feature = "ffmpeg")]
pub mod native;

use std::sync::Arc;

use crate::config::{BackendKind, Config};
use crate::error::Result;

pub use engine::{EncoderState, VideoEncoder};
pub use process::ProcessBackend;
pub use request::{EncodedMovie, EncodingRequest, EncodingResult, RequestBuilder};
pub use session::{EncoderSession, EncoderTuning, SessionFactory, SessionSettings};

#[cfg(feature = "ffmpeg")]
pub use native::NativeBackend;

/// Build the session factory the configuration asks for
pub fn backend_from_config(config: &Config) -> Result<Arc<dyn SessionFactory>> {
    match config.backend.kind {
        BackendKind::Process => Ok(Arc::new(ProcessBackend::new(config.backend.ffmpeg_path.clone()))),
        #[cfg(feature = "ffmpeg")]
        BackendKind::Native => Ok(Arc::new(NativeBackend::new())),
        #[cfg(not(feature = "ffmpeg"))]
        BackendKind::Native => Err(crate::error::ConfigError::InvalidValue {
            key: "backend.kind".to_string(),
            value: "native (built without the ffmpeg feature)".to_string(),
        }
        .into()),
    }
}
