//! # Movie Generator
//!
//! Turn an ordered sequence of still images into a movie file, one image per
//! frame at a constant frame rate.
//!
//! Each image is decoded, fitted onto a fixed canvas and appended to an
//! encoding session with the exact presentation time `i / fps`. The first
//! unreadable image, encoder error or finalize error aborts the whole run;
//! every run ends in exactly one [`EncodingResult`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use movie_generator::{
//!     config::Config,
//!     generation::{MovieGenerator, MovieSettings},
//!     video::ImageSequence,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let generator = MovieGenerator::new(Config::default())?;
//! let images = ImageSequence::from_directory("frames/")?;
//!
//! let settings = MovieSettings { fps: Some(2), ..Default::default() };
//! let request = generator.request(images, "out.mp4", &settings)?;
//!
//! let movie = generator.generate(request).await.into_result()?;
//! println!("{} frames, {:?}", movie.frame_count, movie.duration());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - Frame geometry, formats, timing and image decoding
//! - [`encoder`] - The encoding state machine and its backends
//! - [`generation`] - Background execution and result delivery
//! - [`config`] - Configuration management
//!
//! ## Custom Backends
//!
//! Anything that can consume timed RGB frames can be plugged in by
//! implementing [`SessionFactory`](encoder::SessionFactory) and
//! [`EncoderSession`](encoder::EncoderSession):
//!
//! ```rust,no_run
//! use movie_generator::encoder::{EncoderSession, SessionFactory, SessionSettings};
//! use movie_generator::video::{FrameTime, PixelBuffer};
//! use movie_generator::Result;
//!
//! struct Discard;
//!
//! impl EncoderSession for Discard {
//!     fn begin(&mut self) -> Result<()> { Ok(()) }
//!     fn append(&mut self, _frame: &PixelBuffer, _at: FrameTime) -> Result<()> { Ok(()) }
//!     fn finish(&mut self) -> Result<()> { Ok(()) }
//!     fn abort(&mut self) {}
//! }
//!
//! struct DiscardBackend;
//!
//! impl SessionFactory for DiscardBackend {
//!     fn name(&self) -> &str {
//!         "discard"
//!     }
//!
//!     fn open(&self, _settings: &SessionSettings) -> Result<Box<dyn EncoderSession>> {
//!         Ok(Box::new(Discard))
//!     }
//! }
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod generation;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    encoder::{EncodedMovie, EncodingRequest, EncodingResult, VideoEncoder},
    error::{FailureKind, GeneratorError, Result},
    generation::{MovieGenerator, MovieSettings},
    video::{CodecKind, ContainerKind, FrameSpec, ImageSequence},
};
