//! # Video Module
//!
//! Frame geometry, codec and container metadata, exact frame timing, image
//! sequences and the decoding step that turns images into frames.

pub mod frame_source;
pub mod sequence;
pub mod timing;
pub mod types;

pub use frame_source::{DecodedImage, FitOptions, FrameSource};
pub use sequence::{ImageReference, ImageSequence};
pub use timing::{FrameClock, FrameTime};
pub use types::{CodecKind, ContainerKind, FitPolicy, FrameSpec, PixelBuffer, ResizeFilter};
