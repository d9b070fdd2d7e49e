//! # Movie Generation
//!
//! Runs encodings off the caller's thread and hands back exactly one
//! [`EncodingResult`](crate::encoder::EncodingResult) per request.

pub mod generator;

pub use generator::{MovieGenerator, MovieSettings};
