use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FailureKind, GeneratorError, Result, ValidationError};
use crate::video::frame_source::FitOptions;
use crate::video::sequence::ImageReference;
use crate::video::timing::FrameTime;
use crate::video::types::{CodecKind, ContainerKind, FrameSpec};

/// Everything needed to produce one movie
///
/// A request can only be built with a non-empty sequence, a positive frame
/// rate and a positive canvas size. It is consumed by the encoder.
#[derive(Debug, Clone)]
pub struct EncodingRequest {
    frames: Vec<ImageReference>,
    frame_spec: FrameSpec,
    fps: u32,
    codec: CodecKind,
    container: ContainerKind,
    destination: PathBuf,
    fit: FitOptions,
}

impl EncodingRequest {
    pub fn new<F, P>(
        frames: F,
        frame_spec: FrameSpec,
        fps: u32,
        codec: CodecKind,
        container: ContainerKind,
        destination: P,
    ) -> std::result::Result<Self, ValidationError>
    where
        F: Into<Vec<ImageReference>>,
        P: Into<PathBuf>,
    {
        let request = Self {
            frames: frames.into(),
            frame_spec,
            fps,
            codec,
            container,
            destination: destination.into(),
            fit: FitOptions::default(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Start a request from raw, possibly invalid, user input
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn with_fit(mut self, fit: FitOptions) -> Self {
        self.fit = fit;
        self
    }

    /// Check every invariant without touching the filesystem
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.frames.is_empty() {
            return Err(ValidationError::EmptySequence);
        }
        if self.fps == 0 {
            return Err(ValidationError::InvalidFrameRate { fps: 0 });
        }
        if self.frame_spec.width() == 0 || self.frame_spec.height() == 0 {
            return Err(ValidationError::InvalidDimensions {
                width: self.frame_spec.width().into(),
                height: self.frame_spec.height().into(),
            });
        }
        if self.destination.as_os_str().is_empty() {
            return Err(ValidationError::MissingDestination);
        }
        Ok(())
    }

    pub fn frames(&self) -> &[ImageReference] {
        &self.frames
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    pub fn frame_spec(&self) -> FrameSpec {
        self.frame_spec
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn codec(&self) -> CodecKind {
        self.codec
    }

    pub fn container(&self) -> ContainerKind {
        self.container
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn fit(&self) -> &FitOptions {
        &self.fit
    }
}

/// Collects request fields as the user entered them
///
/// Signed dimensions and frame rate are accepted so that zero and negative
/// input is reported as a validation error rather than rejected by the type
/// system somewhere upstream.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    frames: Vec<ImageReference>,
    width: i64,
    height: i64,
    fps: i64,
    codec: CodecKind,
    container: ContainerKind,
    destination: Option<PathBuf>,
    fit: FitOptions,
}

impl RequestBuilder {
    pub fn frames<I, R>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ImageReference>,
    {
        self.frames = frames.into_iter().map(Into::into).collect();
        self
    }

    pub fn size(mut self, width: i64, height: i64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn fps(mut self, fps: i64) -> Self {
        self.fps = fps;
        self
    }

    pub fn codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    pub fn container(mut self, container: ContainerKind) -> Self {
        self.container = container;
        self
    }

    pub fn destination<P: Into<PathBuf>>(mut self, destination: P) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn fit(mut self, fit: FitOptions) -> Self {
        self.fit = fit;
        self
    }

    pub fn build(self) -> std::result::Result<EncodingRequest, ValidationError> {
        if self.frames.is_empty() {
            return Err(ValidationError::EmptySequence);
        }
        let frame_spec = FrameSpec::from_signed(self.width, self.height)?;
        let fps = u32::try_from(self.fps)
            .ok()
            .filter(|fps| *fps > 0)
            .ok_or(ValidationError::InvalidFrameRate { fps: self.fps })?;
        let destination = self.destination.ok_or(ValidationError::MissingDestination)?;

        Ok(EncodingRequest::new(
            self.frames,
            frame_spec,
            fps,
            self.codec,
            self.container,
            destination,
        )?
        .with_fit(self.fit))
    }
}

/// Summary of a finished movie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMovie {
    pub destination: PathBuf,
    pub frame_count: u64,
    /// `frame_count / fps`, exact
    pub duration: FrameTime,
    pub file_size: u64,
    pub codec: CodecKind,
    pub container: ContainerKind,
}

impl EncodedMovie {
    pub fn duration(&self) -> Duration {
        self.duration.to_duration()
    }
}

/// Terminal outcome of one run
#[derive(Debug)]
pub enum EncodingResult {
    Success(EncodedMovie),
    Failure(GeneratorError),
}

impl EncodingResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure(e) => Some(e.kind()),
        }
    }

    pub fn movie(&self) -> Option<&EncodedMovie> {
        match self {
            Self::Success(movie) => Some(movie),
            Self::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<EncodedMovie> {
        match self {
            Self::Success(movie) => Ok(movie),
            Self::Failure(e) => Err(e),
        }
    }
}

impl From<Result<EncodedMovie>> for EncodingResult {
    fn from(result: Result<EncodedMovie>) -> Self {
        match result {
            Ok(movie) => Self::Success(movie),
            Err(e) => Self::Failure(e),
        }
    }
}

impl From<ValidationError> for EncodingResult {
    fn from(error: ValidationError) -> Self {
        Self::Failure(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> RequestBuilder {
        EncodingRequest::builder()
            .frames(["a.png", "b.png", "c.png"])
            .size(100, 100)
            .fps(2)
            .codec(CodecKind::H264)
            .container(ContainerKind::Mp4)
            .destination("out.mp4")
    }

    #[test]
    fn test_valid_request() {
        let request = builder().build().unwrap();
        assert_eq!(request.frame_count(), 3);
        assert_eq!(request.fps(), 2);
        assert_eq!(request.frame_spec(), FrameSpec::new(100, 100).unwrap());
        assert_eq!(request.destination(), Path::new("out.mp4"));
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let frames: [&str; 0] = [];
        let err = builder().frames(frames).build().unwrap_err();
        assert_eq!(err, ValidationError::EmptySequence);
    }

    #[test]
    fn test_non_positive_fps_rejected() {
        assert_eq!(builder().fps(0).build().unwrap_err(), ValidationError::InvalidFrameRate { fps: 0 });
        assert_eq!(builder().fps(-24).build().unwrap_err(), ValidationError::InvalidFrameRate { fps: -24 });
    }

    #[test]
    fn test_non_positive_dimensions_rejected() {
        assert_eq!(
            builder().size(0, 100).build().unwrap_err(),
            ValidationError::InvalidDimensions { width: 0, height: 100 }
        );
        assert_eq!(
            builder().size(100, -1).build().unwrap_err(),
            ValidationError::InvalidDimensions { width: 100, height: -1 }
        );
    }

    #[test]
    fn test_missing_destination_rejected() {
        let err = EncodingRequest::builder()
            .frames(["a.png"])
            .size(10, 10)
            .fps(24)
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingDestination);
    }

    #[test]
    fn test_direct_constructor_validates() {
        let spec = FrameSpec::new(10, 10).unwrap();
        let err = EncodingRequest::new(Vec::<ImageReference>::new(), spec, 24, CodecKind::H264, ContainerKind::Mov, "x.mov");
        assert_eq!(err.unwrap_err(), ValidationError::EmptySequence);

        let frames = vec![ImageReference::from("a.png")];
        let err = EncodingRequest::new(frames, spec, 0, CodecKind::H264, ContainerKind::Mov, "x.mov");
        assert_eq!(err.unwrap_err(), ValidationError::InvalidFrameRate { fps: 0 });
    }

    #[test]
    fn test_result_conversions() {
        let result: EncodingResult = ValidationError::EmptySequence.into();
        assert!(!result.is_success());
        assert_eq!(result.failure_kind(), Some(FailureKind::Validation));
        assert!(result.into_result().is_err());
    }
}
