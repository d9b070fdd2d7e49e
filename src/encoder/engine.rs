use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::encoder::request::{EncodedMovie, EncodingRequest, EncodingResult};
use crate::encoder::session::{EncoderTuning, SessionFactory, SessionGuard, SessionSettings};
use crate::error::{ResourceError, Result};
use crate::video::frame_source::FrameSource;
use crate::video::timing::FrameClock;

/// Where a run currently is
///
/// ```text
/// Idle -> Opening -> Writing(frame i of n) -> Finalizing -> Done
///                                        \-> Aborted (on any failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Idle,
    Opening,
    Writing { frame: u64, total: u64 },
    Finalizing,
    Done,
    Aborted,
}

/// Drives one encoding session from request to finished file
///
/// Frames are decoded and appended strictly one after the other; frame `i`
/// is stamped `i / fps`. The first failure of any kind aborts the run, and
/// the session is released on every path out of `encode`.
pub struct VideoEncoder {
    factory: Arc<dyn SessionFactory>,
    tuning: EncoderTuning,
    state: EncoderState,
}

impl VideoEncoder {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            tuning: EncoderTuning::default(),
            state: EncoderState::Idle,
        }
    }

    pub fn with_tuning(mut self, tuning: EncoderTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// Run the whole pipeline for `request`, blocking until it completes
    pub fn encode(&mut self, request: EncodingRequest) -> EncodingResult {
        self.state = EncoderState::Idle;

        info!(
            "Encoding {} images at {} fps, {} into {} ({})",
            request.frame_count(),
            request.fps(),
            request.frame_spec(),
            request.destination().display(),
            request.codec()
        );

        match self.run(&request) {
            Ok(movie) => {
                self.transition(EncoderState::Done);
                info!(
                    "Movie complete: {} frames, {:.3}s, {} bytes",
                    movie.frame_count,
                    movie.duration.as_secs_f64(),
                    movie.file_size
                );
                EncodingResult::Success(movie)
            }
            Err(e) => {
                warn!("Encoding aborted in state {:?}: {}", self.state, e);
                self.transition(EncoderState::Aborted);
                EncodingResult::Failure(e)
            }
        }
    }

    fn transition(&mut self, next: EncoderState) {
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn run(&mut self, request: &EncodingRequest) -> Result<EncodedMovie> {
        self.transition(EncoderState::Opening);

        request.validate()?;
        let spec = request.frame_spec();
        let (codec, container) = (request.codec(), request.container());

        if !container.supports(codec) {
            return Err(ResourceError::UnsupportedPairing { codec, container }.into());
        }
        if !codec.accepts(&spec) {
            return Err(ResourceError::UnsupportedDimensions {
                codec,
                width: spec.width(),
                height: spec.height(),
            }
            .into());
        }

        prepare_destination(request.destination())?;

        let settings = SessionSettings {
            destination: request.destination().to_path_buf(),
            frame_spec: spec,
            fps: request.fps(),
            codec,
            container,
            tuning: self.tuning,
        };
        debug!("Opening {} session", self.factory.name());
        let mut session = SessionGuard::new(self.factory.open(&settings)?);
        session.begin()?;

        let source = FrameSource::new(spec, *request.fit());
        let clock = FrameClock::new(request.fps())?;
        let total = request.frame_count();

        for (reference, at) in request.frames().iter().zip(clock) {
            self.transition(EncoderState::Writing {
                frame: at.index(),
                total,
            });

            let frame = source.frame(reference)?;
            session.append(&frame, at)?;
        }

        self.transition(EncoderState::Finalizing);
        session.finish()?;

        // A finished session must have left a file behind
        let file_size = std::fs::metadata(request.destination())?.len();

        Ok(EncodedMovie {
            destination: request.destination().to_path_buf(),
            frame_count: total,
            duration: FrameClock::new(request.fps())?.duration_of(total),
            file_size,
            codec,
            container,
        })
    }
}

/// Create or truncate the destination so an unwritable path fails before
/// any frame is decoded
fn prepare_destination(path: &Path) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|source| ResourceError::DestinationUnwritable {
            path: path.display().to_string(),
            source,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use image::{Rgb, RgbImage};
    use tempfile::{tempdir, TempDir};

    use crate::encoder::session::EncoderSession;
    use crate::error::{EncodeError, FailureKind, GeneratorError, ValidationError};
    use crate::video::timing::FrameTime;
    use crate::video::types::{CodecKind, ContainerKind, FrameSpec, PixelBuffer};

    #[derive(Debug, Default)]
    struct Recording {
        opened: usize,
        began: bool,
        frames: Vec<(FrameTime, [u8; 3])>,
        finished: bool,
        aborted: bool,
    }

    /// Session that remembers what it was given instead of writing a movie
    struct RecordingSession {
        log: Arc<Mutex<Recording>>,
        fail_at: Option<u64>,
    }

    impl EncoderSession for RecordingSession {
        fn begin(&mut self) -> Result<()> {
            self.log.lock().unwrap().began = true;
            Ok(())
        }

        fn append(&mut self, frame: &PixelBuffer, at: FrameTime) -> Result<()> {
            if self.fail_at == Some(at.index()) {
                return Err(EncodeError::AppendFailed {
                    frame: at.index(),
                    reason: "encoder rejected frame".into(),
                }
                .into());
            }
            self.log.lock().unwrap().frames.push((at, frame.get_pixel(0, 0)));
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.log.lock().unwrap().finished = true;
            Ok(())
        }

        fn abort(&mut self) {
            self.log.lock().unwrap().aborted = true;
        }
    }

    #[derive(Default)]
    struct RecordingFactory {
        log: Arc<Mutex<Recording>>,
        fail_at: Option<u64>,
    }

    impl SessionFactory for RecordingFactory {
        fn name(&self) -> &str {
            "recording"
        }

        fn open(&self, _settings: &SessionSettings) -> Result<Box<dyn EncoderSession>> {
            self.log.lock().unwrap().opened += 1;
            Ok(Box::new(RecordingSession {
                log: self.log.clone(),
                fail_at: self.fail_at,
            }))
        }
    }

    fn encoder(fail_at: Option<u64>) -> (VideoEncoder, Arc<Mutex<Recording>>) {
        let factory = RecordingFactory {
            fail_at,
            ..Default::default()
        };
        let log = factory.log.clone();
        (VideoEncoder::new(Arc::new(factory)), log)
    }

    /// Writes one solid 10x10 PNG per color, named so they sort in order
    fn color_frames(colors: &[[u8; 3]]) -> (TempDir, Vec<PathBuf>) {
        let dir = tempdir().unwrap();
        let paths = colors
            .iter()
            .enumerate()
            .map(|(i, color)| {
                let path = dir.path().join(format!("{:03}.png", i));
                RgbImage::from_pixel(10, 10, Rgb(*color)).save(&path).unwrap();
                path
            })
            .collect();
        (dir, paths)
    }

    fn request(paths: &[PathBuf], fps: u32, destination: PathBuf) -> EncodingRequest {
        EncodingRequest::builder()
            .frames(paths.iter().map(|p| p.as_path()))
            .size(10, 10)
            .fps(fps as i64)
            .codec(CodecKind::H264)
            .container(ContainerKind::Mp4)
            .destination(destination)
            .build()
            .unwrap()
    }

    const RED: [u8; 3] = [255, 0, 0];
    const GREEN: [u8; 3] = [0, 255, 0];
    const BLUE: [u8; 3] = [0, 0, 255];

    #[test]
    fn test_frames_are_appended_in_order_at_exact_times() {
        let (dir, paths) = color_frames(&[RED, GREEN, BLUE]);
        let (mut encoder, log) = encoder(None);

        let result = encoder.encode(request(&paths, 2, dir.path().join("out.mp4")));
        let movie = result.into_result().unwrap();

        let log = log.lock().unwrap();
        assert!(log.began && log.finished && !log.aborted);
        let times: Vec<f64> = log.frames.iter().map(|(t, _)| t.as_secs_f64()).collect();
        let colors: Vec<[u8; 3]> = log.frames.iter().map(|(_, c)| *c).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0]);
        assert_eq!(colors, vec![RED, GREEN, BLUE]);

        assert_eq!(movie.frame_count, 3);
        assert_eq!(movie.duration(), std::time::Duration::from_millis(1500));
        assert_eq!(encoder.state(), EncoderState::Done);
    }

    #[test]
    fn test_repeated_images_keep_their_slots() {
        let (dir, paths) = color_frames(&[RED, GREEN]);
        let sequence = vec![paths[1].clone(), paths[0].clone(), paths[1].clone()];
        let (mut encoder, log) = encoder(None);

        let result = encoder.encode(request(&sequence, 25, dir.path().join("out.mp4")));
        assert!(result.is_success());

        let log = log.lock().unwrap();
        let colors: Vec<[u8; 3]> = log.frames.iter().map(|(_, c)| *c).collect();
        assert_eq!(colors, vec![GREEN, RED, GREEN]);
        let indices: Vec<u64> = log.frames.iter().map(|(t, _)| t.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_corrupt_image_aborts_whole_run() {
        let (dir, mut paths) = color_frames(&[RED, GREEN, BLUE]);
        std::fs::write(&paths[1], b"truncated").unwrap();
        paths.push(dir.path().join("missing.png"));
        let (mut encoder, log) = encoder(None);

        let result = encoder.encode(request(&paths, 24, dir.path().join("out.mp4")));
        assert_eq!(result.failure_kind(), Some(FailureKind::Decode));
        assert_eq!(encoder.state(), EncoderState::Aborted);

        let log = log.lock().unwrap();
        assert_eq!(log.frames.len(), 1);
        assert!(log.aborted);
        assert!(!log.finished);
    }

    #[test]
    fn test_append_failure_aborts() {
        let (dir, paths) = color_frames(&[RED, GREEN, BLUE]);
        let (mut encoder, log) = encoder(Some(2));

        let result = encoder.encode(request(&paths, 24, dir.path().join("out.mp4")));
        match result {
            EncodingResult::Failure(GeneratorError::Encode(EncodeError::AppendFailed { frame, .. })) => {
                assert_eq!(frame, 2)
            }
            other => panic!("expected append failure, got {:?}", other),
        }

        let log = log.lock().unwrap();
        assert_eq!(log.frames.len(), 2);
        assert!(log.aborted);
    }

    #[test]
    fn test_unsupported_pairing_fails_before_opening() {
        let (dir, paths) = color_frames(&[RED]);
        let destination = dir.path().join("out.mp4");
        let request = EncodingRequest::builder()
            .frames(paths.iter().map(|p| p.as_path()))
            .size(10, 10)
            .fps(24)
            .codec(CodecKind::ProRes422)
            .container(ContainerKind::Mp4)
            .destination(&destination)
            .build()
            .unwrap();
        let (mut encoder, log) = encoder(None);

        let result = encoder.encode(request);
        assert_eq!(result.failure_kind(), Some(FailureKind::Resource));
        assert_eq!(log.lock().unwrap().opened, 0);
        assert!(!destination.exists());
    }

    #[test]
    fn test_odd_dimensions_rejected_for_subsampled_codecs() {
        let (dir, paths) = color_frames(&[RED]);
        let request = EncodingRequest::builder()
            .frames(paths.iter().map(|p| p.as_path()))
            .size(11, 10)
            .fps(24)
            .codec(CodecKind::H264)
            .container(ContainerKind::Mov)
            .destination(dir.path().join("out.mov"))
            .build()
            .unwrap();
        let (mut encoder, _log) = encoder(None);

        match encoder.encode(request) {
            EncodingResult::Failure(GeneratorError::Resource(ResourceError::UnsupportedDimensions {
                width,
                height,
                ..
            })) => assert_eq!((width, height), (11, 10)),
            other => panic!("expected dimension error, got {:?}", other),
        }
    }

    #[test]
    fn test_unwritable_destination() {
        let (dir, paths) = color_frames(&[RED]);
        let destination = dir.path().join("no/such/dir/out.mp4");
        let (mut encoder, log) = encoder(None);

        let result = encoder.encode(request(&paths, 24, destination));
        assert_eq!(result.failure_kind(), Some(FailureKind::Resource));
        assert_eq!(log.lock().unwrap().opened, 0);
    }

    #[test]
    fn test_rerun_is_equivalent() {
        let (dir, paths) = color_frames(&[RED, BLUE]);
        let destination = dir.path().join("out.mp4");

        let (mut first, first_log) = encoder(None);
        let (mut second, second_log) = encoder(None);
        let a = first.encode(request(&paths, 30, destination.clone())).into_result().unwrap();
        let b = second.encode(request(&paths, 30, destination)).into_result().unwrap();

        assert_eq!(a.frame_count, b.frame_count);
        assert_eq!(a.duration, b.duration);
        assert_eq!(first_log.lock().unwrap().frames, second_log.lock().unwrap().frames);
    }

    #[test]
    fn test_validation_happens_before_io() {
        let err = EncodingRequest::builder()
            .frames(["/nonexistent/a.png"])
            .size(10, 10)
            .fps(0)
            .destination("/nonexistent/out.mp4")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidFrameRate { fps: 0 });

        let result: EncodingResult = err.into();
        assert_eq!(result.failure_kind(), Some(FailureKind::Validation));
    }

    #[test]
    fn test_decode_error_names_the_image() {
        let (dir, mut paths) = color_frames(&[RED]);
        let bad = dir.path().join("zzz.png");
        std::fs::write(&bad, b"junk").unwrap();
        paths.push(bad.clone());
        let (mut encoder, _log) = encoder(None);

        match encoder.encode(request(&paths, 24, dir.path().join("out.mp4"))) {
            EncodingResult::Failure(GeneratorError::Decode(e)) => {
                assert_eq!(e.path(), bad.display().to_string())
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_spec_is_applied() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.png");
        RgbImage::from_pixel(40, 20, Rgb(RED)).save(&path).unwrap();

        struct SizeCheck(FrameSpec);
        impl EncoderSession for SizeCheck {
            fn begin(&mut self) -> Result<()> {
                Ok(())
            }
            fn append(&mut self, frame: &PixelBuffer, _at: FrameTime) -> Result<()> {
                assert!(frame.matches(&self.0));
                Ok(())
            }
            fn finish(&mut self) -> Result<()> {
                Ok(())
            }
            fn abort(&mut self) {}
        }
        struct SizeCheckFactory;
        impl SessionFactory for SizeCheckFactory {
            fn name(&self) -> &str {
                "size check"
            }
            fn open(&self, settings: &SessionSettings) -> Result<Box<dyn EncoderSession>> {
                Ok(Box::new(SizeCheck(settings.frame_spec)))
            }
        }

        let request = EncodingRequest::builder()
            .frames([path.as_path()])
            .size(10, 10)
            .fps(24)
            .destination(dir.path().join("out.mov"))
            .build()
            .unwrap();
        let mut encoder = VideoEncoder::new(Arc::new(SizeCheckFactory));
        assert!(encoder.encode(request).is_success());
    }

    /// Session that writes (or removes) the destination when finished
    struct FileSession {
        destination: PathBuf,
        contents: Option<&'static [u8]>,
    }

    impl EncoderSession for FileSession {
        fn begin(&mut self) -> Result<()> {
            Ok(())
        }
        fn append(&mut self, _frame: &PixelBuffer, _at: FrameTime) -> Result<()> {
            Ok(())
        }
        fn finish(&mut self) -> Result<()> {
            match self.contents {
                Some(bytes) => std::fs::write(&self.destination, bytes)?,
                None => std::fs::remove_file(&self.destination)?,
            }
            Ok(())
        }
        fn abort(&mut self) {}
    }

    struct FileFactory(Option<&'static [u8]>);

    impl SessionFactory for FileFactory {
        fn name(&self) -> &str {
            "file"
        }
        fn open(&self, settings: &SessionSettings) -> Result<Box<dyn EncoderSession>> {
            Ok(Box::new(FileSession {
                destination: settings.destination.clone(),
                contents: self.0,
            }))
        }
    }

    #[test]
    fn test_file_size_is_read_from_destination() {
        let (dir, paths) = color_frames(&[RED]);
        let mut encoder = VideoEncoder::new(Arc::new(FileFactory(Some(b"0123456789"))));

        let movie = encoder
            .encode(request(&paths, 24, dir.path().join("out.mp4")))
            .into_result()
            .unwrap();
        assert_eq!(movie.file_size, 10);
    }

    #[test]
    fn test_vanished_destination_is_an_io_failure() {
        let (dir, paths) = color_frames(&[RED]);
        let mut encoder = VideoEncoder::new(Arc::new(FileFactory(None)));

        let result = encoder.encode(request(&paths, 24, dir.path().join("out.mp4")));
        assert_eq!(result.failure_kind(), Some(FailureKind::Io));
        assert_eq!(encoder.state(), EncoderState::Aborted);
    }
}
