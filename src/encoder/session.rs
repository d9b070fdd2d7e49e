//! The seam between the encoding state machine and a concrete media writer.

use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;
use crate::video::timing::FrameTime;
use crate::video::types::{CodecKind, ContainerKind, FrameSpec, PixelBuffer};

/// Knobs that do not change what is encoded, only how well or how fast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderTuning {
    /// Quality setting (0-100, higher is better)
    pub quality: u8,
    /// Encoder worker threads
    pub threads: usize,
}

impl Default for EncoderTuning {
    fn default() -> Self {
        Self {
            quality: 85,
            threads: num_cpus::get(),
        }
    }
}

/// Parameters a session is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub destination: PathBuf,
    pub frame_spec: FrameSpec,
    pub fps: u32,
    pub codec: CodecKind,
    pub container: ContainerKind,
    pub tuning: EncoderTuning,
}

impl SessionSettings {
    /// Constant rate factor for x264/x265 (0-51, lower is better)
    pub fn crf(&self) -> u8 {
        (51 - ((self.tuning.quality.min(100) as f32 / 100.0) * 51.0) as u8).clamp(0, 51)
    }

    /// JPEG quantizer scale (2-31, lower is better)
    pub fn qscale(&self) -> u8 {
        let quality = self.tuning.quality.min(100) as u32;
        (2 + (100 - quality) * 29 / 100) as u8
    }

    /// prores_ks profile number
    pub fn prores_profile(&self) -> Option<u8> {
        match self.codec {
            CodecKind::ProRes422 => Some(2),
            CodecKind::ProRes4444 => Some(4),
            _ => None,
        }
    }
}

/// A stateful writer that turns a stream of timed frames into a movie file
///
/// Calls arrive in a fixed order: `begin`, any number of `append`s with
/// strictly consecutive times, then either `finish` or `abort`. Sessions live
/// on the worker that opened them and need not be `Send`.
pub trait EncoderSession {
    /// Start the timeline at zero
    fn begin(&mut self) -> Result<()>;

    /// Append one frame at its presentation time
    fn append(&mut self, frame: &PixelBuffer, at: FrameTime) -> Result<()>;

    /// Signal end of input and wait until the container is complete
    fn finish(&mut self) -> Result<()>;

    /// Release everything without completing the file
    fn abort(&mut self);
}

/// Creates sessions for one backend
pub trait SessionFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Allocate a session; failures here are resource errors
    fn open(&self, settings: &SessionSettings) -> Result<Box<dyn EncoderSession>>;
}

/// Owns a session for the duration of a run and aborts it unless it was
/// explicitly finished
pub(crate) struct SessionGuard {
    session: Option<Box<dyn EncoderSession>>,
}

impl SessionGuard {
    pub(crate) fn new(session: Box<dyn EncoderSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub(crate) fn begin(&mut self) -> Result<()> {
        match self.session.as_deref_mut() {
            Some(session) => session.begin(),
            None => Ok(()),
        }
    }

    pub(crate) fn append(&mut self, frame: &PixelBuffer, at: FrameTime) -> Result<()> {
        match self.session.as_deref_mut() {
            Some(session) => session.append(frame, at),
            None => Ok(()),
        }
    }

    /// Finish the session; a failed finish still releases it
    pub(crate) fn finish(mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let result = session.finish();
        if result.is_err() {
            session.abort();
        }
        result
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!("Releasing unfinished encoder session");
            session.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::error::{EncodeError, GeneratorError};

    #[derive(Default)]
    struct Calls(Mutex<Vec<&'static str>>);

    struct Probe {
        calls: Arc<Calls>,
        fail_finish: bool,
    }

    impl EncoderSession for Probe {
        fn begin(&mut self) -> Result<()> {
            self.calls.0.lock().unwrap().push("begin");
            Ok(())
        }

        fn append(&mut self, _frame: &PixelBuffer, _at: FrameTime) -> Result<()> {
            self.calls.0.lock().unwrap().push("append");
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.calls.0.lock().unwrap().push("finish");
            if self.fail_finish {
                return Err(GeneratorError::from(EncodeError::FinalizeFailed {
                    reason: "disk full".into(),
                }));
            }
            Ok(())
        }

        fn abort(&mut self) {
            self.calls.0.lock().unwrap().push("abort");
        }
    }

    fn guard(fail_finish: bool) -> (SessionGuard, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let probe = Probe {
            calls: calls.clone(),
            fail_finish,
        };
        (SessionGuard::new(Box::new(probe)), calls)
    }

    #[test]
    fn test_dropped_guard_aborts() {
        let (mut guard, calls) = guard(false);
        guard.begin().unwrap();
        drop(guard);
        assert_eq!(*calls.0.lock().unwrap(), vec!["begin", "abort"]);
    }

    #[test]
    fn test_finished_guard_does_not_abort() {
        let (mut guard, calls) = guard(false);
        guard.begin().unwrap();
        guard.append(&PixelBuffer::new_filled(2, 2, [0, 0, 0]), FrameTime::zero(24)).unwrap();
        guard.finish().unwrap();
        assert_eq!(*calls.0.lock().unwrap(), vec!["begin", "append", "finish"]);
    }

    #[test]
    fn test_failed_finish_releases_session() {
        let (guard, calls) = guard(true);
        assert!(guard.finish().is_err());
        assert_eq!(*calls.0.lock().unwrap(), vec!["finish", "abort"]);
    }

    #[test]
    fn test_quality_mapping() {
        let mut settings = SessionSettings {
            destination: PathBuf::from("out.mov"),
            frame_spec: FrameSpec::new(16, 16).unwrap(),
            fps: 24,
            codec: CodecKind::H264,
            container: ContainerKind::Mov,
            tuning: EncoderTuning { quality: 100, threads: 1 },
        };
        assert_eq!(settings.crf(), 0);
        assert_eq!(settings.qscale(), 2);
        assert_eq!(settings.prores_profile(), None);

        settings.tuning.quality = 0;
        assert_eq!(settings.crf(), 51);
        assert_eq!(settings.qscale(), 31);

        settings.codec = CodecKind::ProRes4444;
        assert_eq!(settings.prores_profile(), Some(4));
    }
}
