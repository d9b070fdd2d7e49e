use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::error::{EncodeError, ResourceError, Result};
use crate::encoder::session::{EncoderSession, SessionFactory, SessionSettings};
use crate::video::timing::FrameTime;
use crate::video::types::{CodecKind, FrameSpec, PixelBuffer};

/// Encodes by piping raw RGB24 frames into an external `ffmpeg` executable
///
/// ffmpeg's rawvideo demuxer stamps frame `n` with pts `n` in a `1/fps`
/// timebase, so the presentation times are exact as long as frames arrive
/// in order, which the session enforces.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    ffmpeg_path: PathBuf,
}

impl ProcessBackend {
    pub fn new<P: Into<PathBuf>>(ffmpeg_path: P) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Whether the executable was built with the encoder `name`
    pub fn has_encoder(&self, name: &str) -> std::io::Result<bool> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()?;
        Ok(lists_encoder(&String::from_utf8_lossy(&output.stdout), name))
    }

    /// Full argument list for one session
    pub fn arguments(settings: &SessionSettings) -> Vec<OsString> {
        let spec = settings.frame_spec;
        let fps = settings.fps.to_string();
        let mut args: Vec<OsString> = Vec::new();
        fn push(args: &mut Vec<OsString>, values: &[&str]) {
            args.extend(values.iter().map(|v| OsString::from(*v)));
        }

        push(&mut args, &["-hide_banner", "-loglevel", "error", "-y"]);
        push(&mut args, &[
            "-f", "rawvideo",
            "-pixel_format", "rgb24",
            "-video_size", &spec.to_string(),
            "-framerate", &fps,
            "-i", "pipe:0",
        ]);
        push(&mut args, &["-an", "-c:v", settings.codec.ffmpeg_encoder()]);

        match settings.codec {
            CodecKind::H264 => {
                push(&mut args, &["-preset", "medium", "-crf", &settings.crf().to_string()]);
            }
            CodecKind::Hevc => {
                push(&mut args, &["-preset", "medium", "-crf", &settings.crf().to_string()]);
                push(&mut args, &["-x265-params", "log-level=error"]);
            }
            CodecKind::ProRes422 | CodecKind::ProRes4444 => {
                let profile = settings.prores_profile().unwrap_or(2).to_string();
                push(&mut args, &["-profile:v", &profile, "-vendor", "apl0"]);
            }
            CodecKind::MotionJpeg => {
                push(&mut args, &["-q:v", &settings.qscale().to_string()]);
            }
        }

        push(&mut args, &["-pix_fmt", settings.codec.pixel_format()]);
        if let Some(tag) = settings.container.codec_tag(settings.codec) {
            push(&mut args, &["-tag:v", tag]);
        }
        push(&mut args, &["-threads", &settings.tuning.threads.max(1).to_string()]);
        push(&mut args, &["-f", settings.container.muxer()]);

        args.push(settings.destination.clone().into_os_string());
        args
    }
}

impl Default for ProcessBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl SessionFactory for ProcessBackend {
    fn name(&self) -> &str {
        "ffmpeg process"
    }

    fn open(&self, settings: &SessionSettings) -> Result<Box<dyn EncoderSession>> {
        let encoder = settings.codec.ffmpeg_encoder();
        match self.has_encoder(encoder) {
            Ok(true) => {}
            Ok(false) => {
                return Err(ResourceError::EncoderUnavailable {
                    encoder: encoder.to_string(),
                    reason: format!("{} was built without it", self.ffmpeg_path.display()),
                }
                .into())
            }
            Err(e) => {
                return Err(ResourceError::EncoderUnavailable {
                    encoder: self.ffmpeg_path.display().to_string(),
                    reason: e.to_string(),
                }
                .into())
            }
        }

        let args = Self::arguments(settings);
        debug!("Spawning {} {:?}", self.ffmpeg_path.display(), args);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ResourceError::EncoderUnavailable {
                encoder: self.ffmpeg_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let stdin = child.stdin.take();
        let stderr = child.stderr.take().map(|mut stderr| {
            // Drained on its own thread so a chatty ffmpeg never blocks on a full pipe
            std::thread::spawn(move || {
                let mut output = String::new();
                let _ = stderr.read_to_string(&mut output);
                output
            })
        });

        info!("Started ffmpeg ({} via {})", settings.codec, settings.codec.ffmpeg_encoder());

        Ok(Box::new(ProcessSession {
            child,
            stdin,
            stderr,
            spec: settings.frame_spec,
            next: None,
            fps: settings.fps,
            closed: false,
        }))
    }
}

/// Scan `ffmpeg -encoders` output, where each entry reads
/// ` V....D libx264   description`
fn lists_encoder(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|entry| entry == name)
}

struct ProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    spec: FrameSpec,
    /// Time the next append must carry; `None` until `begin`
    next: Option<FrameTime>,
    fps: u32,
    closed: bool,
}

impl ProcessSession {
    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .map(|output| output.trim().to_string())
            .unwrap_or_default()
    }

    fn failure_reason(&mut self, context: String) -> String {
        // ffmpeg has to exit before its stderr pipe reaches EOF
        self.stdin.take();
        let _ = self.child.wait();
        let stderr = self.collect_stderr();
        if stderr.is_empty() {
            context
        } else {
            format!("{}; ffmpeg: {}", context, stderr)
        }
    }
}

impl EncoderSession for ProcessSession {
    fn begin(&mut self) -> Result<()> {
        self.next = Some(FrameTime::zero(self.fps));
        Ok(())
    }

    fn append(&mut self, frame: &PixelBuffer, at: FrameTime) -> Result<()> {
        let expected = self.next.unwrap_or_else(|| FrameTime::zero(self.fps));
        if at != expected {
            return Err(EncodeError::OutOfOrder {
                expected: expected.to_string(),
                got: at.to_string(),
            }
            .into());
        }

        if !frame.matches(&self.spec) {
            return Err(EncodeError::GeometryMismatch {
                width: self.spec.width(),
                height: self.spec.height(),
                got_width: frame.width(),
                got_height: frame.height(),
            }
            .into());
        }

        let written = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(frame.as_bytes()).map_err(|e| e.to_string()),
            None => Err("ffmpeg input is already closed".to_string()),
        };

        if let Err(e) = written {
            let reason = self.failure_reason(e);
            return Err(EncodeError::AppendFailed {
                frame: at.index(),
                reason,
            }
            .into());
        }

        self.next = Some(at.next());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().map_err(|e| EncodeError::FinalizeFailed {
                reason: e.to_string(),
            })?;
        }

        let status = self.child.wait().map_err(|e| EncodeError::FinalizeFailed {
            reason: e.to_string(),
        })?;
        let stderr = self.collect_stderr();
        self.closed = true;

        if !status.success() {
            return Err(EncodeError::FinalizeFailed {
                reason: format!("ffmpeg exited with {}: {}", status, stderr),
            }
            .into());
        }

        if !stderr.is_empty() {
            warn!("ffmpeg reported: {}", stderr);
        }
        Ok(())
    }

    fn abort(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stdin.take();

        if let Err(e) = self.child.kill() {
            debug!("ffmpeg already exited: {}", e);
        }
        let _ = self.child.wait();
        let _ = self.collect_stderr();
        warn!("Aborted ffmpeg session; the destination is incomplete");
    }
}
