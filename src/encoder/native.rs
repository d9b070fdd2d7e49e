//! In-process encoding through libav*, enabled with the `ffmpeg` feature.

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::{codec, encoder, format, Dictionary, Packet, Rational};
use tracing::{debug, info, warn};

use crate::error::{EncodeError, ResourceError, Result};
use crate::encoder::session::{EncoderSession, SessionFactory, SessionSettings};
use crate::video::timing::FrameTime;
use crate::video::types::{CodecKind, FrameSpec, PixelBuffer};

/// Encodes with the linked FFmpeg libraries
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SessionFactory for NativeBackend {
    fn name(&self) -> &str {
        "libav"
    }

    fn open(&self, settings: &SessionSettings) -> Result<Box<dyn EncoderSession>> {
        Ok(Box::new(NativeSession::open(settings)?))
    }
}

fn pixel_format(codec: CodecKind) -> Pixel {
    match codec {
        CodecKind::H264 | CodecKind::Hevc => Pixel::YUV420P,
        CodecKind::ProRes422 => Pixel::YUV422P10LE,
        CodecKind::ProRes4444 => Pixel::YUVA444P10LE,
        CodecKind::MotionJpeg => Pixel::YUVJ420P,
    }
}

fn session_failed(context: &str, e: ffmpeg::Error) -> ResourceError {
    ResourceError::SessionFailed {
        reason: format!("{}: {}", context, e),
    }
}

struct NativeSession {
    octx: format::context::Output,
    encoder: encoder::Video,
    scaler: scaling::Context,
    rgb: VideoFrame,
    converted: VideoFrame,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    spec: FrameSpec,
    fps: u32,
    next: Option<FrameTime>,
    closed: bool,
}

impl NativeSession {
    fn open(settings: &SessionSettings) -> Result<Self> {
        ffmpeg::init().map_err(|e| session_failed("initializing FFmpeg", e))?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);

        let spec = settings.frame_spec;
        let target = pixel_format(settings.codec);
        let fps = i32::try_from(settings.fps).map_err(|_| ResourceError::SessionFailed {
            reason: format!("frame rate {} is out of range", settings.fps),
        })?;
        let time_base = Rational::new(1, fps);

        let codec = encoder::find_by_name(settings.codec.ffmpeg_encoder()).ok_or_else(|| {
            ResourceError::EncoderUnavailable {
                encoder: settings.codec.ffmpeg_encoder().to_string(),
                reason: "not compiled into the linked FFmpeg".to_string(),
            }
        })?;

        let mut octx = format::output_as(&settings.destination, settings.container.muxer())
            .map_err(|e| ResourceError::DestinationUnwritable {
                path: settings.destination.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;
        let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);

        let mut context = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| session_failed("creating encoder context", e))?;
        context.set_width(spec.width());
        context.set_height(spec.height());
        context.set_format(target);
        context.set_time_base(time_base);
        context.set_frame_rate(Some(Rational::new(fps, 1)));
        if global_header {
            context.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        options.set("threads", &settings.tuning.threads.max(1).to_string());
        match settings.codec {
            CodecKind::H264 | CodecKind::Hevc => {
                options.set("preset", "medium");
                options.set("crf", &settings.crf().to_string());
            }
            CodecKind::ProRes422 | CodecKind::ProRes4444 => {
                options.set("profile", &settings.prores_profile().unwrap_or(2).to_string());
                options.set("vendor", "apl0");
            }
            CodecKind::MotionJpeg => {
                let qscale = settings.qscale().to_string();
                options.set("qmin", &qscale);
                options.set("qmax", &qscale);
            }
        }

        let encoder = context
            .open_with(options)
            .map_err(|e| ResourceError::EncoderUnavailable {
                encoder: settings.codec.ffmpeg_encoder().to_string(),
                reason: e.to_string(),
            })?;

        let stream_index = {
            let mut stream = octx
                .add_stream(codec)
                .map_err(|e| session_failed("adding video stream", e))?;
            stream.set_time_base(time_base);
            stream.set_parameters(&encoder);
            stream.index()
        };

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            spec.width(),
            spec.height(),
            target,
            spec.width(),
            spec.height(),
            scaling::Flags::BICUBIC,
        )
        .map_err(|e| session_failed("creating pixel converter", e))?;

        info!("Opened {} encoder for {}", settings.codec.ffmpeg_encoder(), settings.destination.display());

        Ok(Self {
            octx,
            encoder,
            scaler,
            rgb: VideoFrame::new(Pixel::RGB24, spec.width(), spec.height()),
            converted: VideoFrame::new(target, spec.width(), spec.height()),
            stream_index,
            encoder_time_base: time_base,
            stream_time_base: time_base,
            spec,
            fps: settings.fps,
            next: None,
            closed: false,
        })
    }

    /// Move every packet the encoder has ready into the container
    fn drain_packets(&mut self) -> std::result::Result<(), ffmpeg::Error> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet.write_interleaved(&mut self.octx)?;
        }
        Ok(())
    }

    fn fill_rgb(&mut self, frame: &PixelBuffer) {
        let row_len = self.spec.width() as usize * 3;
        let stride = self.rgb.stride(0);
        let src = frame.as_bytes();
        let dst = self.rgb.data_mut(0);

        for (y, row) in src.chunks_exact(row_len).enumerate() {
            let start = y * stride;
            dst[start..start + row_len].copy_from_slice(row);
        }
    }
}

impl EncoderSession for NativeSession {
    fn begin(&mut self) -> Result<()> {
        self.octx
            .write_header()
            .map_err(|e| session_failed("writing container header", e))?;

        // The muxer may pick its own timebase when the header is written
        self.stream_time_base = self
            .octx
            .stream(self.stream_index)
            .map(|stream| stream.time_base())
            .unwrap_or(self.encoder_time_base);
        debug!(
            "Stream timebase {}/{}",
            self.stream_time_base.numerator(),
            self.stream_time_base.denominator()
        );

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

        let append_failed = |e: ffmpeg::Error| EncodeError::AppendFailed {
            frame: at.index(),
            reason: e.to_string(),
        };

        self.fill_rgb(frame);
        self.scaler
            .run(&self.rgb, &mut self.converted)
            .map_err(append_failed)?;

        // Encoder timebase is 1/fps, so the frame index is the pts
        self.converted.set_pts(Some(at.index() as i64));
        self.encoder.send_frame(&self.converted).map_err(append_failed)?;
        self.drain_packets().map_err(append_failed)?;

        self.next = Some(at.next());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let finalize_failed = |e: ffmpeg::Error| EncodeError::FinalizeFailed {
            reason: e.to_string(),
        };

        self.encoder.send_eof().map_err(finalize_failed)?;
        self.drain_packets().map_err(finalize_failed)?;
        self.octx.write_trailer().map_err(finalize_failed)?;
        self.closed = true;
        Ok(())
    }

    fn abort(&mut self) {
        if !self.closed {
            self.closed = true;
            warn!("Aborted libav session; the destination is incomplete");
        }
    }
}
