use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Canvas size shared by every frame of one movie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSpec {
    width: u32,
    height: u32,
}

impl FrameSpec {
    /// Create a frame spec, rejecting zero-sized canvases
    pub fn new(width: u32, height: u32) -> Result<Self, ValidationError> {
        if width == 0 || height == 0 {
            return Err(ValidationError::InvalidDimensions {
                width: width.into(),
                height: height.into(),
            });
        }
        Ok(Self { width, height })
    }

    /// Create a frame spec from signed values as entered by a user
    pub fn from_signed(width: i64, height: i64) -> Result<Self, ValidationError> {
        match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) => Self::new(w, h),
            _ => Err(ValidationError::InvalidDimensions { width, height }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size in bytes of one RGB24 frame at this geometry
    pub fn rgb_frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl fmt::Display for FrameSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Supported video compressors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    H264,
    Hevc,
    #[serde(rename = "prores422")]
    ProRes422,
    #[serde(rename = "prores4444")]
    ProRes4444,
    #[serde(rename = "mjpeg")]
    MotionJpeg,
}

impl CodecKind {
    /// All codecs, in the order they are offered to the user
    pub const ALL: [CodecKind; 5] = [
        CodecKind::H264,
        CodecKind::Hevc,
        CodecKind::ProRes422,
        CodecKind::ProRes4444,
        CodecKind::MotionJpeg,
    ];

    /// Stable name used in configuration files and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::ProRes422 => "prores422",
            Self::ProRes4444 => "prores4444",
            Self::MotionJpeg => "mjpeg",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::H264 => "H.264",
            Self::Hevc => "HEVC",
            Self::ProRes422 => "Apple ProRes 422",
            Self::ProRes4444 => "Apple ProRes 4444",
            Self::MotionJpeg => "Motion JPEG",
        }
    }

    /// Name of the ffmpeg encoder implementing this codec
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::Hevc => "libx265",
            Self::ProRes422 | Self::ProRes4444 => "prores_ks",
            Self::MotionJpeg => "mjpeg",
        }
    }

    /// Pixel format the encoder consumes, as named by ffmpeg
    pub fn pixel_format(&self) -> &'static str {
        match self {
            Self::H264 | Self::Hevc => "yuv420p",
            Self::ProRes422 => "yuv422p10le",
            Self::ProRes4444 => "yuva444p10le",
            Self::MotionJpeg => "yuvj420p",
        }
    }

    /// Horizontal and vertical multiples the frame size must respect,
    /// dictated by chroma subsampling of [`Self::pixel_format`]
    pub fn dimension_alignment(&self) -> (u32, u32) {
        match self {
            Self::H264 | Self::Hevc | Self::MotionJpeg => (2, 2),
            Self::ProRes422 => (2, 1),
            Self::ProRes4444 => (1, 1),
        }
    }

    pub fn accepts(&self, spec: &FrameSpec) -> bool {
        let (x, y) = self.dimension_alignment();
        spec.width() % x == 0 && spec.height() % y == 0
    }

    /// Parse a codec from its configuration name or a common alias
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "h264" | "h.264" | "avc" | "x264" => Some(Self::H264),
            "hevc" | "h265" | "h.265" | "x265" => Some(Self::Hevc),
            "prores" | "prores422" | "prores_422" => Some(Self::ProRes422),
            "prores4444" | "prores_4444" => Some(Self::ProRes4444),
            "mjpeg" | "jpeg" | "motion-jpeg" => Some(Self::MotionJpeg),
            _ => None,
        }
    }
}

impl Default for CodecKind {
    fn default() -> Self {
        Self::ALL[0]
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(|c| c.name()).collect();
            format!("unknown codec '{}' (expected one of: {})", s, known.join(", "))
        })
    }
}

/// Supported output file types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Mov,
    M4v,
    Mp4,
}

impl ContainerKind {
    /// All containers, in the order they are offered to the user
    pub const ALL: [ContainerKind; 3] = [ContainerKind::Mov, ContainerKind::M4v, ContainerKind::Mp4];

    pub fn name(&self) -> &'static str {
        self.extension()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Mov => "QuickTime Movie (.mov)",
            Self::M4v => "MPEG-4 Video (.m4v)",
            Self::Mp4 => "MPEG-4 (.mp4)",
        }
    }

    /// Canonical filename extension, without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mov => "mov",
            Self::M4v => "m4v",
            Self::Mp4 => "mp4",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Mov => "video/quicktime",
            Self::M4v => "video/x-m4v",
            Self::Mp4 => "video/mp4",
        }
    }

    /// ffmpeg muxer writing this container
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Mov => "mov",
            Self::M4v => "ipod",
            Self::Mp4 => "mp4",
        }
    }

    /// Whether `codec` can be stored in this container
    pub fn supports(&self, codec: CodecKind) -> bool {
        match codec {
            CodecKind::H264 | CodecKind::Hevc => true,
            CodecKind::ProRes422 | CodecKind::ProRes4444 | CodecKind::MotionJpeg => {
                matches!(self, Self::Mov)
            }
        }
    }

    /// Sample entry tag to force for `codec`, if the muxer default is not
    /// what QuickTime-family players expect
    pub fn codec_tag(&self, codec: CodecKind) -> Option<&'static str> {
        match codec {
            CodecKind::Hevc => Some("hvc1"),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "mov" | "qt" => Some(Self::Mov),
            "m4v" => Some(Self::M4v),
            "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Append the canonical extension when `path` has none
    pub fn ensure_extension<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.extension().is_some() {
            path.to_path_buf()
        } else {
            path.with_extension(self.extension())
        }
    }
}

impl Default for ContainerKind {
    fn default() -> Self {
        Self::ALL[0]
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ContainerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| {
            format!("unknown container '{}' (expected one of: mov, m4v, mp4)", s)
        })
    }
}

/// How a source image is fitted onto a canvas of a different size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitPolicy {
    /// Scale both axes independently to fill the canvas
    Stretch,
    /// Preserve the aspect ratio, centre the image and pad the remainder
    #[default]
    Letterbox,
}

impl FromStr for FitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stretch" => Ok(Self::Stretch),
            "letterbox" | "fit" => Ok(Self::Letterbox),
            _ => Err(format!("unknown fit policy '{}' (expected stretch or letterbox)", s)),
        }
    }
}

/// Resampling filter used when an image has to be scaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for image::imageops::FilterType {
    fn from(filter: ResizeFilter) -> Self {
        use image::imageops::FilterType;

        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// A normalized RGB24 frame, ready to be handed to an encoder session
///
/// Every buffer produced for one run has exactly the run's [`FrameSpec`]
/// geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    buffer: RgbImage,
}

impl PixelBuffer {
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a buffer of the given size filled with one color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn matches(&self, spec: &FrameSpec) -> bool {
        self.width() == spec.width() && self.height() == spec.height()
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Tightly packed RGB24 rows, top to bottom
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    pub fn into_image(self) -> RgbImage {
        self.buffer
    }
}
