use image::{imageops, io::Reader as ImageReader, DynamicImage, ImageBuffer, ImageError, Rgb, RgbImage};
use tracing::debug;

use crate::error::DecodeError;
use crate::video::sequence::ImageReference;
use crate::video::types::{FitPolicy, FrameSpec, PixelBuffer, ResizeFilter};

/// A source image decoded to pixels but not yet fitted to the canvas
#[derive(Debug, Clone)]
pub struct DecodedImage {
    reference: ImageReference,
    image: DynamicImage,
}

impl DecodedImage {
    pub fn reference(&self) -> &ImageReference {
        &self.reference
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }
}

/// How images are fitted onto the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions {
    pub policy: FitPolicy,
    pub filter: ResizeFilter,
    /// Fill for letterbox bars and transparent pixels
    pub background: [u8; 3],
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            policy: FitPolicy::default(),
            filter: ResizeFilter::default(),
            background: [0, 0, 0],
        }
    }
}

/// Turns image references into pixel buffers of one fixed geometry
///
/// The fit options are fixed at construction, so every frame of a run is
/// fitted the same way.
#[derive(Debug, Clone)]
pub struct FrameSource {
    spec: FrameSpec,
    options: FitOptions,
}

impl FrameSource {
    pub fn new(spec: FrameSpec, options: FitOptions) -> Self {
        Self { spec, options }
    }

    pub fn spec(&self) -> FrameSpec {
        self.spec
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Decode one image, sniffing its format from content
    ///
    /// The file extension is only used as a fallback when the content does
    /// not identify the format.
    pub fn open(reference: &ImageReference) -> Result<DecodedImage, DecodeError> {
        let path = reference.to_string();

        let reader = ImageReader::open(reference.path())
            .map_err(|e| DecodeError::Unreadable {
                path: path.clone(),
                reason: e.to_string(),
            })?
            .with_guessed_format()
            .map_err(|e| DecodeError::Unreadable {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        if reader.format().is_none() {
            return Err(DecodeError::UnknownFormat { path });
        }

        let image = reader.decode().map_err(|e| match e {
            ImageError::Unsupported(_) => DecodeError::UnknownFormat { path: path.clone() },
            ImageError::IoError(io) => DecodeError::Unreadable {
                path: path.clone(),
                reason: io.to_string(),
            },
            other => DecodeError::Malformed {
                path: path.clone(),
                reason: other.to_string(),
            },
        })?;

        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::Malformed {
                path,
                reason: "image has no pixels".to_string(),
            });
        }

        debug!("Decoded {} ({}x{}, {:?})", reference, image.width(), image.height(), image.color());

        Ok(DecodedImage {
            reference: reference.clone(),
            image,
        })
    }

    /// Fit a decoded image onto a canvas of exactly `spec`'s size
    pub fn normalize(image: &DecodedImage, spec: FrameSpec, options: &FitOptions) -> PixelBuffer {
        let (width, height) = (spec.width(), spec.height());
        let flat = flatten(&image.image, options.background);

        if flat.width() == width && flat.height() == height {
            return PixelBuffer::new(flat);
        }

        let filter: imageops::FilterType = options.filter.into();
        let fitted = match options.policy {
            FitPolicy::Stretch => imageops::resize(&flat, width, height, filter),
            FitPolicy::Letterbox => {
                let (fit_w, fit_h) = letterbox_size(flat.width(), flat.height(), width, height);
                let scaled = imageops::resize(&flat, fit_w, fit_h, filter);

                let mut canvas: RgbImage = ImageBuffer::from_pixel(width, height, Rgb(options.background));
                let x = (width - fit_w) / 2;
                let y = (height - fit_h) / 2;
                imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);
                canvas
            }
        };

        PixelBuffer::new(fitted)
    }

    /// Open and normalize in one step
    pub fn frame(&self, reference: &ImageReference) -> Result<PixelBuffer, DecodeError> {
        let decoded = Self::open(reference)?;
        Ok(Self::normalize(&decoded, self.spec, &self.options))
    }
}

/// Largest size with the source aspect ratio that fits inside the canvas
fn letterbox_size(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32) {
    let (src_w, src_h, dst_w64, dst_h64) = (src_w as u64, src_h as u64, dst_w as u64, dst_h as u64);

    if src_w * dst_h64 >= src_h * dst_w64 {
        // Width-bound: bars above and below
        let h = ((src_h * dst_w64 + src_w / 2) / src_w).clamp(1, dst_h64);
        (dst_w, h as u32)
    } else {
        let w = ((src_w * dst_h64 + src_h / 2) / src_h).clamp(1, dst_w64);
        (w as u32, dst_h)
    }
}

/// Drop alpha by compositing over `background`
fn flatten(image: &DynamicImage, background: [u8; 3]) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    ImageBuffer::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |fg: u8, bg: u8| -> u8 {
            ((fg as u32 * a as u32 + bg as u32 * (255 - a as u32) + 127) / 255) as u8
        };
        Rgb([blend(r, background[0]), blend(g, background[1]), blend(b, background[2])])
    })
}
