use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{DecodeError, GeneratorError, Result, ValidationError};
use crate::video::types::FrameSpec;

/// Location of one source image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    path: PathBuf,
}

impl ImageReference {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()?.to_str()
    }

    /// Whether the extension names a still-image format
    ///
    /// This is only a pre-filter; the frame source re-validates content.
    pub fn looks_like_image(&self) -> bool {
        is_image_extension(&self.path)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl From<PathBuf> for ImageReference {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for ImageReference {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<&str> for ImageReference {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

fn is_image_extension(path: &Path) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tif" | "tiff" | "webp" | "tga" | "ico"
                | "pbm" | "pgm" | "ppm" | "pnm" | "pam"
        ),
        None => false,
    }
}

fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// An ordered sequence of source images; order is playback order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSequence {
    images: Vec<ImageReference>,
}

impl ImageSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the caller's order exactly, repeats included
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        paths.into_iter().map(|p| ImageReference::new(p)).collect()
    }

    /// Collect the images directly inside `directory`, sorted by file name
    ///
    /// Subdirectories are not descended into and hidden files are skipped.
    pub fn from_directory<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref();
        let mut images = Vec::new();

        for entry in std::fs::read_dir(directory)? {
            let path = entry?.path();

            if path.is_file() && !is_hidden_file(&path) && is_image_extension(&path) {
                images.push(ImageReference::new(path));
            }
        }

        if images.is_empty() {
            return Err(ValidationError::EmptySequence.into());
        }

        images.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));

        info!("Found {} images in {}", images.len(), directory.display());
        for image in &images {
            debug!("   {}", image);
        }

        Ok(Self { images })
    }

    pub fn push(&mut self, image: ImageReference) {
        self.images.push(image);
    }

    pub fn images(&self) -> &[ImageReference] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn first(&self) -> Option<&ImageReference> {
        self.images.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageReference> {
        self.images.iter()
    }

    /// Native size of the first image, read from its header only
    pub fn native_size(&self) -> Result<(u32, u32)> {
        let first = self.first().ok_or(ValidationError::EmptySequence)?;
        image::image_dimensions(first.path()).map_err(|e| {
            GeneratorError::from(DecodeError::Malformed {
                path: first.to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Build the canvas size, taking any dimension left unset from the
    /// first image
    pub fn resolve_frame_spec(&self, width: Option<u32>, height: Option<u32>) -> Result<FrameSpec> {
        let (width, height) = match (width.filter(|w| *w > 0), height.filter(|h| *h > 0)) {
            (Some(w), Some(h)) => (w, h),
            (w, h) => {
                let (native_w, native_h) = self.native_size()?;
                (w.unwrap_or(native_w), h.unwrap_or(native_h))
            }
        };

        Ok(FrameSpec::new(width, height)?)
    }
}

impl FromIterator<ImageReference> for ImageSequence {
    fn from_iter<I: IntoIterator<Item = ImageReference>>(iter: I) -> Self {
        Self {
            images: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ImageSequence {
    type Item = ImageReference;
    type IntoIter = std::vec::IntoIter<ImageReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.into_iter()
    }
}

impl From<ImageSequence> for Vec<ImageReference> {
    fn from(sequence: ImageSequence) -> Self {
        sequence.images
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::tempdir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::new(width, height).save(&path).unwrap();
        path
    }

    #[test]
    fn test_directory_is_sorted_by_name() {
        let dir = tempdir().unwrap();
        write_png(dir.path(), "c.png", 4, 4);
        write_png(dir.path(), "a.png", 4, 4);
        write_png(dir.path(), "b.png", 4, 4);
        std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
        std::fs::write(dir.path().join(".hidden.png"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let sequence = ImageSequence::from_directory(dir.path()).unwrap();
        let names: Vec<&str> = sequence.iter().filter_map(|i| i.file_name()).collect();
        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_directory_without_images() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("readme.md"), b"# nothing").unwrap();

        let result = ImageSequence::from_directory(dir.path());
        assert!(matches!(
            result,
            Err(GeneratorError::Validation(ValidationError::EmptySequence))
        ));
    }

    #[test]
    fn test_explicit_order_and_repeats_are_kept() {
        let sequence = ImageSequence::from_paths(["z.png", "a.png", "z.png"]);
        let names: Vec<&str> = sequence.iter().filter_map(|i| i.file_name()).collect();
        assert_eq!(names, vec!["z.png", "a.png", "z.png"]);
    }

    #[test]
    fn test_frame_spec_defaults_from_first_image() {
        let dir = tempdir().unwrap();
        write_png(dir.path(), "01.png", 320, 240);
        write_png(dir.path(), "02.png", 16, 16);

        let sequence = ImageSequence::from_directory(dir.path()).unwrap();
        assert_eq!(sequence.native_size().unwrap(), (320, 240));

        let spec = sequence.resolve_frame_spec(None, None).unwrap();
        assert_eq!((spec.width(), spec.height()), (320, 240));

        let spec = sequence.resolve_frame_spec(Some(640), None).unwrap();
        assert_eq!((spec.width(), spec.height()), (640, 240));

        let spec = sequence.resolve_frame_spec(Some(64), Some(48)).unwrap();
        assert_eq!((spec.width(), spec.height()), (64, 48));
    }

    #[test]
    fn test_extension_prefilter() {
        assert!(ImageReference::from("shot.JPG").looks_like_image());
        assert!(ImageReference::from("scan.tiff").looks_like_image());
        assert!(!ImageReference::from("clip.mp4").looks_like_image());
        assert!(!ImageReference::from("README").looks_like_image());
    }
}
