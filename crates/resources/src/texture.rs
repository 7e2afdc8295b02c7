//! Image decoding into RGBA8 pixel data.

use std::path::Path;

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Decoded image, always four 8-bit channels per pixel.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Tightly packed RGBA8 rows, top row first.
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Decodes an image file, converting any source format to RGBA8.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::FileNotFound`] if `path` does not exist
    /// - [`ResourceError::TextureDecode`] if the decoder rejects the file
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let image = image::open(path)
            .map_err(|source| ResourceError::TextureDecode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();

        let (width, height) = image.dimensions();
        debug!("Decoded '{}': {}x{}", path.display(), width, height);

        Ok(Self {
            width,
            height,
            pixels: image.into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_image() {
        let result = ImageData::load(Path::new("textures/missing.png"));
        match result {
            Err(ResourceError::FileNotFound(path)) => {
                assert!(path.ends_with("missing.png"));
            }
            other => panic!("Expected FileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let err = ImageData::load(&path).unwrap_err();
        assert!(matches!(err, ResourceError::TextureDecode { .. }));
        assert!(err.to_string().contains("broken.png"));
    }

    #[test]
    fn test_load_png_as_rgba8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        let source = image::RgbImage::from_pixel(2, 3, image::Rgb([10, 20, 30]));
        source.save(&path).unwrap();

        let data = ImageData::load(&path).unwrap();
        assert_eq!((data.width, data.height), (2, 3));
        assert_eq!(data.pixels.len(), 2 * 3 * 4);
        assert_eq!(&data.pixels[..4], &[10, 20, 30, 255]);
    }
}
