//! Decoded texture data.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};

/// Tightly packed RGBA8 pixels, row-major, top row first.
#[derive(Debug, Clone)]
pub struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureData {
    /// Wraps raw RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidTexture`] if either dimension is zero or the
    /// buffer length is not `width * height * 4`.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> ResourceResult<Self> {
        if width == 0 || height == 0 {
            return Err(ResourceError::InvalidTexture(format!(
                "zero-sized texture {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(ResourceError::InvalidTexture(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decodes an image file into RGBA8.
    ///
    /// Any format the `image` crate was built with is accepted; the alpha
    /// channel is filled with 255 for formats without one.
    pub fn load(path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        info!("Loaded texture {:?} ({}x{})", path, width, height);

        Self::from_rgba8(width, height, rgba.into_raw())
    }

    /// Square black and white checkerboard with `cell`-pixel squares.
    ///
    /// Used when no texture path is configured.
    pub fn checkerboard(size: u32, cell: u32) -> Self {
        let size = size.max(1);
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let value = if ((x / cell) + (y / cell)) % 2 == 0 {
                    255
                } else {
                    0
                };
                pixels.extend_from_slice(&[value, value, value, 255]);
            }
        }
        debug!("Generated {}x{} checkerboard", size, size);
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mip levels a full chain for this texture has.
    pub fn mip_levels(&self) -> u32 {
        self.width.max(self.height).ilog2() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba8_checks_length() {
        assert!(TextureData::from_rgba8(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            TextureData::from_rgba8(2, 2, vec![0; 15]),
            Err(ResourceError::InvalidTexture(_))
        ));
        assert!(matches!(
            TextureData::from_rgba8(0, 2, Vec::new()),
            Err(ResourceError::InvalidTexture(_))
        ));
    }

    #[test]
    fn test_checkerboard_pattern() {
        let tex = TextureData::checkerboard(4, 2);
        assert_eq!(tex.width(), 4);
        assert_eq!(tex.height(), 4);
        assert_eq!(tex.pixels().len(), 64);

        let pixel = |x: usize, y: usize| &tex.pixels()[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(pixel(0, 0), &[255, 255, 255, 255]);
        assert_eq!(pixel(1, 1), &[255, 255, 255, 255]);
        assert_eq!(pixel(2, 0), &[0, 0, 0, 255]);
        assert_eq!(pixel(0, 2), &[0, 0, 0, 255]);
        assert_eq!(pixel(2, 2), &[255, 255, 255, 255]);
    }

    #[test]
    fn test_mip_levels() {
        assert_eq!(TextureData::checkerboard(1, 1).mip_levels(), 1);
        assert_eq!(TextureData::checkerboard(256, 8).mip_levels(), 9);
        let wide = TextureData::from_rgba8(64, 32, vec![0; 64 * 32 * 4]).unwrap();
        assert_eq!(wide.mip_levels(), 7);
    }

    #[test]
    fn test_load_missing_file() {
        let result = TextureData::load("does/not/exist.png");
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
