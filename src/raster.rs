//! Raster images recovered from PDF pages, normalized to RGBA.
//!
//! The PDF backend hands over decoded samples as an [`ImageObject`]; inline
//! images arrive as an [`InlineImageArg`] because producers disagree on how
//! they shape the operator arguments. Both collapse into a [`RasterImage`]
//! (or nothing), which is PNG-encoded for the OCR engine.

use std::io::Cursor;

use crate::error::ExtractError;

/// Decoded image samples as resolved from a PDF object.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageObject {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Set when the object declares 8-bit `DeviceGray` samples.
    pub gray: bool,
}

/// Argument of an inline-image paint, either the image itself or the image
/// nested as the first element of the argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineImageArg {
    Direct(ImageObject),
    Wrapped(Box<InlineImageArg>),
}

impl InlineImageArg {
    /// Collapses either shape into the underlying image object.
    pub fn into_image(self) -> ImageObject {
        match self {
            InlineImageArg::Direct(image) => image,
            InlineImageArg::Wrapped(inner) => inner.into_image(),
        }
    }
}

/// An image with `pixels.len() == width * height * 4`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Normalizes raw samples to RGBA.
    ///
    /// `w*h*3` bytes are RGB and gain an opaque alpha, `w*h*4` bytes are
    /// copied as-is, and `w*h` bytes are accepted only for declared 8-bit
    /// gray. Zero dimensions and any other length are rejected.
    pub fn from_samples(width: u32, height: u32, data: &[u8], gray: bool) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let pixel_count = (width as usize).checked_mul(height as usize)?;
        let rgba_len = pixel_count.checked_mul(4)?;

        let pixels = if data.len() == pixel_count * 3 {
            let mut out = Vec::with_capacity(rgba_len);
            for rgb in data.chunks_exact(3) {
                out.extend_from_slice(rgb);
                out.push(255);
            }
            out
        } else if data.len() == rgba_len {
            data.to_vec()
        } else if gray && data.len() == pixel_count {
            let mut out = Vec::with_capacity(rgba_len);
            for &luma in data {
                out.extend_from_slice(&[luma, luma, luma, 255]);
            }
            out
        } else {
            return None;
        };

        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_object(object: &ImageObject) -> Option<Self> {
        Self::from_samples(object.width, object.height, &object.data, object.gray)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Encodes the image as PNG, the container the OCR engine reads.
    pub fn to_png(&self) -> Result<Vec<u8>, ExtractError> {
        let buffer = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| ExtractError::Image("pixel buffer does not match dimensions".into()))?;
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(buffer)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| ExtractError::Image(format!("PNG encoding failed: {e}")))?;
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_gains_opaque_alpha() {
        let rgb = [1, 2, 3, 4, 5, 6];
        let image = RasterImage::from_samples(2, 1, &rgb, false).unwrap();
        assert_eq!(image.pixels(), &[1, 2, 3, 255, 4, 5, 6, 255]);
        assert_eq!(image.pixels().len(), 2 * 4);
    }

    #[test]
    fn rgba_is_copied_verbatim() {
        let rgba: Vec<u8> = (0..16).collect();
        let image = RasterImage::from_samples(2, 2, &rgba, false).unwrap();
        assert_eq!(image.pixels(), rgba.as_slice());
    }

    #[test]
    fn every_fourth_byte_is_opaque_after_rgb_expansion() {
        let rgb = vec![7u8; 5 * 3 * 3];
        let image = RasterImage::from_samples(5, 3, &rgb, false).unwrap();
        assert_eq!(image.pixels().len(), 5 * 3 * 4);
        assert!(image.pixels().chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn rejects_unrecognized_layouts() {
        assert!(RasterImage::from_samples(2, 2, &[0; 5], false).is_none());
        assert!(RasterImage::from_samples(2, 2, &[0; 4], false).is_none());
        assert!(RasterImage::from_samples(0, 2, &[], false).is_none());
        assert!(RasterImage::from_samples(2, 0, &[], false).is_none());
    }

    #[test]
    fn declared_gray_expands() {
        let image = RasterImage::from_samples(2, 1, &[0, 200], true).unwrap();
        assert_eq!(image.pixels(), &[0, 0, 0, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn wrapped_inline_argument_collapses() {
        let object = ImageObject {
            width: 1,
            height: 1,
            data: vec![9, 9, 9],
            gray: false,
        };
        let wrapped = InlineImageArg::Wrapped(Box::new(InlineImageArg::Direct(object.clone())));
        assert_eq!(wrapped.into_image(), object);
    }

    #[test]
    fn png_round_trips_dimensions() {
        let image = RasterImage::from_samples(3, 2, &[128; 18], false).unwrap();
        let png = image.to_png().unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }
}
