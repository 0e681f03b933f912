//! Sample decoding for PDF image XObjects and inline images.
//!
//! Filters are applied in order. `FlateDecode` (with PNG predictors) is
//! inflated here with an output bound derived from the declared
//! dimensions, and a trailing `DCTDecode` is decoded with `image` under the
//! same bound. Any other filter rejects the image.

use std::io::{Cursor, Read};

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Object};

use crate::raster::ImageObject;

/// Largest sample buffer any single image may decode to.
const MAX_SAMPLE_BYTES: u64 = 256 * 1024 * 1024;

/// Room for predictor tag bytes and producer padding beyond the samples.
const SAMPLE_SLACK: u64 = 4096;

/// Upper bound for form XObject content streams.
pub const MAX_FORM_CONTENT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Flate,
    Dct,
    Other,
}

impl Filter {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"FlateDecode" | b"Fl" => Filter::Flate,
            b"DCTDecode" | b"DCT" => Filter::Dct,
            _ => Filter::Other,
        }
    }
}

/// `DecodeParms` entries that matter for Flate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DecodeParms {
    predictor: i64,
    colors: usize,
    bits: usize,
    columns: usize,
}

impl Default for DecodeParms {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits: 8,
            columns: 1,
        }
    }
}

impl DecodeParms {
    fn from_dict(dict: &Dictionary) -> Self {
        let int = |key: &[u8], default: i64| {
            dict.get(key)
                .ok()
                .and_then(|o| o.as_i64().ok())
                .unwrap_or(default)
        };
        let size = |key: &[u8], default: usize| {
            usize::try_from(int(key, default as i64))
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        Self {
            predictor: int(b"Predictor", 1),
            colors: size(b"Colors", 1),
            bits: size(b"BitsPerComponent", 8),
            columns: size(b"Columns", 1),
        }
    }
}

/// Image dictionary fields, read under full or inline-abbreviated keys.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    width: u32,
    height: u32,
    bits: i64,
    gray: bool,
    filters: Vec<Filter>,
    /// Parallel to `filters`.
    parms: Vec<DecodeParms>,
}

impl ImageSpec {
    /// Reads an image dictionary. `deref` resolves indirect references and
    /// is `Some` for inline images, which cannot hold any.
    pub fn from_dict<'a>(
        dict: &'a Dictionary,
        deref: impl Fn(&'a Object) -> Option<&'a Object>,
    ) -> Option<Self> {
        let field = |long: &[u8], short: &[u8]| {
            dict.get(long)
                .or_else(|_| dict.get(short))
                .ok()
                .and_then(&deref)
        };
        let dimension = |obj: Option<&Object>| {
            obj.and_then(|o| o.as_i64().ok())
                .filter(|v| *v > 0)
                .and_then(|v| u32::try_from(v).ok())
        };

        let width = dimension(field(b"Width", b"W"))?;
        let height = dimension(field(b"Height", b"H"))?;
        let bits = field(b"BitsPerComponent", b"BPC")
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8);
        let gray = field(b"ColorSpace", b"CS")
            .and_then(name_of)
            .is_some_and(|cs| matches!(cs, b"DeviceGray" | b"G" | b"CalGray"));

        let filters: Vec<Filter> = match field(b"Filter", b"F") {
            Some(Object::Name(name)) => vec![Filter::from_name(name)],
            Some(Object::Array(items)) => items
                .iter()
                .map(|item| deref(item).and_then(name_of).map_or(Filter::Other, Filter::from_name))
                .collect(),
            _ => Vec::new(),
        };
        let parms_for = |obj: Option<&'a Object>| {
            obj.and_then(&deref)
                .and_then(|o| o.as_dict().ok())
                .map(DecodeParms::from_dict)
                .unwrap_or_default()
        };
        let parms = match field(b"DecodeParms", b"DP") {
            Some(Object::Array(items)) => (0..filters.len())
                .map(|i| parms_for(items.get(i)))
                .collect(),
            single => vec![parms_for(single); filters.len()],
        };

        Some(Self {
            width,
            height,
            bits,
            gray,
            filters,
            parms,
        })
    }

    /// Bytes the decoded samples may occupy, or `None` when the declared
    /// dimensions are too large to decode at all.
    fn sample_limit(&self) -> Option<usize> {
        let bits = u64::try_from(self.bits.clamp(8, 16)).ok()?;
        let row = u64::from(self.width).checked_mul(4)?.checked_mul(bits)? / 8 + 1;
        let total = row.checked_mul(u64::from(self.height))?;
        if total > MAX_SAMPLE_BYTES {
            return None;
        }
        usize::try_from(total + SAMPLE_SLACK).ok()
    }

    /// Runs the filter chain over the raw stream bytes.
    pub fn decode(&self, raw: &[u8]) -> Option<ImageObject> {
        let limit = self.sample_limit()?;
        let mut data = raw.to_vec();
        let mut jpeg = false;

        for (i, filter) in self.filters.iter().enumerate() {
            match filter {
                Filter::Flate => {
                    let inflated = inflate_bounded(&data, limit)?;
                    data = unpredict(inflated, &self.parms[i])?;
                }
                Filter::Dct if i + 1 == self.filters.len() => jpeg = true,
                _ => return None,
            }
        }

        if jpeg {
            return decode_jpeg(&data, self.width, self.height, limit);
        }
        if data.is_empty() {
            return None;
        }
        Some(ImageObject {
            width: self.width,
            height: self.height,
            data,
            gray: self.gray && self.bits == 8,
        })
    }
}

fn name_of(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

/// Inflates zlib data, failing once the output would exceed `limit`.
pub fn inflate_bounded(data: &[u8], limit: usize) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .ok()?;
    if out.len() > limit {
        return None;
    }
    Some(out)
}

/// Decodes a content stream (form XObject body) under `limit`. `None` for
/// filters other than Flate.
pub fn decode_content(dict: &Dictionary, raw: &[u8], limit: usize) -> Option<Vec<u8>> {
    let filters: Vec<Filter> = match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![Filter::from_name(name)],
        Ok(Object::Array(items)) => items
            .iter()
            .map(|item| name_of(item).map_or(Filter::Other, Filter::from_name))
            .collect(),
        _ => Vec::new(),
    };
    let mut data = raw.to_vec();
    for filter in filters {
        if filter != Filter::Flate {
            return None;
        }
        data = inflate_bounded(&data, limit)?;
    }
    (data.len() <= limit).then_some(data)
}

/// Reverses a Flate predictor. Only PNG predictors (10-15) are supported.
fn unpredict(data: Vec<u8>, parms: &DecodeParms) -> Option<Vec<u8>> {
    match parms.predictor {
        1 => return Some(data),
        p if p >= 10 => {}
        _ => return None,
    }

    let bits_per_pixel = parms.colors.checked_mul(parms.bits)?;
    let pixel_bytes = bits_per_pixel.div_ceil(8).max(1);
    let row_len = parms.columns.checked_mul(bits_per_pixel)?.div_ceil(8);
    let stride = row_len + 1;

    let mut out = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks_exact(stride) {
        let tag = chunk[0];
        let mut row = chunk[1..].to_vec();
        for i in 0..row_len {
            let left = if i >= pixel_bytes { row[i - pixel_bytes] } else { 0 };
            let up = prev[i];
            let up_left = if i >= pixel_bytes { prev[i - pixel_bytes] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                _ => return None,
            };
            row[i] = row[i].wrapping_add(predicted);
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Some(out)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = i16::from(left) + i16::from(up) - i16::from(up_left);
    let pa = (p - i16::from(left)).abs();
    let pb = (p - i16::from(up)).abs();
    let pc = (p - i16::from(up_left)).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

/// JPEG samples as RGB. The JPEG may not be larger than the dictionary
/// declares.
fn decode_jpeg(data: &[u8], width: u32, height: u32, limit: usize) -> Option<ImageObject> {
    let mut reader = image::ImageReader::with_format(Cursor::new(data), image::ImageFormat::Jpeg);
    let mut limits = image::Limits::default();
    limits.max_image_width = Some(width);
    limits.max_image_height = Some(height);
    limits.max_alloc = Some(limit as u64);
    reader.limits(limits);

    let rgb = reader.decode().ok()?.to_rgb8();
    Some(ImageObject {
        width: rgb.width(),
        height: rgb.height(),
        data: rgb.into_raw(),
        gray: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([255, 255, 255]),
        ))
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
        .unwrap();
        out
    }

    fn spec(dict: &Dictionary) -> ImageSpec {
        ImageSpec::from_dict(dict, Some).unwrap()
    }

    #[test]
    fn unfiltered_samples_pass_through() {
        let dict = dictionary! { "Width" => 2, "Height" => 1, "ColorSpace" => "DeviceRGB" };
        let image = spec(&dict).decode(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(image.data, vec![1, 2, 3, 4, 5, 6]);
        assert!(!image.gray);
    }

    #[test]
    fn flate_output_past_the_bound_is_rejected() {
        let dict = dictionary! {
            "Width" => 2,
            "Height" => 2,
            "ColorSpace" => "DeviceRGB",
            "Filter" => "FlateDecode",
        };
        let bomb = deflate(&vec![0u8; 1 << 20]);
        assert!(spec(&dict).decode(&bomb).is_none());

        let fits = deflate(&[7u8; 12]);
        assert_eq!(spec(&dict).decode(&fits).unwrap().data, vec![7u8; 12]);
    }

    #[test]
    fn huge_declared_dimensions_are_rejected_before_decoding() {
        let dict = dictionary! { "Width" => 100_000, "Height" => 100_000 };
        assert!(spec(&dict).decode(&[0; 16]).is_none());
    }

    #[test]
    fn flate_then_dct_chain_decodes_the_jpeg() {
        let dict = dictionary! {
            "Width" => 3,
            "Height" => 2,
            "Filter" => vec![Object::Name(b"FlateDecode".to_vec()), Object::Name(b"DCTDecode".to_vec())],
        };
        let image = spec(&dict).decode(&deflate(&jpeg(3, 2))).unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(image.data.len(), 3 * 2 * 3);
    }

    #[test]
    fn jpeg_larger_than_declared_is_rejected() {
        let dict = dictionary! { "Width" => 3, "Height" => 2, "Filter" => "DCTDecode" };
        assert!(spec(&dict).decode(&jpeg(64, 64)).is_none());
    }

    #[test]
    fn png_up_predictor_is_reversed() {
        // Two RGB rows of one pixel: the second row is stored as a delta.
        let predicted = [2u8, 10, 20, 30, 2, 1, 1, 1];
        let dict = dictionary! {
            "Width" => 1,
            "Height" => 2,
            "ColorSpace" => "DeviceRGB",
            "Filter" => "FlateDecode",
            "DecodeParms" => dictionary! { "Predictor" => 12, "Colors" => 3, "Columns" => 1 },
        };
        let image = spec(&dict).decode(&deflate(&predicted)).unwrap();
        assert_eq!(image.data, vec![10, 20, 30, 11, 21, 31]);
    }

    #[test]
    fn unsupported_filters_reject_the_image() {
        let dict = dictionary! { "W" => 1, "H" => 1, "F" => "LZW" };
        assert!(spec(&dict).decode(&[1, 2, 3]).is_none());
        let dct_first = dictionary! {
            "W" => 1,
            "H" => 1,
            "F" => vec![Object::Name(b"DCT".to_vec()), Object::Name(b"Fl".to_vec())],
        };
        assert!(spec(&dct_first).decode(&[1, 2, 3]).is_none());
    }

    #[test]
    fn gray_is_flagged_for_eight_bit_samples() {
        let dict = dictionary! { "W" => 2, "H" => 1, "CS" => "G", "BPC" => 8 };
        assert!(spec(&dict).decode(&[1, 2]).unwrap().gray);
        let one_bit = dictionary! { "W" => 2, "H" => 1, "CS" => "G", "BPC" => 1 };
        assert!(!spec(&one_bit).decode(&[1]).unwrap().gray);
    }

    #[test]
    fn form_content_is_inflated_under_the_bound() {
        let body = b"q /Im0 Do Q".to_vec();
        let dict = dictionary! { "Filter" => "FlateDecode" };
        assert_eq!(decode_content(&dict, &deflate(&body), 1024).unwrap(), body);
        assert!(decode_content(&dict, &deflate(&vec![b' '; 4096]), 1024).is_none());
        assert_eq!(decode_content(&dictionary! {}, &body, 1024).unwrap(), body);
    }
}
