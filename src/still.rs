//! Still-image decoding and JPEG encoding.
//!
//! Decoded frames arrive in the image store in whatever format the decoder
//! wrote; every substituted message is re-encoded as a baseline JPEG at a
//! fixed quality so restored channels are uniform.

use std::{fs::File, io::BufWriter, path::Path};

use image::{DynamicImage, codecs::jpeg::JpegEncoder};

use crate::error::ReframeError;

/// JPEG quality used for substituted image messages unless overridden.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Decode still-image bytes of any supported format.
pub fn decode_still(bytes: &[u8]) -> Result<DynamicImage, ReframeError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Encode an image as JPEG bytes.
///
/// `quality` is clamped to `1..=100`. Alpha and high bit-depth images are
/// flattened to 8-bit RGB; grayscale stays grayscale.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ReframeError> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    jpeg_compatible(image).write_with_encoder(encoder)?;
    Ok(bytes)
}

/// Encode an image as JPEG straight to a file.
pub fn write_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> Result<(), ReframeError> {
    let writer = BufWriter::new(File::create(path)?);
    let encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
    jpeg_compatible(image).write_with_encoder(encoder)?;
    Ok(())
}

fn jpeg_compatible(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image.clone(),
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageLuma8(image.to_luma8())
        }
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}
