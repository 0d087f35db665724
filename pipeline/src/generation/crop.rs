//! Central crop to the 4:5 portrait format.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::collaborators::{GenerationFailure, Image};

/// Target width / height.
pub const PORTRAIT_RATIO: f64 = 4.0 / 5.0;
/// Images this close to the target ratio are passed through untouched.
pub const RATIO_TOLERANCE: f64 = 0.01;
const JPEG_QUALITY: u8 = 95;

/// Crop `image` centrally to 4:5 and re-encode it as JPEG.
///
/// Output that cannot be decoded is reported as a generation failure.
pub fn crop_to_portrait(image: &Image) -> Result<Image, GenerationFailure> {
    let decoded = image::load_from_memory(&image.data)
        .map_err(|e| GenerationFailure::Undecodable(e.to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(GenerationFailure::Undecodable("empty image".into()));
    }
    let ratio = f64::from(width) / f64::from(height);
    if (ratio - PORTRAIT_RATIO).abs() < RATIO_TOLERANCE {
        return Ok(image.clone());
    }

    let (new_width, new_height) = if ratio > PORTRAIT_RATIO {
        ((f64::from(height) * PORTRAIT_RATIO) as u32, height)
    } else {
        (width, (f64::from(width) / PORTRAIT_RATIO) as u32)
    };
    let left = (width - new_width) / 2;
    let top = (height - new_height) / 2;

    let cropped = decoded.crop_imm(left, top, new_width, new_height);
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(cropped.to_rgb8())
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))
        .map_err(|e| GenerationFailure::Undecodable(e.to_string()))?;

    Ok(Image::jpeg(out))
}
