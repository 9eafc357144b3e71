use base64::{Engine as _, engine::general_purpose};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageReader};
use std::io::Cursor;

use crate::core::registry::ImageFormat;
use crate::error::{PosterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub format: ImageFormat,
    /// `None` keeps whatever quality the input already has.
    pub quality: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Re-encodes `bytes` into the requested format, or passes them through when
/// they already satisfy it.
pub fn process(bytes: &[u8], conversion: Conversion) -> Result<ProcessedImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    let source_format = reader.format().and_then(from_codec_format);

    let passthrough = source_format == Some(conversion.format)
        && (!conversion.format.is_lossy() || conversion.quality.is_none());

    if passthrough {
        let (width, height) = reader.into_dimensions()?;
        tracing::debug!("Passing {} image through unchanged", conversion.format);
        return Ok(ProcessedImage {
            bytes: bytes.to_vec(),
            width,
            height,
            format: conversion.format,
        });
    }

    let image = reader.decode()?;
    let encoded = encode(&image, conversion)?;
    tracing::debug!(
        "Re-encoded {:?} image to {} ({} -> {} bytes)",
        source_format,
        conversion.format,
        bytes.len(),
        encoded.len()
    );

    Ok(ProcessedImage {
        bytes: encoded,
        width: image.width(),
        height: image.height(),
        format: conversion.format,
    })
}

fn encode(image: &DynamicImage, conversion: Conversion) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match conversion.format {
        ImageFormat::Png => {
            image.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        }
        ImageFormat::Jpeg => {
            let rgb = image.to_rgb8();
            let quality = conversion.quality.unwrap_or(90).clamp(1, 100);
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
        }
    }
    Ok(bytes)
}

fn from_codec_format(format: image::ImageFormat) -> Option<ImageFormat> {
    match format {
        image::ImageFormat::Png => Some(ImageFormat::Png),
        image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
        _ => None,
    }
}

/// Decodes a caller-supplied base64 image, tolerating a `data:image/...;base64,` prefix.
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>> {
    let payload = strip_data_uri(data.trim());

    if payload.is_empty() {
        return Err(PosterError::InvalidBase64("payload is empty".to_string()));
    }
    if payload.len() % 4 != 0 {
        return Err(PosterError::InvalidBase64(format!(
            "length {} is not a multiple of 4",
            payload.len()
        )));
    }
    if !has_base64_shape(payload) {
        return Err(PosterError::InvalidBase64(
            "contains characters outside the Base64 alphabet".to_string(),
        ));
    }

    general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| PosterError::InvalidBase64(e.to_string()))
}

fn strip_data_uri(data: &str) -> &str {
    if data.starts_with("data:image") {
        data.split_once(',').map(|(_, payload)| payload).unwrap_or("")
    } else {
        data
    }
}

/// `[A-Za-z0-9+/]*={0,2}`
fn has_base64_shape(payload: &str) -> bool {
    let body = payload.trim_end_matches('=');
    payload.len() - body.len() <= 2
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}
