//! QR images for printed documents.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, GenericImageView, ImageFormat, Luma};
use qrcode::QrCode;

use crate::error::Result;

const MIN_QR_PIXELS: u32 = 240;

#[derive(Debug, Clone, PartialEq)]
pub struct PngImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PngImage {
    /// Validates the bytes as a PNG and reads its size.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let (width, height) = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.dimensions();
        Ok(Self { bytes, width, height })
    }
}

/// Accepts raw base64 or a `data:image/png;base64,` URL.
pub fn decode_base64_png(data: &str) -> Result<PngImage> {
    let payload = match data.split_once("base64,") {
        Some((_, rest)) => rest,
        None => data,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD.decode(cleaned)?;
    PngImage::from_bytes(bytes)
}

pub fn generate_png(payload: &str) -> Result<PngImage> {
    let code = QrCode::new(payload.as_bytes())?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_QR_PIXELS, MIN_QR_PIXELS)
        .build();
    let (width, height) = image.dimensions();

    let dynamic_image = DynamicImage::ImageLuma8(image);
    let mut buffer = Cursor::new(Vec::new());
    dynamic_image.write_to(&mut buffer, image::ImageOutputFormat::Png)?;
    Ok(PngImage { bytes: buffer.into_inner(), width, height })
}
