//! Tiny inlined preview thumbnails
//!
//! A reloaded session has no access to the original bytes, so each item keeps
//! a few-hundred-byte JPEG as a `data:` URL for the UI.

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::io::Cursor;

use shutter_core::constants::PREVIEW_MAX_SIDE;

const PREVIEW_QUALITY: u8 = 40;

pub fn render_preview(data: &[u8]) -> Result<String> {
    render_preview_with_side(data, PREVIEW_MAX_SIDE)
}

pub fn render_preview_with_side(data: &[u8], max_side: u32) -> Result<String> {
    let img = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;
    let thumb = img.resize(max_side, max_side, FilterType::Triangle).to_rgb8();

    let mut buffer = Vec::new();
    thumb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, PREVIEW_QUALITY))?;

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&buffer)))
}
