//! Image re-encoding
//!
//! Pure, blocking functions. Callers run them on a compression worker thread,
//! never on the orchestrating task.

use anyhow::Result;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

use crate::worker::{CompressedImage, CompressionPolicy, TargetEncoding};

/// Output format actually produced by the compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn to_mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// Format selector based on the requested encoding and image properties
pub struct FormatSelector;

impl FormatSelector {
    pub fn select_format(img: &DynamicImage, requested: TargetEncoding) -> OutputFormat {
        match requested {
            TargetEncoding::Jpeg => OutputFormat::Jpeg,
            TargetEncoding::Png => OutputFormat::Png,
            // JPEG for photos, PNG when transparency would otherwise be lost
            TargetEncoding::Auto => {
                if Self::has_meaningful_alpha(img) {
                    OutputFormat::Png
                } else {
                    OutputFormat::Jpeg
                }
            }
        }
    }

    /// Check if image has meaningful alpha channel (not fully opaque)
    fn has_meaningful_alpha(img: &DynamicImage) -> bool {
        match img {
            DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageRgba16(_)
            | DynamicImage::ImageRgba32F(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLumaA16(_) => {
                let rgba = img.to_rgba8();
                let (width, height) = img.dimensions();

                // Sample every 10th pixel
                for y in (0..height).step_by(10) {
                    for x in (0..width).step_by(10) {
                        if rgba.get_pixel(x, y)[3] < 255 {
                            return true;
                        }
                    }
                }
                false
            }
            _ => false,
        }
    }
}

pub struct ImageCompressor;

impl ImageCompressor {
    /// Decode, downscale to `policy.max_dimension` and re-encode.
    pub fn compress(data: &[u8], policy: &CompressionPolicy) -> Result<CompressedImage> {
        let img = image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()?
            .decode()?;

        let img = Self::fit_within(img, policy.max_dimension);
        let format = FormatSelector::select_format(&img, policy.encoding);

        let encoded = match format {
            OutputFormat::Jpeg => Self::encode_jpeg(&img, policy.quality)?,
            OutputFormat::Png => Self::encode_png(&img)?,
        };

        let (width, height) = img.dimensions();

        tracing::debug!(
            original_size = data.len(),
            compressed_size = encoded.len(),
            width,
            height,
            format = format.to_mime_type(),
            "Image re-encoded"
        );

        Ok(CompressedImage {
            original_size: data.len() as u64,
            compressed_size: encoded.len() as u64,
            data: encoded,
            content_type: format.to_mime_type().to_string(),
            extension: format.extension().to_string(),
            width,
            height,
        })
    }

    /// Downscale so the longest side is at most `max_dimension`, keeping the
    /// aspect ratio. Never upscales.
    pub fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
        let (width, height) = img.dimensions();
        if max_dimension == 0 || (width <= max_dimension && height <= max_dimension) {
            return img;
        }
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    }

    fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes> {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut buffer = Vec::with_capacity((width * height / 4) as usize);
        rgb.write_with_encoder(JpegEncoder::new_with_quality(
            &mut buffer,
            quality.clamp(1, 100),
        ))?;
        Ok(Bytes::from(buffer))
    }

    fn encode_png(img: &DynamicImage) -> Result<Bytes> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        img.write_to(&mut cursor, ImageFormat::Png)?;
        Ok(Bytes::from(buffer))
    }
}
