//! Compression stage
//!
//! Decides whether a file is worth re-encoding and shields the pipeline from
//! every compression failure: the caller always gets bytes to upload.

use bytes::Bytes;
use std::sync::Arc;

use crate::worker::{CompressedImage, CompressionFailure, CompressionPolicy, CompressionWorkerPool};

#[derive(Debug, Clone)]
pub enum CompressionOutcome {
    /// Source is below the skip threshold or not a re-encodable image.
    Skipped,
    Compressed(CompressedImage),
    /// Compression failed, timed out or did not shrink the file. The
    /// original bytes are used.
    FellBack { reason: String },
}

impl CompressionOutcome {
    /// Bytes and content type to upload, given the source.
    pub fn payload(&self, original: &Bytes, original_type: &str) -> (Bytes, String) {
        match self {
            CompressionOutcome::Compressed(image) => {
                (image.data.clone(), image.content_type.clone())
            }
            _ => (original.clone(), original_type.to_string()),
        }
    }

    pub fn compressed_size(&self) -> Option<u64> {
        match self {
            CompressionOutcome::Compressed(image) => Some(image.compressed_size),
            _ => None,
        }
    }
}

pub struct CompressionStage {
    pool: Arc<CompressionWorkerPool>,
    skip_threshold: u64,
}

impl CompressionStage {
    pub fn new(pool: Arc<CompressionWorkerPool>, skip_threshold: u64) -> Self {
        Self {
            pool,
            skip_threshold,
        }
    }

    /// Whether a file of this size and type goes through the worker at all.
    pub fn should_compress(&self, size: u64, content_type: &str) -> bool {
        size > self.skip_threshold && is_reencodable(content_type)
    }

    pub async fn process(
        &self,
        data: Bytes,
        content_type: &str,
        policy: CompressionPolicy,
    ) -> CompressionOutcome {
        let original_size = data.len() as u64;
        if !self.should_compress(original_size, content_type) {
            return CompressionOutcome::Skipped;
        }

        match self.pool.compress(data, policy).await {
            Ok(image) if image.compressed_size < original_size => {
                tracing::debug!(
                    original_size,
                    compressed_size = image.compressed_size,
                    ratio = image.ratio(),
                    "Compression reduced file"
                );
                CompressionOutcome::Compressed(image)
            }
            Ok(image) => CompressionOutcome::FellBack {
                reason: format!(
                    "compressed output ({} bytes) not smaller than source ({} bytes)",
                    image.compressed_size, original_size
                ),
            },
            Err(e) => {
                if let CompressionFailure::TimedOut(_) = e {
                    tracing::warn!(original_size, "Compression timed out, using original");
                } else {
                    tracing::warn!(original_size, error = %e, "Compression failed, using original");
                }
                CompressionOutcome::FellBack {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// GIF is passed through to keep animation; HEIC cannot be decoded here.
fn is_reencodable(content_type: &str) -> bool {
    matches!(
        content_type.to_lowercase().as_str(),
        "image/jpeg" | "image/jpg" | "image/png" | "image/webp"
    )
}
