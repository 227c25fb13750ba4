//! Default values shared by configuration and components.

/// Maximum number of retries after the first attempt of a retryable call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_RETRY_GROWTH_FACTOR: f64 = 2.0;
pub const DEFAULT_RETRY_MAX_JITTER_MS: u64 = 250;

/// Object ids per credential request when prefetching.
pub const DEFAULT_CREDENTIAL_CHUNK_SIZE: usize = 8;
/// Signed credentials are treated as stale after this many seconds.
pub const DEFAULT_CREDENTIAL_VALIDITY_SECS: u64 = 50 * 60;

pub const DEFAULT_COMPRESSION_CONCURRENCY: usize = 1;
pub const DEFAULT_COMPRESSION_TIMEOUT_SECS: u64 = 20;
/// Files at or below this size are uploaded without re-encoding.
pub const DEFAULT_COMPRESSION_SKIP_THRESHOLD_BYTES: u64 = 300 * 1024;

pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_INTER_ITEM_DELAY_MS: u64 = 0;

pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 25 * 1024 * 1024;
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &str =
    "image/jpeg,image/png,image/webp,image/gif,image/heic";

pub const DEFAULT_SESSION_RETENTION_HOURS: u64 = 72;
/// Serialized sessions larger than this are treated as corrupt and cleared.
pub const DEFAULT_MAX_SESSION_BYTES: u64 = 5 * 1024 * 1024;

/// Leading bytes hashed by the content fingerprinter.
pub const FINGERPRINT_WINDOW_BYTES: usize = 64 * 1024;

/// Longest side of the inlined preview thumbnail.
pub const PREVIEW_MAX_SIDE: u32 = 48;

/// Asset kind sent to the commit endpoint.
pub const COMMIT_KIND_IMAGE: &str = "image";
