//! Shutter Processing Library
//!
//! Everything that happens to a file before it leaves the device: entry
//! validation, fingerprinting, preview rendering, adaptive network policy and
//! off-thread image compression.

#[cfg(feature = "image")]
pub mod compression;
pub mod fingerprint;
#[cfg(feature = "image")]
pub mod preview;
pub mod profile;
pub mod stage;
pub mod validator;
pub mod worker;

pub use fingerprint::{Fingerprint, Fingerprinter};
pub use profile::NetworkProfiler;
pub use stage::{CompressionOutcome, CompressionStage};
pub use validator::{content_type_for, MediaValidator, ValidationError};
pub use worker::{
    CompressedImage, CompressionFailure, CompressionPolicy, CompressionWorkerPool, TargetEncoding,
};
