//! Network profiler
//!
//! Derives the adaptive transfer/compression policy from runtime hints.

use shutter_core::{ConnectionClass, NetworkHints, NetworkProfile};

/// Device memory (GiB) below which transfers and images are scaled down.
const LOW_MEMORY_GB: f32 = 2.0;

pub struct NetworkProfiler;

impl NetworkProfiler {
    /// Most conservative profile: used for data-saver and 2G-class links.
    pub const CONSERVATIVE: NetworkProfile = NetworkProfile {
        connection: ConnectionClass::Slow2g,
        max_concurrent: 1,
        max_dimension: 1280,
        quality: 60,
    };

    /// Default when no explicit signal is available.
    pub const MID_TIER: NetworkProfile = NetworkProfile {
        connection: ConnectionClass::Unknown,
        max_concurrent: 2,
        max_dimension: 1920,
        quality: 75,
    };

    /// Derive a profile. Never fails; unknown or missing signals fall back to
    /// [`NetworkProfiler::MID_TIER`].
    pub fn profile(hints: &NetworkHints) -> NetworkProfile {
        if hints.save_data {
            return NetworkProfile {
                connection: hints.effective_type.unwrap_or(ConnectionClass::Unknown),
                ..Self::CONSERVATIVE
            };
        }

        let mut profile = match hints.effective_type {
            Some(ConnectionClass::Slow2g) => Self::CONSERVATIVE,
            Some(ConnectionClass::TwoG) => NetworkProfile {
                connection: ConnectionClass::TwoG,
                ..Self::CONSERVATIVE
            },
            Some(ConnectionClass::ThreeG) => NetworkProfile {
                connection: ConnectionClass::ThreeG,
                max_concurrent: 2,
                max_dimension: 1600,
                quality: 70,
            },
            Some(ConnectionClass::FourG) => NetworkProfile {
                connection: ConnectionClass::FourG,
                max_concurrent: 4,
                max_dimension: 2048,
                quality: 80,
            },
            Some(ConnectionClass::Unknown) | None => Self::MID_TIER,
        };

        if let Some(memory) = hints.device_memory_gb {
            if memory > 0.0 && memory < LOW_MEMORY_GB {
                profile.max_concurrent = profile.max_concurrent.min(2);
                profile.max_dimension = profile.max_dimension.min(1600);
            }
        }

        tracing::debug!(
            connection = %profile.connection,
            max_concurrent = profile.max_concurrent,
            max_dimension = profile.max_dimension,
            quality = profile.quality,
            "Derived network profile"
        );

        profile
    }
}
