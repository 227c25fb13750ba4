use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Effective connection class reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionClass {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    Unknown,
}

impl FromStr for ConnectionClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slow-2g" => Ok(ConnectionClass::Slow2g),
            "2g" => Ok(ConnectionClass::TwoG),
            "3g" => Ok(ConnectionClass::ThreeG),
            "4g" | "wifi" | "ethernet" => Ok(ConnectionClass::FourG),
            "unknown" | "" => Ok(ConnectionClass::Unknown),
            _ => Err(anyhow::anyhow!("Invalid connection class: {}", s)),
        }
    }
}

impl Display for ConnectionClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ConnectionClass::Slow2g => write!(f, "slow-2g"),
            ConnectionClass::TwoG => write!(f, "2g"),
            ConnectionClass::ThreeG => write!(f, "3g"),
            ConnectionClass::FourG => write!(f, "4g"),
            ConnectionClass::Unknown => write!(f, "unknown"),
        }
    }
}

/// Raw runtime signals. Every field is optional; absent signals fall back to
/// a mid-tier profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkHints {
    pub effective_type: Option<ConnectionClass>,
    pub save_data: bool,
    pub device_memory_gb: Option<f32>,
}

/// Adaptive policy derived per pipeline run. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub connection: ConnectionClass,
    pub max_concurrent: usize,
    pub max_dimension: u32,
    /// Encoder quality, 1-100.
    pub quality: u8,
}
