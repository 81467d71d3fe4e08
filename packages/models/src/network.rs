//! Radio-network configuration tiers.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Cyclic-prefix mode of a configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
pub enum CyclicPrefix {
    /// Normal cyclic prefix.
    Normal,
    /// Extended cyclic prefix, for long delay spread.
    Extended,
}

/// A recommended 5G NR configuration.
///
/// Serialized as its short label (e.g. `"mmWave-28GHz"`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum NetworkConfig {
    /// 120 kHz subcarrier spacing, 28 GHz band, extended cyclic prefix.
    #[serde(rename = "mmWave-28GHz")]
    #[strum(serialize = "mmWave-28GHz")]
    MmWave,
    /// 60 kHz subcarrier spacing, 3.5 GHz C-band, normal cyclic prefix.
    #[serde(rename = "Cband-3.5GHz")]
    #[strum(serialize = "Cband-3.5GHz")]
    CBand,
    /// 30 kHz subcarrier spacing, 700 MHz low band, normal cyclic prefix.
    #[serde(rename = "LowBand-700MHz")]
    #[strum(serialize = "LowBand-700MHz")]
    LowBand,
}

impl NetworkConfig {
    /// Short label, identical to the `Display` output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::MmWave => "mmWave-28GHz",
            Self::CBand => "Cband-3.5GHz",
            Self::LowBand => "LowBand-700MHz",
        }
    }

    /// Subcarrier spacing in kHz.
    #[must_use]
    pub const fn subcarrier_spacing_khz(self) -> u32 {
        match self {
            Self::MmWave => 120,
            Self::CBand => 60,
            Self::LowBand => 30,
        }
    }

    /// Carrier frequency in MHz.
    #[must_use]
    pub const fn carrier_frequency_mhz(self) -> u32 {
        match self {
            Self::MmWave => 28_000,
            Self::CBand => 3_500,
            Self::LowBand => 700,
        }
    }

    /// Human-readable band name.
    #[must_use]
    pub const fn band(self) -> &'static str {
        match self {
            Self::MmWave => "mmWave (28 GHz)",
            Self::CBand => "C-band (3.5 GHz)",
            Self::LowBand => "Low-band (700 MHz)",
        }
    }

    #[must_use]
    pub const fn cyclic_prefix(self) -> CyclicPrefix {
        match self {
            Self::MmWave => CyclicPrefix::Extended,
            Self::CBand | Self::LowBand => CyclicPrefix::Normal,
        }
    }

    /// Long form shown in the results panel, e.g.
    /// `120 kHz Subcarrier | mmWave (28 GHz) | Extended Cyclic Prefix`.
    #[must_use]
    pub fn description(self) -> String {
        format!(
            "{} kHz Subcarrier | {} | {} Cyclic Prefix",
            self.subcarrier_spacing_khz(),
            self.band(),
            self.cyclic_prefix()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_label() {
        for config in [NetworkConfig::MmWave, NetworkConfig::CBand, NetworkConfig::LowBand] {
            assert_eq!(config.to_string(), config.label());
            assert_eq!(config.label().parse::<NetworkConfig>().unwrap(), config);
        }
    }

    #[test]
    fn descriptions_match_results_panel() {
        assert_eq!(
            NetworkConfig::MmWave.description(),
            "120 kHz Subcarrier | mmWave (28 GHz) | Extended Cyclic Prefix"
        );
        assert_eq!(
            NetworkConfig::CBand.description(),
            "60 kHz Subcarrier | C-band (3.5 GHz) | Normal Cyclic Prefix"
        );
        assert_eq!(
            NetworkConfig::LowBand.description(),
            "30 kHz Subcarrier | Low-band (700 MHz) | Normal Cyclic Prefix"
        );
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&NetworkConfig::CBand).unwrap();
        assert_eq!(json, "\"Cband-3.5GHz\"");
    }
}
