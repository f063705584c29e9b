//! Configuration for the playback engine.
//!
//! A [`Config`] is deserialized from an optional TOML file via `serde`,
//! then overridden field-by-field by CLI flags/environment variables in
//! `main.rs`. Nothing here talks to a network or a device; this module
//! only describes tuning knobs the rest of the crate reads at startup.

use std::str::FromStr;

use serde::Deserialize;

use crate::controller::FallbackPolicy;
use crate::error::{Error, Result};

/// Complete configuration for the playback engine.
///
/// Every field has a default matching the tuning constants documented
/// alongside the modules that use them ([`crate::cache`],
/// [`crate::preload`]).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chunk size, in bytes, used by the chunk cache and preloader.
    pub chunk_size: u64,

    /// Maximum total bytes the chunk cache may hold before evicting.
    pub cache_capacity_bytes: u64,

    /// Chunks to keep filled ahead of the playback position.
    pub preload_chunks_ahead: u64,

    /// Chunks to keep filled behind the playback position.
    pub preload_chunks_behind: u64,

    /// Policy applied when the hardware decoder rejects a codec.
    pub fallback_policy: FallbackPolicyConfig,

    /// Caps the video decoder's output frame rate; frames beyond this
    /// are dropped at decode time rather than presentation time. `None`
    /// means no cap.
    pub video_fps_cap: Option<f64>,

    /// Downmixes decoded audio to stereo regardless of source channel
    /// count.
    pub downmix_to_stereo: bool,

    /// Audio output device selector, in the same
    /// `[<host>][|<device>][|<rate>][|<format>]` shape the teacher's
    /// device picker accepts. `None` selects the system default.
    pub device: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: crate::cache::CHUNK_SIZE,
            cache_capacity_bytes: crate::cache::DEFAULT_CAPACITY_BYTES,
            preload_chunks_ahead: crate::preload::CHUNKS_AHEAD,
            preload_chunks_behind: crate::preload::CHUNKS_BEHIND,
            fallback_policy: FallbackPolicyConfig::Auto,
            video_fps_cap: None,
            downmix_to_stereo: false,
            device: None,
        }
    }
}

impl Config {
    /// Parses a TOML document into a `Config`, falling back to defaults
    /// for any field it omits.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` isn't valid TOML or doesn't match the
    /// `Config` schema.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| Error::fatal(format!("invalid configuration: {e}")))
    }
}

/// Serializable mirror of [`FallbackPolicy`], since the controller's
/// enum doesn't derive `Deserialize` (it isn't part of the wire/config
/// surface on its own).
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicyConfig {
    #[default]
    Auto,
    Manual,
}

impl From<FallbackPolicyConfig> for FallbackPolicy {
    fn from(value: FallbackPolicyConfig) -> Self {
        match value {
            FallbackPolicyConfig::Auto => FallbackPolicy::Auto,
            FallbackPolicyConfig::Manual => FallbackPolicy::Manual,
        }
    }
}

impl FromStr for FallbackPolicyConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(Error::fatal(format!(
                "unknown fallback policy: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_tuning_constants() {
        let config = Config::default();
        assert_eq!(config.chunk_size, crate::cache::CHUNK_SIZE);
        assert_eq!(
            config.cache_capacity_bytes,
            crate::cache::DEFAULT_CAPACITY_BYTES
        );
        assert_eq!(config.fallback_policy, FallbackPolicyConfig::Auto);
    }

    #[test]
    fn from_toml_overrides_only_given_fields() {
        let config = Config::from_toml("cache_capacity_bytes = 1048576\n").unwrap();
        assert_eq!(config.cache_capacity_bytes, 1_048_576);
        assert_eq!(config.chunk_size, crate::cache::CHUNK_SIZE);
    }

    #[test]
    fn from_toml_rejects_garbage() {
        assert!(Config::from_toml("not valid toml {{{").is_err());
    }

    #[test]
    fn fallback_policy_parses_case_insensitively() {
        assert_eq!(
            "Auto".parse::<FallbackPolicyConfig>().unwrap(),
            FallbackPolicyConfig::Auto
        );
        assert_eq!(
            "MANUAL".parse::<FallbackPolicyConfig>().unwrap(),
            FallbackPolicyConfig::Manual
        );
        assert!("bogus".parse::<FallbackPolicyConfig>().is_err());
    }
}
