//! Packager configuration
//!
//! Loaded from TOML files; every section and field falls back to its default.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::container::FourCC;
use crate::error::{PackagerError, Result};

/// Representation construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepresentationConfig {
    /// Advertised bandwidth of a layered video representation in bit/s
    pub layered_video_bandwidth: u64,

    /// Advertised bandwidth of an audio representation in bit/s
    pub audio_bandwidth: u64,

    /// Samples of the primary track per fragment (video)
    pub video_samples_per_fragment: usize,

    /// Samples per fragment (audio)
    pub audio_samples_per_fragment: usize,

    /// Track reference type linking the enhancement layer to the base layer
    pub dependency_type: String,
}

impl Default for RepresentationConfig {
    fn default() -> Self {
        Self {
            layered_video_bandwidth: 10_000_000,
            audio_bandwidth: 128_000,
            video_samples_per_fragment: 48,
            audio_samples_per_fragment: 500,
            dependency_type: "vdep".to_string(),
        }
    }
}

impl RepresentationConfig {
    /// `dependency_type` as a box type, if it is a four character code
    pub fn dependency_fourcc(&self) -> Option<FourCC> {
        <[u8; 4]>::try_from(self.dependency_type.as_bytes())
            .ok()
            .map(FourCC)
    }
}

/// Manifest settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Manifest file name inside the output directory
    pub file_name: String,

    /// DASH profile URN
    pub profile: String,

    /// MPD@minBufferTime in seconds
    pub min_buffer_time_secs: f64,

    /// ProgramInformation@moreInformationURL
    pub program_information_url: Option<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            file_name: "Manifest.mpd".to_string(),
            profile: ON_DEMAND_PROFILE.to_string(),
            min_buffer_time_secs: 4.0,
            program_information_url: None,
        }
    }
}

/// On-demand ISOBMFF profile
pub const ON_DEMAND_PROFILE: &str = "urn:mpeg:dash:profile:isoff-on-demand:2011";

/// Which layer of a layered video representation gets encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptedLayer {
    #[default]
    Enhancement,
    Base,
}

/// Encryption settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Layer wrapped by the encryption adapter when a key is supplied
    pub layer: EncryptedLayer,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Packager configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagerConfig {
    /// Representation settings
    pub representation: RepresentationConfig,

    /// Manifest settings
    pub manifest: ManifestConfig,

    /// Encryption settings
    pub encryption: EncryptionConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl PackagerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| {
            PackagerError::Config(format!("{}: {}", path.as_ref().display(), e))
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| PackagerError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        let rep = &self.representation;
        if rep.video_samples_per_fragment == 0 || rep.audio_samples_per_fragment == 0 {
            return Err(PackagerError::Config(
                "samples per fragment must be at least 1".to_string(),
            ));
        }
        if rep.dependency_fourcc().is_none() || !rep.dependency_type.is_ascii() {
            return Err(PackagerError::Config(format!(
                "dependency_type must be a four character code, got {:?}",
                rep.dependency_type
            )));
        }
        if !self.manifest.min_buffer_time_secs.is_finite() || self.manifest.min_buffer_time_secs < 0.0
        {
            return Err(PackagerError::Config(
                "min_buffer_time_secs must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    PackagerConfig::default().to_file(path)
}
