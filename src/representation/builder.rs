//! Representation construction rules for one input file.

use std::path::Path;

use tracing::{info, warn};

use super::classifier::classify;
use super::{AudioRepresentation, LayeredVideoRepresentation, Representation, TrackClass};
use crate::config::{EncryptedLayer, RepresentationConfig};
use crate::container::MediaTrack;
use crate::crypto::{self, ContentKey};
use crate::error::{PackagerError, Result};

/// Run-wide settings for building representations.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions<'a> {
    pub config: &'a RepresentationConfig,
    /// Content key applied to one layer of every layered representation
    pub key: Option<&'a ContentKey>,
    pub encrypted_layer: EncryptedLayer,
}

impl<'a> BuildOptions<'a> {
    pub fn new(config: &'a RepresentationConfig) -> Self {
        Self {
            config,
            key: None,
            encrypted_layer: EncryptedLayer::default(),
        }
    }

    pub fn with_key(mut self, key: Option<&'a ContentKey>, layer: EncryptedLayer) -> Self {
        self.key = key;
        self.encrypted_layer = layer;
        self
    }
}

/// Turn the tracks of one input into representations.
///
/// - base + enhancement video layers become one layered representation, with
///   the configured layer encrypted when a key is supplied;
/// - a lone layer is an error unless it is the first track, in which case it
///   is skipped;
/// - an audio track becomes one audio representation.
///
/// An input that yields nothing is an error.
pub fn build_representations(
    path: &Path,
    tracks: Vec<Box<dyn MediaTrack>>,
    options: &BuildOptions<'_>,
) -> Result<Vec<Box<dyn Representation>>> {
    let found = classify(&tracks, path)?;
    let config = options.config;

    let mut base = None;
    let mut enhancement = None;
    let mut audio = None;
    for (index, track) in tracks.into_iter().enumerate() {
        if found.base == Some(index) {
            base = Some(track);
        } else if found.enhancement == Some(index) {
            enhancement = Some(track);
        } else if found.audio == Some(index) {
            audio = Some(track);
        }
    }

    let mut representations: Vec<Box<dyn Representation>> = Vec::new();

    match (base, enhancement) {
        (Some(base), Some(enhancement)) => {
            let (base, enhancement) = match (options.key, options.encrypted_layer) {
                (Some(key), EncryptedLayer::Enhancement) => (base, crypto::wrap(enhancement, key)),
                (Some(key), EncryptedLayer::Base) => (crypto::wrap(base, key), enhancement),
                (None, _) => (base, enhancement),
            };
            let dependency_type = config.dependency_fourcc().ok_or_else(|| {
                PackagerError::Config(format!(
                    "invalid dependency_type {:?}",
                    config.dependency_type
                ))
            })?;
            representations.push(Box::new(LayeredVideoRepresentation::new(
                base,
                enhancement,
                config.layered_video_bandwidth,
                config.video_samples_per_fragment,
                dependency_type,
            )));
        }
        _ => {
            let lone = match (found.base, found.enhancement) {
                (Some(index), None) => Some((TrackClass::BaseVideo, index)),
                (None, Some(index)) => Some((TrackClass::EnhancementVideo, index)),
                _ => None,
            };
            if let Some((class, index)) = lone {
                if index != 0 {
                    return Err(PackagerError::UnsupportedLayerSplit {
                        class,
                        path: path.to_path_buf(),
                    });
                }
                warn!(
                    path = %path.display(),
                    %class,
                    "lone layer track is the first track, skipping it without a representation"
                );
            }
        }
    }

    if let Some(track) = audio {
        representations.push(Box::new(AudioRepresentation::new(
            track,
            config.audio_bandwidth,
            config.audio_samples_per_fragment,
        )));
    }

    if representations.is_empty() {
        return Err(PackagerError::NoRepresentation(path.to_path_buf()));
    }

    info!(
        path = %path.display(),
        count = representations.len(),
        encrypted = options.key.is_some(),
        "built representations"
    );
    Ok(representations)
}
