//! Track classification for one input file.

use std::path::Path;

use tracing::debug;

use super::TrackClass;
use crate::container::{FourCC, MediaTrack};
use crate::error::{PackagerError, Result};

/// Index of the first track of each recognized class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub enhancement: Option<usize>,
    pub base: Option<usize>,
    pub audio: Option<usize>,
}

impl Classification {
    fn slot(&mut self, class: TrackClass) -> &mut Option<usize> {
        match class {
            TrackClass::EnhancementVideo => &mut self.enhancement,
            TrackClass::BaseVideo => &mut self.base,
            TrackClass::Audio => &mut self.audio,
        }
    }
}

/// Class of a single track, `None` for tracks the packager ignores.
pub fn class_of(track: &dyn MediaTrack) -> Option<TrackClass> {
    match track.codec_tag().as_bytes() {
        b"dvhe" => Some(TrackClass::EnhancementVideo),
        b"hvc1" | b"hevc" => Some(TrackClass::BaseVideo),
        _ if track.handler() == FourCC::SOUN => Some(TrackClass::Audio),
        _ => None,
    }
}

/// Scan `tracks` once; a second track of any class is an error.
pub fn classify(tracks: &[Box<dyn MediaTrack>], path: &Path) -> Result<Classification> {
    let mut found = Classification::default();

    for (index, track) in tracks.iter().enumerate() {
        let Some(class) = class_of(track.as_ref()) else {
            debug!(
                path = %path.display(),
                index,
                codec = %track.codec_tag(),
                handler = %track.handler(),
                "ignoring track"
            );
            continue;
        };

        let slot = found.slot(class);
        if slot.is_some() {
            return Err(PackagerError::DuplicateTrack {
                class,
                path: path.to_path_buf(),
            });
        }
        *slot = Some(index);
        debug!(path = %path.display(), index, %class, "classified track");
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::representation::test_support::FakeTrack;

    fn path() -> &'static Path {
        Path::new("input.mp4")
    }

    #[test]
    fn test_classifies_layers_and_audio() {
        let tracks = vec![
            FakeTrack::video(b"hvc1").boxed(),
            FakeTrack::video(b"dvhe").boxed(),
            FakeTrack::audio("eng").boxed(),
        ];
        let found = classify(&tracks, path()).unwrap();
        assert_eq!(
            found,
            Classification {
                enhancement: Some(1),
                base: Some(0),
                audio: Some(2)
            }
        );
    }

    #[test]
    fn test_hevc_alias_is_base_layer() {
        let tracks = vec![FakeTrack::audio("eng").boxed(), FakeTrack::video(b"hevc").boxed()];
        let found = classify(&tracks, path()).unwrap();
        assert_eq!(found.base, Some(1));
    }

    #[test]
    fn test_unrecognized_tracks_are_ignored() {
        let tracks = vec![
            FakeTrack::video(b"avc1").boxed(),
            FakeTrack::new(b"tx3g", FourCC(*b"text"), 10, 1).boxed(),
        ];
        assert_eq!(classify(&tracks, path()).unwrap(), Classification::default());
    }

    #[test]
    fn test_duplicate_base_layer() {
        let tracks = vec![FakeTrack::video(b"hvc1").boxed(), FakeTrack::video(b"hevc").boxed()];
        let err = classify(&tracks, path()).unwrap_err();
        assert!(matches!(
            err,
            PackagerError::DuplicateTrack {
                class: TrackClass::BaseVideo,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_enhancement_layer() {
        let tracks = vec![FakeTrack::video(b"dvhe").boxed(), FakeTrack::video(b"dvhe").boxed()];
        let err = classify(&tracks, path()).unwrap_err();
        assert!(matches!(
            err,
            PackagerError::DuplicateTrack {
                class: TrackClass::EnhancementVideo,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_audio() {
        let tracks = vec![FakeTrack::audio("eng").boxed(), FakeTrack::audio("fra").boxed()];
        let err = classify(&tracks, path()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
