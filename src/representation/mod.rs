//! Representations: classified tracks turned into writable, describable units.

mod audio;
pub mod builder;
pub mod classifier;
mod layered;

pub use audio::AudioRepresentation;
pub use builder::{build_representations, BuildOptions};
pub use classifier::{classify, Classification};
pub use layered::LayeredVideoRepresentation;

use std::fmt;

use base64::Engine;

use crate::container::{FourCC, MediaTrack, WriteOptions, WrittenRepresentation};
use crate::crypto::{common_pssh, format_key_id};
use crate::manifest::codec::codec_string;
use crate::manifest::model::{
    CommonAttributes, ContentProtection, RepresentationDescriptor, SegmentBase,
};

/// Content class of a track, as recognized by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackClass {
    /// Dolby Vision enhancement layer (`dvhe`)
    EnhancementVideo,
    /// HEVC base layer (`hvc1` / `hevc`)
    BaseVideo,
    /// Any track with a `soun` handler
    Audio,
}

impl fmt::Display for TrackClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackClass::EnhancementVideo => write!(f, "enhancement-layer video (dvhe)"),
            TrackClass::BaseVideo => write!(f, "base-layer video (hvc1)"),
            TrackClass::Audio => write!(f, "audio"),
        }
    }
}

/// A unit of output: one file, one `Representation` element.
///
/// Downstream code (identifier allocation, grouping, manifest) only looks at
/// the primary track and the descriptor, never at the concrete type.
pub trait Representation: fmt::Debug + Send + Sync {
    /// Track that names the representation: handler, codec tag, language
    fn primary_track(&self) -> &dyn MediaTrack;

    /// All tracks, in the order they are written
    fn tracks(&self) -> Vec<&dyn MediaTrack>;

    /// Target bitrate in bit/s
    fn bandwidth(&self) -> u64;

    fn write_options(&self) -> WriteOptions;

    /// `codecs` attribute
    fn codecs(&self) -> String {
        let track = self.primary_track();
        codec_string(track.codec_tag(), &track.sample_entry())
    }

    /// Grouping key: primary codec tag followed by its language
    fn content_signature(&self) -> String {
        let track = self.primary_track();
        format!("{}{}", track.codec_tag(), track.language())
    }

    /// Longest duration among the referenced tracks, in seconds
    fn duration_secs(&self) -> f64 {
        self.tracks()
            .iter()
            .map(|t| t.duration_secs())
            .fold(0.0, f64::max)
    }

    /// Manifest-facing metadata once the representation has been written
    /// under `id`.
    fn describe(&self, id: &str, written: &WrittenRepresentation) -> RepresentationDescriptor {
        let primary = self.primary_track();
        let handler = primary.handler();
        let is_video = handler == FourCC::VIDE;

        let mut common = CommonAttributes {
            mime_type: Some(if is_video { "video/mp4" } else { "audio/mp4" }.to_string()),
            codecs: Some(self.codecs()),
            ..Default::default()
        };
        if is_video {
            if let Some((width, height)) = primary.dimensions() {
                common.width = Some(width);
                common.height = Some(height);
            }
            common.frame_rate = frame_rate(primary);
        } else if handler == FourCC::SOUN {
            common.audio_sampling_rate = Some(audio_sampling_rate(primary));
        }

        let language = primary.language();
        RepresentationDescriptor {
            id: id.to_string(),
            base_url: format!("{}.mp4", id),
            bandwidth: self.bandwidth(),
            common,
            lang: (language != "und").then(|| language.to_string()),
            content_protection: content_protection(&self.tracks()),
            segment_base: Some(SegmentBase {
                index_range: written.index_range,
                initialization: written.init_range,
            }),
        }
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Frame rate when every sample has the same duration.
fn frame_rate(track: &dyn MediaTrack) -> Option<String> {
    let samples = track.samples();
    let first = samples.first()?.duration as u64;
    if first == 0 || samples.iter().any(|s| s.duration as u64 != first) {
        return None;
    }
    let timescale = track.timescale() as u64;
    let divisor = gcd(timescale, first);
    let (num, den) = (timescale / divisor, first / divisor);
    Some(if den == 1 {
        num.to_string()
    } else {
        format!("{}/{}", num, den)
    })
}

/// Sample rate from the audio sample entry (16.16 fixed point), falling
/// back to the media timescale.
fn audio_sampling_rate(track: &dyn MediaTrack) -> u32 {
    let entry = track.sample_entry();
    entry
        .get(32..36)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]) >> 16)
        .filter(|&rate| rate > 0)
        .unwrap_or_else(|| track.timescale())
}

/// `ContentProtection` elements for the protected tracks, if any.
fn content_protection(tracks: &[&dyn MediaTrack]) -> Vec<ContentProtection> {
    let mut key_ids: Vec<[u8; 16]> = Vec::new();
    for kid in tracks.iter().filter_map(|t| t.key_id()) {
        if !key_ids.contains(&kid) {
            key_ids.push(kid);
        }
    }
    let Some(default_kid) = key_ids.first() else {
        return Vec::new();
    };

    let pssh = base64::engine::general_purpose::STANDARD.encode(common_pssh(&key_ids));
    vec![
        ContentProtection {
            scheme_id_uri: "urn:mpeg:dash:mp4protection:2011".to_string(),
            value: Some("cenc".to_string()),
            default_kid: Some(format_key_id(default_kid)),
            pssh: None,
        },
        ContentProtection {
            scheme_id_uri: "urn:uuid:1077efec-c0b2-4d02-ace3-3c1e52e2fb4b".to_string(),
            value: None,
            default_kid: None,
            pssh: Some(pssh),
        },
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use bytes::{BufMut, Bytes, BytesMut};

    use crate::container::isobmff::write_box;
    use crate::container::{FourCC, MediaTrack, Sample, SampleInfo};
    use crate::error::Result;

    /// In-memory track for pipeline tests.
    #[derive(Debug, Clone)]
    pub struct FakeTrack {
        pub track_id: u32,
        pub codec_tag: FourCC,
        pub handler: FourCC,
        pub duration: u64,
        pub timescale: u32,
        pub language: String,
        pub samples: Vec<SampleInfo>,
    }

    impl FakeTrack {
        pub fn new(codec: &[u8; 4], handler: FourCC, duration: u64, timescale: u32) -> Self {
            let samples = (0..4)
                .map(|i| SampleInfo {
                    offset: 0,
                    size: 8,
                    decode_time: i * duration / 4,
                    duration: (duration / 4) as u32,
                    composition_offset: 0,
                    is_sync: true,
                })
                .collect();
            Self {
                track_id: 1,
                codec_tag: FourCC(*codec),
                handler,
                duration,
                timescale,
                language: "und".to_string(),
                samples,
            }
        }

        pub fn video(codec: &[u8; 4]) -> Self {
            Self::new(codec, FourCC::VIDE, 10_000, 1000)
        }

        pub fn audio(language: &str) -> Self {
            let mut track = Self::new(b"mp4a", FourCC::SOUN, 480_000, 48_000);
            track.language = language.to_string();
            track
        }

        pub fn boxed(self) -> Box<dyn MediaTrack> {
            Box::new(self)
        }
    }

    impl MediaTrack for FakeTrack {
        fn track_id(&self) -> u32 {
            self.track_id
        }
        fn codec_tag(&self) -> FourCC {
            self.codec_tag
        }
        fn handler(&self) -> FourCC {
            self.handler
        }
        fn duration(&self) -> u64 {
            self.duration
        }
        fn timescale(&self) -> u32 {
            self.timescale
        }
        fn language(&self) -> &str {
            &self.language
        }
        fn dimensions(&self) -> Option<(u32, u32)> {
            (self.handler == FourCC::VIDE).then_some((1920, 1080))
        }
        fn sample_entry(&self) -> Bytes {
            let mut entry = BytesMut::new();
            write_box(&mut entry, self.codec_tag.as_bytes(), |b| b.put_slice(&[0u8; 78]));
            entry.freeze()
        }
        fn samples(&self) -> &[SampleInfo] {
            &self.samples
        }
        fn read_sample(&self, index: usize) -> Result<Sample> {
            Ok(Sample {
                data: Bytes::from(vec![index as u8; 8]),
                encryption: None,
            })
        }
    }
}
