use super::Representation;
use crate::container::{FourCC, MediaTrack, WriteOptions};
use crate::manifest::codec::{codec_string, join_codecs};

/// Base and enhancement video layers written as one two-track file.
///
/// The base layer is the primary track; the enhancement layer references it
/// through a track reference of type `dependency_type`.
#[derive(Debug)]
pub struct LayeredVideoRepresentation {
    base: Box<dyn MediaTrack>,
    enhancement: Box<dyn MediaTrack>,
    bandwidth: u64,
    samples_per_fragment: usize,
    dependency_type: FourCC,
}

impl LayeredVideoRepresentation {
    pub fn new(
        base: Box<dyn MediaTrack>,
        enhancement: Box<dyn MediaTrack>,
        bandwidth: u64,
        samples_per_fragment: usize,
        dependency_type: FourCC,
    ) -> Self {
        Self {
            base,
            enhancement,
            bandwidth,
            samples_per_fragment,
            dependency_type,
        }
    }

    pub fn base(&self) -> &dyn MediaTrack {
        self.base.as_ref()
    }

    pub fn enhancement(&self) -> &dyn MediaTrack {
        self.enhancement.as_ref()
    }
}

impl Representation for LayeredVideoRepresentation {
    fn primary_track(&self) -> &dyn MediaTrack {
        self.base.as_ref()
    }

    fn tracks(&self) -> Vec<&dyn MediaTrack> {
        vec![self.base.as_ref(), self.enhancement.as_ref()]
    }

    fn bandwidth(&self) -> u64 {
        self.bandwidth
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            samples_per_fragment: self.samples_per_fragment,
            dependency_type: Some(self.dependency_type),
        }
    }

    fn codecs(&self) -> String {
        join_codecs(
            self.tracks()
                .into_iter()
                .map(|t| codec_string(t.codec_tag(), &t.sample_entry())),
        )
    }
}
