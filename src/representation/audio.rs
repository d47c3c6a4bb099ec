use super::Representation;
use crate::container::{MediaTrack, WriteOptions};

/// A single audio track.
#[derive(Debug)]
pub struct AudioRepresentation {
    track: Box<dyn MediaTrack>,
    bandwidth: u64,
    samples_per_fragment: usize,
}

impl AudioRepresentation {
    pub fn new(track: Box<dyn MediaTrack>, bandwidth: u64, samples_per_fragment: usize) -> Self {
        Self {
            track,
            bandwidth,
            samples_per_fragment,
        }
    }
}

impl Representation for AudioRepresentation {
    fn primary_track(&self) -> &dyn MediaTrack {
        self.track.as_ref()
    }

    fn tracks(&self) -> Vec<&dyn MediaTrack> {
        vec![self.track.as_ref()]
    }

    fn bandwidth(&self) -> u64 {
        self.bandwidth
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            samples_per_fragment: self.samples_per_fragment,
            dependency_type: None,
        }
    }
}
