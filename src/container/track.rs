//! Track model shared by the reader, the encryption adapter and the writer.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::crypto::SampleEncryption;
use crate::error::{ContainerError, Result};

/// Four character code (box types, codec tags, handler types).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const VIDE: FourCC = FourCC(*b"vide");
    pub const SOUN: FourCC = FourCC(*b"soun");

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(value: &[u8; 4]) -> Self {
        FourCC(*value)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({})", self)
    }
}

/// Where a sample lives and how it is timed, in track timescale units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    pub offset: u64,
    pub size: u32,
    pub decode_time: u64,
    pub duration: u32,
    pub composition_offset: i32,
    pub is_sync: bool,
}

/// A sample payload ready to be written.
#[derive(Debug, Clone)]
pub struct Sample {
    pub data: Bytes,
    /// IV and subsample layout when the payload is encrypted
    pub encryption: Option<SampleEncryption>,
}

/// An elementary track as seen by the packaging pipeline.
///
/// Implemented by file-backed tracks and by the encryption adapter, which
/// wraps another track and is otherwise indistinguishable from it.
pub trait MediaTrack: fmt::Debug + Send + Sync {
    fn track_id(&self) -> u32;

    /// Codec tag: the type of the first sample entry (`hvc1`, `dvhe`, `mp4a`, ...)
    fn codec_tag(&self) -> FourCC;

    /// Handler category from `hdlr` (`vide`, `soun`, ...)
    fn handler(&self) -> FourCC;

    /// Duration in timescale units
    fn duration(&self) -> u64;

    fn timescale(&self) -> u32;

    /// ISO-639-2/T language code, `und` when unset
    fn language(&self) -> &str;

    /// Presentation width/height in pixels (video only)
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Complete sample entry box as it must appear in `stsd`
    fn sample_entry(&self) -> Bytes;

    fn samples(&self) -> &[SampleInfo];

    /// Sample payload as it must be written (possibly encrypted)
    fn read_sample(&self, index: usize) -> Result<Sample>;

    /// Default key id, when the track is protected
    fn key_id(&self) -> Option<[u8; 16]> {
        None
    }

    fn duration_secs(&self) -> f64 {
        if self.timescale() == 0 {
            0.0
        } else {
            self.duration() as f64 / self.timescale() as f64
        }
    }
}

/// Shared, lazily read handle on a source file.
#[derive(Clone)]
pub(crate) struct SourceFile {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl SourceFile {
    pub(crate) fn new(path: &Path, file: File) -> Self {
        Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        }
    }

    pub(crate) fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SourceFile").field(&self.path).finish()
    }
}

/// A track of an on-disk MP4 file. Samples are read on demand.
#[derive(Debug, Clone)]
pub struct Mp4Track {
    pub(crate) track_id: u32,
    pub(crate) codec_tag: FourCC,
    pub(crate) handler: FourCC,
    pub(crate) duration: u64,
    pub(crate) timescale: u32,
    pub(crate) language: String,
    pub(crate) dimensions: Option<(u32, u32)>,
    pub(crate) sample_entry: Bytes,
    pub(crate) samples: Vec<SampleInfo>,
    pub(crate) source: SourceFile,
}

impl MediaTrack for Mp4Track {
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
        self.dimensions
    }

    fn sample_entry(&self) -> Bytes {
        self.sample_entry.clone()
    }

    fn samples(&self) -> &[SampleInfo] {
        &self.samples
    }

    fn read_sample(&self, index: usize) -> Result<Sample> {
        let info = self
            .samples
            .get(index)
            .ok_or(ContainerError::SampleOutOfRange {
                track_id: self.track_id,
                index,
            })?;
        let data = self.source.read_at(info.offset, info.size as usize)?;
        Ok(Sample {
            data: Bytes::from(data),
            encryption: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_display() {
        assert_eq!(FourCC(*b"hvc1").to_string(), "hvc1");
        assert_eq!(FourCC([b'a', 0, b'c', b'd']).to_string(), "a\\x00cd");
        assert_eq!(FourCC::from(b"soun"), FourCC::SOUN);
    }
}
