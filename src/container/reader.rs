//! MP4 reader - extracts track metadata and sample tables from `moov`.
//!
//! Only the movie box is loaded into memory; media data stays on disk and is
//! read sample by sample when a representation is written.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;

use super::isobmff::{find_box, find_path, iter_boxes, FieldReader};
use super::sample_table::read_sample_table;
use super::track::{FourCC, Mp4Track, SourceFile};
use crate::error::{ContainerError, Result};

/// Locate the top-level `moov` box and return its payload.
fn read_moov(file: &mut File, path: &Path) -> Result<Vec<u8>> {
    let file_len = file.metadata()?.len();
    let mut pos = 0u64;

    while pos + 8 <= file_len {
        file.seek(SeekFrom::Start(pos))?;
        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let size32 = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let box_type = [header[4], header[5], header[6], header[7]];

        let (header_len, size) = match size32 {
            0 => (8, file_len - pos),
            1 => {
                let mut large = [0u8; 8];
                file.read_exact(&mut large)?;
                (16, u64::from_be_bytes(large))
            }
            n => (8, n as u64),
        };
        let end = match pos.checked_add(size) {
            Some(end) if size >= header_len && end <= file_len => end,
            _ => return Err(ContainerError::InvalidBoxSize { offset: pos, size }.into()),
        };

        if &box_type == b"moov" {
            let mut payload = vec![0u8; (size - header_len) as usize];
            file.read_exact(&mut payload)?;
            return Ok(payload);
        }
        pos = end;
    }

    Err(ContainerError::MissingMoov(path.display().to_string()).into())
}

/// Unpack the ISO-639-2/T code stored in `mdhd`.
fn decode_language(packed: u16) -> String {
    let chars = [
        ((packed >> 10) & 0x1f) as u8 + 0x60,
        ((packed >> 5) & 0x1f) as u8 + 0x60,
        (packed & 0x1f) as u8 + 0x60,
    ];
    if chars.iter().all(|c| c.is_ascii_lowercase()) {
        String::from_utf8_lossy(&chars).into_owned()
    } else {
        "und".to_string()
    }
}

struct TrackHeader {
    track_id: u32,
    width: u32,
    height: u32,
}

fn parse_tkhd(tkhd: &[u8]) -> std::result::Result<TrackHeader, ContainerError> {
    let mut r = FieldReader::new(tkhd, "tkhd");
    let (version, _) = r.full_box_header()?;
    if version == 1 {
        r.skip(16)?;
    } else {
        r.skip(8)?;
    }
    let track_id = r.u32()?;
    r.skip(4)?;
    r.skip(if version == 1 { 8 } else { 4 })?;
    // reserved, layer, alternate_group, volume, reserved, matrix
    r.skip(8 + 2 + 2 + 2 + 2 + 36)?;
    let width = r.u32()? >> 16;
    let height = r.u32()? >> 16;
    Ok(TrackHeader {
        track_id,
        width,
        height,
    })
}

struct MediaHeader {
    timescale: u32,
    duration: u64,
    language: String,
}

fn parse_mdhd(mdhd: &[u8]) -> std::result::Result<MediaHeader, ContainerError> {
    let mut r = FieldReader::new(mdhd, "mdhd");
    let (version, _) = r.full_box_header()?;
    let (timescale, duration) = if version == 1 {
        r.skip(16)?;
        (r.u32()?, r.u64()?)
    } else {
        r.skip(8)?;
        (r.u32()?, r.u32()? as u64)
    };
    let language = decode_language(r.u16()?);
    Ok(MediaHeader {
        timescale,
        duration,
        language,
    })
}

fn parse_hdlr(hdlr: &[u8]) -> std::result::Result<FourCC, ContainerError> {
    let mut r = FieldReader::new(hdlr, "hdlr");
    r.full_box_header()?;
    r.skip(4)?;
    Ok(FourCC(r.fourcc()?))
}

/// First sample entry of `stsd`, header included.
fn first_sample_entry(stsd: &[u8]) -> std::result::Result<&[u8], ContainerError> {
    let mut r = FieldReader::new(stsd, "stsd");
    r.full_box_header()?;
    let count = r.u32()?;
    if count == 0 {
        return Err(ContainerError::MissingBox {
            parent: "stsd",
            child: "sample entry",
        });
    }
    let entries = r.rest();
    let mut header = FieldReader::new(entries, "stsd");
    let size = header.u32()? as usize;
    if size < 8 || size > entries.len() {
        return Err(ContainerError::Truncated("stsd"));
    }
    Ok(&entries[..size])
}

/// Width/height fields of a visual sample entry.
fn visual_entry_dimensions(entry: &[u8]) -> Option<(u32, u32)> {
    let mut r = FieldReader::new(entry.get(8..)?, "sample entry");
    r.skip(24).ok()?;
    let width = r.u16().ok()? as u32;
    let height = r.u16().ok()? as u32;
    Some((width, height))
}

fn missing(parent: &'static str, child: &'static str) -> ContainerError {
    ContainerError::MissingBox { parent, child }
}

fn parse_trak(trak: &[u8], source: &SourceFile) -> Result<Mp4Track> {
    let tkhd = find_box(trak, b"tkhd").ok_or_else(|| missing("trak", "tkhd"))?;
    let mdia = find_box(trak, b"mdia").ok_or_else(|| missing("trak", "mdia"))?;
    let mdhd = find_box(mdia, b"mdhd").ok_or_else(|| missing("mdia", "mdhd"))?;
    let hdlr = find_box(mdia, b"hdlr").ok_or_else(|| missing("mdia", "hdlr"))?;
    let stbl = find_path(mdia, &[b"minf", b"stbl"]).ok_or_else(|| missing("minf", "stbl"))?;
    let stsd = find_box(stbl, b"stsd").ok_or_else(|| missing("stbl", "stsd"))?;

    let header = parse_tkhd(tkhd)?;
    let media = parse_mdhd(mdhd)?;
    let handler = parse_hdlr(hdlr)?;
    let entry = first_sample_entry(stsd)?;
    let codec_tag = FourCC([entry[4], entry[5], entry[6], entry[7]]);
    let samples = read_sample_table(stbl)?;

    let dimensions = if handler == FourCC::VIDE {
        if header.width > 0 && header.height > 0 {
            Some((header.width, header.height))
        } else {
            visual_entry_dimensions(entry)
        }
    } else {
        None
    };

    Ok(Mp4Track {
        track_id: header.track_id,
        codec_tag,
        handler,
        duration: media.duration,
        timescale: media.timescale,
        language: media.language,
        dimensions,
        sample_entry: Bytes::copy_from_slice(entry),
        samples,
        source: source.clone(),
    })
}

/// Open an MP4 file and return its tracks in `moov` order.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Vec<Mp4Track>> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let moov = read_moov(&mut file, path)?;
    let source = SourceFile::new(path, file);

    let mut tracks = Vec::new();
    for (btype, payload) in iter_boxes(&moov) {
        if btype != b"trak" {
            continue;
        }
        let track = parse_trak(payload, &source)?;
        tracks.push(track);
    }

    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_language() {
        // 'e' = 5, 'n' = 14, 'g' = 7
        let packed = (5 << 10) | (14 << 5) | 7;
        assert_eq!(decode_language(packed), "eng");
        assert_eq!(decode_language(0), "und");
    }

    #[test]
    fn test_open_missing_file() {
        let err = open("/nonexistent/input.mp4").unwrap_err();
        assert!(matches!(err, crate::error::PackagerError::Io(_)));
    }

    #[test]
    fn test_open_file_without_moov() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        std::fs::write(&path, [0, 0, 0, 16, b'f', b't', b'y', b'p', b'i', b's', b'o', b'6', 0, 0, 0, 0])
            .unwrap();
        let err = open(&path).unwrap_err();
        assert!(matches!(
            err,
            crate::error::PackagerError::Container(ContainerError::MissingMoov(_))
        ));
    }

    fn corrupt_large_box(box_type: &[u8; 4]) -> Vec<u8> {
        let mut data = vec![0, 0, 0, 8, b'f', b'r', b'e', b'e', 0, 0, 0, 1];
        data.extend_from_slice(box_type);
        data.extend_from_slice(&u64::MAX.to_be_bytes());
        data
    }

    #[test]
    fn test_overflowing_top_level_box_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.mp4");
        std::fs::write(&path, corrupt_large_box(b"mdat")).unwrap();
        let err = open(&path).unwrap_err();
        assert!(matches!(
            err,
            crate::error::PackagerError::Container(ContainerError::InvalidBoxSize {
                offset: 8,
                size: u64::MAX
            })
        ));
    }

    #[test]
    fn test_overflowing_box_inside_moov_is_not_a_track() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.mp4");
        let payload = corrupt_large_box(b"trak");
        let mut data = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&payload);
        std::fs::write(&path, data).unwrap();
        assert!(open(&path).unwrap().is_empty());
    }
}
