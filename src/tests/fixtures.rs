//! Test fixtures
//!
//! Synthesizes small progressive MP4 files (ftyp, mdat, moov) with HEVC base
//! layer, Dolby Vision enhancement layer and AAC tracks, so the whole
//! pipeline can run without checked-in media.

use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};

use crate::container::isobmff::{write_box, write_full_box};

/// Description of one track of a fixture file.
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub codec: [u8; 4],
    pub handler: [u8; 4],
    pub timescale: u32,
    pub sample_duration: u32,
    pub sample_count: u32,
    /// ISO-639-2/T code
    pub language: &'static str,
    /// Every n-th sample is a sync sample
    pub sync_every: u32,
    /// Distinguishes the payload bytes of otherwise identical tracks
    pub seed: u8,
}

impl TrackSpec {
    /// HEVC base layer: 10 s at timescale 1000 (10000 units)
    pub fn base_layer() -> Self {
        Self {
            codec: *b"hvc1",
            handler: *b"vide",
            timescale: 1000,
            sample_duration: 400,
            sample_count: 25,
            language: "und",
            sync_every: 12,
            seed: 1,
        }
    }

    /// Dolby Vision enhancement layer with the base layer's timing
    pub fn enhancement_layer() -> Self {
        Self {
            codec: *b"dvhe",
            seed: 2,
            ..Self::base_layer()
        }
    }

    /// AAC, 8 s at 48 kHz
    pub fn audio(language: &'static str) -> Self {
        Self {
            codec: *b"mp4a",
            handler: *b"soun",
            timescale: 48_000,
            sample_duration: 1024,
            sample_count: 375,
            language,
            sync_every: 1,
            seed: 3,
        }
    }

    pub fn with_duration(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn duration(&self) -> u64 {
        self.sample_count as u64 * self.sample_duration as u64
    }

    pub fn is_video(&self) -> bool {
        &self.handler == b"vide"
    }

    /// Sample payload. Video samples are a single length-prefixed NAL unit.
    pub fn payload(&self, index: u32) -> Vec<u8> {
        let fill = self.seed.wrapping_mul(31).wrapping_add(index as u8);
        if self.is_video() {
            let nal_len = 60 + (index % 7) as usize;
            let mut out = Vec::with_capacity(4 + nal_len);
            out.extend_from_slice(&(nal_len as u32).to_be_bytes());
            out.extend_from_slice(&[0x02, 0x01]);
            out.extend((0..nal_len - 2).map(|i| fill.wrapping_add(i as u8)));
            out
        } else {
            (0..24).map(|i| fill.wrapping_add(i as u8)).collect()
        }
    }

    fn sample_entry(&self, buf: &mut BytesMut) {
        if self.is_video() {
            write_box(buf, &self.codec, |b| {
                b.put_slice(&[0u8; 6]);
                b.put_u16(1);
                b.put_slice(&[0u8; 16]);
                b.put_u16(1920);
                b.put_u16(1080);
                b.put_u32(0x0048_0000);
                b.put_u32(0x0048_0000);
                b.put_u32(0);
                b.put_u16(1);
                b.put_slice(&[0u8; 32]);
                b.put_u16(0x0018);
                b.put_i16(-1);
                write_box(b, b"hvcC", |b| {
                    b.put_slice(&[1, 0x01, 0x60, 0, 0, 0, 0x90, 0, 0, 0, 0, 0, 93]);
                    b.put_slice(&[0xf0, 0x00, 0xfc, 0xfd, 0xf8, 0xf8, 0, 0, 0x0f, 0]);
                });
                if &self.codec == b"dvhe" {
                    write_box(b, b"dvcC", |b| {
                        let bits: u16 = (8 << 9) | (6 << 3) | 0x05;
                        b.put_slice(&[1, 0]);
                        b.put_u16(bits);
                        b.put_slice(&[0u8; 20]);
                    });
                }
            });
        } else {
            write_box(buf, &self.codec, |b| {
                b.put_slice(&[0u8; 6]);
                b.put_u16(1);
                b.put_slice(&[0u8; 8]);
                b.put_u16(2);
                b.put_u16(16);
                b.put_u32(0);
                b.put_u32(self.timescale << 16);
                write_full_box(b, b"esds", 0, 0, |b| {
                    b.put_slice(&[0x03, 0x19, 0x00, 0x01, 0x00]);
                    b.put_slice(&[0x04, 0x11, 0x40, 0x15]);
                    b.put_slice(&[0u8; 11]);
                    b.put_slice(&[0x05, 0x02, 0x11, 0x90]);
                });
            });
        }
    }
}

fn pack_language(language: &str) -> u16 {
    language
        .bytes()
        .take(3)
        .fold(0u16, |acc, c| (acc << 5) | (c.saturating_sub(0x60) & 0x1f) as u16)
}

fn write_trak(buf: &mut BytesMut, spec: &TrackSpec, track_id: u32, offsets: &[u64]) {
    let duration = spec.duration() as u32;
    write_box(buf, b"trak", |b| {
        write_full_box(b, b"tkhd", 0, 3, |b| {
            b.put_u32(0);
            b.put_u32(0);
            b.put_u32(track_id);
            b.put_u32(0);
            b.put_u32(duration);
            b.put_u64(0);
            b.put_u32(0);
            b.put_u16(if spec.is_video() { 0 } else { 0x0100 });
            b.put_u16(0);
            for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
                b.put_u32(v);
            }
            let (w, h) = if spec.is_video() { (1920, 1080) } else { (0, 0) };
            b.put_u32(w << 16);
            b.put_u32(h << 16);
        });
        write_box(b, b"mdia", |b| {
            write_full_box(b, b"mdhd", 0, 0, |b| {
                b.put_u32(0);
                b.put_u32(0);
                b.put_u32(spec.timescale);
                b.put_u32(duration);
                b.put_u16(pack_language(spec.language));
                b.put_u16(0);
            });
            write_full_box(b, b"hdlr", 0, 0, |b| {
                b.put_u32(0);
                b.put_slice(&spec.handler);
                b.put_slice(&[0u8; 12]);
                b.put_slice(b"fixture\0");
            });
            write_box(b, b"minf", |b| {
                write_box(b, b"stbl", |b| {
                    write_full_box(b, b"stsd", 0, 0, |b| {
                        b.put_u32(1);
                        spec.sample_entry(b);
                    });
                    write_full_box(b, b"stts", 0, 0, |b| {
                        b.put_u32(1);
                        b.put_u32(spec.sample_count);
                        b.put_u32(spec.sample_duration);
                    });
                    if spec.sync_every > 1 {
                        let syncs: Vec<u32> = (0..spec.sample_count)
                            .filter(|i| i % spec.sync_every == 0)
                            .map(|i| i + 1)
                            .collect();
                        write_full_box(b, b"stss", 0, 0, |b| {
                            b.put_u32(syncs.len() as u32);
                            for s in &syncs {
                                b.put_u32(*s);
                            }
                        });
                    }
                    write_full_box(b, b"stsc", 0, 0, |b| {
                        b.put_u32(1);
                        b.put_u32(1);
                        b.put_u32(1);
                        b.put_u32(1);
                    });
                    write_full_box(b, b"stsz", 0, 0, |b| {
                        b.put_u32(0);
                        b.put_u32(spec.sample_count);
                        for i in 0..spec.sample_count {
                            b.put_u32(spec.payload(i).len() as u32);
                        }
                    });
                    write_full_box(b, b"stco", 0, 0, |b| {
                        b.put_u32(offsets.len() as u32);
                        for &o in offsets {
                            b.put_u32(o as u32);
                        }
                    });
                });
            });
        });
    });
}

/// Build a progressive MP4 holding `tracks` (one sample per chunk).
pub fn build_mp4(tracks: &[TrackSpec]) -> Vec<u8> {
    let mut out = BytesMut::new();
    write_box(&mut out, b"ftyp", |b| {
        b.put_slice(b"isom");
        b.put_u32(0x200);
        b.put_slice(b"isom");
        b.put_slice(b"mp41");
    });

    let mut payload = Vec::new();
    let mut offsets: Vec<Vec<u64>> = Vec::new();
    let mdat_data_start = out.len() as u64 + 8;
    for spec in tracks {
        let mut track_offsets = Vec::new();
        for i in 0..spec.sample_count {
            track_offsets.push(mdat_data_start + payload.len() as u64);
            payload.extend_from_slice(&spec.payload(i));
        }
        offsets.push(track_offsets);
    }
    write_box(&mut out, b"mdat", |b| b.put_slice(&payload));

    let movie_duration = tracks
        .iter()
        .map(|t| t.duration() * 1000 / t.timescale as u64)
        .max()
        .unwrap_or(0);
    write_box(&mut out, b"moov", |b| {
        write_full_box(b, b"mvhd", 0, 0, |b| {
            b.put_u32(0);
            b.put_u32(0);
            b.put_u32(1000);
            b.put_u32(movie_duration as u32);
            b.put_u32(0x0001_0000);
            b.put_u16(0x0100);
            b.put_slice(&[0u8; 10]);
            for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
                b.put_u32(v);
            }
            b.put_slice(&[0u8; 24]);
            b.put_u32(tracks.len() as u32 + 1);
        });
        for (i, spec) in tracks.iter().enumerate() {
            write_trak(b, spec, i as u32 + 1, &offsets[i]);
        }
    });

    out.to_vec()
}

/// Write a fixture file named `name` into `dir`.
pub fn write_mp4(dir: &Path, name: &str, tracks: &[TrackSpec]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_mp4(tracks)).expect("write fixture");
    path
}

/// Base layer, enhancement layer and audio in one file.
pub fn layered_with_audio(dir: &Path, name: &str, language: &'static str) -> PathBuf {
    write_mp4(
        dir,
        name,
        &[
            TrackSpec::base_layer(),
            TrackSpec::enhancement_layer(),
            TrackSpec::audio(language),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{open, FourCC, MediaTrack};

    #[test]
    fn test_fixture_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = layered_with_audio(dir.path(), "in.mp4", "eng");
        let tracks = open(&path).unwrap();
        assert_eq!(tracks.len(), 3);

        let base = &tracks[0];
        assert_eq!(base.codec_tag(), FourCC(*b"hvc1"));
        assert_eq!(base.handler(), FourCC::VIDE);
        assert_eq!(base.duration(), 10_000);
        assert_eq!(base.timescale(), 1000);
        assert_eq!(base.duration_secs(), 10.0);
        assert_eq!(base.dimensions(), Some((1920, 1080)));
        assert_eq!(base.samples().len(), 25);
        assert_eq!(base.samples().iter().filter(|s| s.is_sync).count(), 3);

        assert_eq!(tracks[1].codec_tag(), FourCC(*b"dvhe"));
        assert_eq!(tracks[2].handler(), FourCC::SOUN);
        assert_eq!(tracks[2].language(), "eng");

        let spec = TrackSpec::enhancement_layer();
        assert_eq!(tracks[1].read_sample(5).unwrap().data.as_ref(), spec.payload(5).as_slice());
    }
}
