//! Fragmented MP4 writer for the DASH on-demand profile.
//!
//! File layout: `ftyp`, `moov` (with `mvex`), one `sidx` indexing every
//! fragment, then a `moof`/`mdat` pair per fragment. The first track is the
//! primary track: it drives fragment boundaries and the `sidx` timescale.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;

use bytes::{BufMut, BytesMut};
use tracing::debug;

use super::isobmff::{write_box, write_full_box, write_mdat_header};
use super::track::{FourCC, MediaTrack, Sample, SampleInfo};
use crate::crypto::common_pssh;
use crate::error::{ContainerError, PackagerError, Result};

const MOVIE_TIMESCALE: u32 = 1000;

const SYNC_SAMPLE_FLAGS: u32 = 0x0200_0000;
const NON_SYNC_SAMPLE_FLAGS: u32 = 0x0101_0000;

const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;
// data-offset, duration, size, flags, composition time offset
const TRUN_FLAGS: u32 = 0x0001 | 0x0100 | 0x0200 | 0x0400 | 0x0800;
const SENC_USE_SUBSAMPLES: u32 = 0x2;

const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Per-representation writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Primary-track samples per fragment (video cuts move to the next sync sample)
    pub samples_per_fragment: usize,
    /// Track reference type linking every secondary track to the primary one
    pub dependency_type: Option<FourCC>,
}

/// Byte ranges of a written file, as advertised in the manifest `SegmentBase`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenRepresentation {
    /// Inclusive range of `ftyp` + `moov`
    pub init_range: (u64, u64),
    /// Inclusive range of the `sidx` box
    pub index_range: (u64, u64),
    pub fragment_count: usize,
    pub file_size: u64,
}

/// Sample index ranges making up one fragment, one range per track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentPlan {
    pub ranges: Vec<Range<usize>>,
}

fn rescale(value: u64, from: u32, to: u32) -> u64 {
    if from == 0 {
        return 0;
    }
    (value as u128 * to as u128 / from as u128) as u64
}

fn primary_cuts(samples: &[SampleInfo], per_fragment: usize, align_to_sync: bool) -> Vec<Range<usize>> {
    let per_fragment = per_fragment.max(1);
    let mut cuts = Vec::new();
    let mut start = 0;
    while start < samples.len() {
        let mut end = (start + per_fragment).min(samples.len());
        if align_to_sync {
            while end < samples.len() && !samples[end].is_sync {
                end += 1;
            }
        }
        cuts.push(start..end);
        start = end;
    }
    cuts
}

/// Split the tracks into fragments.
///
/// The primary track is cut every `samples_per_fragment` samples; for video
/// the cut moves forward to the next sync sample. Samples of the other tracks
/// land in the fragment whose time span contains their decode time.
pub fn plan_fragments(
    tracks: &[&dyn MediaTrack],
    samples_per_fragment: usize,
) -> Result<Vec<FragmentPlan>> {
    let Some((primary, others)) = tracks.split_first() else {
        return Ok(Vec::new());
    };
    if let Some(track) = tracks.iter().find(|t| t.timescale() == 0) {
        return Err(ContainerError::SampleTable(format!(
            "track {} has a zero timescale",
            track.track_id()
        ))
        .into());
    }

    let primary_samples = primary.samples();
    if primary_samples.is_empty() {
        if let Some(track) = others.iter().find(|t| !t.samples().is_empty()) {
            return Err(ContainerError::SampleTable(format!(
                "track {} has samples but primary track {} has none",
                track.track_id(),
                primary.track_id()
            ))
            .into());
        }
    }
    let cuts = primary_cuts(
        primary_samples,
        samples_per_fragment,
        primary.handler() == FourCC::VIDE,
    );
    let starts: Vec<u64> = cuts
        .iter()
        .map(|r| primary_samples[r.start].decode_time)
        .collect();
    let mut plans: Vec<FragmentPlan> = cuts
        .into_iter()
        .map(|r| FragmentPlan { ranges: vec![r] })
        .collect();

    for other in others {
        let samples = other.samples();
        let mut pos = 0;
        for (i, plan) in plans.iter_mut().enumerate() {
            let begin = pos;
            match starts.get(i + 1) {
                Some(&limit) => {
                    while pos < samples.len()
                        && rescale(samples[pos].decode_time, other.timescale(), primary.timescale())
                            < limit
                    {
                        pos += 1;
                    }
                }
                None => pos = samples.len(),
            }
            plan.ranges.push(begin..pos);
        }
    }

    Ok(plans)
}

fn encode_language(language: &str) -> u16 {
    let bytes = language.as_bytes();
    if bytes.len() == 3 && bytes.iter().all(|c| c.is_ascii_lowercase()) {
        bytes
            .iter()
            .fold(0u16, |acc, &c| (acc << 5) | (c - 0x60) as u16)
    } else {
        encode_language("und")
    }
}

fn write_matrix(b: &mut BytesMut) {
    for value in UNITY_MATRIX {
        b.put_u32(value);
    }
}

fn write_mvhd(b: &mut BytesMut, duration: u64, next_track_id: u32) {
    write_full_box(b, b"mvhd", 1, 0, |b| {
        b.put_u64(0);
        b.put_u64(0);
        b.put_u32(MOVIE_TIMESCALE);
        b.put_u64(duration);
        b.put_u32(0x0001_0000);
        b.put_u16(0x0100);
        b.put_slice(&[0u8; 10]);
        write_matrix(b);
        b.put_slice(&[0u8; 24]);
        b.put_u32(next_track_id);
    });
}

fn write_trak(b: &mut BytesMut, track: &dyn MediaTrack, track_id: u32, depends_on: Option<(FourCC, u32)>) {
    let handler = track.handler();
    let (width, height) = track.dimensions().unwrap_or((0, 0));
    let movie_duration = rescale(track.duration(), track.timescale(), MOVIE_TIMESCALE);

    write_box(b, b"trak", |b| {
        write_full_box(b, b"tkhd", 0, 0x3, |b| {
            b.put_u32(0);
            b.put_u32(0);
            b.put_u32(track_id);
            b.put_u32(0);
            b.put_u32(movie_duration.min(u32::MAX as u64) as u32);
            b.put_u64(0);
            b.put_u16(0);
            b.put_u16(0);
            b.put_u16(if handler == FourCC::SOUN { 0x0100 } else { 0 });
            b.put_u16(0);
            write_matrix(b);
            b.put_u32(width << 16);
            b.put_u32(height << 16);
        });

        if let Some((reference_type, target)) = depends_on {
            write_box(b, b"tref", |b| {
                write_box(b, reference_type.as_bytes(), |b| b.put_u32(target));
            });
        }

        write_box(b, b"mdia", |b| {
            write_full_box(b, b"mdhd", 0, 0, |b| {
                b.put_u32(0);
                b.put_u32(0);
                b.put_u32(track.timescale());
                b.put_u32(track.duration().min(u32::MAX as u64) as u32);
                b.put_u16(encode_language(track.language()));
                b.put_u16(0);
            });
            write_full_box(b, b"hdlr", 0, 0, |b| {
                b.put_u32(0);
                b.put_slice(handler.as_bytes());
                b.put_slice(&[0u8; 12]);
                let name: &[u8] = match handler.as_bytes() {
                    b"vide" => b"VideoHandler\0",
                    b"soun" => b"SoundHandler\0",
                    _ => b"\0",
                };
                b.put_slice(name);
            });
            write_box(b, b"minf", |b| {
                match handler.as_bytes() {
                    b"vide" => write_full_box(b, b"vmhd", 0, 1, |b| b.put_slice(&[0u8; 8])),
                    b"soun" => write_full_box(b, b"smhd", 0, 0, |b| b.put_u32(0)),
                    _ => write_full_box(b, b"nmhd", 0, 0, |_| {}),
                }
                write_box(b, b"dinf", |b| {
                    write_full_box(b, b"dref", 0, 0, |b| {
                        b.put_u32(1);
                        write_full_box(b, b"url ", 0, 1, |_| {});
                    });
                });
                write_box(b, b"stbl", |b| {
                    write_full_box(b, b"stsd", 0, 0, |b| {
                        b.put_u32(1);
                        b.put_slice(&track.sample_entry());
                    });
                    write_full_box(b, b"stts", 0, 0, |b| b.put_u32(0));
                    write_full_box(b, b"stsc", 0, 0, |b| b.put_u32(0));
                    write_full_box(b, b"stsz", 0, 0, |b| b.put_u64(0));
                    write_full_box(b, b"stco", 0, 0, |b| b.put_u32(0));
                });
            });
        });
    });
}

/// `ftyp` + `moov` of a fragmented file holding `tracks`.
pub fn build_init_segment(tracks: &[&dyn MediaTrack], dependency_type: Option<FourCC>) -> BytesMut {
    let movie_duration = tracks
        .iter()
        .map(|t| rescale(t.duration(), t.timescale(), MOVIE_TIMESCALE))
        .max()
        .unwrap_or(0);
    let mut key_ids: Vec<[u8; 16]> = Vec::new();
    for kid in tracks.iter().filter_map(|t| t.key_id()) {
        if !key_ids.contains(&kid) {
            key_ids.push(kid);
        }
    }

    let mut buf = BytesMut::new();
    write_box(&mut buf, b"ftyp", |b| {
        b.put_slice(b"iso6");
        b.put_u32(0);
        for brand in [b"isom", b"iso6", b"dash"] {
            b.put_slice(brand);
        }
    });
    write_box(&mut buf, b"moov", |b| {
        write_mvhd(b, movie_duration, tracks.len() as u32 + 1);
        for (i, track) in tracks.iter().enumerate() {
            let depends_on = match dependency_type {
                Some(reference_type) if i > 0 => Some((reference_type, 1)),
                _ => None,
            };
            write_trak(b, *track, i as u32 + 1, depends_on);
        }
        write_box(b, b"mvex", |b| {
            write_full_box(b, b"mehd", 1, 0, |b| b.put_u64(movie_duration));
            for i in 0..tracks.len() {
                write_full_box(b, b"trex", 0, 0, |b| {
                    b.put_u32(i as u32 + 1);
                    b.put_u32(1);
                    b.put_u32(0);
                    b.put_u32(0);
                    b.put_u32(0);
                });
            }
        });
        if !key_ids.is_empty() {
            b.put_slice(&common_pssh(&key_ids));
        }
    });
    buf
}

/// Samples of one track inside one fragment.
struct TrackRun {
    track_id: u32,
    base_decode_time: u64,
    entries: Vec<(SampleInfo, Sample)>,
    /// `saiz` entry per sample when the track is encrypted
    aux_sizes: Option<Vec<u8>>,
}

impl TrackRun {
    fn payload_len(&self) -> u64 {
        self.entries.iter().map(|(_, s)| s.data.len() as u64).sum()
    }

    fn uses_subsamples(&self) -> bool {
        self.entries.iter().any(|(_, s)| {
            s.encryption
                .as_ref()
                .is_some_and(|e| !e.subsamples.is_empty())
        })
    }
}

fn collect_run(track: &dyn MediaTrack, track_id: u32, range: Range<usize>) -> Result<TrackRun> {
    let infos = track.samples();
    let base_decode_time = infos.get(range.start).map_or(0, |s| s.decode_time);
    let mut entries = Vec::with_capacity(range.len());
    for index in range {
        let info = *infos.get(index).ok_or(ContainerError::SampleOutOfRange {
            track_id: track.track_id(),
            index,
        })?;
        entries.push((info, track.read_sample(index)?));
    }

    let mut run = TrackRun {
        track_id,
        base_decode_time,
        entries,
        aux_sizes: None,
    };
    if track.key_id().is_some() {
        let subsample_entries = run.uses_subsamples();
        let mut sizes = Vec::with_capacity(run.entries.len());
        for (_, sample) in &run.entries {
            let encryption = sample.encryption.as_ref().ok_or_else(|| {
                PackagerError::Encryption(format!(
                    "track {} produced a clear sample",
                    track.track_id()
                ))
            })?;
            let size = u8::try_from(encryption.aux_info_size(subsample_entries)).map_err(|_| {
                PackagerError::Encryption(format!(
                    "too many subsamples in a sample of track {}",
                    track.track_id()
                ))
            })?;
            sizes.push(size);
        }
        run.aux_sizes = Some(sizes);
    }
    Ok(run)
}

/// `saiz`, `saio` and `senc` of an encrypted run. Records where the `saio`
/// offset field is and where the first `senc` entry starts.
fn write_sample_encryption(
    b: &mut BytesMut,
    run: &TrackRun,
    sizes: &[u8],
    saio_fields: &mut Vec<(usize, usize)>,
) {
    let subsample_entries = run.uses_subsamples();
    let uniform = sizes.windows(2).all(|w| w[0] == w[1]);

    write_full_box(b, b"saiz", 0, 0, |b| {
        if uniform {
            b.put_u8(sizes.first().copied().unwrap_or(0));
            b.put_u32(sizes.len() as u32);
        } else {
            b.put_u8(0);
            b.put_u32(sizes.len() as u32);
            b.put_slice(sizes);
        }
    });

    let mut saio_pos = 0;
    write_full_box(b, b"saio", 0, 0, |b| {
        b.put_u32(1);
        saio_pos = b.len();
        b.put_u32(0);
    });

    let flags = if subsample_entries { SENC_USE_SUBSAMPLES } else { 0 };
    let mut first_entry = 0;
    write_full_box(b, b"senc", 0, flags, |b| {
        b.put_u32(run.entries.len() as u32);
        first_entry = b.len();
        for encryption in run.entries.iter().filter_map(|(_, s)| s.encryption.as_ref()) {
            b.put_slice(&encryption.iv);
            if subsample_entries {
                b.put_u16(encryption.subsamples.len() as u16);
                for subsample in &encryption.subsamples {
                    b.put_u16(subsample.clear);
                    b.put_u32(subsample.protected);
                }
            }
        }
    });
    saio_fields.push((saio_pos, first_entry));
}

/// `moof` followed by the `mdat` header for the runs' payloads.
fn build_fragment_header(sequence: u32, runs: &[TrackRun]) -> BytesMut {
    let mut data_offset_fields: Vec<(usize, u64)> = Vec::new();
    let mut saio_fields: Vec<(usize, usize)> = Vec::new();
    let mut payload_len = 0u64;

    let mut buf = BytesMut::new();
    write_box(&mut buf, b"moof", |b| {
        write_full_box(b, b"mfhd", 0, 0, |b| b.put_u32(sequence));
        for run in runs.iter().filter(|r| !r.entries.is_empty()) {
            write_box(b, b"traf", |b| {
                write_full_box(b, b"tfhd", 0, TFHD_DEFAULT_BASE_IS_MOOF, |b| {
                    b.put_u32(run.track_id)
                });
                write_full_box(b, b"tfdt", 1, 0, |b| b.put_u64(run.base_decode_time));
                write_full_box(b, b"trun", 1, TRUN_FLAGS, |b| {
                    b.put_u32(run.entries.len() as u32);
                    data_offset_fields.push((b.len(), payload_len));
                    b.put_i32(0);
                    for (info, sample) in &run.entries {
                        b.put_u32(info.duration);
                        b.put_u32(sample.data.len() as u32);
                        b.put_u32(if info.is_sync {
                            SYNC_SAMPLE_FLAGS
                        } else {
                            NON_SYNC_SAMPLE_FLAGS
                        });
                        b.put_i32(info.composition_offset);
                    }
                });
                if let Some(sizes) = &run.aux_sizes {
                    write_sample_encryption(b, run, sizes, &mut saio_fields);
                }
            });
            payload_len += run.payload_len();
        }
    });

    // Offsets are relative to the start of moof (default-base-is-moof).
    let mdat_header_len = if payload_len + 8 <= u32::MAX as u64 { 8 } else { 16 };
    let moof_len = buf.len() as u64;
    for (pos, offset) in data_offset_fields {
        let value = (moof_len + mdat_header_len + offset) as i32;
        buf[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
    }
    for (pos, target) in saio_fields {
        buf[pos..pos + 4].copy_from_slice(&(target as u32).to_be_bytes());
    }

    write_mdat_header(&mut buf, payload_len);
    buf
}

struct SegmentReference {
    size: u32,
    duration: u32,
    starts_with_sap: bool,
}

fn sidx_len(references: usize) -> usize {
    // header, version/flags, reference id, timescale, ept, first offset,
    // reserved, count, references
    8 + 4 + 4 + 4 + 8 + 8 + 2 + 2 + 12 * references
}

fn build_sidx(timescale: u32, earliest_presentation_time: u64, references: &[SegmentReference]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(sidx_len(references.len()));
    write_full_box(&mut buf, b"sidx", 1, 0, |b| {
        b.put_u32(1);
        b.put_u32(timescale);
        b.put_u64(earliest_presentation_time);
        b.put_u64(0);
        b.put_u16(0);
        b.put_u16(references.len() as u16);
        for reference in references {
            b.put_u32(reference.size & 0x7FFF_FFFF);
            b.put_u32(reference.duration);
            b.put_u32(if reference.starts_with_sap {
                0x9000_0000
            } else {
                0
            });
        }
    });
    buf
}

/// Write `tracks` as one fragmented MP4 file at `path`.
pub fn write(
    tracks: &[&dyn MediaTrack],
    options: &WriteOptions,
    path: &Path,
) -> Result<WrittenRepresentation> {
    let primary = *tracks
        .first()
        .ok_or_else(|| ContainerError::SampleTable("representation has no tracks".to_string()))?;
    let plans = plan_fragments(tracks, options.samples_per_fragment)?;
    if plans.len() > u16::MAX as usize {
        return Err(ContainerError::SampleTable(format!(
            "{} fragments do not fit in one sidx",
            plans.len()
        ))
        .into());
    }

    let init = build_init_segment(tracks, options.dependency_type);
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&init)?;

    // sidx is filled in once fragment sizes are known
    let sidx_start = init.len() as u64;
    let sidx_size = sidx_len(plans.len());
    out.write_all(&vec![0u8; sidx_size])?;

    let primary_samples = primary.samples();
    let mut references = Vec::with_capacity(plans.len());
    for (i, plan) in plans.iter().enumerate() {
        let mut runs = Vec::with_capacity(tracks.len());
        for (t, (track, range)) in tracks.iter().zip(&plan.ranges).enumerate() {
            runs.push(collect_run(*track, t as u32 + 1, range.clone())?);
        }

        let header = build_fragment_header(i as u32 + 1, &runs);
        out.write_all(&header)?;
        let mut size = header.len() as u64;
        for run in &runs {
            for (_, sample) in &run.entries {
                out.write_all(&sample.data)?;
            }
            size += run.payload_len();
        }

        let primary_range = &plan.ranges[0];
        let duration: u64 = primary_samples[primary_range.clone()]
            .iter()
            .map(|s| s.duration as u64)
            .sum();
        references.push(SegmentReference {
            size: u32::try_from(size).map_err(|_| {
                ContainerError::SampleTable(format!("fragment {} exceeds 4 GiB", i + 1))
            })?,
            duration: duration.min(u32::MAX as u64) as u32,
            starts_with_sap: primary_samples[primary_range.start].is_sync,
        });
    }
    let file_size = out.stream_position()?;

    let earliest_presentation_time = primary_samples
        .first()
        .map_or(0, |s| (s.decode_time as i64 + s.composition_offset as i64).max(0) as u64);
    let sidx = build_sidx(primary.timescale(), earliest_presentation_time, &references);
    out.seek(SeekFrom::Start(sidx_start))?;
    out.write_all(&sidx)?;
    out.flush()?;

    debug!(
        path = %path.display(),
        tracks = tracks.len(),
        fragments = references.len(),
        bytes = file_size,
        "wrote fragmented mp4"
    );

    Ok(WrittenRepresentation {
        init_range: (0, sidx_start - 1),
        index_range: (sidx_start, sidx_start + sidx_size as u64 - 1),
        fragment_count: references.len(),
        file_size,
    })
}
