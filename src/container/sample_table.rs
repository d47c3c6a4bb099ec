//! Sample table (`stbl`) decoding.
//!
//! Flattens `stsz`, `stco`/`co64`, `stsc`, `stts`, `ctts` and `stss` into one
//! `SampleInfo` per sample.

use super::isobmff::{find_box, FieldReader};
use super::track::SampleInfo;
use crate::error::ContainerError;

fn missing(child: &'static str) -> ContainerError {
    ContainerError::MissingBox {
        parent: "stbl",
        child,
    }
}

fn read_sizes(stbl: &[u8]) -> Result<Vec<u32>, ContainerError> {
    let stsz = find_box(stbl, b"stsz").ok_or_else(|| missing("stsz"))?;
    let mut r = FieldReader::new(stsz, "stsz");
    r.full_box_header()?;
    let sample_size = r.u32()?;
    let count = r.u32()? as usize;
    if sample_size != 0 {
        return Ok(vec![sample_size; count]);
    }
    if r.remaining() / 4 < count {
        return Err(ContainerError::Truncated("stsz"));
    }
    (0..count).map(|_| r.u32()).collect()
}

fn read_chunk_offsets(stbl: &[u8]) -> Result<Vec<u64>, ContainerError> {
    if let Some(stco) = find_box(stbl, b"stco") {
        let mut r = FieldReader::new(stco, "stco");
        r.full_box_header()?;
        let count = r.u32()? as usize;
        if r.remaining() / 4 < count {
            return Err(ContainerError::Truncated("stco"));
        }
        return (0..count).map(|_| r.u32().map(u64::from)).collect();
    }
    let co64 = find_box(stbl, b"co64").ok_or_else(|| missing("stco"))?;
    let mut r = FieldReader::new(co64, "co64");
    r.full_box_header()?;
    let count = r.u32()? as usize;
    if r.remaining() / 8 < count {
        return Err(ContainerError::Truncated("co64"));
    }
    (0..count).map(|_| r.u64()).collect()
}

/// `(first_chunk, samples_per_chunk)` runs, first_chunk 1-based.
fn read_sample_to_chunk(stbl: &[u8]) -> Result<Vec<(u32, u32)>, ContainerError> {
    let stsc = find_box(stbl, b"stsc").ok_or_else(|| missing("stsc"))?;
    let mut r = FieldReader::new(stsc, "stsc");
    r.full_box_header()?;
    let count = r.u32()? as usize;
    if r.remaining() / 12 < count {
        return Err(ContainerError::Truncated("stsc"));
    }
    let mut runs = Vec::with_capacity(count);
    for _ in 0..count {
        let first_chunk = r.u32()?;
        let samples_per_chunk = r.u32()?;
        let _description_index = r.u32()?;
        runs.push((first_chunk, samples_per_chunk));
    }
    Ok(runs)
}

fn read_durations(stbl: &[u8], sample_count: usize) -> Result<Vec<u32>, ContainerError> {
    let stts = find_box(stbl, b"stts").ok_or_else(|| missing("stts"))?;
    let mut r = FieldReader::new(stts, "stts");
    r.full_box_header()?;
    let entries = r.u32()?;
    let mut durations = Vec::with_capacity(sample_count);
    for _ in 0..entries {
        let count = r.u32()? as usize;
        let delta = r.u32()?;
        let take = count.min(sample_count.saturating_sub(durations.len()));
        durations.extend(std::iter::repeat(delta).take(take));
    }
    if durations.len() != sample_count {
        return Err(ContainerError::SampleTable(format!(
            "stts covers {} samples, stsz has {}",
            durations.len(),
            sample_count
        )));
    }
    Ok(durations)
}

fn read_composition_offsets(
    stbl: &[u8],
    sample_count: usize,
) -> Result<Vec<i32>, ContainerError> {
    let Some(ctts) = find_box(stbl, b"ctts") else {
        return Ok(vec![0; sample_count]);
    };
    let mut r = FieldReader::new(ctts, "ctts");
    let (version, _) = r.full_box_header()?;
    let entries = r.u32()?;
    let mut offsets = Vec::with_capacity(sample_count);
    for _ in 0..entries {
        let count = r.u32()? as usize;
        // version 0 offsets are unsigned on paper but signed in practice
        let offset = if version == 0 {
            r.u32()? as i32
        } else {
            r.i32()?
        };
        let take = count.min(sample_count.saturating_sub(offsets.len()));
        offsets.extend(std::iter::repeat(offset).take(take));
    }
    offsets.resize(sample_count, 0);
    Ok(offsets)
}

fn read_sync_samples(stbl: &[u8], sample_count: usize) -> Result<Vec<bool>, ContainerError> {
    let Some(stss) = find_box(stbl, b"stss") else {
        return Ok(vec![true; sample_count]);
    };
    let mut r = FieldReader::new(stss, "stss");
    r.full_box_header()?;
    let entries = r.u32()?;
    let mut sync = vec![false; sample_count];
    for _ in 0..entries {
        let number = r.u32()? as usize;
        if number == 0 || number > sample_count {
            return Err(ContainerError::SampleTable(format!(
                "stss references sample {} of {}",
                number, sample_count
            )));
        }
        sync[number - 1] = true;
    }
    Ok(sync)
}

/// Decode the sample table of one track.
pub fn read_sample_table(stbl: &[u8]) -> Result<Vec<SampleInfo>, ContainerError> {
    let sizes = read_sizes(stbl)?;
    let sample_count = sizes.len();
    let chunk_offsets = read_chunk_offsets(stbl)?;
    let runs = read_sample_to_chunk(stbl)?;
    let durations = read_durations(stbl, sample_count)?;
    let composition = read_composition_offsets(stbl, sample_count)?;
    let sync = read_sync_samples(stbl, sample_count)?;

    let mut samples = Vec::with_capacity(sample_count);
    let mut decode_time = 0u64;
    let mut sample = 0usize;

    for (run_idx, &(first_chunk, samples_per_chunk)) in runs.iter().enumerate() {
        let last_chunk = runs
            .get(run_idx + 1)
            .map(|&(next, _)| next.saturating_sub(1))
            .unwrap_or(chunk_offsets.len() as u32);
        for chunk in first_chunk..=last_chunk {
            let Some(&chunk_offset) = (chunk as usize)
                .checked_sub(1)
                .and_then(|i| chunk_offsets.get(i))
            else {
                break;
            };
            let mut offset = chunk_offset;
            for _ in 0..samples_per_chunk {
                if sample >= sample_count {
                    break;
                }
                samples.push(SampleInfo {
                    offset,
                    size: sizes[sample],
                    decode_time,
                    duration: durations[sample],
                    composition_offset: composition[sample],
                    is_sync: sync[sample],
                });
                offset += sizes[sample] as u64;
                decode_time += durations[sample] as u64;
                sample += 1;
            }
        }
    }

    if samples.len() != sample_count {
        return Err(ContainerError::SampleTable(format!(
            "chunks cover {} samples, stsz has {}",
            samples.len(),
            sample_count
        )));
    }
    Ok(samples)
}
