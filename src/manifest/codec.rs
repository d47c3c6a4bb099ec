//! RFC 6381 codec string generation
//!
//! Derives the `codecs` attribute from a track's sample entry and its
//! decoder configuration box.

use crate::container::isobmff::{find_box, FieldReader};
use crate::container::FourCC;

/// Sample entry header (8) + VisualSampleEntry fields (78)
const VISUAL_ENTRY_CHILDREN: usize = 86;
/// Sample entry header (8) + AudioSampleEntry fields (28)
const AUDIO_ENTRY_CHILDREN: usize = 36;

/// Codec string for a track with the given codec tag and sample entry
/// (complete box, header included). Falls back to the bare codec tag.
pub fn codec_string(codec_tag: FourCC, sample_entry: &[u8]) -> String {
    let tag = codec_tag.to_string();
    let parsed = match codec_tag.as_bytes() {
        b"avc1" | b"avc3" => visual_child(sample_entry, b"avcC").and_then(|c| avc_codec(&tag, c)),
        b"hvc1" | b"hev1" => visual_child(sample_entry, b"hvcC").and_then(|c| hevc_codec(&tag, c)),
        b"dvhe" | b"dvh1" => visual_child(sample_entry, b"dvcC")
            .or_else(|| visual_child(sample_entry, b"dvvC"))
            .and_then(|c| dolby_vision_codec(&tag, c)),
        b"mp4a" => audio_child(sample_entry, b"esds").and_then(mp4a_codec),
        b"ac-3" => Some("ac-3".to_string()),
        b"ec-3" => Some("ec-3".to_string()),
        b"Opus" => Some("opus".to_string()),
        b"fLaC" => Some("flac".to_string()),
        _ => None,
    };
    parsed.unwrap_or(tag)
}

fn visual_child<'a>(entry: &'a [u8], box_type: &[u8; 4]) -> Option<&'a [u8]> {
    find_box(entry.get(VISUAL_ENTRY_CHILDREN..)?, box_type)
}

fn audio_child<'a>(entry: &'a [u8], box_type: &[u8; 4]) -> Option<&'a [u8]> {
    find_box(entry.get(AUDIO_ENTRY_CHILDREN..)?, box_type)
}

/// `avc1.PPCCLL` from `avcC`.
fn avc_codec(tag: &str, avcc: &[u8]) -> Option<String> {
    let mut r = FieldReader::new(avcc, "avcC");
    r.u8().ok()?;
    let profile = r.u8().ok()?;
    let compatibility = r.u8().ok()?;
    let level = r.u8().ok()?;
    Some(format!(
        "{}.{:02x}{:02x}{:02x}",
        tag, profile, compatibility, level
    ))
}

/// `hvc1.[A-C]P.C.[LH]L.XX[.XX...]` from `hvcC`.
fn hevc_codec(tag: &str, hvcc: &[u8]) -> Option<String> {
    let mut r = FieldReader::new(hvcc, "hvcC");
    r.u8().ok()?;
    let byte = r.u8().ok()?;
    let profile_space = byte >> 6;
    let tier = (byte >> 5) & 0x01;
    let profile_idc = byte & 0x1f;
    let compatibility = r.u32().ok()?.reverse_bits();
    let constraints = r.bytes(6).ok()?;
    let level = r.u8().ok()?;

    let space = match profile_space {
        1 => "A",
        2 => "B",
        3 => "C",
        _ => "",
    };
    let mut out = format!(
        "{}.{}{}.{:X}.{}{}",
        tag,
        space,
        profile_idc,
        compatibility,
        if tier == 1 { 'H' } else { 'L' },
        level
    );

    let used = constraints
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    for b in &constraints[..used] {
        out.push_str(&format!(".{:X}", b));
    }
    Some(out)
}

/// `dvhe.PP.LL` from `dvcC`/`dvvC`.
fn dolby_vision_codec(tag: &str, config: &[u8]) -> Option<String> {
    let mut r = FieldReader::new(config, "dvcC");
    r.skip(2).ok()?;
    let bits = r.u16().ok()?;
    let profile = bits >> 9;
    let level = (bits >> 3) & 0x3f;
    Some(format!("{}.{:02}.{:02}", tag, profile, level))
}

/// MPEG-4 descriptor header: tag and variable-length size.
fn descriptor(r: &mut FieldReader<'_>) -> Option<(u8, usize)> {
    let tag = r.u8().ok()?;
    let mut size = 0usize;
    for _ in 0..4 {
        let b = r.u8().ok()?;
        size = (size << 7) | (b & 0x7f) as usize;
        if b & 0x80 == 0 {
            break;
        }
    }
    Some((tag, size))
}

/// `mp4a.OO.A` from `esds`: object type indication and audio object type.
fn mp4a_codec(esds: &[u8]) -> Option<String> {
    let mut r = FieldReader::new(esds, "esds");
    r.full_box_header().ok()?;

    let (tag, _) = descriptor(&mut r)?;
    if tag != 0x03 {
        return None;
    }
    r.skip(2).ok()?;
    let flags = r.u8().ok()?;
    if flags & 0x80 != 0 {
        r.skip(2).ok()?;
    }
    if flags & 0x40 != 0 {
        let len = r.u8().ok()? as usize;
        r.skip(len).ok()?;
    }
    if flags & 0x20 != 0 {
        r.skip(2).ok()?;
    }

    let (tag, _) = descriptor(&mut r)?;
    if tag != 0x04 {
        return None;
    }
    let object_type = r.u8().ok()?;
    r.skip(12).ok()?;

    let audio_object_type = match descriptor(&mut r) {
        Some((0x05, size)) if size > 0 => {
            let first = r.u8().ok()?;
            let aot = first >> 3;
            if aot == 31 {
                let second = r.u8().ok()?;
                Some(32 + (((first & 0x07) << 3) | (second >> 5)))
            } else {
                Some(aot)
            }
        }
        _ => None,
    };

    Some(match audio_object_type {
        Some(aot) => format!("mp4a.{:x}.{}", object_type, aot),
        None => format!("mp4a.{:x}", object_type),
    })
}

/// Codec attribute of a multi-track representation.
pub fn join_codecs<I, S>(codecs: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    codecs
        .into_iter()
        .map(|c| c.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(",")
}
