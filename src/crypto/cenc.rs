//! `cenc` scheme encryption adapter (AES-128-CTR).

use aes::Aes128;
use bytes::{BufMut, Bytes, BytesMut};
use ctr::cipher::{KeyIvInit, StreamCipher};

use super::{ContentKey, SampleEncryption, Subsample, IV_SIZE};
use crate::container::isobmff::{find_box, rewrite_box, write_box, write_full_box, FieldReader};
use crate::container::track::{FourCC, MediaTrack, Sample, SampleInfo};
use crate::error::{PackagerError, Result};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Bytes before the child boxes of a visual sample entry
const VISUAL_ENTRY_HEADER: usize = 8 + 78;

/// Wrap `track` so that its samples are encrypted on read.
pub fn wrap(track: Box<dyn MediaTrack>, key: &ContentKey) -> Box<dyn MediaTrack> {
    Box::new(CencEncryptingTrack::new(track, key.clone()))
}

/// NAL unit framing of a video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NalFraming {
    length_size: usize,
    header_size: usize,
}

fn nal_framing(codec_tag: FourCC, sample_entry: &[u8]) -> Option<NalFraming> {
    let (header_size, config_box): (usize, &[u8; 4]) = match codec_tag.as_bytes() {
        b"hvc1" | b"hev1" | b"hevc" | b"dvhe" | b"dvh1" => (2, b"hvcC"),
        b"avc1" | b"avc3" | b"dvav" | b"dva1" => (1, b"avcC"),
        _ => return None,
    };
    let length_size = sample_entry
        .get(VISUAL_ENTRY_HEADER..)
        .and_then(|children| find_box(children, config_box))
        .and_then(|config| {
            let offset = if config_box == b"hvcC" { 21 } else { 4 };
            config.get(offset).map(|b| (b & 0x03) as usize + 1)
        })
        .unwrap_or(4);
    Some(NalFraming {
        length_size,
        header_size,
    })
}

/// Clear/protected layout of a NAL-structured sample. Each NAL keeps its
/// length prefix and header in the clear; protected runs are whole blocks.
fn nal_subsamples(data: &[u8], framing: NalFraming) -> Result<Vec<Subsample>> {
    let mut subsamples: Vec<Subsample> = Vec::new();
    let mut reader = FieldReader::new(data, "NAL unit");

    while reader.remaining() > 0 {
        let mut nal_len = 0usize;
        for _ in 0..framing.length_size {
            nal_len = (nal_len << 8) | reader.u8().map_err(nal_error)? as usize;
        }
        reader.skip(nal_len).map_err(nal_error)?;

        let total = framing.length_size + nal_len;
        let min_clear = (framing.length_size + framing.header_size).min(total);
        let protected = (total - min_clear) / 16 * 16;
        push_run(&mut subsamples, total - protected, protected as u32);
    }
    Ok(subsamples)
}

fn nal_error(_: crate::error::ContainerError) -> PackagerError {
    PackagerError::Encryption("NAL unit length exceeds sample size".to_string())
}

fn push_run(subsamples: &mut Vec<Subsample>, mut clear: usize, protected: u32) {
    if let Some(last) = subsamples.last_mut() {
        if last.protected == 0 && last.clear as usize + clear <= u16::MAX as usize {
            last.clear += clear as u16;
            last.protected = protected;
            return;
        }
    }
    while clear > u16::MAX as usize {
        subsamples.push(Subsample {
            clear: u16::MAX,
            protected: 0,
        });
        clear -= u16::MAX as usize;
    }
    subsamples.push(Subsample {
        clear: clear as u16,
        protected,
    });
}

/// `sinf` box describing `cenc` protection of `original_format`.
fn protection_scheme_info(original_format: FourCC, key_id: &[u8; 16]) -> BytesMut {
    let mut buf = BytesMut::new();
    write_box(&mut buf, b"sinf", |b| {
        write_box(b, b"frma", |b| b.put_slice(original_format.as_bytes()));
        write_full_box(b, b"schm", 0, 0, |b| {
            b.put_slice(b"cenc");
            b.put_u32(0x0001_0000);
        });
        write_box(b, b"schi", |b| {
            write_full_box(b, b"tenc", 0, 0, |b| {
                b.put_u8(0);
                b.put_u8(0);
                b.put_u8(1);
                b.put_u8(IV_SIZE);
                b.put_slice(key_id);
            });
        });
    });
    buf
}

/// A track whose samples are encrypted with the `cenc` scheme on read.
#[derive(Debug)]
pub struct CencEncryptingTrack {
    inner: Box<dyn MediaTrack>,
    key: ContentKey,
    first_iv: u64,
    framing: Option<NalFraming>,
    sample_entry: Bytes,
}

impl CencEncryptingTrack {
    /// Per-sample IVs start at a random value.
    pub fn new(inner: Box<dyn MediaTrack>, key: ContentKey) -> Self {
        Self::with_initial_iv(inner, key, rand::random())
    }

    /// Per-sample IVs start at `first_iv` and increase by one per sample.
    pub fn with_initial_iv(inner: Box<dyn MediaTrack>, key: ContentKey, first_iv: u64) -> Self {
        let original = inner.sample_entry();
        let codec_tag = inner.codec_tag();
        let framing = nal_framing(codec_tag, &original);
        let protected_type = if inner.handler() == FourCC::SOUN {
            b"enca"
        } else {
            b"encv"
        };
        let sinf = protection_scheme_info(codec_tag, &key.key_id);
        let sample_entry = rewrite_box(&original, protected_type, &sinf).freeze();

        Self {
            inner,
            key,
            first_iv,
            framing,
            sample_entry,
        }
    }

    fn iv_for(&self, index: usize) -> [u8; IV_SIZE as usize] {
        self.first_iv.wrapping_add(index as u64).to_be_bytes()
    }

    fn encrypt(&self, data: &mut [u8], encryption: &SampleEncryption) -> Result<()> {
        let mut counter = [0u8; 16];
        counter[..encryption.iv.len()].copy_from_slice(&encryption.iv);
        let mut cipher = Aes128Ctr::new_from_slices(&self.key.key, &counter)
            .map_err(|e| PackagerError::Encryption(e.to_string()))?;

        if encryption.subsamples.is_empty() {
            cipher.apply_keystream(data);
            return Ok(());
        }

        let mut pos = 0usize;
        for subsample in &encryption.subsamples {
            pos += subsample.clear as usize;
            let end = pos + subsample.protected as usize;
            let run = data.get_mut(pos..end).ok_or_else(|| {
                PackagerError::Encryption("subsample layout exceeds sample".to_string())
            })?;
            cipher.apply_keystream(run);
            pos = end;
        }
        Ok(())
    }
}

impl MediaTrack for CencEncryptingTrack {
    fn track_id(&self) -> u32 {
        self.inner.track_id()
    }

    fn codec_tag(&self) -> FourCC {
        self.inner.codec_tag()
    }

    fn handler(&self) -> FourCC {
        self.inner.handler()
    }

    fn duration(&self) -> u64 {
        self.inner.duration()
    }

    fn timescale(&self) -> u32 {
        self.inner.timescale()
    }

    fn language(&self) -> &str {
        self.inner.language()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.inner.dimensions()
    }

    fn sample_entry(&self) -> Bytes {
        self.sample_entry.clone()
    }

    fn samples(&self) -> &[SampleInfo] {
        self.inner.samples()
    }

    fn read_sample(&self, index: usize) -> Result<Sample> {
        let clear = self.inner.read_sample(index)?;
        let subsamples = match self.framing {
            Some(framing) => nal_subsamples(&clear.data, framing)?,
            None => Vec::new(),
        };
        let encryption = SampleEncryption {
            iv: self.iv_for(index),
            subsamples,
        };

        let mut data = clear.data.to_vec();
        self.encrypt(&mut data, &encryption)?;

        Ok(Sample {
            data: Bytes::from(data),
            encryption: Some(encryption),
        })
    }

    fn key_id(&self) -> Option<[u8; 16]> {
        Some(self.key.key_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::isobmff::iter_boxes;

    #[derive(Debug)]
    struct StubTrack {
        codec: FourCC,
        handler: FourCC,
        entry: Bytes,
        samples: Vec<SampleInfo>,
        payloads: Vec<Bytes>,
    }

    impl MediaTrack for StubTrack {
        fn track_id(&self) -> u32 {
            1
        }
        fn codec_tag(&self) -> FourCC {
            self.codec
        }
        fn handler(&self) -> FourCC {
            self.handler
        }
        fn duration(&self) -> u64 {
            self.samples.len() as u64
        }
        fn timescale(&self) -> u32 {
            1
        }
        fn language(&self) -> &str {
            "und"
        }
        fn dimensions(&self) -> Option<(u32, u32)> {
            None
        }
        fn sample_entry(&self) -> Bytes {
            self.entry.clone()
        }
        fn samples(&self) -> &[SampleInfo] {
            &self.samples
        }
        fn read_sample(&self, index: usize) -> Result<Sample> {
            Ok(Sample {
                data: self.payloads[index].clone(),
                encryption: None,
            })
        }
    }

    fn stub(codec: &[u8; 4], handler: FourCC, payloads: Vec<Vec<u8>>) -> StubTrack {
        let mut entry = BytesMut::new();
        write_box(&mut entry, codec, |b| b.put_slice(&[0u8; 78]));
        let samples = payloads
            .iter()
            .enumerate()
            .map(|(i, p)| SampleInfo {
                offset: 0,
                size: p.len() as u32,
                decode_time: i as u64,
                duration: 1,
                composition_offset: 0,
                is_sync: true,
            })
            .collect();
        StubTrack {
            codec: FourCC(*codec),
            handler,
            entry: entry.freeze(),
            samples,
            payloads: payloads.into_iter().map(Bytes::from).collect(),
        }
    }

    fn key() -> ContentKey {
        ContentKey::new([0x11; 16], [0x22; 16])
    }

    #[test]
    fn test_sample_entry_becomes_encv() {
        let track = CencEncryptingTrack::with_initial_iv(
            Box::new(stub(b"hvc1", FourCC::VIDE, vec![vec![0; 4]])),
            key(),
            0,
        );
        assert_eq!(track.codec_tag(), FourCC(*b"hvc1"));

        let entry = track.sample_entry();
        let (btype, payload) = iter_boxes(&entry).next().unwrap();
        assert_eq!(btype, b"encv");
        let sinf = find_box(&payload[78..], b"sinf").unwrap();
        assert_eq!(find_box(sinf, b"frma").unwrap(), b"hvc1");
        let tenc = crate::container::isobmff::find_path(sinf, &[b"schi", b"tenc"]).unwrap();
        assert_eq!(tenc[6], 1);
        assert_eq!(tenc[7], IV_SIZE);
        assert_eq!(&tenc[8..24], &[0x11; 16]);
    }

    #[test]
    fn test_audio_full_sample_encryption_round_trips() {
        let plain = vec![0xabu8; 37];
        let track = CencEncryptingTrack::with_initial_iv(
            Box::new(stub(b"mp4a", FourCC::SOUN, vec![plain.clone()])),
            key(),
            41,
        );
        let sample = track.read_sample(0).unwrap();
        let encryption = sample.encryption.clone().unwrap();
        assert!(encryption.subsamples.is_empty());
        assert_eq!(encryption.iv, 41u64.to_be_bytes());
        assert_ne!(sample.data.as_ref(), plain.as_slice());

        let mut decrypted = sample.data.to_vec();
        track.encrypt(&mut decrypted, &encryption).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_nal_subsamples_keep_headers_clear() {
        // one NAL of 40 bytes: 4 length + 2 header clear, 34 left -> 32 protected
        let mut sample = vec![0, 0, 0, 40];
        sample.extend(std::iter::repeat(0x5a).take(40));
        let framing = NalFraming {
            length_size: 4,
            header_size: 2,
        };
        let subsamples = nal_subsamples(&sample, framing).unwrap();
        assert_eq!(
            subsamples,
            vec![Subsample {
                clear: 12,
                protected: 32
            }]
        );

        let track = CencEncryptingTrack::with_initial_iv(
            Box::new(stub(b"dvhe", FourCC::VIDE, vec![sample.clone()])),
            key(),
            7,
        );
        let out = track.read_sample(0).unwrap();
        assert_eq!(&out.data[..12], &sample[..12]);
        assert_ne!(&out.data[12..], &sample[12..]);
        assert_eq!(out.encryption.unwrap().aux_info_size(true), 8 + 2 + 6);
    }

    #[test]
    fn test_small_nal_stays_clear_and_merges() {
        let framing = NalFraming {
            length_size: 4,
            header_size: 2,
        };
        let sample = vec![0, 0, 0, 3, 1, 2, 3, 0, 0, 0, 2, 9, 9];
        let subsamples = nal_subsamples(&sample, framing).unwrap();
        assert_eq!(
            subsamples,
            vec![Subsample {
                clear: 13,
                protected: 0
            }]
        );
    }

    #[test]
    fn test_truncated_nal_is_error() {
        let framing = NalFraming {
            length_size: 4,
            header_size: 2,
        };
        let err = nal_subsamples(&[0, 0, 0, 50, 1, 2], framing).unwrap_err();
        assert!(matches!(err, PackagerError::Encryption(_)));
    }
}
