//! Common Encryption (ISO/IEC 23001-7) support.

mod cenc;

pub use cenc::{wrap, CencEncryptingTrack};

use bytes::{BufMut, Bytes, BytesMut};

use crate::container::isobmff::write_full_box;
use crate::error::{PackagerError, Result};

/// W3C common PSSH system id (`1077efec-c0b2-4d02-ace3-3c1e52e2fb4b`)
pub const COMMON_SYSTEM_ID: [u8; 16] = [
    0x10, 0x77, 0xef, 0xec, 0xc0, 0xb2, 0x4d, 0x02, 0xac, 0xe3, 0x3c, 0x1e, 0x52, 0xe2, 0xfb, 0x4b,
];

/// Per-sample IV size used for every protected track
pub const IV_SIZE: u8 = 8;

/// A content key and the id it is advertised under.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey {
    pub key_id: [u8; 16],
    pub key: [u8; 16],
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("key_id", &self.key_id_uuid())
            .field("key", &"<redacted>")
            .finish()
    }
}

impl ContentKey {
    pub fn new(key_id: [u8; 16], key: [u8; 16]) -> Self {
        Self { key_id, key }
    }

    /// Parse a key id (UUID or 32 hex digits) and a key (32 hex digits).
    pub fn parse(key_id: &str, key: &str) -> Result<Self> {
        let key_id = match uuid::Uuid::parse_str(key_id.trim()) {
            Ok(uuid) => *uuid.as_bytes(),
            Err(_) => parse_hex16(key_id, "key id")?,
        };
        let key = parse_hex16(key, "key")?;
        Ok(Self { key_id, key })
    }

    /// Key id in canonical UUID form, as used by `cenc:default_KID`
    pub fn key_id_uuid(&self) -> String {
        format_key_id(&self.key_id)
    }
}

/// Canonical UUID form of a key id.
pub fn format_key_id(key_id: &[u8; 16]) -> String {
    uuid::Uuid::from_bytes(*key_id).hyphenated().to_string()
}

fn parse_hex16(text: &str, what: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(text.trim())
        .map_err(|e| PackagerError::Encryption(format!("invalid {}: {}", what, e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        PackagerError::Encryption(format!("{} must be 16 bytes, got {}", what, b.len()))
    })
}

/// One clear/protected run inside a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subsample {
    pub clear: u16,
    pub protected: u32,
}

/// Encryption parameters of one sample, as recorded in `senc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEncryption {
    pub iv: [u8; IV_SIZE as usize],
    /// Empty for full-sample encryption
    pub subsamples: Vec<Subsample>,
}

impl SampleEncryption {
    /// Size of this sample's auxiliary information (`saiz` entry). With
    /// `subsample_entries` the count is written even when it is zero.
    pub fn aux_info_size(&self, subsample_entries: bool) -> usize {
        if subsample_entries {
            self.iv.len() + 2 + self.subsamples.len() * 6
        } else {
            self.iv.len()
        }
    }
}

/// `pssh` box (version 1) for the common system listing the given key ids.
pub fn common_pssh(key_ids: &[[u8; 16]]) -> Bytes {
    let mut buf = BytesMut::new();
    write_full_box(&mut buf, b"pssh", 1, 0, |b| {
        b.put_slice(&COMMON_SYSTEM_ID);
        b.put_u32(key_ids.len() as u32);
        for kid in key_ids {
            b.put_slice(kid);
        }
        b.put_u32(0);
    });
    buf.freeze()
}
