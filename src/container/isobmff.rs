//! ISOBMFF (MP4) box parsing and writing utilities.
//! Centralizes boilerplate for traversing and emitting MP4 structures in memory.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ContainerError;

/// Boxes whose payload is nothing but child boxes.
pub const CONTAINER_BOXES: &[&[u8; 4]] = &[
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"edts", b"dinf", b"mvex", b"moof", b"traf",
    b"sinf", b"schi", b"tref",
];

/// Iterator over the sibling boxes of a buffer, yielding `(type, payload)`.
///
/// Stops at the first header that does not fit in the remaining data.
pub struct BoxIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = (&'a [u8; 4], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data;
        let pos = self.pos;
        if pos + 8 > data.len() {
            return None;
        }
        let size32 = u32::from_be_bytes(data[pos..pos + 4].try_into().ok()?) as usize;
        let btype: &[u8; 4] = data[pos + 4..pos + 8].try_into().ok()?;
        let (header, size) = match size32 {
            0 => (8, data.len() - pos),
            1 => {
                if pos + 16 > data.len() {
                    return None;
                }
                let large = u64::from_be_bytes(data[pos + 8..pos + 16].try_into().ok()?);
                (16, usize::try_from(large).ok()?)
            }
            n => (8, n),
        };
        let end = match pos.checked_add(size) {
            Some(end) if size >= header && end <= data.len() => end,
            _ => {
                self.pos = data.len();
                return None;
            }
        };
        self.pos = end;
        Some((btype, &data[pos + header..end]))
    }
}

/// Iterate the boxes laid out back to back in `data`.
pub fn iter_boxes(data: &[u8]) -> BoxIter<'_> {
    BoxIter { data, pos: 0 }
}

/// Payload of the first child box of the given type.
pub fn find_box<'a>(data: &'a [u8], box_type: &[u8; 4]) -> Option<&'a [u8]> {
    iter_boxes(data)
        .find(|(t, _)| *t == box_type)
        .map(|(_, payload)| payload)
}

/// Follow a path of nested box types, e.g. `[b"mdia", b"minf", b"stbl"]`.
pub fn find_path<'a>(data: &'a [u8], path: &[&[u8; 4]]) -> Option<&'a [u8]> {
    path.iter()
        .try_fold(data, |current, box_type| find_box(current, box_type))
}

/// Walk all top-level boxes in a buffer, and recursively traverse specified container boxes.
/// `callback` is invoked for EVERY box in pre-order traversal.
/// The callback signature is `|box_type: &[u8; 4], payload: &[u8]|`.
pub fn walk_boxes<'a, F>(data: &'a [u8], containers: &[&[u8; 4]], callback: &mut F)
where
    F: FnMut(&[u8; 4], &'a [u8]),
{
    for (btype, payload) in iter_boxes(data) {
        callback(btype, payload);

        if containers.contains(&btype) {
            walk_boxes(payload, containers, callback);
        }
    }
}

/// Bounds-checked big-endian field reader over a box payload.
pub struct FieldReader<'a> {
    data: &'a [u8],
    name: &'static str,
}

impl<'a> FieldReader<'a> {
    /// `name` is reported in `ContainerError::Truncated`.
    pub fn new(data: &'a [u8], name: &'static str) -> Self {
        Self { data, name }
    }

    fn need(&self, n: usize) -> Result<(), ContainerError> {
        if self.data.remaining() < n {
            Err(ContainerError::Truncated(self.name))
        } else {
            Ok(())
        }
    }

    pub fn u8(&mut self) -> Result<u8, ContainerError> {
        self.need(1)?;
        Ok(self.data.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16, ContainerError> {
        self.need(2)?;
        Ok(self.data.get_u16())
    }

    pub fn u32(&mut self) -> Result<u32, ContainerError> {
        self.need(4)?;
        Ok(self.data.get_u32())
    }

    pub fn i32(&mut self) -> Result<i32, ContainerError> {
        self.need(4)?;
        Ok(self.data.get_i32())
    }

    pub fn u64(&mut self) -> Result<u64, ContainerError> {
        self.need(8)?;
        Ok(self.data.get_u64())
    }

    /// Version byte and 24-bit flags of a full box.
    pub fn full_box_header(&mut self) -> Result<(u8, u32), ContainerError> {
        let word = self.u32()?;
        Ok(((word >> 24) as u8, word & 0x00FF_FFFF))
    }

    pub fn fourcc(&mut self) -> Result<[u8; 4], ContainerError> {
        self.need(4)?;
        let mut out = [0u8; 4];
        self.data.copy_to_slice(&mut out);
        Ok(out)
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ContainerError> {
        self.need(n)?;
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ContainerError> {
        self.need(n)?;
        self.data.advance(n);
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    pub fn rest(&self) -> &'a [u8] {
        self.data
    }
}

/// Append a box, patching its 32-bit size once `body` has written the payload.
pub fn write_box<F>(buf: &mut BytesMut, box_type: &[u8; 4], body: F)
where
    F: FnOnce(&mut BytesMut),
{
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(box_type);
    body(buf);
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Append a full box (version + 24-bit flags).
pub fn write_full_box<F>(buf: &mut BytesMut, box_type: &[u8; 4], version: u8, flags: u32, body: F)
where
    F: FnOnce(&mut BytesMut),
{
    write_box(buf, box_type, |b| {
        b.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
        body(b);
    });
}

/// Append an `mdat` header for `payload_len` bytes of media data, switching
/// to a 64-bit size when needed.
pub fn write_mdat_header(buf: &mut BytesMut, payload_len: u64) {
    if payload_len + 8 <= u32::MAX as u64 {
        buf.put_u32((payload_len + 8) as u32);
        buf.put_slice(b"mdat");
    } else {
        buf.put_u32(1);
        buf.put_slice(b"mdat");
        buf.put_u64(payload_len + 16);
    }
}

/// Replace the type of a complete box and append extra child bytes to it,
/// fixing up the size. Used to turn a sample entry into its protected form.
pub fn rewrite_box(original: &[u8], new_type: &[u8; 4], extra_children: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(original.len() + extra_children.len());
    out.put_slice(original);
    out.put_slice(extra_children);
    let size = out.len() as u32;
    out[0..4].copy_from_slice(&size.to_be_bytes());
    out[4..8].copy_from_slice(new_type);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> BytesMut {
        let mut buf = BytesMut::new();
        write_box(&mut buf, b"ftyp", |b| b.put_slice(b"iso6\0\0\0\0"));
        write_box(&mut buf, b"moov", |b| {
            write_full_box(b, b"mvhd", 0, 0, |b| b.put_u32(1000));
            write_box(b, b"trak", |b| {
                write_full_box(b, b"tkhd", 0, 3, |b| b.put_u32(7));
            });
        });
        buf
    }

    #[test]
    fn test_iter_and_find() {
        let buf = sample_tree();
        let types: Vec<[u8; 4]> = iter_boxes(&buf).map(|(t, _)| *t).collect();
        assert_eq!(types, vec![*b"ftyp", *b"moov"]);

        let tkhd = find_path(&buf, &[b"moov", b"trak", b"tkhd"]).unwrap();
        let mut r = FieldReader::new(tkhd, "tkhd");
        assert_eq!(r.full_box_header().unwrap(), (0, 3));
        assert_eq!(r.u32().unwrap(), 7);
        assert!(matches!(r.u8(), Err(ContainerError::Truncated("tkhd"))));
    }

    #[test]
    fn test_walk_boxes_visits_nested() {
        let buf = sample_tree();
        let mut seen = Vec::new();
        walk_boxes(&buf, CONTAINER_BOXES, &mut |t, _| seen.push(*t));
        assert_eq!(seen, vec![*b"ftyp", *b"moov", *b"mvhd", *b"trak", *b"tkhd"]);
    }

    #[test]
    fn test_truncated_box_stops_iteration() {
        let mut buf = sample_tree();
        buf.truncate(buf.len() - 2);
        let types: Vec<[u8; 4]> = iter_boxes(&buf).map(|(t, _)| *t).collect();
        assert_eq!(types, vec![*b"ftyp"]);
    }

    #[test]
    fn test_large_size_header() {
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_slice(b"mdat");
        buf.put_u64(16 + 3);
        buf.put_slice(&[1, 2, 3]);
        let (t, payload) = iter_boxes(&buf).next().unwrap();
        assert_eq!(t, b"mdat");
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn test_overflowing_large_size_stops_iteration() {
        let mut buf = BytesMut::new();
        write_box(&mut buf, b"free", |_| {});
        buf.put_u32(1);
        buf.put_slice(b"trak");
        buf.put_u64(u64::MAX);
        let types: Vec<[u8; 4]> = iter_boxes(&buf).map(|(t, _)| *t).collect();
        assert_eq!(types, vec![*b"free"]);
    }

    #[test]
    fn test_rewrite_box_appends_children() {
        let mut entry = BytesMut::new();
        write_box(&mut entry, b"hvc1", |b| b.put_slice(&[0u8; 4]));
        let mut child = BytesMut::new();
        write_box(&mut child, b"sinf", |_| {});

        let out = rewrite_box(&entry, b"encv", &child);
        let (t, payload) = iter_boxes(&out).next().unwrap();
        assert_eq!(t, b"encv");
        assert_eq!(payload.len(), 4 + 8);
        assert_eq!(&payload[8..12], b"sinf");
    }
}
