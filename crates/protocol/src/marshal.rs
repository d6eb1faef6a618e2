//! Big-endian marshaling primitives.
//!
//! Every wire structure implements [`Marshal`] and [`Unmarshal`]. Encoding
//! appends to a `Vec<u8>` through [`bytes::BufMut`]; decoding walks a
//! [`Reader`], a copyable cursor over an immutable slice.
//!
//! # Failure semantics
//!
//! Composite reads go through [`Reader::read`], which decodes into a copy
//! of the cursor and commits only on success. A failed decode therefore
//! leaves the caller's cursor exactly where it was.

use bytes::{Buf, BufMut};

use crate::error::{ProtocolError, Result};

/// Encode a value in wire format.
pub trait Marshal {
    /// Append the wire encoding of `self` to `buf`.
    fn marshal(&self, buf: &mut Vec<u8>);

    /// Encode `self` into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.marshal(&mut buf);
        buf
    }
}

/// Decode a value from wire format.
pub trait Unmarshal: Sized {
    /// Decode a value, advancing `reader` past it.
    ///
    /// Implementations may leave `reader` partially advanced on error;
    /// callers should go through [`Reader::read`] which discards that state.
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self>;
}

/// Cursor over an immutable input buffer.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Whether the input is exhausted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The unread tail of the input.
    pub fn rest(&self) -> &'a [u8] {
        self.data
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.data.len() < needed {
            return Err(ProtocolError::TruncatedInput {
                needed,
                remaining: self.data.len(),
            });
        }
        Ok(())
    }

    /// Read one byte.
    pub fn u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.data.get_u8())
    }

    /// Read a big-endian `u16`.
    pub fn u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.data.get_u16())
    }

    /// Read a big-endian `u32`.
    pub fn u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.data.get_u32())
    }

    /// Read a big-endian `u64`.
    pub fn u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.data.get_u64())
    }

    /// Read exactly `len` raw bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    /// Read a 16-bit length followed by that many bytes.
    ///
    /// Fails with [`ProtocolError::MalformedLength`] when the declared
    /// length runs past the end of the input.
    pub fn sized(&mut self) -> Result<&'a [u8]> {
        let mut probe = *self;
        let declared = probe.u16()? as usize;
        if declared > probe.remaining() {
            return Err(ProtocolError::MalformedLength {
                declared,
                remaining: probe.remaining(),
            });
        }
        let body = probe.bytes(declared)?;
        *self = probe;
        Ok(body)
    }

    /// Decode a value, committing the cursor only on success.
    pub fn read<T: Unmarshal>(&mut self) -> Result<T> {
        let mut probe = *self;
        let value = T::unmarshal(&mut probe)?;
        *self = probe;
        Ok(value)
    }

    /// Decode a structure wrapped in a 16-bit size field.
    ///
    /// The structure must consume exactly the declared number of bytes.
    pub fn sized_struct<T: Unmarshal>(&mut self, context: &'static str) -> Result<T> {
        let mut probe = *self;
        let body = probe.sized()?;
        let value = decode_exact_in::<T>(body, context)?;
        *self = probe;
        Ok(value)
    }

    /// Decode a `u32` count-prefixed list of at most `max` entries.
    pub fn list<T: Unmarshal>(&mut self, kind: &'static str, max: usize) -> Result<Vec<T>> {
        let mut probe = *self;
        let count = probe.u32()? as usize;
        if count > max {
            return Err(ProtocolError::ListTooLong { kind, count, max });
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(probe.read::<T>()?);
        }
        *self = probe;
        Ok(items)
    }
}

/// Append a 16-bit length and the bytes it covers.
///
/// Callers guarantee `bytes.len() <= u16::MAX`; the sized buffer types
/// enforce their own (smaller) maximums on construction.
pub fn put_sized(buf: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= u16::MAX as usize);
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
}

/// Append a structure wrapped in a backpatched 16-bit size field.
pub fn put_sized_struct<T: Marshal + ?Sized>(buf: &mut Vec<u8>, value: &T) {
    let start = buf.len();
    buf.put_u16(0);
    value.marshal(buf);
    let len = buf.len() - start - 2;
    debug_assert!(len <= u16::MAX as usize);
    buf[start..start + 2].copy_from_slice(&(len as u16).to_be_bytes());
}

/// Append a `u32` count followed by each item.
pub fn put_list<T: Marshal>(buf: &mut Vec<u8>, items: &[T]) {
    buf.put_u32(items.len() as u32);
    for item in items {
        item.marshal(buf);
    }
}

/// Decode a value from the front of `data`, returning the unread tail.
pub fn decode<T: Unmarshal>(data: &[u8]) -> Result<(T, &[u8])> {
    let mut reader = Reader::new(data);
    let value = reader.read::<T>()?;
    Ok((value, reader.rest()))
}

/// Decode a value that must span all of `data`.
pub fn decode_exact<T: Unmarshal>(data: &[u8]) -> Result<T> {
    decode_exact_in(data, std::any::type_name::<T>())
}

fn decode_exact_in<T: Unmarshal>(data: &[u8], context: &'static str) -> Result<T> {
    let (value, rest) = decode::<T>(data)?;
    if !rest.is_empty() {
        return Err(ProtocolError::TrailingBytes {
            context,
            count: rest.len(),
        });
    }
    Ok(value)
}

impl Marshal for u8 {
    fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u8(*self);
    }
}

impl Unmarshal for u8 {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        reader.u8()
    }
}

impl Marshal for u16 {
    fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u16(*self);
    }
}

impl Unmarshal for u16 {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        reader.u16()
    }
}

impl Marshal for u32 {
    fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u32(*self);
    }
}

impl Unmarshal for u32 {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        reader.u32()
    }
}

impl Marshal for u64 {
    fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u64(*self);
    }
}

impl Unmarshal for u64 {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        reader.u64()
    }
}

/// `TPMI_YES_NO`: a single byte that must be 0 or 1.
impl Marshal for bool {
    fn marshal(&self, buf: &mut Vec<u8>) {
        buf.put_u8(u8::from(*self));
    }
}

impl Unmarshal for bool {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        match reader.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidValue {
                field: "TPMI_YES_NO",
                value: other as u32,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Pair(u16, u32);

    impl Marshal for Pair {
        fn marshal(&self, buf: &mut Vec<u8>) {
            self.0.marshal(buf);
            self.1.marshal(buf);
        }
    }

    impl Unmarshal for Pair {
        fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
            Ok(Self(reader.u16()?, reader.u32()?))
        }
    }

    #[test]
    fn test_integers_are_big_endian() {
        let mut buf = Vec::new();
        0x0102u16.marshal(&mut buf);
        0x0304_0506u32.marshal(&mut buf);
        0x0708_090A_0B0C_0D0Eu64.marshal(&mut buf);
        assert_eq!(
            buf,
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14]
        );
    }

    #[test]
    fn test_decode_returns_remaining() {
        let data = [0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xAA, 0xBB];
        let (pair, rest) = decode::<Pair>(&data).unwrap();
        assert_eq!(pair, Pair(1, 2));
        assert_eq!(rest, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_decode_exact_rejects_trailing_bytes() {
        let data = [0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xAA];
        let err = decode_exact::<Pair>(&data).unwrap_err();
        assert!(matches!(err, ProtocolError::TrailingBytes { count: 1, .. }));
    }

    #[test]
    fn test_truncated_integer() {
        let mut reader = Reader::new(&[0x01, 0x02, 0x03]);
        let err = reader.u32().unwrap_err();
        assert_eq!(
            err,
            ProtocolError::TruncatedInput {
                needed: 4,
                remaining: 3
            }
        );
    }

    #[test]
    fn test_failed_read_leaves_cursor_untouched() {
        // u16 succeeds inside Pair, then the u32 is short
        let data = [0x00, 0x01, 0x00, 0x00];
        let mut reader = Reader::new(&data);
        assert!(reader.read::<Pair>().is_err());
        assert_eq!(reader.remaining(), 4);
        assert_eq!(reader.u16().unwrap(), 1);
    }

    #[test]
    fn test_sized_roundtrip() {
        let mut buf = Vec::new();
        put_sized(&mut buf, b"abc");
        assert_eq!(buf, vec![0x00, 0x03, b'a', b'b', b'c']);

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.sized().unwrap(), b"abc");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_sized_declared_length_exceeds_input() {
        let data = [0x00, 0x05, 0x01, 0x02];
        let mut reader = Reader::new(&data);
        let err = reader.sized().unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MalformedLength {
                declared: 5,
                remaining: 2
            }
        );
        assert_eq!(reader.remaining(), 4);
    }

    #[test]
    fn test_sized_struct_backpatches_length() {
        let mut buf = Vec::new();
        put_sized_struct(&mut buf, &Pair(7, 9));
        assert_eq!(&buf[..2], &[0x00, 0x06]);

        let mut reader = Reader::new(&buf);
        let pair = reader.sized_struct::<Pair>("pair").unwrap();
        assert_eq!(pair, Pair(7, 9));
    }

    #[test]
    fn test_sized_struct_must_fill_its_bound() {
        // size says 7 but Pair only consumes 6
        let data = [0x00, 0x07, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xFF];
        let mut reader = Reader::new(&data);
        let err = reader.sized_struct::<Pair>("pair").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TrailingBytes {
                context: "pair",
                count: 1
            }
        ));
    }

    #[test]
    fn test_list_roundtrip() {
        let items = vec![Pair(1, 2), Pair(3, 4)];
        let mut buf = Vec::new();
        put_list(&mut buf, &items);
        assert_eq!(&buf[..4], &[0, 0, 0, 2]);

        let mut reader = Reader::new(&buf);
        let decoded: Vec<Pair> = reader.list("pairs", 8).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn test_list_count_limit() {
        let data = [0x00, 0x00, 0x00, 0x09];
        let mut reader = Reader::new(&data);
        let err = reader.list::<Pair>("pairs", 8).unwrap_err();
        assert!(matches!(err, ProtocolError::ListTooLong { count: 9, max: 8, .. }));
    }

    #[test]
    fn test_bool_rejects_out_of_range() {
        assert_eq!(decode_exact::<bool>(&[1]).unwrap(), true);
        assert_eq!(decode_exact::<bool>(&[0]).unwrap(), false);
        assert!(matches!(
            decode_exact::<bool>(&[2]).unwrap_err(),
            ProtocolError::InvalidValue { value: 2, .. }
        ));
    }
}
