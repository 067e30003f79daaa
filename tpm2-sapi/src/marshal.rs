// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 marshalling/unmarshalling utilities
//!
//! Every codec runs against a cursor. A [`CommandBuffer`] either writes into a
//! caller-owned slice or, when it has no backing slice, only advances its
//! cursor so the encoded size of a value can be probed before anything is
//! allocated. A [`ResponseBuffer`] reads from a caller-owned slice; decoding a
//! value and dropping it is the skip mode.
//!
//! The free functions [`marshal`], [`unmarshal`], [`marshal_union`] and
//! [`unmarshal_union`] are the dual-mode entry points working on raw slices
//! and optional cursors.

use std::any::type_name;
use std::fmt::Debug;

use tracing::{trace, warn};

use crate::constants::{
    TpmAlgId, TpmCap, TpmEccCurve, TpmSt, TpmaAlgorithm, TpmaCc, TpmaLocality, TpmaNv, TpmaObject,
    TpmaSession,
};
use crate::error::{Result, SapiError};

/// Cursor for building TPM commands
#[derive(Debug)]
pub struct CommandBuffer<'a> {
    data: Option<&'a mut [u8]>,
    pos: usize,
}

impl<'a> CommandBuffer<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self::at(data, 0)
    }

    pub fn at(data: &'a mut [u8], pos: usize) -> Self {
        Self {
            data: Some(data),
            pos,
        }
    }

    /// A cursor that writes nothing and only counts bytes
    pub fn size_probe() -> Self {
        Self::size_probe_at(0)
    }

    pub fn size_probe_at(pos: usize) -> Self {
        Self { data: None, pos }
    }

    pub fn is_size_probe(&self) -> bool {
        self.data.is_none()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let start = self.pos;
        let capacity = self.data.as_deref().map_or(usize::MAX, <[u8]>::len);
        let end = match start.checked_add(bytes.len()) {
            Some(end) if end <= capacity => end,
            _ => {
                return Err(SapiError::InsufficientBuffer {
                    offset: start,
                    needed: bytes.len(),
                    capacity,
                })
            }
        };
        if let Some(data) = self.data.as_deref_mut() {
            data[start..end].copy_from_slice(bytes);
        }
        self.pos = end;
        Ok(())
    }

    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        self.put_bytes(&[v])
    }

    pub fn put_u16(&mut self, v: u16) -> Result<()> {
        self.put_bytes(&v.to_be_bytes())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<()> {
        self.put_bytes(&v.to_be_bytes())
    }

    pub fn put_u64(&mut self, v: u64) -> Result<()> {
        self.put_bytes(&v.to_be_bytes())
    }

    /// Overwrite bytes already produced (for size fields). No-op on a size probe.
    pub fn update_bytes(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        let Some(data) = self.data.as_deref_mut() else {
            return Ok(());
        };
        match pos.checked_add(bytes.len()) {
            Some(end) if end <= self.pos && end <= data.len() => {
                data[pos..end].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(SapiError::InsufficientBuffer {
                offset: pos,
                needed: bytes.len(),
                capacity: self.pos,
            }),
        }
    }

    pub fn update_u32(&mut self, pos: usize, v: u32) -> Result<()> {
        self.update_bytes(pos, &v.to_be_bytes())
    }
}

/// Cursor for parsing TPM responses
#[derive(Debug, Clone)]
pub struct ResponseBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ResponseBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.pos;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => {
                self.pos = end;
                Ok(&self.data[start..end])
            }
            _ => Err(SapiError::InsufficientBuffer {
                offset: start,
                needed: len,
                capacity: self.data.len(),
            }),
        }
    }

    fn get_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.get_bytes(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_array::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        self.get_array().map(u16::from_be_bytes)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.get_array().map(u32::from_be_bytes)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        self.get_array().map(u64::from_be_bytes)
    }

    /// Skip bytes
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.get_bytes(len).map(drop)
    }
}

/// Trait for types that can be marshalled to TPM format
pub trait Marshal {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()>;

    /// Encoded size, computed with a size probe
    fn marshalled_size(&self) -> Result<usize> {
        let mut probe = CommandBuffer::size_probe();
        self.marshal(&mut probe)?;
        Ok(probe.position())
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.marshalled_size()?];
        let mut buf = CommandBuffer::new(&mut out);
        self.marshal(&mut buf)?;
        Ok(out)
    }
}

/// Trait for types that can be unmarshalled from TPM format
pub trait Unmarshal: Sized {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self>;

    /// Consume and validate an encoded value without keeping it
    fn skip(buf: &mut ResponseBuffer<'_>) -> Result<()> {
        Self::unmarshal(buf).map(drop)
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut buf = ResponseBuffer::new(data);
        Self::unmarshal(&mut buf)
    }
}

/// A payload whose shape is chosen by a selector carried outside of it.
///
/// The enclosing structure owns the selector field; it is passed in
/// explicitly on both directions.
pub trait Union: Sized {
    type Selector: Copy + Debug;

    /// Fails with `BadValue` for an unknown selector or a variant that does not
    /// belong to `selector`, before writing payload bytes.
    fn marshal_union(&self, selector: Self::Selector, buf: &mut CommandBuffer<'_>) -> Result<()>;

    /// Fails with `MalformedResponse` for an unknown selector.
    fn unmarshal_union(selector: Self::Selector, buf: &mut ResponseBuffer<'_>) -> Result<Self>;
}

fn run_marshal(
    what: &str,
    buffer: Option<&mut [u8]>,
    offset: Option<&mut usize>,
    encode: impl FnOnce(&mut CommandBuffer<'_>) -> Result<()>,
) -> Result<()> {
    let start = offset.as_deref().copied().unwrap_or(0);
    let mut buf = match buffer {
        Some(data) => CommandBuffer::at(data, start),
        None if offset.is_some() => CommandBuffer::size_probe_at(start),
        None => {
            warn!("marshal {what}: neither buffer nor offset given");
            return Err(SapiError::BadReference("offset"));
        }
    };
    trace!(
        "marshalling {what} at offset {start} ({})",
        if buf.is_size_probe() { "probe" } else { "write" }
    );
    encode(&mut buf)?;
    if let Some(offset) = offset {
        *offset = buf.position();
    }
    Ok(())
}

fn run_unmarshal<T>(
    what: &str,
    buffer: &[u8],
    offset: Option<&mut usize>,
    dest: Option<&mut T>,
    decode: impl FnOnce(&mut ResponseBuffer<'_>) -> Result<T>,
) -> Result<()> {
    if offset.is_none() && dest.is_none() {
        warn!("unmarshal {what}: neither destination nor offset given");
        return Err(SapiError::BadReference("offset"));
    }
    let start = offset.as_deref().copied().unwrap_or(0);
    trace!(
        "unmarshalling {what} at offset {start} ({})",
        if dest.is_some() { "read" } else { "skip" }
    );
    let mut buf = ResponseBuffer::at(buffer, start);
    let value = decode(&mut buf)?;
    if let Some(dest) = dest {
        *dest = value;
    }
    if let Some(offset) = offset {
        *offset = buf.position();
    }
    Ok(())
}

/// Encode `src` into `buffer` at `offset`.
///
/// Without `buffer` the value is only measured: `offset` advances by the
/// encoded size. Without `offset` an internal cursor starting at zero is used,
/// which requires `buffer`. `offset` is written back only on success.
pub fn marshal<T: Marshal + ?Sized>(
    src: Option<&T>,
    buffer: Option<&mut [u8]>,
    offset: Option<&mut usize>,
) -> Result<()> {
    let what = type_name::<T>();
    let Some(src) = src else {
        warn!("marshal {what}: no source value");
        return Err(SapiError::BadReference("source value"));
    };
    run_marshal(what, buffer, offset, |buf| src.marshal(buf))
}

/// Decode a `T` from `buffer` at `offset` into `dest`.
///
/// Without `dest` the value is validated and skipped. Without `offset` an
/// internal cursor starting at zero is used, which requires `dest`.
pub fn unmarshal<T: Unmarshal>(
    buffer: &[u8],
    offset: Option<&mut usize>,
    dest: Option<&mut T>,
) -> Result<()> {
    run_unmarshal(type_name::<T>(), buffer, offset, dest, T::unmarshal)
}

/// Union flavour of [`marshal`]: the payload codec is selected by `selector`.
pub fn marshal_union<U: Union>(
    src: Option<&U>,
    selector: U::Selector,
    buffer: Option<&mut [u8]>,
    offset: Option<&mut usize>,
) -> Result<()> {
    let what = type_name::<U>();
    let Some(src) = src else {
        warn!("marshal {what}: no source value");
        return Err(SapiError::BadReference("source value"));
    };
    run_marshal(what, buffer, offset, |buf| {
        src.marshal_union(selector, buf)
    })
}

/// Union flavour of [`unmarshal`].
pub fn unmarshal_union<U: Union>(
    selector: U::Selector,
    buffer: &[u8],
    offset: Option<&mut usize>,
    dest: Option<&mut U>,
) -> Result<()> {
    run_unmarshal(type_name::<U>(), buffer, offset, dest, |buf| {
        U::unmarshal_union(selector, buf)
    })
}

// Implement Marshal for primitive types
impl Marshal for u8 {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u8(*self)
    }
}

impl Marshal for u16 {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u16(*self)
    }
}

impl Marshal for u32 {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u32(*self)
    }
}

impl Marshal for u64 {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u64(*self)
    }
}

// Implement Unmarshal for primitive types
impl Unmarshal for u8 {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u8()
    }

    fn skip(buf: &mut ResponseBuffer<'_>) -> Result<()> {
        buf.skip(1)
    }
}

impl Unmarshal for u16 {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u16()
    }

    fn skip(buf: &mut ResponseBuffer<'_>) -> Result<()> {
        buf.skip(2)
    }
}

impl Unmarshal for u32 {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u32()
    }

    fn skip(buf: &mut ResponseBuffer<'_>) -> Result<()> {
        buf.skip(4)
    }
}

impl Unmarshal for u64 {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u64()
    }

    fn skip(buf: &mut ResponseBuffer<'_>) -> Result<()> {
        buf.skip(8)
    }
}

// Identifiers and attribute bitfields travel as their raw integer
impl Marshal for TpmAlgId {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u16(self.0)
    }
}

impl Unmarshal for TpmAlgId {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u16().map(Self)
    }
}

impl Marshal for TpmSt {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u16(self.0)
    }
}

impl Unmarshal for TpmSt {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u16().map(Self)
    }
}

impl Marshal for TpmEccCurve {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u16(self.0)
    }
}

impl Unmarshal for TpmEccCurve {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u16().map(Self)
    }
}

impl Marshal for TpmCap {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u32(self.0)
    }
}

impl Unmarshal for TpmCap {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u32().map(Self)
    }
}

impl Marshal for TpmaObject {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u32(self.0)
    }
}

impl Unmarshal for TpmaObject {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u32().map(Self)
    }
}

impl Marshal for TpmaNv {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u32(self.0)
    }
}

impl Unmarshal for TpmaNv {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u32().map(Self)
    }
}

impl Marshal for TpmaAlgorithm {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u32(self.0)
    }
}

impl Unmarshal for TpmaAlgorithm {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u32().map(Self)
    }
}

impl Marshal for TpmaCc {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u32(self.0)
    }
}

impl Unmarshal for TpmaCc {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u32().map(Self)
    }
}

impl Marshal for TpmaSession {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u8(self.0)
    }
}

impl Unmarshal for TpmaSession {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u8().map(Self)
    }
}

impl Marshal for TpmaLocality {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        buf.put_u8(self.0)
    }
}

impl Unmarshal for TpmaLocality {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        buf.get_u8().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Stamp {
        count: u64,
        reset: u32,
    }

    impl Marshal for Stamp {
        fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
            self.count.marshal(buf)?;
            self.reset.marshal(buf)
        }
    }

    impl Unmarshal for Stamp {
        fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
            Ok(Self {
                count: u64::unmarshal(buf)?,
                reset: u32::unmarshal(buf)?,
            })
        }
    }

    #[test]
    fn test_big_endian_primitives() {
        let mut data = [0u8; 15];
        let mut buf = CommandBuffer::new(&mut data);
        buf.put_u8(0x01).unwrap();
        buf.put_u16(0x0203).unwrap();
        buf.put_u32(0x04050607).unwrap();
        buf.put_u64(0x08090a0b0c0d0e0f).unwrap();
        assert_eq!(buf.position(), 15);
        assert_eq!(data, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);

        let mut rsp = ResponseBuffer::new(&data);
        assert_eq!(rsp.get_u8().unwrap(), 0x01);
        assert_eq!(rsp.get_u16().unwrap(), 0x0203);
        assert_eq!(rsp.get_u32().unwrap(), 0x04050607);
        assert_eq!(rsp.get_u64().unwrap(), 0x08090a0b0c0d0e0f);
        assert_eq!(rsp.remaining(), 0);
    }

    #[test]
    fn test_structure_at_offset() {
        let stamp = Stamp {
            count: 0x1122334455667788,
            reset: 0xaabbccdd,
        };
        let mut data = [0u8; 20];
        let mut offset = 5;
        marshal(Some(&stamp), Some(&mut data[..]), Some(&mut offset)).unwrap();
        assert_eq!(offset, 17);
        assert_eq!(&data[..5], &[0; 5]);
        assert_eq!(&data[5..13], &0x1122334455667788u64.to_be_bytes());
        assert_eq!(&data[13..17], &0xaabbccddu32.to_be_bytes());
        assert_eq!(&data[17..], &[0; 3]);

        let mut decoded = Stamp::default();
        let mut offset = 5;
        unmarshal(&data, Some(&mut offset), Some(&mut decoded)).unwrap();
        assert_eq!(decoded, stamp);
        assert_eq!(offset, 17);
    }

    #[test]
    fn test_size_probe_matches_write() {
        let stamp = Stamp { count: 1, reset: 2 };
        let mut offset = 0;
        marshal(Some(&stamp), None, Some(&mut offset)).unwrap();
        assert_eq!(offset, 12);
        assert_eq!(stamp.marshalled_size().unwrap(), 12);

        let mut exact = [0u8; 12];
        marshal(Some(&stamp), Some(&mut exact[..]), None).unwrap();
        assert_eq!(exact.to_vec(), stamp.to_bytes().unwrap());
    }

    #[test]
    fn test_missing_references() {
        let mut data = [0xffu8; 4];
        let mut offset = 1;
        let err = marshal::<u32>(None, Some(&mut data[..]), Some(&mut offset)).unwrap_err();
        assert!(matches!(err, SapiError::BadReference(_)));
        assert_eq!(offset, 1);
        assert_eq!(data, [0xff; 4]);

        let err = marshal(Some(&7u32), None, None).unwrap_err();
        assert!(matches!(err, SapiError::BadReference(_)));

        let err = unmarshal::<u32>(&data, None, None).unwrap_err();
        assert!(matches!(err, SapiError::BadReference(_)));
    }

    #[test]
    fn test_skip_mode_advances_cursor() {
        let data = [0u8; 12];
        let mut offset = 0;
        unmarshal::<Stamp>(&data, Some(&mut offset), None).unwrap();
        assert_eq!(offset, 12);
    }

    #[test]
    fn test_insufficient_buffer_leaves_offset() {
        let stamp = Stamp { count: 1, reset: 2 };
        let mut data = [0u8; 10];
        let mut offset = 0;
        let err = marshal(Some(&stamp), Some(&mut data[..]), Some(&mut offset)).unwrap_err();
        assert!(matches!(
            err,
            SapiError::InsufficientBuffer {
                offset: 8,
                needed: 4,
                capacity: 10
            }
        ));
        assert_eq!(offset, 0);
        // The first field is already written; nothing is rolled back.
        assert_eq!(&data[..8], &1u64.to_be_bytes());

        let mut offset = 0;
        let err = unmarshal::<Stamp>(&data, Some(&mut offset), None).unwrap_err();
        assert!(matches!(err, SapiError::InsufficientBuffer { .. }));
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_update_u32() {
        let mut data = [0u8; 6];
        let mut buf = CommandBuffer::new(&mut data);
        buf.put_u16(0x8001).unwrap();
        buf.put_u32(0).unwrap();
        buf.update_u32(2, 6).unwrap();
        assert!(buf.update_u32(4, 1).is_err());
        assert_eq!(data, [0x80, 0x01, 0, 0, 0, 6]);
    }
}
