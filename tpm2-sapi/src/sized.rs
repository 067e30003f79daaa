// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Bounded containers: TPM2B buffers, PCR selections, TPML lists and
//! size-prefixed structures.
//!
//! Every container has a capacity fixed by the protocol. Encoding checks the
//! element count before writing anything; decoding checks the count right
//! after reading it and never touches the element bytes an over-large count
//! would imply.

use tracing::warn;

use crate::constants::*;
use crate::error::{Result, SapiError};
use crate::marshal::{CommandBuffer, Marshal, ResponseBuffer, Unmarshal};
use crate::types::{
    TpmsAlgProperty, TpmsAuthCommand, TpmsCreationData, TpmsEccPoint, TpmsNvPublic,
    TpmsSensitiveCreate, TpmsTaggedProperty,
};
use crate::unions::{TpmtHa, TpmtPublic};

/// Write `count` as a `C`, then every element.
pub(crate) fn marshal_counted<C, T>(
    items: &[T],
    max: usize,
    what: &str,
    buf: &mut CommandBuffer<'_>,
) -> Result<()>
where
    C: Marshal + TryFrom<usize>,
    T: Marshal,
{
    let count = items.len();
    let encoded = match C::try_from(count) {
        Ok(encoded) if count <= max => encoded,
        _ => {
            warn!("{what}: {count} elements exceed capacity {max}");
            return Err(SapiError::bad_value(format!(
                "{what}: {count} elements exceed capacity {max}"
            )));
        }
    };
    encoded.marshal(buf)?;
    for item in items {
        item.marshal(buf)?;
    }
    Ok(())
}

/// Read a `C` count, reject it if it exceeds `max`, then read that many elements.
pub(crate) fn unmarshal_counted<C, T>(
    max: usize,
    what: &str,
    buf: &mut ResponseBuffer<'_>,
) -> Result<Vec<T>>
where
    C: Unmarshal + Into<u64>,
    T: Unmarshal,
{
    let count: u64 = C::unmarshal(buf)?.into();
    let count = match usize::try_from(count) {
        Ok(count) if count <= max => count,
        _ => {
            return Err(SapiError::malformed(format!(
                "{what}: count {count} exceeds capacity {max}"
            )))
        }
    };
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(T::unmarshal(buf)?);
    }
    Ok(items)
}

/// TPM2B: a 16-bit size followed by at most `MAX` bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tpm2b<const MAX: usize> {
    pub buffer: Vec<u8>,
}

impl<const MAX: usize> Tpm2b<MAX> {
    pub const CAPACITY: usize = MAX;

    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            buffer: data.into(),
        }
    }

    pub fn empty() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn read_size(buf: &mut ResponseBuffer<'_>) -> Result<usize> {
        let size = buf.get_u16()? as usize;
        if size > MAX {
            return Err(SapiError::malformed(format!(
                "TPM2B size {size} exceeds capacity {MAX}"
            )));
        }
        Ok(size)
    }
}

impl<const MAX: usize> Marshal for Tpm2b<MAX> {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        let size = self.buffer.len();
        if size > MAX {
            warn!("TPM2B of {size} bytes exceeds capacity {MAX}");
            return Err(SapiError::bad_value(format!(
                "TPM2B size {size} exceeds capacity {MAX}"
            )));
        }
        buf.put_u16(size as u16)?;
        buf.put_bytes(&self.buffer)
    }
}

impl<const MAX: usize> Unmarshal for Tpm2b<MAX> {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        let size = Self::read_size(buf)?;
        Ok(Self::new(buf.get_bytes(size)?))
    }

    fn skip(buf: &mut ResponseBuffer<'_>) -> Result<()> {
        let size = Self::read_size(buf)?;
        buf.skip(size)
    }
}

pub type Tpm2bDigest = Tpm2b<MAX_DIGEST_SIZE>;
pub type Tpm2bNonce = Tpm2bDigest;
pub type Tpm2bAuth = Tpm2bDigest;
pub type Tpm2bOperand = Tpm2bDigest;
pub type Tpm2bData = Tpm2b<MAX_DATA_SIZE>;
pub type Tpm2bName = Tpm2b<MAX_NAME_SIZE>;
pub type Tpm2bEvent = Tpm2b<MAX_EVENT_SIZE>;
pub type Tpm2bMaxBuffer = Tpm2b<MAX_DIGEST_BUFFER>;
pub type Tpm2bMaxNvBuffer = Tpm2b<MAX_NV_BUFFER_SIZE>;
pub type Tpm2bEccParameter = Tpm2b<MAX_ECC_KEY_BYTES>;
pub type Tpm2bPublicKeyRsa = Tpm2b<MAX_RSA_KEY_BYTES>;
pub type Tpm2bSensitiveData = Tpm2b<MAX_SYM_DATA>;
pub type Tpm2bIdObject = Tpm2b<MAX_ID_OBJECT_SIZE>;
pub type Tpm2bEncryptedSecret = Tpm2b<MAX_ENCRYPTED_SECRET_SIZE>;
pub type Tpm2bAttest = Tpm2b<MAX_ATTEST_SIZE>;
pub type Tpm2bContextSensitive = Tpm2b<MAX_CONTEXT_SIZE>;
pub type Tpm2bContextData = Tpm2b<MAX_CONTEXT_SIZE>;

/// TPMS_PCR_SELECT - a bare PCR bitmap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsPcrSelect {
    pub pcr_select: Vec<u8>,
}

impl Marshal for TpmsPcrSelect {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        marshal_counted::<u8, _>(&self.pcr_select, PCR_SELECT_MAX, "TPMS_PCR_SELECT", buf)
    }
}

impl Unmarshal for TpmsPcrSelect {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            pcr_select: unmarshal_counted::<u8, _>(PCR_SELECT_MAX, "TPMS_PCR_SELECT", buf)?,
        })
    }
}

/// TPMS_PCR_SELECTION - PCR selection for a single hash algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsPcrSelection {
    pub hash: TpmAlgId,
    pub pcr_select: Vec<u8>,
}

impl Marshal for TpmsPcrSelection {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.hash.marshal(buf)?;
        marshal_counted::<u8, _>(&self.pcr_select, PCR_SELECT_MAX, "TPMS_PCR_SELECTION", buf)
    }
}

impl Unmarshal for TpmsPcrSelection {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            hash: TpmAlgId::unmarshal(buf)?,
            pcr_select: unmarshal_counted::<u8, _>(PCR_SELECT_MAX, "TPMS_PCR_SELECTION", buf)?,
        })
    }
}

/// TPMS_TAGGED_PCR_SELECT - PCR bitmap for a PCR property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsTaggedPcrSelect {
    pub tag: u32,
    pub pcr_select: Vec<u8>,
}

impl Marshal for TpmsTaggedPcrSelect {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.tag.marshal(buf)?;
        marshal_counted::<u8, _>(
            &self.pcr_select,
            PCR_SELECT_MAX,
            "TPMS_TAGGED_PCR_SELECT",
            buf,
        )
    }
}

impl Unmarshal for TpmsTaggedPcrSelect {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            tag: u32::unmarshal(buf)?,
            pcr_select: unmarshal_counted::<u8, _>(
                PCR_SELECT_MAX,
                "TPMS_TAGGED_PCR_SELECT",
                buf,
            )?,
        })
    }
}

/// TPML: a 32-bit count followed by at most `MAX` elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmList<T, const MAX: usize> {
    pub items: Vec<T>,
}

impl<T, const MAX: usize> Default for TpmList<T, MAX> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T, const MAX: usize> TpmList<T, MAX> {
    pub const CAPACITY: usize = MAX;

    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Marshal, const MAX: usize> Marshal for TpmList<T, MAX> {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        marshal_counted::<u32, _>(&self.items, MAX, std::any::type_name::<T>(), buf)
    }
}

impl<T: Unmarshal, const MAX: usize> Unmarshal for TpmList<T, MAX> {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        let items = unmarshal_counted::<u32, _>(MAX, std::any::type_name::<T>(), buf)?;
        Ok(Self { items })
    }
}

pub type TpmlPcrSelection = TpmList<TpmsPcrSelection, NUM_PCR_BANKS>;
pub type TpmlDigest = TpmList<Tpm2bDigest, MAX_DIGEST_LIST>;
pub type TpmlDigestValues = TpmList<TpmtHa, NUM_PCR_BANKS>;
pub type TpmlHandle = TpmList<u32, MAX_CAP_HANDLES>;
pub type TpmlCc = TpmList<u32, MAX_CAP_CC>;
pub type TpmlCca = TpmList<TpmaCc, MAX_CAP_CC>;
pub type TpmlAlgProperty = TpmList<TpmsAlgProperty, MAX_CAP_ALGS>;
pub type TpmlTaggedTpmProperty = TpmList<TpmsTaggedProperty, MAX_TPM_PROPERTIES>;
pub type TpmlTaggedPcrProperty = TpmList<TpmsTaggedPcrSelect, MAX_PCR_PROPERTIES>;
pub type TpmlEccCurve = TpmList<TpmEccCurve, MAX_ECC_CURVES>;
pub type TpmlAuthCommand = TpmList<TpmsAuthCommand, MAX_SESSION_NUM>;

/// A structure wrapped in a 16-bit size prefix (TPM2B_PUBLIC and friends).
///
/// The size is computed with a size probe, so nothing is buffered twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedStruct<T> {
    pub inner: T,
}

impl<T> SizedStruct<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: Marshal> Marshal for SizedStruct<T> {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        let size = self.inner.marshalled_size()?;
        let size = u16::try_from(size).map_err(|_| {
            SapiError::bad_value(format!("sized structure of {size} bytes does not fit TPM2B"))
        })?;
        buf.put_u16(size)?;
        self.inner.marshal(buf)
    }
}

impl<T: Unmarshal> Unmarshal for SizedStruct<T> {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        let size = buf.get_u16()? as usize;
        if size == 0 {
            return Err(SapiError::malformed("sized structure with zero size"));
        }
        let mut inner_buf = ResponseBuffer::new(buf.get_bytes(size)?);
        let inner = T::unmarshal(&mut inner_buf)?;
        if inner_buf.remaining() != 0 {
            return Err(SapiError::malformed(format!(
                "sized structure declares {size} bytes, {} left unparsed",
                inner_buf.remaining()
            )));
        }
        Ok(Self { inner })
    }
}

pub type Tpm2bNvPublic = SizedStruct<TpmsNvPublic>;
pub type Tpm2bEccPoint = SizedStruct<TpmsEccPoint>;
pub type Tpm2bSensitiveCreate = SizedStruct<TpmsSensitiveCreate>;
pub type Tpm2bPublic = SizedStruct<TpmtPublic>;
pub type Tpm2bCreationData = SizedStruct<TpmsCreationData>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{marshal, unmarshal};

    #[test]
    fn test_pcr_select_encoding() {
        let select = TpmsPcrSelect {
            pcr_select: vec![1, 2, 3],
        };
        let mut data = [0u8; 4];
        let mut offset = 0;
        marshal(Some(&select), Some(&mut data[..]), Some(&mut offset)).unwrap();
        assert_eq!(offset, 4);
        assert_eq!(data, [0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_count_over_capacity_writes_nothing() {
        let items = [0u8; 10];
        let mut data = [0xaau8; 16];
        let mut buf = CommandBuffer::new(&mut data);
        let err = marshal_counted::<u8, _>(&items, 8, "selection", &mut buf).unwrap_err();
        assert!(matches!(err, SapiError::BadValue(_)));
        assert_eq!(buf.position(), 0);
        assert_eq!(data, [0xaa; 16]);
    }

    #[test]
    fn test_decode_count_over_capacity_stops_after_count() {
        // sizeofSelect = 5 exceeds PCR_SELECT_MAX, followed by plenty of bytes
        let data = [0x00, 0x0b, 0x05, 0xff, 0xff, 0xff, 0xff, 0xff];
        let mut buf = ResponseBuffer::new(&data);
        let err = TpmsPcrSelection::unmarshal(&mut buf).unwrap_err();
        assert!(matches!(err, SapiError::MalformedResponse(_)));
        assert_eq!(buf.position(), 3);
    }

    #[test]
    fn test_pcr_selection_roundtrip() {
        // PCRs 0, 7 and 23 in the SHA256 bank
        let sel = TpmlPcrSelection::new(vec![TpmsPcrSelection {
            hash: TpmAlgId::SHA256,
            pcr_select: vec![0b1000_0001, 0x00, 0b1000_0000],
        }]);
        let bytes = sel.to_bytes().unwrap();
        assert_eq!(
            bytes,
            [0, 0, 0, 1, 0x00, 0x0b, 3, 0b1000_0001, 0x00, 0b1000_0000]
        );
        let decoded = TpmlPcrSelection::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, sel);
    }

    #[test]
    fn test_tagged_pcr_select_skip() {
        let data = [0, 0, 0, 1, 3, 0xff, 0, 0, 0xee];
        let mut offset = 0;
        unmarshal::<TpmsTaggedPcrSelect>(&data, Some(&mut offset), None).unwrap();
        assert_eq!(offset, 8);
    }

    #[test]
    fn test_tpm2b_capacity() {
        let too_big = Tpm2bDigest::new(vec![0u8; MAX_DIGEST_SIZE + 1]);
        assert!(matches!(
            too_big.marshalled_size(),
            Err(SapiError::BadValue(_))
        ));

        let mut data = vec![0x00, 0x41];
        data.extend_from_slice(&[0u8; 0x41]);
        assert!(matches!(
            Tpm2bDigest::from_bytes(&data),
            Err(SapiError::MalformedResponse(_))
        ));

        let digest = Tpm2bDigest::from_bytes(&[0x00, 0x02, 0xab, 0xcd, 0xef]).unwrap();
        assert_eq!(digest.as_bytes(), &[0xab, 0xcd]);
    }

    #[test]
    fn test_data_and_name_capacity() {
        // TPM2B_DATA holds a full TPMT_HA
        let data = Tpm2bData::new(vec![7u8; 66]);
        let bytes = data.to_bytes().unwrap();
        assert_eq!(bytes.len(), 68);
        assert_eq!(Tpm2bData::from_bytes(&bytes).unwrap(), data);
        assert!(matches!(
            Tpm2bData::new(vec![0u8; 67]).to_bytes(),
            Err(SapiError::BadValue(_))
        ));

        let name = Tpm2bName::new(vec![1u8; 66]);
        assert_eq!(name.marshalled_size().unwrap(), 68);
        let mut wire = vec![0x00, 0x43];
        wire.extend_from_slice(&[0u8; 67]);
        assert!(matches!(
            Tpm2bName::from_bytes(&wire),
            Err(SapiError::MalformedResponse(_))
        ));
        let mut wire = vec![0x00, 0x44];
        wire.extend_from_slice(&[0u8; 68]);
        assert!(matches!(
            Tpm2bName::from_bytes(&wire),
            Err(SapiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_list_capacity() {
        let list = TpmlDigest::new(vec![Tpm2bDigest::empty(); MAX_DIGEST_LIST + 1]);
        assert!(matches!(list.to_bytes(), Err(SapiError::BadValue(_))));

        let data = [0, 0, 0, 9, 0, 0];
        let mut buf = ResponseBuffer::new(&data);
        assert!(matches!(
            TpmlDigest::unmarshal(&mut buf),
            Err(SapiError::MalformedResponse(_))
        ));
        assert_eq!(buf.position(), 4);
    }

    #[test]
    fn test_sized_struct() {
        let point = Tpm2bEccPoint::new(TpmsEccPoint {
            x: Tpm2bEccParameter::new(vec![1, 2]),
            y: Tpm2bEccParameter::new(vec![3]),
        });
        let bytes = point.to_bytes().unwrap();
        assert_eq!(bytes, [0, 7, 0, 2, 1, 2, 0, 1, 3]);
        assert_eq!(Tpm2bEccPoint::from_bytes(&bytes).unwrap(), point);

        assert!(matches!(
            Tpm2bEccPoint::from_bytes(&[0, 0]),
            Err(SapiError::MalformedResponse(_))
        ));
        // declared size larger than the inner structure
        assert!(matches!(
            Tpm2bEccPoint::from_bytes(&[0, 5, 0, 0, 0, 0, 0]),
            Err(SapiError::MalformedResponse(_))
        ));

        let sensitive = Tpm2bSensitiveCreate::new(TpmsSensitiveCreate {
            user_auth: Tpm2bAuth::empty(),
            data: Tpm2bSensitiveData::new(vec![0xaa, 0xbb]),
        });
        assert_eq!(
            sensitive.to_bytes().unwrap(),
            [0, 6, 0, 0, 0, 2, 0xaa, 0xbb]
        );
    }
}
