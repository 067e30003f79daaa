// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPMU unions and the TPMT structures that carry their selectors.
//!
//! A TPMT structure writes or reads its selector first and hands it to the
//! payload's [`Union`] codec. The payload codecs match selector and variant
//! together; any pair the protocol does not define is an error, never a
//! silent empty payload.

use std::fmt::Debug;
use std::marker::PhantomData;

use tracing::warn;

use crate::constants::*;
use crate::error::{Result, SapiError};
use crate::marshal::{CommandBuffer, Marshal, ResponseBuffer, Union, Unmarshal};
use crate::sized::*;
use crate::types::*;

fn mismatch(what: &str, selector: impl Debug) -> SapiError {
    warn!("{what}: payload does not match selector {selector:?}");
    SapiError::bad_value(format!("{what}: payload does not match selector {selector:?}"))
}

fn unknown(what: &str, selector: impl Debug) -> SapiError {
    SapiError::malformed(format!("{what}: unknown selector {selector:?}"))
}

/// TPMU_HA - digest whose length is fixed by the hash algorithm
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmuHa(pub Vec<u8>);

impl Union for TpmuHa {
    type Selector = TpmAlgId;

    fn marshal_union(&self, selector: TpmAlgId, buf: &mut CommandBuffer<'_>) -> Result<()> {
        match (selector, selector.digest_size()) {
            (TpmAlgId::NULL, _) if self.0.is_empty() => Ok(()),
            (_, Some(size)) if self.0.len() == size => buf.put_bytes(&self.0),
            _ => Err(mismatch("TPMU_HA", selector)),
        }
    }

    fn unmarshal_union(selector: TpmAlgId, buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        match (selector, selector.digest_size()) {
            (TpmAlgId::NULL, _) => Ok(Self::default()),
            (_, Some(size)) => Ok(Self(buf.get_bytes(size)?.to_vec())),
            (_, None) => Err(unknown("TPMU_HA", selector)),
        }
    }
}

/// TPMT_HA - hash algorithm and digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtHa {
    pub hash_alg: TpmAlgId,
    pub digest: TpmuHa,
}

impl TpmtHa {
    pub fn new(hash_alg: TpmAlgId, digest: Vec<u8>) -> Self {
        Self {
            hash_alg,
            digest: TpmuHa(digest),
        }
    }
}

impl Marshal for TpmtHa {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.hash_alg.marshal(buf)?;
        self.digest.marshal_union(self.hash_alg, buf)
    }
}

impl Unmarshal for TpmtHa {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        let hash_alg = TpmAlgId::unmarshal(buf)?;
        let digest = TpmuHa::unmarshal_union(hash_alg, buf)?;
        Ok(Self { hash_alg, digest })
    }
}

/// TPMU_SYM_KEY_BITS and TPMU_SYM_MODE, which share the same selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmuSymDetails {
    Null,
    Xor { hash_alg: TpmAlgId },
    Block { key_bits: u16, mode: TpmAlgId },
}

fn is_block_cipher(alg: TpmAlgId) -> bool {
    matches!(
        alg,
        TpmAlgId::AES | TpmAlgId::SM4 | TpmAlgId::CAMELLIA | TpmAlgId::TDES
    )
}

impl Union for TpmuSymDetails {
    type Selector = TpmAlgId;

    fn marshal_union(&self, selector: TpmAlgId, buf: &mut CommandBuffer<'_>) -> Result<()> {
        match (selector, self) {
            (TpmAlgId::NULL, Self::Null) => Ok(()),
            (TpmAlgId::XOR, Self::Xor { hash_alg }) => hash_alg.marshal(buf),
            (alg, Self::Block { key_bits, mode }) if is_block_cipher(alg) => {
                key_bits.marshal(buf)?;
                mode.marshal(buf)
            }
            _ => Err(mismatch("TPMT_SYM_DEF", selector)),
        }
    }

    fn unmarshal_union(selector: TpmAlgId, buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        match selector {
            TpmAlgId::NULL => Ok(Self::Null),
            TpmAlgId::XOR => Ok(Self::Xor {
                hash_alg: TpmAlgId::unmarshal(buf)?,
            }),
            alg if is_block_cipher(alg) => Ok(Self::Block {
                key_bits: u16::unmarshal(buf)?,
                mode: TpmAlgId::unmarshal(buf)?,
            }),
            _ => Err(unknown("TPMT_SYM_DEF", selector)),
        }
    }
}

/// TPMT_SYM_DEF - Symmetric algorithm definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtSymDef {
    pub algorithm: TpmAlgId,
    pub details: TpmuSymDetails,
}

/// TPMT_SYM_DEF_OBJECT has the same layout
pub type TpmtSymDefObject = TpmtSymDef;

impl TpmtSymDef {
    pub fn null() -> Self {
        Self {
            algorithm: TpmAlgId::NULL,
            details: TpmuSymDetails::Null,
        }
    }
}

impl Marshal for TpmtSymDef {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.algorithm.marshal(buf)?;
        self.details.marshal_union(self.algorithm, buf)
    }
}

impl Unmarshal for TpmtSymDef {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        let algorithm = TpmAlgId::unmarshal(buf)?;
        let details = TpmuSymDetails::unmarshal_union(algorithm, buf)?;
        Ok(Self { algorithm, details })
    }
}

/// Payload layout of a scheme, as selected by a family's table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeShape {
    Empty,
    Hash,
    Ecdaa,
    Xor,
}

/// Scheme payloads shared by every TPMU_*_SCHEME union
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmuSchemeDetails {
    Empty,
    Hash(TpmsSchemeHash),
    Ecdaa(TpmsSchemeEcdaa),
    Xor(TpmsSchemeXor),
}

impl Union for TpmuSchemeDetails {
    type Selector = SchemeShape;

    fn marshal_union(&self, selector: SchemeShape, buf: &mut CommandBuffer<'_>) -> Result<()> {
        match (selector, self) {
            (SchemeShape::Empty, Self::Empty) => Ok(()),
            (SchemeShape::Hash, Self::Hash(details)) => details.marshal(buf),
            (SchemeShape::Ecdaa, Self::Ecdaa(details)) => details.marshal(buf),
            (SchemeShape::Xor, Self::Xor(details)) => details.marshal(buf),
            _ => Err(mismatch("TPMU_SCHEME", selector)),
        }
    }

    fn unmarshal_union(selector: SchemeShape, buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(match selector {
            SchemeShape::Empty => Self::Empty,
            SchemeShape::Hash => Self::Hash(TpmsSchemeHash::unmarshal(buf)?),
            SchemeShape::Ecdaa => Self::Ecdaa(TpmsSchemeEcdaa::unmarshal(buf)?),
            SchemeShape::Xor => Self::Xor(TpmsSchemeXor::unmarshal(buf)?),
        })
    }
}

/// Which scheme algorithms a TPMT_*_SCHEME accepts, and their payload shape
pub trait SchemeFamily: Copy + Debug + PartialEq + Eq {
    const NAME: &'static str;

    fn shape(scheme: TpmAlgId) -> Option<SchemeShape>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigSchemes;

impl SchemeFamily for SigSchemes {
    const NAME: &'static str = "TPMT_SIG_SCHEME";

    fn shape(scheme: TpmAlgId) -> Option<SchemeShape> {
        match scheme {
            TpmAlgId::NULL => Some(SchemeShape::Empty),
            TpmAlgId::RSASSA
            | TpmAlgId::RSAPSS
            | TpmAlgId::ECDSA
            | TpmAlgId::SM2
            | TpmAlgId::ECSCHNORR
            | TpmAlgId::HMAC => Some(SchemeShape::Hash),
            TpmAlgId::ECDAA => Some(SchemeShape::Ecdaa),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsaSchemes;

impl SchemeFamily for RsaSchemes {
    const NAME: &'static str = "TPMT_RSA_SCHEME";

    fn shape(scheme: TpmAlgId) -> Option<SchemeShape> {
        match scheme {
            TpmAlgId::NULL | TpmAlgId::RSAES => Some(SchemeShape::Empty),
            TpmAlgId::RSASSA | TpmAlgId::RSAPSS | TpmAlgId::OAEP => Some(SchemeShape::Hash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EccSchemes;

impl SchemeFamily for EccSchemes {
    const NAME: &'static str = "TPMT_ECC_SCHEME";

    fn shape(scheme: TpmAlgId) -> Option<SchemeShape> {
        match scheme {
            TpmAlgId::NULL => Some(SchemeShape::Empty),
            TpmAlgId::ECDSA
            | TpmAlgId::SM2
            | TpmAlgId::ECSCHNORR
            | TpmAlgId::ECDH
            | TpmAlgId::ECMQV => Some(SchemeShape::Hash),
            TpmAlgId::ECDAA => Some(SchemeShape::Ecdaa),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfSchemes;

impl SchemeFamily for KdfSchemes {
    const NAME: &'static str = "TPMT_KDF_SCHEME";

    fn shape(scheme: TpmAlgId) -> Option<SchemeShape> {
        match scheme {
            TpmAlgId::NULL => Some(SchemeShape::Empty),
            TpmAlgId::MGF1
            | TpmAlgId::KDF1_SP800_56A
            | TpmAlgId::KDF2
            | TpmAlgId::KDF1_SP800_108 => Some(SchemeShape::Hash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyedHashSchemes;

impl SchemeFamily for KeyedHashSchemes {
    const NAME: &'static str = "TPMT_KEYEDHASH_SCHEME";

    fn shape(scheme: TpmAlgId) -> Option<SchemeShape> {
        match scheme {
            TpmAlgId::NULL => Some(SchemeShape::Empty),
            TpmAlgId::HMAC => Some(SchemeShape::Hash),
            TpmAlgId::XOR => Some(SchemeShape::Xor),
            _ => None,
        }
    }
}

/// TPMT_*_SCHEME - scheme selector and its details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtScheme<F: SchemeFamily> {
    pub scheme: TpmAlgId,
    pub details: TpmuSchemeDetails,
    family: PhantomData<F>,
}

pub type TpmtSigScheme = TpmtScheme<SigSchemes>;
pub type TpmtRsaScheme = TpmtScheme<RsaSchemes>;
pub type TpmtEccScheme = TpmtScheme<EccSchemes>;
pub type TpmtKdfScheme = TpmtScheme<KdfSchemes>;
pub type TpmtKeyedHashScheme = TpmtScheme<KeyedHashSchemes>;

impl<F: SchemeFamily> TpmtScheme<F> {
    pub fn new(scheme: TpmAlgId, details: TpmuSchemeDetails) -> Self {
        Self {
            scheme,
            details,
            family: PhantomData,
        }
    }

    pub fn null() -> Self {
        Self::new(TpmAlgId::NULL, TpmuSchemeDetails::Empty)
    }

    /// A scheme whose details are a single hash algorithm (RSASSA, ECDSA, HMAC, ...)
    pub fn with_hash(scheme: TpmAlgId, hash_alg: TpmAlgId) -> Self {
        Self::new(scheme, TpmuSchemeDetails::Hash(TpmsSchemeHash { hash_alg }))
    }
}

impl<F: SchemeFamily> Marshal for TpmtScheme<F> {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        let Some(shape) = F::shape(self.scheme) else {
            return Err(mismatch(F::NAME, self.scheme));
        };
        self.scheme.marshal(buf)?;
        self.details.marshal_union(shape, buf)
    }
}

impl<F: SchemeFamily> Unmarshal for TpmtScheme<F> {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        let scheme = TpmAlgId::unmarshal(buf)?;
        let shape = F::shape(scheme).ok_or_else(|| unknown(F::NAME, scheme))?;
        let details = TpmuSchemeDetails::unmarshal_union(shape, buf)?;
        Ok(Self::new(scheme, details))
    }
}

/// TPMU_SIGNATURE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuSignature {
    Null,
    Rsa(TpmsSignatureRsa),
    Ecc(TpmsSignatureEcc),
    Hmac(TpmtHa),
}

impl Union for TpmuSignature {
    type Selector = TpmAlgId;

    fn marshal_union(&self, selector: TpmAlgId, buf: &mut CommandBuffer<'_>) -> Result<()> {
        match (selector, self) {
            (TpmAlgId::NULL, Self::Null) => Ok(()),
            (TpmAlgId::RSASSA | TpmAlgId::RSAPSS, Self::Rsa(sig)) => sig.marshal(buf),
            (
                TpmAlgId::ECDSA | TpmAlgId::ECDAA | TpmAlgId::SM2 | TpmAlgId::ECSCHNORR,
                Self::Ecc(sig),
            ) => sig.marshal(buf),
            (TpmAlgId::HMAC, Self::Hmac(ha)) => ha.marshal(buf),
            _ => Err(mismatch("TPMU_SIGNATURE", selector)),
        }
    }

    fn unmarshal_union(selector: TpmAlgId, buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        match selector {
            TpmAlgId::NULL => Ok(Self::Null),
            TpmAlgId::RSASSA | TpmAlgId::RSAPSS => {
                Ok(Self::Rsa(TpmsSignatureRsa::unmarshal(buf)?))
            }
            TpmAlgId::ECDSA | TpmAlgId::ECDAA | TpmAlgId::SM2 | TpmAlgId::ECSCHNORR => {
                Ok(Self::Ecc(TpmsSignatureEcc::unmarshal(buf)?))
            }
            TpmAlgId::HMAC => Ok(Self::Hmac(TpmtHa::unmarshal(buf)?)),
            _ => Err(unknown("TPMU_SIGNATURE", selector)),
        }
    }
}

/// TPMT_SIGNATURE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtSignature {
    pub sig_alg: TpmAlgId,
    pub signature: TpmuSignature,
}

impl Marshal for TpmtSignature {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.sig_alg.marshal(buf)?;
        self.signature.marshal_union(self.sig_alg, buf)
    }
}

impl Unmarshal for TpmtSignature {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        let sig_alg = TpmAlgId::unmarshal(buf)?;
        let signature = TpmuSignature::unmarshal_union(sig_alg, buf)?;
        Ok(Self { sig_alg, signature })
    }
}

/// TPMU_ATTEST
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuAttest {
    Certify(TpmsCertifyInfo),
    Creation(TpmsCreationInfo),
    Quote(TpmsQuoteInfo),
    CommandAudit(TpmsCommandAuditInfo),
    SessionAudit(TpmsSessionAuditInfo),
    Time(TpmsTimeAttestInfo),
    Nv(TpmsNvCertifyInfo),
}

impl Union for TpmuAttest {
    type Selector = TpmSt;

    fn marshal_union(&self, selector: TpmSt, buf: &mut CommandBuffer<'_>) -> Result<()> {
        match (selector, self) {
            (TpmSt::ATTEST_CERTIFY, Self::Certify(info)) => info.marshal(buf),
            (TpmSt::ATTEST_CREATION, Self::Creation(info)) => info.marshal(buf),
            (TpmSt::ATTEST_QUOTE, Self::Quote(info)) => info.marshal(buf),
            (TpmSt::ATTEST_COMMAND_AUDIT, Self::CommandAudit(info)) => info.marshal(buf),
            (TpmSt::ATTEST_SESSION_AUDIT, Self::SessionAudit(info)) => info.marshal(buf),
            (TpmSt::ATTEST_TIME, Self::Time(info)) => info.marshal(buf),
            (TpmSt::ATTEST_NV, Self::Nv(info)) => info.marshal(buf),
            _ => Err(mismatch("TPMU_ATTEST", selector)),
        }
    }

    fn unmarshal_union(selector: TpmSt, buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(match selector {
            TpmSt::ATTEST_CERTIFY => Self::Certify(TpmsCertifyInfo::unmarshal(buf)?),
            TpmSt::ATTEST_CREATION => Self::Creation(TpmsCreationInfo::unmarshal(buf)?),
            TpmSt::ATTEST_QUOTE => Self::Quote(TpmsQuoteInfo::unmarshal(buf)?),
            TpmSt::ATTEST_COMMAND_AUDIT => {
                Self::CommandAudit(TpmsCommandAuditInfo::unmarshal(buf)?)
            }
            TpmSt::ATTEST_SESSION_AUDIT => {
                Self::SessionAudit(TpmsSessionAuditInfo::unmarshal(buf)?)
            }
            TpmSt::ATTEST_TIME => Self::Time(TpmsTimeAttestInfo::unmarshal(buf)?),
            TpmSt::ATTEST_NV => Self::Nv(TpmsNvCertifyInfo::unmarshal(buf)?),
            _ => return Err(unknown("TPMU_ATTEST", selector)),
        })
    }
}

/// TPMU_CAPABILITIES
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuCapabilities {
    Algorithms(TpmlAlgProperty),
    Handles(TpmlHandle),
    Command(TpmlCca),
    PpCommands(TpmlCc),
    AuditCommands(TpmlCc),
    AssignedPcr(TpmlPcrSelection),
    TpmProperties(TpmlTaggedTpmProperty),
    PcrProperties(TpmlTaggedPcrProperty),
    EccCurves(TpmlEccCurve),
}

impl Union for TpmuCapabilities {
    type Selector = TpmCap;

    fn marshal_union(&self, selector: TpmCap, buf: &mut CommandBuffer<'_>) -> Result<()> {
        match (selector, self) {
            (TpmCap::ALGS, Self::Algorithms(list)) => list.marshal(buf),
            (TpmCap::HANDLES, Self::Handles(list)) => list.marshal(buf),
            (TpmCap::COMMANDS, Self::Command(list)) => list.marshal(buf),
            (TpmCap::PP_COMMANDS, Self::PpCommands(list)) => list.marshal(buf),
            (TpmCap::AUDIT_COMMANDS, Self::AuditCommands(list)) => list.marshal(buf),
            (TpmCap::PCRS, Self::AssignedPcr(list)) => list.marshal(buf),
            (TpmCap::TPM_PROPERTIES, Self::TpmProperties(list)) => list.marshal(buf),
            (TpmCap::PCR_PROPERTIES, Self::PcrProperties(list)) => list.marshal(buf),
            (TpmCap::ECC_CURVES, Self::EccCurves(list)) => list.marshal(buf),
            _ => Err(mismatch("TPMU_CAPABILITIES", selector)),
        }
    }

    fn unmarshal_union(selector: TpmCap, buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(match selector {
            TpmCap::ALGS => Self::Algorithms(TpmlAlgProperty::unmarshal(buf)?),
            TpmCap::HANDLES => Self::Handles(TpmlHandle::unmarshal(buf)?),
            TpmCap::COMMANDS => Self::Command(TpmlCca::unmarshal(buf)?),
            TpmCap::PP_COMMANDS => Self::PpCommands(TpmlCc::unmarshal(buf)?),
            TpmCap::AUDIT_COMMANDS => Self::AuditCommands(TpmlCc::unmarshal(buf)?),
            TpmCap::PCRS => Self::AssignedPcr(TpmlPcrSelection::unmarshal(buf)?),
            TpmCap::TPM_PROPERTIES => Self::TpmProperties(TpmlTaggedTpmProperty::unmarshal(buf)?),
            TpmCap::PCR_PROPERTIES => Self::PcrProperties(TpmlTaggedPcrProperty::unmarshal(buf)?),
            TpmCap::ECC_CURVES => Self::EccCurves(TpmlEccCurve::unmarshal(buf)?),
            _ => return Err(unknown("TPMU_CAPABILITIES", selector)),
        })
    }
}

/// TPMU_PUBLIC_PARMS - Public parameters union
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmuPublicParms {
    KeyedHash(TpmsKeyedHashParms),
    SymCipher(TpmsSymCipherParms),
    Rsa(TpmsRsaParms),
    Ecc(TpmsEccParms),
}

impl Union for TpmuPublicParms {
    type Selector = TpmAlgId;

    fn marshal_union(&self, selector: TpmAlgId, buf: &mut CommandBuffer<'_>) -> Result<()> {
        match (selector, self) {
            (TpmAlgId::KEYEDHASH, Self::KeyedHash(p)) => p.marshal(buf),
            (TpmAlgId::SYMCIPHER, Self::SymCipher(p)) => p.marshal(buf),
            (TpmAlgId::RSA, Self::Rsa(p)) => p.marshal(buf),
            (TpmAlgId::ECC, Self::Ecc(p)) => p.marshal(buf),
            _ => Err(mismatch("TPMU_PUBLIC_PARMS", selector)),
        }
    }

    fn unmarshal_union(selector: TpmAlgId, buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(match selector {
            TpmAlgId::KEYEDHASH => Self::KeyedHash(TpmsKeyedHashParms::unmarshal(buf)?),
            TpmAlgId::SYMCIPHER => Self::SymCipher(TpmsSymCipherParms::unmarshal(buf)?),
            TpmAlgId::RSA => Self::Rsa(TpmsRsaParms::unmarshal(buf)?),
            TpmAlgId::ECC => Self::Ecc(TpmsEccParms::unmarshal(buf)?),
            _ => return Err(unknown("TPMU_PUBLIC_PARMS", selector)),
        })
    }
}

/// TPMU_PUBLIC_ID - Unique identifier union
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicId {
    KeyedHash(Tpm2bDigest),
    Sym(Tpm2bDigest),
    Rsa(Tpm2bPublicKeyRsa),
    Ecc(TpmsEccPoint),
}

impl Union for TpmuPublicId {
    type Selector = TpmAlgId;

    fn marshal_union(&self, selector: TpmAlgId, buf: &mut CommandBuffer<'_>) -> Result<()> {
        match (selector, self) {
            (TpmAlgId::KEYEDHASH, Self::KeyedHash(d)) => d.marshal(buf),
            (TpmAlgId::SYMCIPHER, Self::Sym(d)) => d.marshal(buf),
            (TpmAlgId::RSA, Self::Rsa(n)) => n.marshal(buf),
            (TpmAlgId::ECC, Self::Ecc(point)) => point.marshal(buf),
            _ => Err(mismatch("TPMU_PUBLIC_ID", selector)),
        }
    }

    fn unmarshal_union(selector: TpmAlgId, buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(match selector {
            TpmAlgId::KEYEDHASH => Self::KeyedHash(Tpm2bDigest::unmarshal(buf)?),
            TpmAlgId::SYMCIPHER => Self::Sym(Tpm2bDigest::unmarshal(buf)?),
            TpmAlgId::RSA => Self::Rsa(Tpm2bPublicKeyRsa::unmarshal(buf)?),
            TpmAlgId::ECC => Self::Ecc(TpmsEccPoint::unmarshal(buf)?),
            _ => return Err(unknown("TPMU_PUBLIC_ID", selector)),
        })
    }
}

/// TPMT_PUBLIC - Public area template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    pub type_alg: TpmAlgId,
    pub name_alg: TpmAlgId,
    pub object_attributes: TpmaObject,
    pub auth_policy: Tpm2bDigest,
    pub parameters: TpmuPublicParms,
    pub unique: TpmuPublicId,
}

impl Marshal for TpmtPublic {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.type_alg.marshal(buf)?;
        self.name_alg.marshal(buf)?;
        self.object_attributes.marshal(buf)?;
        self.auth_policy.marshal(buf)?;
        self.parameters.marshal_union(self.type_alg, buf)?;
        self.unique.marshal_union(self.type_alg, buf)
    }
}

impl Unmarshal for TpmtPublic {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        let type_alg = TpmAlgId::unmarshal(buf)?;
        let name_alg = TpmAlgId::unmarshal(buf)?;
        let object_attributes = TpmaObject::unmarshal(buf)?;
        let auth_policy = Tpm2bDigest::unmarshal(buf)?;
        let parameters = TpmuPublicParms::unmarshal_union(type_alg, buf)?;
        let unique = TpmuPublicId::unmarshal_union(type_alg, buf)?;
        Ok(Self {
            type_alg,
            name_alg,
            object_attributes,
            auth_policy,
            parameters,
            unique,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{marshal_union, unmarshal_union};

    fn aes_128_cfb() -> TpmtSymDef {
        TpmtSymDef {
            algorithm: TpmAlgId::AES,
            details: TpmuSymDetails::Block {
                key_bits: 128,
                mode: TpmAlgId::CFB,
            },
        }
    }

    /// RSA 2048 restricted decryption key, the usual storage root template
    fn storage_key() -> TpmtPublic {
        TpmtPublic {
            type_alg: TpmAlgId::RSA,
            name_alg: TpmAlgId::SHA256,
            object_attributes: TpmaObject(
                TpmaObject::FIXED_TPM
                    | TpmaObject::FIXED_PARENT
                    | TpmaObject::SENSITIVE_DATA_ORIGIN
                    | TpmaObject::USER_WITH_AUTH
                    | TpmaObject::RESTRICTED
                    | TpmaObject::DECRYPT,
            ),
            auth_policy: Tpm2bDigest::empty(),
            parameters: TpmuPublicParms::Rsa(TpmsRsaParms {
                symmetric: aes_128_cfb(),
                scheme: TpmtRsaScheme::null(),
                key_bits: 2048,
                exponent: 0,
            }),
            unique: TpmuPublicId::Rsa(Tpm2bPublicKeyRsa::empty()),
        }
    }

    #[test]
    fn test_rsa_storage_key_template() {
        let bytes = storage_key().to_bytes().unwrap();
        assert_eq!(
            hex::encode(&bytes),
            "0001000b00030072000000060080004300100800000000000000"
        );
        assert_eq!(bytes.len(), 26);
        let decoded = TpmtPublic::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, storage_key());
    }

    #[test]
    fn test_public_mismatched_parameters() {
        let mut public = storage_key();
        public.type_alg = TpmAlgId::ECC;
        let mut out = [0u8; 64];
        let mut buf = CommandBuffer::new(&mut out);
        assert!(matches!(
            public.marshal(&mut buf),
            Err(SapiError::BadValue(_))
        ));
        // header fields are written, the payload is not
        assert_eq!(buf.position(), 10);
    }

    #[test]
    fn test_scheme_families() {
        assert!(matches!(
            TpmtSigScheme::with_hash(TpmAlgId::RSAES, TpmAlgId::SHA256).to_bytes(),
            Err(SapiError::BadValue(_))
        ));
        assert!(matches!(
            TpmtSigScheme::with_hash(TpmAlgId::ECDAA, TpmAlgId::SHA256).to_bytes(),
            Err(SapiError::BadValue(_))
        ));
        assert_eq!(
            TpmtRsaScheme::with_hash(TpmAlgId::RSASSA, TpmAlgId::SHA256)
                .to_bytes()
                .unwrap(),
            [0x00, 0x14, 0x00, 0x0b]
        );
        assert_eq!(
            TpmtEccScheme::with_hash(TpmAlgId::ECDSA, TpmAlgId::SHA384)
                .to_bytes()
                .unwrap(),
            [0x00, 0x18, 0x00, 0x0c]
        );
        assert_eq!(TpmtKdfScheme::null().to_bytes().unwrap(), [0x00, 0x10]);

        let xor = TpmtKeyedHashScheme::from_bytes(&[0x00, 0x0a, 0x00, 0x0b, 0x00, 0x22]).unwrap();
        assert_eq!(
            xor.details,
            TpmuSchemeDetails::Xor(TpmsSchemeXor {
                hash_alg: TpmAlgId::SHA256,
                kdf: TpmAlgId::KDF1_SP800_108,
            })
        );
        assert!(matches!(
            TpmtKdfScheme::from_bytes(&[0x00, 0x14, 0x00, 0x0b]),
            Err(SapiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_sym_def() {
        assert_eq!(
            aes_128_cfb().to_bytes().unwrap(),
            [0x00, 0x06, 0x00, 0x80, 0x00, 0x43]
        );
        assert_eq!(TpmtSymDef::null().to_bytes().unwrap(), [0x00, 0x10]);
        let xor = TpmtSymDef::from_bytes(&[0x00, 0x0a, 0x00, 0x0b]).unwrap();
        assert_eq!(
            xor.details,
            TpmuSymDetails::Xor {
                hash_alg: TpmAlgId::SHA256
            }
        );
        let bad = TpmtSymDef {
            algorithm: TpmAlgId::XOR,
            details: TpmuSymDetails::Null,
        };
        assert!(matches!(bad.to_bytes(), Err(SapiError::BadValue(_))));
    }

    #[test]
    fn test_ha_digest_length() {
        let ha = TpmtHa::new(TpmAlgId::SHA1, vec![0x11; 20]);
        let bytes = ha.to_bytes().unwrap();
        assert_eq!(bytes.len(), 22);
        assert_eq!(TpmtHa::from_bytes(&bytes).unwrap(), ha);

        let short = TpmtHa::new(TpmAlgId::SHA256, vec![0x11; 20]);
        assert!(matches!(short.to_bytes(), Err(SapiError::BadValue(_))));
        assert!(matches!(
            TpmtHa::from_bytes(&[0x00, 0x06]),
            Err(SapiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_signature_roundtrip() {
        let sig = TpmtSignature {
            sig_alg: TpmAlgId::ECDSA,
            signature: TpmuSignature::Ecc(TpmsSignatureEcc {
                hash: TpmAlgId::SHA256,
                signature_r: Tpm2bEccParameter::new(vec![1; 32]),
                signature_s: Tpm2bEccParameter::new(vec![2; 32]),
            }),
        };
        let bytes = sig.to_bytes().unwrap();
        assert_eq!(bytes.len(), 2 + 2 + 34 + 34);
        assert_eq!(TpmtSignature::from_bytes(&bytes).unwrap(), sig);

        assert!(matches!(
            TpmtSignature::from_bytes(&[0x00, 0x99]),
            Err(SapiError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_capabilities_dispatch() {
        let handles = hex::decode("00000001000000028100000181000002").unwrap();
        let handles = TpmsCapabilityData::from_bytes(&handles).unwrap();
        assert_eq!(
            handles.data,
            TpmuCapabilities::Handles(TpmlHandle::new(vec![0x81000001, 0x81000002]))
        );

        // TPM_CAP_ALGS, one entry: RSA with attributes 0x00000009
        let data = hex::decode("0000000000000001000100000009").unwrap();
        let mut decoded = TpmuCapabilities::Handles(TpmlHandle::default());
        let mut offset = 4;
        unmarshal_union(TpmCap::ALGS, &data, Some(&mut offset), Some(&mut decoded)).unwrap();
        assert_eq!(offset, 14);
        assert_eq!(
            decoded,
            TpmuCapabilities::Algorithms(TpmlAlgProperty::new(vec![TpmsAlgProperty {
                alg: TpmAlgId::RSA,
                alg_properties: TpmaAlgorithm(9),
            }]))
        );

        let mut offset = 0;
        let err = unmarshal_union::<TpmuCapabilities>(TpmCap(0x42), &data, Some(&mut offset), None)
            .unwrap_err();
        assert!(matches!(err, SapiError::MalformedResponse(_)));
        assert_eq!(offset, 0);

        let mut out = [0u8; 8];
        let mut offset = 0;
        let err = marshal_union(
            Some(&TpmuCapabilities::EccCurves(TpmlEccCurve::default())),
            TpmCap::AUTH_POLICIES,
            Some(&mut out[..]),
            Some(&mut offset),
        )
        .unwrap_err();
        assert!(matches!(err, SapiError::BadValue(_)));
        assert_eq!(offset, 0);
        assert_eq!(out, [0; 8]);
    }

    #[test]
    fn test_command_attributes() {
        let data = hex::decode("000000010440017a").unwrap();
        let mut buf = ResponseBuffer::new(&data);
        let TpmuCapabilities::Command(list) =
            TpmuCapabilities::unmarshal_union(TpmCap::COMMANDS, &mut buf).unwrap()
        else {
            panic!("expected a command list");
        };
        let attrs = list.items[0];
        assert_eq!(attrs.command_index(), 0x017a);
        assert_eq!(attrs.c_handles(), 2);
        assert_ne!(attrs.0 & TpmaCc::NV, 0);
    }
}
