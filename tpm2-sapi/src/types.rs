// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 data types
//!
//! TPMS structures are encoded as the concatenation of their fields, in the
//! order the protocol defines. The first failing field aborts the structure.

use crate::constants::*;
use crate::error::Result;
use crate::marshal::{CommandBuffer, Marshal, ResponseBuffer, Union, Unmarshal};
use crate::sized::*;
use crate::unions::{
    TpmtEccScheme, TpmtKdfScheme, TpmtKeyedHashScheme, TpmtRsaScheme,
    TpmtSymDefObject, TpmuAttest, TpmuCapabilities,
};

/// TPMS_ALG_PROPERTY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsAlgProperty {
    pub alg: TpmAlgId,
    pub alg_properties: TpmaAlgorithm,
}

impl Marshal for TpmsAlgProperty {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.alg.marshal(buf)?;
        self.alg_properties.marshal(buf)
    }
}

impl Unmarshal for TpmsAlgProperty {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            alg: TpmAlgId::unmarshal(buf)?,
            alg_properties: TpmaAlgorithm::unmarshal(buf)?,
        })
    }
}

/// TPMS_ALGORITHM_DESCRIPTION
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsAlgorithmDescription {
    pub alg: TpmAlgId,
    pub attributes: TpmaAlgorithm,
}

impl Marshal for TpmsAlgorithmDescription {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.alg.marshal(buf)?;
        self.attributes.marshal(buf)
    }
}

impl Unmarshal for TpmsAlgorithmDescription {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            alg: TpmAlgId::unmarshal(buf)?,
            attributes: TpmaAlgorithm::unmarshal(buf)?,
        })
    }
}

/// TPMS_TAGGED_PROPERTY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsTaggedProperty {
    pub property: u32,
    pub value: u32,
}

impl Marshal for TpmsTaggedProperty {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.property.marshal(buf)?;
        self.value.marshal(buf)
    }
}

impl Unmarshal for TpmsTaggedProperty {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            property: u32::unmarshal(buf)?,
            value: u32::unmarshal(buf)?,
        })
    }
}

/// TPMS_CLOCK_INFO
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmsClockInfo {
    pub clock: u64,
    pub reset_count: u32,
    pub restart_count: u32,
    /// TPMI_YES_NO
    pub safe: u8,
}

impl Marshal for TpmsClockInfo {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.clock.marshal(buf)?;
        self.reset_count.marshal(buf)?;
        self.restart_count.marshal(buf)?;
        self.safe.marshal(buf)
    }
}

impl Unmarshal for TpmsClockInfo {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            clock: u64::unmarshal(buf)?,
            reset_count: u32::unmarshal(buf)?,
            restart_count: u32::unmarshal(buf)?,
            safe: u8::unmarshal(buf)?,
        })
    }
}

/// TPMS_TIME_INFO
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmsTimeInfo {
    pub time: u64,
    pub clock_info: TpmsClockInfo,
}

impl Marshal for TpmsTimeInfo {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.time.marshal(buf)?;
        self.clock_info.marshal(buf)
    }
}

impl Unmarshal for TpmsTimeInfo {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            time: u64::unmarshal(buf)?,
            clock_info: TpmsClockInfo::unmarshal(buf)?,
        })
    }
}

/// TPMS_TIME_ATTEST_INFO
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmsTimeAttestInfo {
    pub time: TpmsTimeInfo,
    pub firmware_version: u64,
}

impl Marshal for TpmsTimeAttestInfo {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.time.marshal(buf)?;
        self.firmware_version.marshal(buf)
    }
}

impl Unmarshal for TpmsTimeAttestInfo {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            time: TpmsTimeInfo::unmarshal(buf)?,
            firmware_version: u64::unmarshal(buf)?,
        })
    }
}

/// TPMS_CERTIFY_INFO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsCertifyInfo {
    pub name: Tpm2bName,
    pub qualified_name: Tpm2bName,
}

impl Marshal for TpmsCertifyInfo {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.name.marshal(buf)?;
        self.qualified_name.marshal(buf)
    }
}

impl Unmarshal for TpmsCertifyInfo {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            name: Tpm2bName::unmarshal(buf)?,
            qualified_name: Tpm2bName::unmarshal(buf)?,
        })
    }
}

/// TPMS_COMMAND_AUDIT_INFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsCommandAuditInfo {
    pub audit_counter: u64,
    pub digest_alg: TpmAlgId,
    pub audit_digest: Tpm2bDigest,
    pub command_digest: Tpm2bDigest,
}

impl Marshal for TpmsCommandAuditInfo {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.audit_counter.marshal(buf)?;
        self.digest_alg.marshal(buf)?;
        self.audit_digest.marshal(buf)?;
        self.command_digest.marshal(buf)
    }
}

impl Unmarshal for TpmsCommandAuditInfo {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            audit_counter: u64::unmarshal(buf)?,
            digest_alg: TpmAlgId::unmarshal(buf)?,
            audit_digest: Tpm2bDigest::unmarshal(buf)?,
            command_digest: Tpm2bDigest::unmarshal(buf)?,
        })
    }
}

/// TPMS_SESSION_AUDIT_INFO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsSessionAuditInfo {
    pub exclusive_session: u8,
    pub session_digest: Tpm2bDigest,
}

impl Marshal for TpmsSessionAuditInfo {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.exclusive_session.marshal(buf)?;
        self.session_digest.marshal(buf)
    }
}

impl Unmarshal for TpmsSessionAuditInfo {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            exclusive_session: u8::unmarshal(buf)?,
            session_digest: Tpm2bDigest::unmarshal(buf)?,
        })
    }
}

/// TPMS_CREATION_INFO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsCreationInfo {
    pub object_name: Tpm2bName,
    pub creation_hash: Tpm2bDigest,
}

impl Marshal for TpmsCreationInfo {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.object_name.marshal(buf)?;
        self.creation_hash.marshal(buf)
    }
}

impl Unmarshal for TpmsCreationInfo {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            object_name: Tpm2bName::unmarshal(buf)?,
            creation_hash: Tpm2bDigest::unmarshal(buf)?,
        })
    }
}

/// TPMS_NV_CERTIFY_INFO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsNvCertifyInfo {
    pub index_name: Tpm2bName,
    pub offset: u16,
    pub nv_contents: Tpm2bMaxNvBuffer,
}

impl Marshal for TpmsNvCertifyInfo {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.index_name.marshal(buf)?;
        self.offset.marshal(buf)?;
        self.nv_contents.marshal(buf)
    }
}

impl Unmarshal for TpmsNvCertifyInfo {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            index_name: Tpm2bName::unmarshal(buf)?,
            offset: u16::unmarshal(buf)?,
            nv_contents: Tpm2bMaxNvBuffer::unmarshal(buf)?,
        })
    }
}

/// TPMS_QUOTE_INFO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsQuoteInfo {
    pub pcr_select: TpmlPcrSelection,
    pub pcr_digest: Tpm2bDigest,
}

impl Marshal for TpmsQuoteInfo {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.pcr_select.marshal(buf)?;
        self.pcr_digest.marshal(buf)
    }
}

impl Unmarshal for TpmsQuoteInfo {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            pcr_select: TpmlPcrSelection::unmarshal(buf)?,
            pcr_digest: Tpm2bDigest::unmarshal(buf)?,
        })
    }
}

/// TPMS_ATTEST - Attestation structure (returned by Quote, Certify, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    pub magic: u32,
    pub attest_type: TpmSt,
    pub qualified_signer: Tpm2bName,
    pub extra_data: Tpm2bData,
    pub clock_info: TpmsClockInfo,
    pub firmware_version: u64,
    /// Shape selected by `attest_type`
    pub attested: TpmuAttest,
}

impl Marshal for TpmsAttest {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.magic.marshal(buf)?;
        self.attest_type.marshal(buf)?;
        self.qualified_signer.marshal(buf)?;
        self.extra_data.marshal(buf)?;
        self.clock_info.marshal(buf)?;
        self.firmware_version.marshal(buf)?;
        self.attested.marshal_union(self.attest_type, buf)
    }
}

impl Unmarshal for TpmsAttest {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        let magic = u32::unmarshal(buf)?;
        let attest_type = TpmSt::unmarshal(buf)?;
        let qualified_signer = Tpm2bName::unmarshal(buf)?;
        let extra_data = Tpm2bData::unmarshal(buf)?;
        let clock_info = TpmsClockInfo::unmarshal(buf)?;
        let firmware_version = u64::unmarshal(buf)?;
        let attested = TpmuAttest::unmarshal_union(attest_type, buf)?;
        Ok(Self {
            magic,
            attest_type,
            qualified_signer,
            extra_data,
            clock_info,
            firmware_version,
            attested,
        })
    }
}

/// TPMS_AUTH_COMMAND - one entry of a command authorization area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAuthCommand {
    pub session_handle: u32,
    pub nonce: Tpm2bNonce,
    pub session_attributes: TpmaSession,
    pub hmac: Tpm2bAuth,
}

impl TpmsAuthCommand {
    /// Password authorization (TPM_RS_PW)
    pub fn password(password: &[u8]) -> Self {
        Self {
            session_handle: tpm_rh::PW,
            nonce: Tpm2bNonce::empty(),
            session_attributes: TpmaSession::new().with_continue_session(),
            hmac: Tpm2bAuth::new(password),
        }
    }
}

impl Marshal for TpmsAuthCommand {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.session_handle.marshal(buf)?;
        self.nonce.marshal(buf)?;
        self.session_attributes.marshal(buf)?;
        self.hmac.marshal(buf)
    }
}

impl Unmarshal for TpmsAuthCommand {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            session_handle: u32::unmarshal(buf)?,
            nonce: Tpm2bNonce::unmarshal(buf)?,
            session_attributes: TpmaSession::unmarshal(buf)?,
            hmac: Tpm2bAuth::unmarshal(buf)?,
        })
    }
}

/// TPMS_AUTH_RESPONSE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsAuthResponse {
    pub nonce: Tpm2bNonce,
    pub session_attributes: TpmaSession,
    pub hmac: Tpm2bAuth,
}

impl Marshal for TpmsAuthResponse {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.nonce.marshal(buf)?;
        self.session_attributes.marshal(buf)?;
        self.hmac.marshal(buf)
    }
}

impl Unmarshal for TpmsAuthResponse {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            nonce: Tpm2bNonce::unmarshal(buf)?,
            session_attributes: TpmaSession::unmarshal(buf)?,
            hmac: Tpm2bAuth::unmarshal(buf)?,
        })
    }
}

/// TPMS_SENSITIVE_CREATE - Sensitive data for object creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsSensitiveCreate {
    pub user_auth: Tpm2bAuth,
    pub data: Tpm2bSensitiveData,
}

impl Marshal for TpmsSensitiveCreate {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.user_auth.marshal(buf)?;
        self.data.marshal(buf)
    }
}

impl Unmarshal for TpmsSensitiveCreate {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            user_auth: Tpm2bAuth::unmarshal(buf)?,
            data: Tpm2bSensitiveData::unmarshal(buf)?,
        })
    }
}

/// TPMS_SCHEME_HASH
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsSchemeHash {
    pub hash_alg: TpmAlgId,
}

impl Marshal for TpmsSchemeHash {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.hash_alg.marshal(buf)
    }
}

impl Unmarshal for TpmsSchemeHash {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            hash_alg: TpmAlgId::unmarshal(buf)?,
        })
    }
}

/// TPMS_SCHEME_ECDAA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsSchemeEcdaa {
    pub hash_alg: TpmAlgId,
    pub count: u16,
}

impl Marshal for TpmsSchemeEcdaa {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.hash_alg.marshal(buf)?;
        self.count.marshal(buf)
    }
}

impl Unmarshal for TpmsSchemeEcdaa {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            hash_alg: TpmAlgId::unmarshal(buf)?,
            count: u16::unmarshal(buf)?,
        })
    }
}

/// TPMS_SCHEME_XOR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsSchemeXor {
    pub hash_alg: TpmAlgId,
    pub kdf: TpmAlgId,
}

impl Marshal for TpmsSchemeXor {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.hash_alg.marshal(buf)?;
        self.kdf.marshal(buf)
    }
}

impl Unmarshal for TpmsSchemeXor {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            hash_alg: TpmAlgId::unmarshal(buf)?,
            kdf: TpmAlgId::unmarshal(buf)?,
        })
    }
}

/// TPMS_ECC_POINT
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsEccPoint {
    pub x: Tpm2bEccParameter,
    pub y: Tpm2bEccParameter,
}

impl Marshal for TpmsEccPoint {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.x.marshal(buf)?;
        self.y.marshal(buf)
    }
}

impl Unmarshal for TpmsEccPoint {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            x: Tpm2bEccParameter::unmarshal(buf)?,
            y: Tpm2bEccParameter::unmarshal(buf)?,
        })
    }
}

/// TPMS_SIGNATURE_RSA (RSASSA and RSAPSS)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsSignatureRsa {
    pub hash: TpmAlgId,
    pub sig: Tpm2bPublicKeyRsa,
}

impl Marshal for TpmsSignatureRsa {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.hash.marshal(buf)?;
        self.sig.marshal(buf)
    }
}

impl Unmarshal for TpmsSignatureRsa {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            hash: TpmAlgId::unmarshal(buf)?,
            sig: Tpm2bPublicKeyRsa::unmarshal(buf)?,
        })
    }
}

/// TPMS_SIGNATURE_ECC (ECDSA, ECDAA, SM2, ECSCHNORR)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsSignatureEcc {
    pub hash: TpmAlgId,
    pub signature_r: Tpm2bEccParameter,
    pub signature_s: Tpm2bEccParameter,
}

impl Marshal for TpmsSignatureEcc {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.hash.marshal(buf)?;
        self.signature_r.marshal(buf)?;
        self.signature_s.marshal(buf)
    }
}

impl Unmarshal for TpmsSignatureEcc {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            hash: TpmAlgId::unmarshal(buf)?,
            signature_r: Tpm2bEccParameter::unmarshal(buf)?,
            signature_s: Tpm2bEccParameter::unmarshal(buf)?,
        })
    }
}

/// TPMS_NV_PIN_COUNTER_PARAMETERS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmsNvPinCounterParameters {
    pub pin_count: u32,
    pub pin_limit: u32,
}

impl Marshal for TpmsNvPinCounterParameters {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.pin_count.marshal(buf)?;
        self.pin_limit.marshal(buf)
    }
}

impl Unmarshal for TpmsNvPinCounterParameters {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            pin_count: u32::unmarshal(buf)?,
            pin_limit: u32::unmarshal(buf)?,
        })
    }
}

/// TPMS_NV_PUBLIC - NV index public area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsNvPublic {
    pub nv_index: u32,
    pub name_alg: TpmAlgId,
    pub attributes: TpmaNv,
    pub auth_policy: Tpm2bDigest,
    pub data_size: u16,
}

impl Marshal for TpmsNvPublic {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.nv_index.marshal(buf)?;
        self.name_alg.marshal(buf)?;
        self.attributes.marshal(buf)?;
        self.auth_policy.marshal(buf)?;
        self.data_size.marshal(buf)
    }
}

impl Unmarshal for TpmsNvPublic {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            nv_index: u32::unmarshal(buf)?,
            name_alg: TpmAlgId::unmarshal(buf)?,
            attributes: TpmaNv::unmarshal(buf)?,
            auth_policy: Tpm2bDigest::unmarshal(buf)?,
            data_size: u16::unmarshal(buf)?,
        })
    }
}

/// TPMS_CONTEXT_DATA
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsContextData {
    pub integrity: Tpm2bDigest,
    pub encrypted: Tpm2bContextSensitive,
}

impl Marshal for TpmsContextData {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.integrity.marshal(buf)?;
        self.encrypted.marshal(buf)
    }
}

impl Unmarshal for TpmsContextData {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            integrity: Tpm2bDigest::unmarshal(buf)?,
            encrypted: Tpm2bContextSensitive::unmarshal(buf)?,
        })
    }
}

/// TPMS_CONTEXT - a saved object or session context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmsContext {
    pub sequence: u64,
    pub saved_handle: u32,
    pub hierarchy: u32,
    pub context_blob: Tpm2bContextData,
}

impl Marshal for TpmsContext {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.sequence.marshal(buf)?;
        self.saved_handle.marshal(buf)?;
        self.hierarchy.marshal(buf)?;
        self.context_blob.marshal(buf)
    }
}

impl Unmarshal for TpmsContext {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            sequence: u64::unmarshal(buf)?,
            saved_handle: u32::unmarshal(buf)?,
            hierarchy: u32::unmarshal(buf)?,
            context_blob: Tpm2bContextData::unmarshal(buf)?,
        })
    }
}

/// TPMS_CREATION_DATA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsCreationData {
    pub pcr_select: TpmlPcrSelection,
    pub pcr_digest: Tpm2bDigest,
    pub locality: TpmaLocality,
    pub parent_name_alg: TpmAlgId,
    pub parent_name: Tpm2bName,
    pub parent_qualified_name: Tpm2bName,
    pub outside_info: Tpm2bData,
}

impl Marshal for TpmsCreationData {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.pcr_select.marshal(buf)?;
        self.pcr_digest.marshal(buf)?;
        self.locality.marshal(buf)?;
        self.parent_name_alg.marshal(buf)?;
        self.parent_name.marshal(buf)?;
        self.parent_qualified_name.marshal(buf)?;
        self.outside_info.marshal(buf)
    }
}

impl Unmarshal for TpmsCreationData {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            pcr_select: TpmlPcrSelection::unmarshal(buf)?,
            pcr_digest: Tpm2bDigest::unmarshal(buf)?,
            locality: TpmaLocality::unmarshal(buf)?,
            parent_name_alg: TpmAlgId::unmarshal(buf)?,
            parent_name: Tpm2bName::unmarshal(buf)?,
            parent_qualified_name: Tpm2bName::unmarshal(buf)?,
            outside_info: Tpm2bData::unmarshal(buf)?,
        })
    }
}

/// TPMS_KEYEDHASH_PARMS - Keyed hash parameters (for sealed data)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsKeyedHashParms {
    pub scheme: TpmtKeyedHashScheme,
}

impl Marshal for TpmsKeyedHashParms {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.scheme.marshal(buf)
    }
}

impl Unmarshal for TpmsKeyedHashParms {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            scheme: TpmtKeyedHashScheme::unmarshal(buf)?,
        })
    }
}

/// TPMS_SYMCIPHER_PARMS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsSymCipherParms {
    pub sym: TpmtSymDefObject,
}

impl Marshal for TpmsSymCipherParms {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.sym.marshal(buf)
    }
}

impl Unmarshal for TpmsSymCipherParms {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            sym: TpmtSymDefObject::unmarshal(buf)?,
        })
    }
}

/// TPMS_RSA_PARMS - RSA key parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsRsaParms {
    pub symmetric: TpmtSymDefObject,
    pub scheme: TpmtRsaScheme,
    pub key_bits: u16,
    pub exponent: u32,
}

impl Marshal for TpmsRsaParms {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.symmetric.marshal(buf)?;
        self.scheme.marshal(buf)?;
        self.key_bits.marshal(buf)?;
        self.exponent.marshal(buf)
    }
}

impl Unmarshal for TpmsRsaParms {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            symmetric: TpmtSymDefObject::unmarshal(buf)?,
            scheme: TpmtRsaScheme::unmarshal(buf)?,
            key_bits: u16::unmarshal(buf)?,
            exponent: u32::unmarshal(buf)?,
        })
    }
}

/// TPMS_ECC_PARMS - ECC key parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmsEccParms {
    pub symmetric: TpmtSymDefObject,
    pub scheme: TpmtEccScheme,
    pub curve_id: TpmEccCurve,
    pub kdf: TpmtKdfScheme,
}

impl Marshal for TpmsEccParms {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.symmetric.marshal(buf)?;
        self.scheme.marshal(buf)?;
        self.curve_id.marshal(buf)?;
        self.kdf.marshal(buf)
    }
}

impl Unmarshal for TpmsEccParms {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            symmetric: TpmtSymDefObject::unmarshal(buf)?,
            scheme: TpmtEccScheme::unmarshal(buf)?,
            curve_id: TpmEccCurve::unmarshal(buf)?,
            kdf: TpmtKdfScheme::unmarshal(buf)?,
        })
    }
}

/// TPMS_ALGORITHM_DETAIL_ECC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAlgorithmDetailEcc {
    pub curve_id: TpmEccCurve,
    pub key_size: u16,
    pub kdf: TpmtKdfScheme,
    pub sign: TpmtEccScheme,
    pub p: Tpm2bEccParameter,
    pub a: Tpm2bEccParameter,
    pub b: Tpm2bEccParameter,
    pub g_x: Tpm2bEccParameter,
    pub g_y: Tpm2bEccParameter,
    pub n: Tpm2bEccParameter,
    pub h: Tpm2bEccParameter,
}

impl Marshal for TpmsAlgorithmDetailEcc {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.curve_id.marshal(buf)?;
        self.key_size.marshal(buf)?;
        self.kdf.marshal(buf)?;
        self.sign.marshal(buf)?;
        for param in [&self.p, &self.a, &self.b, &self.g_x, &self.g_y, &self.n, &self.h] {
            param.marshal(buf)?;
        }
        Ok(())
    }
}

impl Unmarshal for TpmsAlgorithmDetailEcc {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        Ok(Self {
            curve_id: TpmEccCurve::unmarshal(buf)?,
            key_size: u16::unmarshal(buf)?,
            kdf: TpmtKdfScheme::unmarshal(buf)?,
            sign: TpmtEccScheme::unmarshal(buf)?,
            p: Tpm2bEccParameter::unmarshal(buf)?,
            a: Tpm2bEccParameter::unmarshal(buf)?,
            b: Tpm2bEccParameter::unmarshal(buf)?,
            g_x: Tpm2bEccParameter::unmarshal(buf)?,
            g_y: Tpm2bEccParameter::unmarshal(buf)?,
            n: Tpm2bEccParameter::unmarshal(buf)?,
            h: Tpm2bEccParameter::unmarshal(buf)?,
        })
    }
}

/// TPMS_CAPABILITY_DATA - result of TPM2_GetCapability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsCapabilityData {
    pub capability: TpmCap,
    /// Shape selected by `capability`
    pub data: TpmuCapabilities,
}

impl Marshal for TpmsCapabilityData {
    fn marshal(&self, buf: &mut CommandBuffer<'_>) -> Result<()> {
        self.capability.marshal(buf)?;
        self.data.marshal_union(self.capability, buf)
    }
}

impl Unmarshal for TpmsCapabilityData {
    fn unmarshal(buf: &mut ResponseBuffer<'_>) -> Result<Self> {
        let capability = TpmCap::unmarshal(buf)?;
        let data = TpmuCapabilities::unmarshal_union(capability, buf)?;
        Ok(Self { capability, data })
    }
}
