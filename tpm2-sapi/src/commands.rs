// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 command definitions
//!
//! Each command declares its wire layout through [`Command`]; the context in
//! [`crate::context`] drives it through Prepare, Execute and Complete.

use crate::constants::{TpmCap, TpmCc, TpmaLocality};
use crate::context::{Command, CommandFlags, CommandWriter};
use crate::error::Result;
use crate::marshal::{ResponseBuffer, Unmarshal};
use crate::sized::{
    Tpm2bAttest, Tpm2bData, Tpm2bDigest, Tpm2bEncryptedSecret, Tpm2bIdObject, Tpm2bMaxBuffer,
};
use crate::types::{TpmsAttest, TpmsCapabilityData};
use crate::unions::{TpmtHa, TpmtSigScheme, TpmtSignature};

/// TPM2_ActivateCredential
#[derive(Debug, Clone)]
pub struct ActivateCredential {
    /// Object the credential is bound to (USER auth)
    pub activate_handle: u32,
    /// Key that decrypts `secret` (ADMIN auth)
    pub key_handle: u32,
    /// Sent as an empty buffer when absent
    pub credential_blob: Option<Tpm2bIdObject>,
    pub secret: Tpm2bEncryptedSecret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateCredentialResponse {
    pub cert_info: Tpm2bDigest,
}

impl Command for ActivateCredential {
    const CODE: TpmCc = TpmCc::ActivateCredential;
    const FLAGS: CommandFlags = CommandFlags::new(true, true, true);

    type Response = ActivateCredentialResponse;

    fn marshal_handles(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
        w.handle(self.activate_handle)?;
        w.handle(self.key_handle)
    }

    fn marshal_parameters(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
        w.optional_param(self.credential_blob.as_ref())?;
        w.param(&self.secret)
    }

    fn unmarshal_response(_: &[u32], params: &mut ResponseBuffer<'_>) -> Result<Self::Response> {
        Ok(ActivateCredentialResponse {
            cert_info: Tpm2bDigest::unmarshal(params)?,
        })
    }
}

/// TPM2_FieldUpgradeData
#[derive(Debug, Clone)]
pub struct FieldUpgradeData {
    pub fu_data: Tpm2bMaxBuffer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpgradeDataResponse {
    pub next_digest: TpmtHa,
    pub first_digest: TpmtHa,
}

impl Command for FieldUpgradeData {
    const CODE: TpmCc = TpmCc::FieldUpgradeData;
    const FLAGS: CommandFlags = CommandFlags::new(true, false, true);

    type Response = FieldUpgradeDataResponse;

    fn marshal_parameters(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
        w.param(&self.fu_data)
    }

    fn unmarshal_response(_: &[u32], params: &mut ResponseBuffer<'_>) -> Result<Self::Response> {
        Ok(FieldUpgradeDataResponse {
            next_digest: TpmtHa::unmarshal(params)?,
            first_digest: TpmtHa::unmarshal(params)?,
        })
    }
}

/// TPM2_GetCommandAuditDigest
#[derive(Debug, Clone)]
pub struct GetCommandAuditDigest {
    /// Usually the endorsement hierarchy
    pub privacy_handle: u32,
    pub sign_handle: u32,
    pub qualifying_data: Option<Tpm2bData>,
    pub in_scheme: TpmtSigScheme,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCommandAuditDigestResponse {
    pub audit_info: Tpm2bAttest,
    pub signature: TpmtSignature,
}

impl GetCommandAuditDigestResponse {
    /// Decode the signed attestation carried in `audit_info`
    pub fn attest(&self) -> Result<TpmsAttest> {
        TpmsAttest::from_bytes(self.audit_info.as_bytes())
    }
}

impl Command for GetCommandAuditDigest {
    const CODE: TpmCc = TpmCc::GetCommandAuditDigest;
    const FLAGS: CommandFlags = CommandFlags::new(true, true, true);

    type Response = GetCommandAuditDigestResponse;

    fn marshal_handles(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
        w.handle(self.privacy_handle)?;
        w.handle(self.sign_handle)
    }

    fn marshal_parameters(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
        w.optional_param(self.qualifying_data.as_ref())?;
        w.param(&self.in_scheme)
    }

    fn unmarshal_response(_: &[u32], params: &mut ResponseBuffer<'_>) -> Result<Self::Response> {
        Ok(GetCommandAuditDigestResponse {
            audit_info: Tpm2bAttest::unmarshal(params)?,
            signature: TpmtSignature::unmarshal(params)?,
        })
    }
}

/// TPM2_PolicyLocality
#[derive(Debug, Clone, Copy)]
pub struct PolicyLocality {
    pub policy_session: u32,
    pub locality: TpmaLocality,
}

impl Command for PolicyLocality {
    const CODE: TpmCc = TpmCc::PolicyLocality;
    const FLAGS: CommandFlags = CommandFlags::new(false, false, true);

    type Response = ();

    fn marshal_handles(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
        w.handle(self.policy_session)
    }

    fn marshal_parameters(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
        w.param(&self.locality)
    }

    fn unmarshal_response(_: &[u32], _: &mut ResponseBuffer<'_>) -> Result<()> {
        Ok(())
    }
}

/// TPM2_GetCapability
#[derive(Debug, Clone, Copy)]
pub struct GetCapability {
    pub capability: TpmCap,
    pub property: u32,
    pub property_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCapabilityResponse {
    pub more_data: bool,
    pub capability_data: TpmsCapabilityData,
}

impl Command for GetCapability {
    const CODE: TpmCc = TpmCc::GetCapability;
    const FLAGS: CommandFlags = CommandFlags::new(false, false, true);

    type Response = GetCapabilityResponse;

    fn marshal_parameters(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
        w.param(&self.capability)?;
        w.param(&self.property)?;
        w.param(&self.property_count)
    }

    fn unmarshal_response(_: &[u32], params: &mut ResponseBuffer<'_>) -> Result<Self::Response> {
        Ok(GetCapabilityResponse {
            more_data: u8::unmarshal(params)? != 0,
            capability_data: TpmsCapabilityData::unmarshal(params)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{tpm_rh, TpmAlgId};
    use crate::context::{Stage, SysContext};
    use crate::error::SapiError;

    fn offline(_: &[u8]) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("offline")
    }

    #[test]
    fn test_activate_credential_absent_blob() {
        let mut ctx = SysContext::new(offline);
        ctx.prepare(&ActivateCredential {
            activate_handle: 0x80000001,
            key_handle: 0x81000001,
            credential_blob: None,
            secret: Tpm2bEncryptedSecret::new(vec![1, 2]),
        })
        .unwrap();

        assert_eq!(
            hex::encode(ctx.command_bytes()),
            "800100000018000001478000000181000001000000020102"
        );
        let flags = ctx.flags();
        assert!(flags.decrypt_null);
        assert!(flags.decrypt_allowed);
        assert!(flags.encrypt_allowed);
        assert!(flags.auth_allowed);
        assert_eq!(ctx.command_handles(), 2);
    }

    #[test]
    fn test_activate_credential_present_blob() {
        let mut ctx = SysContext::new(offline);
        ctx.prepare(&ActivateCredential {
            activate_handle: 0x80000001,
            key_handle: 0x81000001,
            credential_blob: Some(Tpm2bIdObject::new(vec![0xcc; 3])),
            secret: Tpm2bEncryptedSecret::empty(),
        })
        .unwrap();
        let flags = ctx.flags();
        assert!(!flags.decrypt_null);
        assert!(flags.decrypt_allowed && flags.encrypt_allowed && flags.auth_allowed);
        assert_eq!(ctx.decrypt_param().unwrap(), &[0xcc; 3]);
    }

    #[test]
    fn test_policy_locality_layout() {
        let mut ctx = SysContext::new(offline);
        ctx.prepare(&PolicyLocality {
            policy_session: 0x03000000,
            locality: TpmaLocality(TpmaLocality::ZERO),
        })
        .unwrap();
        assert_eq!(
            hex::encode(ctx.command_bytes()),
            "80010000000f0000016f0300000001"
        );
        assert!(matches!(ctx.decrypt_param(), Err(SapiError::BadValue(_))));
        assert_eq!(ctx.stage(), Stage::Prepared);
    }

    #[test]
    fn test_get_capability_layout() {
        let mut ctx = SysContext::new(offline);
        ctx.prepare(&GetCapability {
            capability: TpmCap::TPM_PROPERTIES,
            property: 0x100,
            property_count: 1,
        })
        .unwrap();
        assert_eq!(
            hex::encode(ctx.command_bytes()),
            "8001000000160000017a000000060000010000000001"
        );
        assert_eq!(ctx.command_handles(), 0);
        assert!(!ctx.flags().decrypt_allowed);
    }

    #[test]
    fn test_get_command_audit_digest_layout() {
        let mut ctx = SysContext::new(offline);
        ctx.prepare(&GetCommandAuditDigest {
            privacy_handle: tpm_rh::ENDORSEMENT,
            sign_handle: 0x81000002,
            qualifying_data: None,
            in_scheme: TpmtSigScheme::with_hash(TpmAlgId::RSASSA, TpmAlgId::SHA256),
        })
        .unwrap();
        assert_eq!(
            hex::encode(ctx.command_bytes()),
            "800100000018000001334000000b8100000200000014000b"
        );
        assert!(ctx.flags().decrypt_null);
    }

    #[test]
    fn test_field_upgrade_data_oversize() {
        let mut ctx = SysContext::new(offline);
        let err = ctx
            .prepare(&FieldUpgradeData {
                fu_data: Tpm2bMaxBuffer::new(vec![0; 1025]),
            })
            .unwrap_err();
        assert!(matches!(err, SapiError::BadValue(_)));
        assert_eq!(ctx.stage(), Stage::Idle);
    }
}
