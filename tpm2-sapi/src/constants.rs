// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 constants, identifiers and attribute bitfields
//!
//! Identifiers that the TPM may return with values unknown to this crate
//! (algorithms, structure tags, capabilities, curves, response codes) are open
//! newtypes rather than enums, so decoding never has to interpret them.

/// Size of the command/response header: tag (2) + size (4) + code (4)
pub const HEADER_SIZE: usize = 10;

/// Default command/response buffer size
pub const TPM_MAX_COMMAND_SIZE: usize = 4096;

/// Maximum number of authorization sessions per command
pub const MAX_SESSION_NUM: usize = 3;

/// `TPM_GENERATED_VALUE`, the magic that opens every attestation structure
pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;

// Buffer capacities
pub const MAX_DIGEST_SIZE: usize = 64;
/// Hash algorithm id followed by a digest (TPMT_HA)
pub const MAX_DATA_SIZE: usize = 2 + MAX_DIGEST_SIZE;
/// A digest name or a bare handle, whichever is larger (TPMU_NAME)
pub const MAX_NAME_SIZE: usize = 2 + MAX_DIGEST_SIZE;
pub const MAX_EVENT_SIZE: usize = 1024;
pub const MAX_DIGEST_BUFFER: usize = 1024;
pub const MAX_NV_BUFFER_SIZE: usize = 2048;
pub const MAX_ECC_KEY_BYTES: usize = 128;
pub const MAX_RSA_KEY_BYTES: usize = 512;
pub const MAX_SYM_DATA: usize = 256;
pub const MAX_ID_OBJECT_SIZE: usize = 2 * (2 + MAX_DIGEST_SIZE);
pub const MAX_ENCRYPTED_SECRET_SIZE: usize = MAX_RSA_KEY_BYTES;
pub const MAX_ATTEST_SIZE: usize = 2304;
pub const MAX_CONTEXT_SIZE: usize = 5120;

// List capacities
pub const MAX_PCRS: usize = 32;
pub const PCR_SELECT_MAX: usize = MAX_PCRS.div_ceil(8);
pub const NUM_PCR_BANKS: usize = 16;
pub const MAX_DIGEST_LIST: usize = 8;
pub const MAX_CAP_BUFFER: usize = 1024;
const CAP_DATA_SIZE: usize = MAX_CAP_BUFFER - 4 - 4;
pub const MAX_CAP_HANDLES: usize = CAP_DATA_SIZE / 4;
pub const MAX_CAP_CC: usize = CAP_DATA_SIZE / 4;
pub const MAX_CAP_ALGS: usize = CAP_DATA_SIZE / 6;
pub const MAX_TPM_PROPERTIES: usize = CAP_DATA_SIZE / 8;
pub const MAX_PCR_PROPERTIES: usize = CAP_DATA_SIZE / (5 + PCR_SELECT_MAX);
pub const MAX_ECC_CURVES: usize = CAP_DATA_SIZE / 2;

/// TPM 2.0 Command Codes (TPM_CC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TpmCc {
    GetCommandAuditDigest = 0x00000133,
    FieldUpgradeData = 0x00000141,
    ActivateCredential = 0x00000147,
    PolicyLocality = 0x0000016F,
    GetCapability = 0x0000017A,
    GetRandom = 0x0000017B,
}

impl TpmCc {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// TPM 2.0 Response Codes (TPM_RC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TpmRc(pub u32);

impl TpmRc {
    pub const SUCCESS: Self = Self(0x00000000);
    pub const BAD_TAG: Self = Self(0x0000001E);
    pub const FAILURE: Self = Self(0x00000101);

    pub fn to_u32(self) -> u32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

/// TPM 2.0 Algorithm IDs (TPM_ALG_ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TpmAlgId(pub u16);

impl TpmAlgId {
    pub const ERROR: Self = Self(0x0000);
    pub const RSA: Self = Self(0x0001);
    pub const TDES: Self = Self(0x0003);
    pub const SHA1: Self = Self(0x0004);
    pub const HMAC: Self = Self(0x0005);
    pub const AES: Self = Self(0x0006);
    pub const MGF1: Self = Self(0x0007);
    pub const KEYEDHASH: Self = Self(0x0008);
    pub const XOR: Self = Self(0x000A);
    pub const SHA256: Self = Self(0x000B);
    pub const SHA384: Self = Self(0x000C);
    pub const SHA512: Self = Self(0x000D);
    pub const NULL: Self = Self(0x0010);
    pub const SM3_256: Self = Self(0x0012);
    pub const SM4: Self = Self(0x0013);
    pub const RSASSA: Self = Self(0x0014);
    pub const RSAES: Self = Self(0x0015);
    pub const RSAPSS: Self = Self(0x0016);
    pub const OAEP: Self = Self(0x0017);
    pub const ECDSA: Self = Self(0x0018);
    pub const ECDH: Self = Self(0x0019);
    pub const ECDAA: Self = Self(0x001A);
    pub const SM2: Self = Self(0x001B);
    pub const ECSCHNORR: Self = Self(0x001C);
    pub const ECMQV: Self = Self(0x001D);
    pub const KDF1_SP800_56A: Self = Self(0x0020);
    pub const KDF2: Self = Self(0x0021);
    pub const KDF1_SP800_108: Self = Self(0x0022);
    pub const ECC: Self = Self(0x0023);
    pub const SYMCIPHER: Self = Self(0x0025);
    pub const CAMELLIA: Self = Self(0x0026);
    pub const CTR: Self = Self(0x0040);
    pub const OFB: Self = Self(0x0041);
    pub const CBC: Self = Self(0x0042);
    pub const CFB: Self = Self(0x0043);
    pub const ECB: Self = Self(0x0044);

    pub fn to_u16(self) -> u16 {
        self.0
    }

    /// Digest size for hash algorithms, `None` for anything else
    pub fn digest_size(self) -> Option<usize> {
        match self {
            Self::SHA1 => Some(20),
            Self::SHA256 | Self::SM3_256 => Some(32),
            Self::SHA384 => Some(48),
            Self::SHA512 => Some(64),
            _ => None,
        }
    }
}

/// TPM 2.0 Permanent Handles
pub mod tpm_rh {
    pub const OWNER: u32 = 0x40000001;
    pub const NULL: u32 = 0x40000007;
    pub const PW: u32 = 0x40000009; // Password authorization
    pub const ENDORSEMENT: u32 = 0x4000000B;
    pub const PLATFORM: u32 = 0x4000000C;
}

/// Structure tags (TPM_ST)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TpmSt(pub u16);

impl TpmSt {
    pub const RSP_COMMAND: Self = Self(0x00C4);
    pub const NULL: Self = Self(0x8000);
    pub const NO_SESSIONS: Self = Self(0x8001);
    pub const SESSIONS: Self = Self(0x8002);
    pub const ATTEST_NV: Self = Self(0x8014);
    pub const ATTEST_COMMAND_AUDIT: Self = Self(0x8015);
    pub const ATTEST_SESSION_AUDIT: Self = Self(0x8016);
    pub const ATTEST_CERTIFY: Self = Self(0x8017);
    pub const ATTEST_QUOTE: Self = Self(0x8018);
    pub const ATTEST_TIME: Self = Self(0x8019);
    pub const ATTEST_CREATION: Self = Self(0x801A);
    pub const CREATION: Self = Self(0x8021);
    pub const VERIFIED: Self = Self(0x8022);
    pub const AUTH_SECRET: Self = Self(0x8023);
    pub const HASHCHECK: Self = Self(0x8024);
    pub const AUTH_SIGNED: Self = Self(0x8025);

    pub fn to_u16(self) -> u16 {
        self.0
    }
}

/// Capability selectors (TPM_CAP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TpmCap(pub u32);

impl TpmCap {
    pub const ALGS: Self = Self(0x00000000);
    pub const HANDLES: Self = Self(0x00000001);
    pub const COMMANDS: Self = Self(0x00000002);
    pub const PP_COMMANDS: Self = Self(0x00000003);
    pub const AUDIT_COMMANDS: Self = Self(0x00000004);
    pub const PCRS: Self = Self(0x00000005);
    pub const TPM_PROPERTIES: Self = Self(0x00000006);
    pub const PCR_PROPERTIES: Self = Self(0x00000007);
    pub const ECC_CURVES: Self = Self(0x00000008);
    pub const AUTH_POLICIES: Self = Self(0x00000009);
}

/// ECC Curve IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TpmEccCurve(pub u16);

impl TpmEccCurve {
    pub const NONE: Self = Self(0x0000);
    pub const NIST_P192: Self = Self(0x0001);
    pub const NIST_P224: Self = Self(0x0002);
    pub const NIST_P256: Self = Self(0x0003);
    pub const NIST_P384: Self = Self(0x0004);
    pub const NIST_P521: Self = Self(0x0005);
    pub const BN_P256: Self = Self(0x0010);
    pub const SM2_P256: Self = Self(0x0020);

    pub fn to_u16(self) -> u16 {
        self.0
    }
}

/// TPM 2.0 Object Attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaObject(pub u32);

impl TpmaObject {
    pub const FIXED_TPM: u32 = 1 << 1;
    pub const ST_CLEAR: u32 = 1 << 2;
    pub const FIXED_PARENT: u32 = 1 << 4;
    pub const SENSITIVE_DATA_ORIGIN: u32 = 1 << 5;
    pub const USER_WITH_AUTH: u32 = 1 << 6;
    pub const ADMIN_WITH_POLICY: u32 = 1 << 7;
    pub const NO_DA: u32 = 1 << 10;
    pub const ENCRYPTED_DUPLICATION: u32 = 1 << 11;
    pub const RESTRICTED: u32 = 1 << 16;
    pub const DECRYPT: u32 = 1 << 17;
    pub const SIGN_ENCRYPT: u32 = 1 << 18;
}

/// TPM 2.0 NV Attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaNv(pub u32);

impl TpmaNv {
    pub const PP_WRITE: u32 = 1 << 0;
    pub const OWNER_WRITE: u32 = 1 << 1;
    pub const AUTH_WRITE: u32 = 1 << 2;
    pub const POLICY_WRITE: u32 = 1 << 3;
    pub const PP_READ: u32 = 1 << 16;
    pub const OWNER_READ: u32 = 1 << 17;
    pub const AUTH_READ: u32 = 1 << 18;
    pub const POLICY_READ: u32 = 1 << 19;
    pub const NO_DA: u32 = 1 << 25;
    pub const ORDERLY: u32 = 1 << 26;
    pub const WRITTEN: u32 = 1 << 29;
}

/// TPM 2.0 Session Attributes (TPMA_SESSION)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaSession(pub u8);

impl TpmaSession {
    pub const CONTINUE_SESSION: u8 = 1 << 0;
    pub const AUDIT_EXCLUSIVE: u8 = 1 << 1;
    pub const AUDIT_RESET: u8 = 1 << 2;
    pub const DECRYPT: u8 = 1 << 5;
    pub const ENCRYPT: u8 = 1 << 6;
    pub const AUDIT: u8 = 1 << 7;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_continue_session(mut self) -> Self {
        self.0 |= Self::CONTINUE_SESSION;
        self
    }
}

/// Locality bitmap (TPMA_LOCALITY)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaLocality(pub u8);

impl TpmaLocality {
    pub const ZERO: u8 = 1 << 0;
    pub const ONE: u8 = 1 << 1;
    pub const TWO: u8 = 1 << 2;
    pub const THREE: u8 = 1 << 3;
    pub const FOUR: u8 = 1 << 4;
}

/// Algorithm attributes (TPMA_ALGORITHM)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaAlgorithm(pub u32);

impl TpmaAlgorithm {
    pub const ASYMMETRIC: u32 = 1 << 0;
    pub const SYMMETRIC: u32 = 1 << 1;
    pub const HASH: u32 = 1 << 2;
    pub const OBJECT: u32 = 1 << 3;
    pub const SIGNING: u32 = 1 << 8;
    pub const ENCRYPTING: u32 = 1 << 9;
    pub const METHOD: u32 = 1 << 10;
}

/// Command attributes (TPMA_CC); the low 16 bits carry the command index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TpmaCc(pub u32);

impl TpmaCc {
    pub const COMMAND_INDEX_MASK: u32 = 0x0000_FFFF;
    pub const NV: u32 = 1 << 22;
    pub const EXTENSIVE: u32 = 1 << 23;
    pub const FLUSHED: u32 = 1 << 24;
    pub const R_HANDLE: u32 = 1 << 28;
    pub const V: u32 = 1 << 29;

    pub fn command_index(self) -> u16 {
        (self.0 & Self::COMMAND_INDEX_MASK) as u16
    }

    /// Number of handles in the command's handle area
    pub fn c_handles(self) -> u8 {
        ((self.0 >> 25) & 0x7) as u8
    }
}
