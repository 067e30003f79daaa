// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Error type shared by the codec and the command context.

use thiserror::Error;

use crate::constants::TpmRc;
use crate::context::Stage;

pub type Result<T, E = SapiError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SapiError {
    /// A required reference (source value, cursor or destination) was missing.
    #[error("bad reference: {0}")]
    BadReference(&'static str),
    /// The caller built a value that violates a structural constraint.
    #[error("bad value: {0}")]
    BadValue(String),
    /// The peer sent bytes that violate the wire contract.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("insufficient buffer: {needed} bytes needed at offset {offset}, capacity {capacity}")]
    InsufficientBuffer {
        offset: usize,
        needed: usize,
        capacity: usize,
    },
    #[error("bad sequence: {operation} is not allowed in stage {stage:?}")]
    BadSequence {
        operation: &'static str,
        stage: Stage,
    },
    #[error("TPM error: 0x{:08x}", .0.to_u32())]
    Tpm(TpmRc),
    #[error("transport failure: {0:#}")]
    Transport(#[source] anyhow::Error),
}

impl SapiError {
    pub(crate) fn bad_value(msg: impl Into<String>) -> Self {
        Self::BadValue(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Re-labels a read past the end of peer-supplied bytes as a malformed response.
    pub(crate) fn into_peer_error(self) -> Self {
        match self {
            Self::InsufficientBuffer {
                offset,
                needed,
                capacity,
            } => Self::MalformedResponse(format!(
                "response truncated: {needed} bytes needed at offset {offset}, only {capacity} available"
            )),
            other => other,
        }
    }
}
