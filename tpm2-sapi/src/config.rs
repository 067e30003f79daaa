// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Command context configuration

use crate::constants::{HEADER_SIZE, TPM_MAX_COMMAND_SIZE};
use crate::error::{Result, SapiError};

/// Sizing for a [`SysContext`](crate::context::SysContext).
///
/// Command and response buffers are allocated once at `max_command_size` and
/// never grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysContextConfig {
    pub max_command_size: usize,
}

impl Default for SysContextConfig {
    fn default() -> Self {
        Self {
            max_command_size: TPM_MAX_COMMAND_SIZE,
        }
    }
}

impl SysContextConfig {
    pub fn with_max_command_size(mut self, size: usize) -> Self {
        self.max_command_size = size;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_command_size < HEADER_SIZE {
            return Err(SapiError::bad_value(format!(
                "max command size {} cannot hold a {HEADER_SIZE}-byte header",
                self.max_command_size
            )));
        }
        Ok(())
    }
}
