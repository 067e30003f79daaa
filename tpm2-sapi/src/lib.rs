// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 marshaling and system-API command context
//!
//! This crate encodes and decodes TPM 2.0 structures to and from big-endian
//! byte buffers, and drives single commands through a Prepare, Execute and
//! Complete lifecycle on top of a caller-supplied transport.
//!
//! ## Features
//!
//! - **Dual-mode codec**: every type can be written, size-probed, read or skipped
//!   through the same [`Marshal`] / [`Unmarshal`] implementations
//! - **Explicit union selectors**: discriminated payloads take their selector as
//!   an argument and reject unknown selectors
//! - **Bounded buffers**: counts and sizes are checked against protocol maxima
//!   before anything is read or written
//! - **No cryptography and no device I/O**: sessions are computed by the caller
//!   from the exposed parameter areas, bytes are moved by a [`Transport`]
//!
//! ## Example
//!
//! ```no_run
//! use tpm2_sapi::{GetCapability, SysContext, TpmCap};
//!
//! let transport = |_cmd: &[u8]| -> anyhow::Result<Vec<u8>> {
//!     // hand `cmd` to a TPM or simulator
//!     anyhow::bail!("no TPM attached")
//! };
//! let mut ctx = SysContext::new(transport);
//! let (caps, _) = ctx.call(
//!     &GetCapability {
//!         capability: TpmCap::HANDLES,
//!         property: 0x81000000,
//!         property_count: 16,
//!     },
//!     &[],
//! )?;
//! println!("{:?}", caps.capability_data);
//! # Ok::<(), tpm2_sapi::SapiError>(())
//! ```

mod commands;
mod config;
mod constants;
mod context;
mod error;
mod marshal;
mod sized;
mod types;
mod unions;

pub use commands::*;
pub use config::SysContextConfig;
pub use constants::*;
pub use context::{
    Command, CommandFlags, CommandWriter, ResponseHeader, SessionFlags, Stage, SysContext,
    Transport,
};
pub use error::{Result, SapiError};
pub use marshal::{
    marshal, marshal_union, unmarshal, unmarshal_union, CommandBuffer, Marshal, ResponseBuffer,
    Union, Unmarshal,
};
pub use sized::*;
pub use types::*;
pub use unions::*;
