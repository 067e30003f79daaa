// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Command context: Prepare, Execute and Complete one TPM command at a time
//!
//! A [`SysContext`] owns a command buffer and a response buffer, both sized
//! once from [`SysContextConfig`]. A command goes through
//!
//! 1. [`SysContext::prepare`]: header, handles and parameters are marshalled
//!    and the header size is back-filled. Optionally the authorization area is
//!    inserted with [`SysContext::set_cmd_auths`].
//! 2. [`SysContext::execute`]: the command is handed to the [`Transport`] and
//!    the response header is validated.
//! 3. [`SysContext::complete`]: the response parameters are unmarshalled.
//!
//! [`SysContext::call`] runs all three and stops at the first error.
//!
//! The context never computes HMACs or encrypts anything. It exposes the
//! parameter areas and the per-command flags an authorization layer needs.

use tracing::{debug, warn};

use crate::config::SysContextConfig;
use crate::constants::{TpmCc, TpmRc, TpmSt, HEADER_SIZE, MAX_SESSION_NUM};
use crate::error::{Result, SapiError};
use crate::marshal::{CommandBuffer, Marshal, ResponseBuffer, Unmarshal};
use crate::sized::Tpm2b;
use crate::types::{TpmsAuthCommand, TpmsAuthResponse};

/// Phase of the command currently held by a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Prepared,
    Executed,
    Complete,
}

/// Static properties of a command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFlags {
    /// The first command parameter may be session-encrypted
    pub decrypt_allowed: bool,
    /// The first response parameter may be session-encrypted
    pub encrypt_allowed: bool,
    pub auth_allowed: bool,
}

impl CommandFlags {
    pub const fn new(decrypt_allowed: bool, encrypt_allowed: bool, auth_allowed: bool) -> Self {
        Self {
            decrypt_allowed,
            encrypt_allowed,
            auth_allowed,
        }
    }
}

/// Flags of the prepared command, read by the authorization layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub decrypt_allowed: bool,
    pub encrypt_allowed: bool,
    pub auth_allowed: bool,
    /// An optional parameter was passed as absent and encoded as a zero size
    pub decrypt_null: bool,
}

/// Byte transport to a TPM or simulator
pub trait Transport {
    fn transmit(&mut self, command: &[u8]) -> anyhow::Result<Vec<u8>>;
}

impl<F> Transport for F
where
    F: FnMut(&[u8]) -> anyhow::Result<Vec<u8>>,
{
    fn transmit(&mut self, command: &[u8]) -> anyhow::Result<Vec<u8>> {
        self(command)
    }
}

/// Writes a command's handle and parameter areas
pub struct CommandWriter<'c, 'b> {
    buf: &'c mut CommandBuffer<'b>,
    handles: usize,
    params: usize,
    decrypt_null: bool,
}

impl<'c, 'b> CommandWriter<'c, 'b> {
    fn new(buf: &'c mut CommandBuffer<'b>) -> Self {
        Self {
            buf,
            handles: 0,
            params: 0,
            decrypt_null: false,
        }
    }

    fn position(&self) -> usize {
        self.buf.position()
    }

    pub fn handle(&mut self, handle: u32) -> Result<()> {
        self.buf.put_u32(handle)?;
        self.handles += 1;
        Ok(())
    }

    pub fn param<T: Marshal + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.marshal(&mut *self.buf)?;
        self.params += 1;
        Ok(())
    }

    /// A TPM2B parameter the caller may leave out. An absent value is sent as
    /// a zero size. When it is the first parameter, the one session encryption
    /// applies to, the command is marked `decrypt_null`.
    pub fn optional_param<const N: usize>(&mut self, value: Option<&Tpm2b<N>>) -> Result<()> {
        match value {
            Some(value) => value.marshal(&mut *self.buf)?,
            None => {
                self.buf.put_u16(0)?;
                if self.params == 0 {
                    self.decrypt_null = true;
                }
            }
        }
        self.params += 1;
        Ok(())
    }
}

/// A TPM command: its code, static flags and wire layout
pub trait Command {
    const CODE: TpmCc;
    const FLAGS: CommandFlags;
    /// Number of handles in the response handle area
    const RESPONSE_HANDLES: usize = 0;

    type Response;

    fn marshal_handles(&self, _w: &mut CommandWriter<'_, '_>) -> Result<()> {
        Ok(())
    }

    fn marshal_parameters(&self, w: &mut CommandWriter<'_, '_>) -> Result<()>;

    fn unmarshal_response(
        handles: &[u32],
        params: &mut ResponseBuffer<'_>,
    ) -> Result<Self::Response>;
}

/// TPM response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub tag: TpmSt,
    pub size: usize,
    pub code: TpmRc,
}

impl ResponseHeader {
    /// Parse and check a response header against the bytes received
    pub fn parse(response: &[u8]) -> Result<Self> {
        if response.len() < HEADER_SIZE {
            return Err(SapiError::malformed(format!(
                "TPM response too short: {} bytes",
                response.len()
            )));
        }
        let mut buf = ResponseBuffer::new(response);
        let tag = TpmSt::unmarshal(&mut buf)?;
        let size = buf.get_u32()? as usize;
        let code = TpmRc(buf.get_u32()?);
        if !matches!(tag, TpmSt::NO_SESSIONS | TpmSt::SESSIONS | TpmSt::RSP_COMMAND) {
            return Err(SapiError::malformed(format!(
                "invalid response tag: 0x{:04x}",
                tag.to_u16()
            )));
        }
        if tag == TpmSt::RSP_COMMAND && code.is_success() {
            return Err(SapiError::malformed(
                "RSP_COMMAND tag on a successful response",
            ));
        }
        if size < HEADER_SIZE || size > response.len() {
            return Err(SapiError::malformed(format!(
                "TPM response size mismatch: header says {size}, got {}",
                response.len()
            )));
        }
        Ok(Self { tag, size, code })
    }
}

/// Per-command context over a [`Transport`]
pub struct SysContext<T> {
    transport: T,
    cmd: Vec<u8>,
    cmd_len: usize,
    rsp: Vec<u8>,
    stage: Stage,
    command_code: Option<TpmCc>,
    flags: SessionFlags,
    cmd_handles: usize,
    /// Offset of the first command parameter
    cp_start: usize,
    cmd_auths: usize,
    rsp_handle_count: usize,
    rsp_header: Option<ResponseHeader>,
    rsp_handles: Vec<u32>,
    /// Response parameter area
    rp_start: usize,
    rp_end: usize,
}

impl<T: Transport> SysContext<T> {
    pub fn new(transport: T) -> Self {
        let config = SysContextConfig::default();
        Self::build(transport, config.max_command_size)
    }

    pub fn with_config(transport: T, config: SysContextConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, config.max_command_size))
    }

    fn build(transport: T, size: usize) -> Self {
        Self {
            transport,
            cmd: vec![0u8; size],
            cmd_len: 0,
            rsp: vec![0u8; size],
            stage: Stage::Idle,
            command_code: None,
            flags: SessionFlags::default(),
            cmd_handles: 0,
            cp_start: 0,
            cmd_auths: 0,
            rsp_handle_count: 0,
            rsp_header: None,
            rsp_handles: Vec::new(),
            rp_start: 0,
            rp_end: 0,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    /// Number of handles in the prepared command's handle area
    pub fn command_handles(&self) -> usize {
        self.cmd_handles
    }

    pub fn prepared_command(&self) -> Option<TpmCc> {
        self.command_code
    }

    /// The marshalled command, including its header
    pub fn command_bytes(&self) -> &[u8] {
        &self.cmd[..self.cmd_len]
    }

    pub fn response_header(&self) -> Option<&ResponseHeader> {
        self.rsp_header.as_ref()
    }

    pub fn response_handles(&self) -> &[u32] {
        &self.rsp_handles
    }

    fn require(&self, allowed: &[Stage], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            warn!("{operation} called in stage {:?}", self.stage);
            Err(SapiError::BadSequence {
                operation,
                stage: self.stage,
            })
        }
    }

    fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.command_code = None;
        self.flags = SessionFlags::default();
        self.cmd_len = 0;
        self.cmd_handles = 0;
        self.cp_start = 0;
        self.cmd_auths = 0;
        self.rsp_handle_count = 0;
        self.rsp_header = None;
        self.rsp_handles.clear();
        self.rp_start = 0;
        self.rp_end = 0;
    }

    /// Marshal `command` into the command buffer. Legal in any stage.
    pub fn prepare<C: Command>(&mut self, command: &C) -> Result<()> {
        debug!("preparing {:?}", C::CODE);
        self.reset();

        let mut buf = CommandBuffer::new(&mut self.cmd);
        buf.put_u16(TpmSt::NO_SESSIONS.to_u16())?;
        buf.put_u32(0)?; // Size placeholder
        buf.put_u32(C::CODE.to_u32())?;

        let mut writer = CommandWriter::new(&mut buf);
        command.marshal_handles(&mut writer)?;
        let handles = writer.handles;
        let cp_start = writer.position();
        command.marshal_parameters(&mut writer)?;
        let decrypt_null = writer.decrypt_null;

        let len = buf.position();
        buf.update_u32(2, len as u32)?;

        self.cmd_len = len;
        self.cmd_handles = handles;
        self.cp_start = cp_start;
        self.rsp_handle_count = C::RESPONSE_HANDLES;
        self.command_code = Some(C::CODE);
        self.flags = SessionFlags {
            decrypt_allowed: C::FLAGS.decrypt_allowed,
            encrypt_allowed: C::FLAGS.encrypt_allowed,
            auth_allowed: C::FLAGS.auth_allowed,
            decrypt_null,
        };
        self.stage = Stage::Prepared;
        debug!("prepared {:?}: {len} bytes, {handles} handles", C::CODE);
        Ok(())
    }

    /// Replace `self.cmd[start..end]` with `bytes` and fix the header size.
    fn splice_command(&mut self, start: usize, end: usize, bytes: &[u8]) -> Result<()> {
        let new_len = self.cmd_len - (end - start) + bytes.len();
        if new_len > self.cmd.len() {
            return Err(SapiError::InsufficientBuffer {
                offset: start,
                needed: bytes.len(),
                capacity: self.cmd.len() - (self.cmd_len - (end - start)),
            });
        }
        self.cmd.copy_within(end..self.cmd_len, start + bytes.len());
        self.cmd[start..start + bytes.len()].copy_from_slice(bytes);
        self.cmd_len = new_len;
        self.cmd[2..6].copy_from_slice(&(new_len as u32).to_be_bytes());
        Ok(())
    }

    /// Insert the command authorization area after the handle area.
    pub fn set_cmd_auths(&mut self, auths: &[TpmsAuthCommand]) -> Result<()> {
        self.require(&[Stage::Prepared], "set_cmd_auths")?;
        if auths.is_empty() {
            return Ok(());
        }
        if self.cmd_auths != 0 {
            return Err(SapiError::BadSequence {
                operation: "set_cmd_auths",
                stage: self.stage,
            });
        }
        if !self.flags.auth_allowed {
            warn!("{:?} does not take authorization", self.command_code);
            return Err(SapiError::bad_value(format!(
                "{:?} does not take authorization",
                self.command_code
            )));
        }
        if auths.len() > MAX_SESSION_NUM {
            return Err(SapiError::bad_value(format!(
                "{} sessions given, at most {MAX_SESSION_NUM} allowed",
                auths.len()
            )));
        }

        let mut area_size = 0usize;
        for auth in auths {
            area_size += auth.marshalled_size()?;
        }
        let mut area = vec![0u8; 4 + area_size];
        let mut buf = CommandBuffer::new(&mut area);
        buf.put_u32(area_size as u32)?;
        for auth in auths {
            auth.marshal(&mut buf)?;
        }

        let at = self.cp_start;
        self.splice_command(at, at, &area)?;
        self.cp_start += area.len();
        self.cmd_auths = auths.len();
        self.cmd[0..2].copy_from_slice(&TpmSt::SESSIONS.to_u16().to_be_bytes());
        debug!("inserted {} authorizations ({} bytes)", auths.len(), area.len());
        Ok(())
    }

    /// Command parameter area, as hashed into cpHash
    pub fn cp_buffer(&self) -> Result<&[u8]> {
        self.require(
            &[Stage::Prepared, Stage::Executed, Stage::Complete],
            "cp_buffer",
        )?;
        Ok(&self.cmd[self.cp_start..self.cmd_len])
    }

    /// Response parameter area, as hashed into rpHash
    pub fn rp_buffer(&self) -> Result<&[u8]> {
        self.require(&[Stage::Executed, Stage::Complete], "rp_buffer")?;
        Ok(&self.rsp[self.rp_start..self.rp_end])
    }

    /// Locate the TPM2B at the start of `area`: (offset of its data, data length)
    fn leading_tpm2b(area: &[u8]) -> Result<(usize, usize)> {
        let mut buf = ResponseBuffer::new(area);
        let size = buf.get_u16()? as usize;
        buf.skip(size)?;
        Ok((2, size))
    }

    fn check_decrypt(&self) -> Result<()> {
        self.require(&[Stage::Prepared], "decrypt_param")?;
        if !self.flags.decrypt_allowed {
            return Err(SapiError::bad_value(format!(
                "{:?} has no decryptable parameter",
                self.command_code
            )));
        }
        Ok(())
    }

    /// First command parameter, for session encryption in place
    pub fn decrypt_param(&self) -> Result<&[u8]> {
        self.check_decrypt()?;
        if self.flags.decrypt_null {
            return Err(SapiError::bad_value(
                "decrypt parameter was passed as absent",
            ));
        }
        let area = &self.cmd[self.cp_start..self.cmd_len];
        let (start, len) = Self::leading_tpm2b(area)?;
        Ok(&area[start..start + len])
    }

    /// Overwrite the first command parameter.
    ///
    /// A present parameter keeps its size. An absent one is replaced by `data`.
    pub fn set_decrypt_param(&mut self, data: &[u8]) -> Result<()> {
        self.check_decrypt()?;
        let (start, len) = Self::leading_tpm2b(&self.cmd[self.cp_start..self.cmd_len])?;
        if !self.flags.decrypt_null && data.len() != len {
            return Err(SapiError::bad_value(format!(
                "decrypt parameter is {len} bytes, got {}",
                data.len()
            )));
        }
        let size = u16::try_from(data.len())
            .map_err(|_| SapiError::bad_value("decrypt parameter too large"))?;
        let mut param = Vec::with_capacity(2 + data.len());
        param.extend_from_slice(&size.to_be_bytes());
        param.extend_from_slice(data);
        let at = self.cp_start;
        self.splice_command(at, at + start + len, &param)?;
        self.flags.decrypt_null = false;
        Ok(())
    }

    fn encrypt_range(&self) -> Result<(usize, usize)> {
        self.require(&[Stage::Executed, Stage::Complete], "encrypt_param")?;
        if !self.flags.encrypt_allowed {
            return Err(SapiError::bad_value(format!(
                "{:?} has no encryptable response parameter",
                self.command_code
            )));
        }
        let area = &self.rsp[self.rp_start..self.rp_end];
        let (start, len) = Self::leading_tpm2b(area).map_err(SapiError::into_peer_error)?;
        Ok((self.rp_start + start, len))
    }

    /// First response parameter, for session decryption in place
    pub fn encrypt_param(&self) -> Result<&[u8]> {
        let (start, len) = self.encrypt_range()?;
        Ok(&self.rsp[start..start + len])
    }

    /// Overwrite the first response parameter with data of the same size
    pub fn set_encrypt_param(&mut self, data: &[u8]) -> Result<()> {
        let (start, len) = self.encrypt_range()?;
        if data.len() != len {
            return Err(SapiError::bad_value(format!(
                "encrypt parameter is {len} bytes, got {}",
                data.len()
            )));
        }
        self.rsp[start..start + len].copy_from_slice(data);
        Ok(())
    }

    /// Send the prepared command and validate the response header.
    ///
    /// A TPM error code leaves the context in [`Stage::Prepared`], so the same
    /// command can be sent again.
    pub fn execute(&mut self) -> Result<()> {
        self.require(&[Stage::Prepared], "execute")?;
        debug!("executing {:?} ({} bytes)", self.command_code, self.cmd_len);

        let response = self
            .transport
            .transmit(&self.cmd[..self.cmd_len])
            .map_err(SapiError::Transport)?;
        if response.len() > self.rsp.len() {
            return Err(SapiError::InsufficientBuffer {
                offset: 0,
                needed: response.len(),
                capacity: self.rsp.len(),
            });
        }
        self.rsp[..response.len()].copy_from_slice(&response);

        let header = ResponseHeader::parse(&response)?;
        self.rsp_header = Some(header);
        if !header.code.is_success() {
            debug!("{:?} failed: 0x{:08x}", self.command_code, header.code.to_u32());
            return Err(SapiError::Tpm(header.code));
        }

        let (handles, rp_start, rp_end) = self
            .layout_response(&header)
            .map_err(SapiError::into_peer_error)?;
        self.rsp_handles = handles;
        self.rp_start = rp_start;
        self.rp_end = rp_end;
        self.stage = Stage::Executed;
        debug!("{:?} succeeded: {} bytes", self.command_code, header.size);
        Ok(())
    }

    /// Response handles, then the bounds of the parameter area
    fn layout_response(&self, header: &ResponseHeader) -> Result<(Vec<u32>, usize, usize)> {
        let mut buf = ResponseBuffer::at(&self.rsp[..header.size], HEADER_SIZE);
        let mut handles = Vec::with_capacity(self.rsp_handle_count);
        for _ in 0..self.rsp_handle_count {
            handles.push(buf.get_u32()?);
        }
        if header.tag == TpmSt::SESSIONS {
            let param_size = buf.get_u32()? as usize;
            let start = buf.position();
            buf.skip(param_size)?;
            Ok((handles, start, buf.position()))
        } else {
            Ok((handles, buf.position(), header.size))
        }
    }

    /// Response authorization area, one entry per command authorization
    pub fn rsp_auths(&self) -> Result<Vec<TpmsAuthResponse>> {
        self.require(&[Stage::Executed, Stage::Complete], "rsp_auths")?;
        let Some(header) = self.rsp_header else {
            return Ok(Vec::new());
        };
        if header.tag != TpmSt::SESSIONS {
            return Ok(Vec::new());
        }
        let mut buf = ResponseBuffer::new(&self.rsp[self.rp_end..header.size]);
        let mut auths = Vec::with_capacity(self.cmd_auths);
        for _ in 0..self.cmd_auths {
            let auth = TpmsAuthResponse::unmarshal(&mut buf).map_err(SapiError::into_peer_error)?;
            auths.push(auth);
        }
        Ok(auths)
    }

    /// Unmarshal the response parameters of the executed command.
    pub fn complete<C: Command>(&mut self) -> Result<C::Response> {
        self.require(&[Stage::Executed], "complete")?;
        if self.command_code != Some(C::CODE) {
            return Err(SapiError::bad_value(format!(
                "completing {:?} but {:?} was prepared",
                C::CODE,
                self.command_code
            )));
        }
        let mut params = ResponseBuffer::new(&self.rsp[self.rp_start..self.rp_end]);
        let response = C::unmarshal_response(&self.rsp_handles, &mut params)
            .map_err(SapiError::into_peer_error)?;
        self.stage = Stage::Complete;
        debug!("completed {:?}", C::CODE);
        Ok(response)
    }

    /// Prepare, authorize, execute and complete `command` in one go.
    pub fn call<C: Command>(
        &mut self,
        command: &C,
        auths: &[TpmsAuthCommand],
    ) -> Result<(C::Response, Vec<TpmsAuthResponse>)> {
        self.prepare(command)?;
        self.set_cmd_auths(auths)?;
        self.execute()?;
        let rsp_auths = self.rsp_auths()?;
        let response = self.complete::<C>()?;
        Ok((response, rsp_auths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::tpm_rh;
    use crate::sized::Tpm2bDigest;

    /// A command with a handle, an optional digest and one response handle
    struct Sample {
        handle: u32,
        digest: Option<Tpm2bDigest>,
    }

    impl Command for Sample {
        const CODE: TpmCc = TpmCc::GetRandom;
        const FLAGS: CommandFlags = CommandFlags::new(true, true, true);
        const RESPONSE_HANDLES: usize = 1;

        type Response = (u32, Tpm2bDigest);

        fn marshal_handles(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
            w.handle(self.handle)
        }

        fn marshal_parameters(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
            w.optional_param(self.digest.as_ref())
        }

        fn unmarshal_response(
            handles: &[u32],
            params: &mut ResponseBuffer<'_>,
        ) -> Result<Self::Response> {
            Ok((handles[0], Tpm2bDigest::unmarshal(params)?))
        }
    }

    fn no_transport(_: &[u8]) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("no TPM attached")
    }

    fn sample() -> Sample {
        Sample {
            handle: 0x81000001,
            digest: Some(Tpm2bDigest::new(vec![0xaa, 0xbb])),
        }
    }

    #[test]
    fn test_prepare_layout() {
        let mut ctx = SysContext::new(no_transport);
        ctx.prepare(&sample()).unwrap();
        assert_eq!(ctx.stage(), Stage::Prepared);
        assert_eq!(ctx.command_handles(), 1);
        assert_eq!(
            hex::encode(ctx.command_bytes()),
            "8001000000120000017b810000010002aabb"
        );
        assert_eq!(ctx.cp_buffer().unwrap(), &[0x00, 0x02, 0xaa, 0xbb]);
        assert_eq!(ctx.decrypt_param().unwrap(), &[0xaa, 0xbb]);
        assert!(!ctx.flags().decrypt_null);
    }

    #[test]
    fn test_sequence_errors() {
        let mut ctx = SysContext::new(no_transport);
        assert!(matches!(
            ctx.execute(),
            Err(SapiError::BadSequence {
                stage: Stage::Idle,
                ..
            })
        ));
        assert!(matches!(
            ctx.complete::<Sample>(),
            Err(SapiError::BadSequence { .. })
        ));
        assert!(matches!(ctx.rp_buffer(), Err(SapiError::BadSequence { .. })));

        ctx.prepare(&sample()).unwrap();
        let err = ctx.execute().unwrap_err();
        assert!(matches!(err, SapiError::Transport(_)));
        assert_eq!(ctx.stage(), Stage::Prepared);
    }

    #[test]
    fn test_set_cmd_auths_splices_area() {
        let mut ctx = SysContext::new(no_transport);
        ctx.prepare(&sample()).unwrap();
        let before = ctx.command_bytes().len();
        ctx.set_cmd_auths(&[TpmsAuthCommand::password(b"")]).unwrap();
        let bytes = ctx.command_bytes();
        assert_eq!(bytes.len(), before + 4 + 9);
        assert_eq!(&bytes[0..2], &[0x80, 0x02]);
        assert_eq!(
            u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize,
            bytes.len()
        );
        // handle, then the authorization area, then the parameters
        assert_eq!(&bytes[10..14], &[0x81, 0x00, 0x00, 0x01]);
        assert_eq!(&bytes[14..18], &[0, 0, 0, 9]);
        assert_eq!(&bytes[18..22], &tpm_rh::PW.to_be_bytes());
        assert_eq!(ctx.cp_buffer().unwrap(), &[0x00, 0x02, 0xaa, 0xbb]);

        let four = vec![TpmsAuthCommand::password(b""); 4];
        ctx.prepare(&sample()).unwrap();
        assert!(matches!(
            ctx.set_cmd_auths(&four),
            Err(SapiError::BadValue(_))
        ));
    }

    #[test]
    fn test_set_decrypt_param() {
        let mut ctx = SysContext::new(no_transport);
        ctx.prepare(&sample()).unwrap();
        assert!(matches!(
            ctx.set_decrypt_param(&[1, 2, 3]),
            Err(SapiError::BadValue(_))
        ));
        ctx.set_decrypt_param(&[0x11, 0x22]).unwrap();
        assert_eq!(ctx.decrypt_param().unwrap(), &[0x11, 0x22]);

        ctx.prepare(&Sample {
            handle: 1,
            digest: None,
        })
        .unwrap();
        assert!(ctx.flags().decrypt_null);
        assert!(matches!(ctx.decrypt_param(), Err(SapiError::BadValue(_))));
        ctx.set_decrypt_param(&[9, 9, 9]).unwrap();
        assert!(!ctx.flags().decrypt_null);
        assert_eq!(ctx.decrypt_param().unwrap(), &[9, 9, 9]);
        let bytes = ctx.command_bytes();
        assert_eq!(bytes.len(), 10 + 4 + 2 + 3);
        assert_eq!(&bytes[2..6], &19u32.to_be_bytes());
    }

    /// Two digests where only the second may be left out
    struct TwoDigests {
        first: Tpm2bDigest,
        second: Option<Tpm2bDigest>,
    }

    impl Command for TwoDigests {
        const CODE: TpmCc = TpmCc::GetRandom;
        const FLAGS: CommandFlags = CommandFlags::new(true, true, true);
        const RESPONSE_HANDLES: usize = 0;

        type Response = ();

        fn marshal_handles(&self, _: &mut CommandWriter<'_, '_>) -> Result<()> {
            Ok(())
        }

        fn marshal_parameters(&self, w: &mut CommandWriter<'_, '_>) -> Result<()> {
            w.param(&self.first)?;
            w.optional_param(self.second.as_ref())
        }

        fn unmarshal_response(_: &[u32], _: &mut ResponseBuffer<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_absent_later_param_keeps_first_encryptable() {
        let mut ctx = SysContext::new(no_transport);
        ctx.prepare(&TwoDigests {
            first: Tpm2bDigest::new(vec![1, 2]),
            second: None,
        })
        .unwrap();
        assert!(!ctx.flags().decrypt_null);
        assert_eq!(ctx.decrypt_param().unwrap(), &[1, 2]);
        assert!(matches!(
            ctx.set_decrypt_param(&[9; 5]),
            Err(SapiError::BadValue(_))
        ));
        assert_eq!(ctx.cp_buffer().unwrap(), &[0, 2, 1, 2, 0, 0]);
        ctx.set_decrypt_param(&[7, 8]).unwrap();
        assert_eq!(ctx.cp_buffer().unwrap(), &[0, 2, 7, 8, 0, 0]);
    }

    #[test]
    fn test_execute_and_complete() {
        let transport = |_: &[u8]| -> anyhow::Result<Vec<u8>> {
            // NO_SESSIONS, size 18, success, handle 0x80000001, digest [0x42, 0x43]
            Ok(hex::decode("800100000012000000008000000100024243").unwrap())
        };
        let mut ctx = SysContext::new(transport);
        ctx.prepare(&sample()).unwrap();
        ctx.execute().unwrap();
        assert_eq!(ctx.response_handles(), &[0x80000001]);
        assert_eq!(ctx.rp_buffer().unwrap(), &[0x00, 0x02, 0x42, 0x43]);
        assert_eq!(ctx.encrypt_param().unwrap(), &[0x42, 0x43]);
        assert!(ctx.rsp_auths().unwrap().is_empty());
        let (handle, digest) = ctx.complete::<Sample>().unwrap();
        assert_eq!(handle, 0x80000001);
        assert_eq!(digest.as_bytes(), &[0x42, 0x43]);
        assert_eq!(ctx.stage(), Stage::Complete);
    }

    #[test]
    fn test_response_header_checks() {
        assert!(matches!(
            ResponseHeader::parse(&[0x80, 0x01, 0, 0]),
            Err(SapiError::MalformedResponse(_))
        ));
        // unknown tag
        assert!(matches!(
            ResponseHeader::parse(&hex::decode("12340000000a00000000").unwrap()),
            Err(SapiError::MalformedResponse(_))
        ));
        // size beyond the received bytes
        assert!(matches!(
            ResponseHeader::parse(&hex::decode("80010000000b00000000").unwrap()),
            Err(SapiError::MalformedResponse(_))
        ));
        let raw = hex::decode("80010000000a00000101").unwrap();
        let header = ResponseHeader::parse(&raw).unwrap();
        assert_eq!(header.code, TpmRc::FAILURE);
        // RSP_COMMAND only ever carries an error code
        assert!(matches!(
            ResponseHeader::parse(&hex::decode("00c40000000a00000000").unwrap()),
            Err(SapiError::MalformedResponse(_))
        ));
        let raw = hex::decode("00c40000000a0000001e").unwrap();
        let header = ResponseHeader::parse(&raw).unwrap();
        assert_eq!(header.tag, TpmSt::RSP_COMMAND);
        assert_eq!(header.code, TpmRc::BAD_TAG);
    }

    #[test]
    fn test_tpm_error_code() {
        let transport = |_: &[u8]| -> anyhow::Result<Vec<u8>> {
            Ok(hex::decode("80010000000a00000101").unwrap())
        };
        let mut ctx = SysContext::new(transport);
        ctx.prepare(&sample()).unwrap();
        assert!(matches!(ctx.execute(), Err(SapiError::Tpm(TpmRc::FAILURE))));
        assert_eq!(ctx.stage(), Stage::Prepared);
        assert_eq!(ctx.response_header().unwrap().code, TpmRc::FAILURE);
    }

    #[test]
    fn test_truncated_response_is_malformed() {
        let transport = |_: &[u8]| -> anyhow::Result<Vec<u8>> {
            // the digest claims 4 bytes but only 2 follow
            Ok(hex::decode("800100000012000000008000000100044243").unwrap())
        };
        let mut ctx = SysContext::new(transport);
        ctx.prepare(&sample()).unwrap();
        ctx.execute().unwrap();
        assert!(matches!(
            ctx.complete::<Sample>(),
            Err(SapiError::MalformedResponse(_))
        ));
        assert_eq!(ctx.stage(), Stage::Executed);
    }

    #[test]
    fn test_small_command_buffer() {
        let tiny = SysContextConfig::default().with_max_command_size(4);
        assert!(matches!(
            SysContext::with_config(no_transport, tiny),
            Err(SapiError::BadValue(_))
        ));
        let small = SysContextConfig::default().with_max_command_size(16);
        let mut ctx = SysContext::with_config(no_transport, small).unwrap();
        assert!(matches!(
            ctx.prepare(&sample()),
            Err(SapiError::InsufficientBuffer { .. })
        ));
        assert_eq!(ctx.stage(), Stage::Idle);
    }
}
