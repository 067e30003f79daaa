// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Decode hex-encoded TPM 2.0 structures
//!
//! Usage:
//!   tpm2-decode <kind> [hex]      (hex is read from stdin when omitted)
//!   tpm2-decode --skip <kind> [hex]

use std::fmt::Debug;
use std::io::{self, Read};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tpm2_sapi::{
    unmarshal, ResponseBuffer, SizedStruct, TpmlPcrSelection, TpmsAttest, TpmsCapabilityData,
    TpmsNvPublic, TpmtPublic, TpmtSigScheme, TpmtSignature, Unmarshal,
};
use tracing::debug;

/// Decode a TPM 2.0 structure and print it
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// structure to decode
    #[arg(value_enum)]
    kind: Kind,

    /// hex encoded bytes; read from stdin when omitted
    hex: Option<String>,

    /// validate and skip the structure, printing only the consumed size
    #[arg(long)]
    skip: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    /// TPMS_ATTEST
    Attest,
    /// TPMT_SIGNATURE
    Signature,
    /// TPMS_CAPABILITY_DATA
    CapabilityData,
    /// TPM2B_PUBLIC
    Public,
    /// TPM2B_NV_PUBLIC
    NvPublic,
    /// TPML_PCR_SELECTION
    PcrSelection,
    /// TPMT_SIG_SCHEME
    SigScheme,
}

fn read_input(hex_arg: Option<String>) -> Result<Vec<u8>> {
    let text = match hex_arg {
        Some(text) => text,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            text
        }
    };
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(cleaned).context("input is not valid hex")
}

/// Decode one `T` from the start of `bytes`, returning the number of bytes consumed
fn decode<T: Unmarshal + Debug>(bytes: &[u8], skip: bool) -> Result<usize> {
    if skip {
        let mut offset = 0;
        unmarshal::<T>(bytes, Some(&mut offset), None)?;
        return Ok(offset);
    }
    let mut buf = ResponseBuffer::new(bytes);
    let value = T::unmarshal(&mut buf)?;
    println!("{value:#?}");
    Ok(buf.position())
}

fn main() -> Result<()> {
    {
        use tracing_subscriber::{fmt, EnvFilter};
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_writer(io::stderr).with_env_filter(filter).init();
    }

    let args = Args::parse();
    let bytes = read_input(args.hex)?;
    debug!("decoding {} bytes as {:?}", bytes.len(), args.kind);

    let consumed = match args.kind {
        Kind::Attest => decode::<TpmsAttest>(&bytes, args.skip),
        Kind::Signature => decode::<TpmtSignature>(&bytes, args.skip),
        Kind::CapabilityData => decode::<TpmsCapabilityData>(&bytes, args.skip),
        Kind::Public => decode::<SizedStruct<TpmtPublic>>(&bytes, args.skip),
        Kind::NvPublic => decode::<SizedStruct<TpmsNvPublic>>(&bytes, args.skip),
        Kind::PcrSelection => decode::<TpmlPcrSelection>(&bytes, args.skip),
        Kind::SigScheme => decode::<TpmtSigScheme>(&bytes, args.skip),
    }
    .with_context(|| format!("failed to decode {:?}", args.kind))?;

    println!("consumed {consumed} of {} bytes", bytes.len());
    Ok(())
}
