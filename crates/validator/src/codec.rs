// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};

use crate::certificate::Certificate;
use crate::packet::Data;

/// Decodes wire-format packets.
///
/// Implementations fill in [`Data::signed_portion`] with the exact bytes the
/// signature covers.
pub trait Codec: Send + Sync {
    fn decode_data(&self, wire: &[u8]) -> Result<Data>;
}

pub fn decode_certificate(codec: &dyn Codec, wire: &[u8]) -> Result<Certificate> {
    let data = codec.decode_data(wire)?;
    Ok(Certificate::try_from(data)?)
}

/// Decodes base64 text holding an encoded certificate; whitespace is ignored.
pub fn certificate_from_base64(codec: &dyn Codec, text: &str) -> Result<Certificate> {
    let text: String = text.split_whitespace().collect();
    let wire = general_purpose::STANDARD
        .decode(text)
        .context("invalid base64 certificate")?;
    decode_certificate(codec, &wire)
}

pub fn read_certificate_file(codec: &dyn Codec, path: &Path) -> Result<Certificate> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read certificate file {}", path.display()))?;
    certificate_from_base64(codec, &text)
        .with_context(|| format!("failed to decode certificate file {}", path.display()))
}
