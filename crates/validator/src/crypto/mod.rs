// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

mod pki;
mod spki;

pub use self::pki::PrivateKeyInfoExt;
pub use self::spki::SubjectPublicKeyInfoExt;

use anyhow::{bail, Result};
use der::Decode;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::packet::SignatureType;

/// Checks a signature value against the signed bytes and a public key.
pub trait CryptoVerifier: Send + Sync {
    fn verify(
        &self,
        signature_type: SignatureType,
        signed: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> bool;
}

/// Verifies with the DER `SubjectPublicKeyInfo` carried by certificates.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyVerifier;

impl KeyVerifier {
    fn check(
        signature_type: SignatureType,
        signed: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<()> {
        if signature_type == SignatureType::DigestSha256 {
            if digest(signed) != signature {
                bail!("digest mismatch");
            }
            return Ok(());
        }

        let spki = ::spki::SubjectPublicKeyInfo::from_der(public_key)?;
        spki.verify(signed, signature_type, signature)
    }
}

impl CryptoVerifier for KeyVerifier {
    fn verify(
        &self,
        signature_type: SignatureType,
        signed: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> bool {
        match Self::check(signature_type, signed, signature, public_key) {
            Ok(()) => true,
            Err(e) => {
                debug!("{} signature rejected: {}", signature_type, e);
                false
            }
        }
    }
}

/// SHA-256 of `body`, the signature value of a `DigestSha256` signature.
pub fn digest(body: &[u8]) -> Vec<u8> {
    Sha256::digest(body).to_vec()
}
