// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, bail, Result};
use sec1::pkcs8::{EncodePrivateKey, ObjectIdentifier, PrivateKeyInfo, SubjectPublicKeyInfo};
use zeroize::Zeroizing;

use der::Decode;
use sec1::EcPrivateKey;

use const_oid::db::rfc5912::{ID_EC_PUBLIC_KEY as ECPK, SECP_256_R_1 as P256};

use crate::packet::SignatureType;

/// Signing side of the key handling, used by producers and test fixtures.
pub trait PrivateKeyInfoExt {
    /// Generates a keypair
    ///
    /// Returns the DER encoding of the `PrivateKeyInfo` type.
    fn generate(oid: ObjectIdentifier) -> Result<Zeroizing<Vec<u8>>>;

    /// Get the public key
    ///
    /// The result is what a certificate carries as its content once
    /// DER encoded.
    fn public_key(&self) -> Result<SubjectPublicKeyInfo<'_>>;

    /// Get the signature type this key produces
    fn signs_with(&self) -> Result<SignatureType>;

    /// Signs the body, returning the signature value as it is placed in a packet.
    fn sign(&self, body: &[u8], algo: SignatureType) -> Result<Vec<u8>>;
}

impl<'a> PrivateKeyInfoExt for PrivateKeyInfo<'a> {
    fn generate(oid: ObjectIdentifier) -> Result<Zeroizing<Vec<u8>>> {
        let rand = rand::thread_rng();

        let doc = match oid {
            P256 => p256::SecretKey::random(rand)
                .to_pkcs8_der()
                .map_err(|e| anyhow!("{:?}", e))?,

            _ => bail!("unsupported"),
        };

        Ok(doc.to_bytes())
    }

    fn public_key(&self) -> Result<SubjectPublicKeyInfo<'_>> {
        match self.algorithm.oids()? {
            (ECPK, ..) => {
                let ec = EcPrivateKey::from_der(self.private_key)?;
                let pk = ec.public_key.ok_or_else(|| anyhow!("missing public key"))?;
                Ok(SubjectPublicKeyInfo {
                    algorithm: self.algorithm,
                    subject_public_key: pk,
                })
            }
            _ => bail!("unsupported"),
        }
    }

    fn signs_with(&self) -> Result<SignatureType> {
        match self.algorithm.oids()? {
            (ECPK, Some(P256)) => Ok(SignatureType::Sha256WithEcdsa),
            _ => bail!("unsupported"),
        }
    }

    fn sign(&self, body: &[u8], algo: SignatureType) -> Result<Vec<u8>> {
        match (self.algorithm.oids()?, algo) {
            ((ECPK, Some(P256)), SignatureType::Sha256WithEcdsa) => {
                use p256::ecdsa::signature::Signer;
                use p256::ecdsa::Signature;
                let ec = EcPrivateKey::from_der(self.private_key)?;
                let sign_key = p256::ecdsa::SigningKey::from_bytes(ec.private_key)?;
                let signed: Signature = sign_key.sign(body);
                Ok(signed.to_der().as_bytes().to_vec())
            }

            (_, SignatureType::DigestSha256) => Ok(super::digest(body)),

            _ => bail!("unsupported"),
        }
    }
}
