// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, Result};
use rsa::pkcs1::DecodeRsaPublicKey;
use spki::SubjectPublicKeyInfo;

use const_oid::db::rfc5912::{
    ID_EC_PUBLIC_KEY as ECPK, RSA_ENCRYPTION as RSA, SECP_256_R_1 as P256,
};

use crate::packet::SignatureType;

pub trait SubjectPublicKeyInfoExt {
    /// Verifies a signature
    ///
    /// ECDSA signatures are expected in their DER encoding, RSA signatures
    /// as the raw PKCS#1 v1.5 signature block.
    fn verify(&self, body: &[u8], algo: SignatureType, signature: &[u8]) -> Result<()>;
}

impl SubjectPublicKeyInfoExt for SubjectPublicKeyInfo<'_> {
    fn verify(&self, body: &[u8], algo: SignatureType, sign: &[u8]) -> Result<()> {
        match (self.algorithm.oids()?, algo) {
            ((ECPK, Some(P256)), SignatureType::Sha256WithEcdsa) => {
                use p256::ecdsa::signature::Verifier;
                let vkey = p256::ecdsa::VerifyingKey::from_sec1_bytes(self.subject_public_key)?;
                let sig = p256::ecdsa::Signature::from_der(sign)?;
                Ok(vkey.verify(body, &sig)?)
            }

            ((RSA, None), SignatureType::Sha256WithRsa) => {
                use signature::Verifier;
                let pkey = rsa::RsaPublicKey::from_pkcs1_der(self.subject_public_key)?;
                let vkey = rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new_with_prefix(pkey);
                let s = rsa::pkcs1v15::Signature::from(Box::from(sign));
                Ok(vkey.verify(body, &s)?)
            }

            _ => Err(anyhow!("unsupported")),
        }
    }
}
