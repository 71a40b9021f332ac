// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Certificates are Data packets carrying a public key.
//!
//! The name of a certificate follows `/<identity>/KEY/<keyId>/<issuerId>/<version>`
//! and its content is the DER encoded `SubjectPublicKeyInfo` of the key.

use thiserror::Error;

use crate::name::{Component, Name};
use crate::packet::{ContentType, Data, SignatureInfo, ValidityPeriod};

pub const KEY_COMPONENT: &[u8] = b"KEY";

const KEY_OFFSET: isize = -4;
const MIN_CERT_NAME_LENGTH: usize = 4;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CertificateError {
    #[error("name {0} does not follow the certificate naming convention")]
    InvalidName(Name),

    #[error("content type is not KEY")]
    WrongContentType,

    #[error("missing public key")]
    EmptyContent,

    #[error("missing validity period")]
    MissingValidity,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    data: Data,
    validity: ValidityPeriod,
}

fn is_key_marker(component: Option<&Component>) -> bool {
    component.map_or(false, |c| c.as_bytes() == KEY_COMPONENT)
}

/// Whether `name` follows the certificate naming convention.
pub fn is_valid_name(name: &Name) -> bool {
    name.size() >= MIN_CERT_NAME_LENGTH && is_key_marker(name.get(KEY_OFFSET))
}

/// Identity of a key name (`/id/KEY/kid`) or certificate name.
pub fn extract_identity(name: &Name) -> Option<Name> {
    if is_valid_name(name) {
        Some(name.prefix(KEY_OFFSET))
    } else if name.size() >= 2 && is_key_marker(name.get(-2)) {
        Some(name.prefix(-2))
    } else {
        None
    }
}

/// Key name of a key name (returned as is) or certificate name.
pub fn extract_key_name(name: &Name) -> Option<Name> {
    if is_valid_name(name) {
        Some(name.prefix(-2))
    } else if name.size() >= 2 && is_key_marker(name.get(-2)) {
        Some(name.clone())
    } else {
        None
    }
}

impl TryFrom<Data> for Certificate {
    type Error = CertificateError;

    fn try_from(data: Data) -> Result<Self, Self::Error> {
        if !is_valid_name(&data.name) {
            return Err(CertificateError::InvalidName(data.name));
        }
        if data.content_type != ContentType::Key {
            return Err(CertificateError::WrongContentType);
        }
        if data.content.is_empty() {
            return Err(CertificateError::EmptyContent);
        }
        let validity = data
            .signature_info
            .validity
            .ok_or(CertificateError::MissingValidity)?;

        Ok(Self { data, validity })
    }
}

impl Certificate {
    pub fn name(&self) -> &Name {
        &self.data.name
    }

    pub fn identity(&self) -> Name {
        self.data.name.prefix(KEY_OFFSET)
    }

    pub fn key_name(&self) -> Name {
        self.data.name.prefix(-2)
    }

    pub fn key_id(&self) -> &Component {
        &self.data.name.components()[self.data.name.size() - 3]
    }

    pub fn issuer_id(&self) -> &Component {
        &self.data.name.components()[self.data.name.size() - 2]
    }

    /// DER encoded `SubjectPublicKeyInfo`.
    pub fn public_key(&self) -> &[u8] {
        &self.data.content
    }

    pub fn validity(&self) -> ValidityPeriod {
        self.validity
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        self.validity.contains(now)
    }

    pub fn signature_info(&self) -> &SignatureInfo {
        &self.data.signature_info
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn into_data(self) -> Data {
        self.data
    }
}
