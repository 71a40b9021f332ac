// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Decoded packet model.
//!
//! Wire encoding is out of scope for this crate: a [`Codec`](crate::Codec)
//! produces these values together with the exact bytes covered by the
//! signature.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::bail;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::name::Name;

/// Default lifetime of an Interest, also bounding one certificate fetch attempt.
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_secs(4);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureType {
    #[serde(rename = "sha256")]
    DigestSha256,

    #[serde(rename = "rsa-sha256")]
    Sha256WithRsa,

    #[serde(rename = "ecdsa-sha256")]
    Sha256WithEcdsa,
}

impl SignatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DigestSha256 => "sha256",
            Self::Sha256WithRsa => "rsa-sha256",
            Self::Sha256WithEcdsa => "ecdsa-sha256",
        }
    }
}

impl FromStr for SignatureType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "sha256" => Self::DigestSha256,
            "rsa-sha256" => Self::Sha256WithRsa,
            "ecdsa-sha256" => Self::Sha256WithEcdsa,
            _ => bail!("unknown signature type {:?}", s),
        })
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyLocator {
    Name(Name),
    Digest(Vec<u8>),
}

/// Validity window of a certificate, in milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityPeriod {
    pub not_before: u64,
    pub not_after: u64,
}

impl ValidityPeriod {
    pub fn new(not_before: u64, not_after: u64) -> Self {
        Self {
            not_before,
            not_after,
        }
    }

    pub fn contains(&self, now: u64) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

impl fmt::Display for ValidityPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt = |ms: u64| {
            let time = i64::try_from(ms)
                .ok()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
            match time {
                Some(t) => t.format("%Y%m%dT%H%M%S").to_string(),
                None => ms.to_string(),
            }
        };
        write!(f, "({}, {})", fmt(self.not_before), fmt(self.not_after))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature_type: SignatureType,

    #[serde(default)]
    pub key_locator: Option<KeyLocator>,

    /// Present on certificates.
    #[serde(default)]
    pub validity: Option<ValidityPeriod>,

    /// Signing time of a signed Interest, in milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: Option<u64>,

    #[serde(default)]
    pub nonce: Option<Vec<u8>>,
}

impl SignatureInfo {
    pub fn new(signature_type: SignatureType) -> Self {
        Self {
            signature_type,
            key_locator: None,
            validity: None,
            timestamp: None,
            nonce: None,
        }
    }

    pub fn with_key_name(mut self, name: Name) -> Self {
        self.key_locator = Some(KeyLocator::Name(name));
        self
    }

    pub fn with_validity(mut self, validity: ValidityPeriod) -> Self {
        self.validity = Some(validity);
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The key name in the locator, if the locator is a name.
    pub fn key_name(&self) -> Option<&Name> {
        match &self.key_locator {
            Some(KeyLocator::Name(name)) => Some(name),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Blob,
    Link,
    Key,
    Nack,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,

    #[serde(default)]
    pub content_type: ContentType,

    #[serde(default)]
    pub content: Vec<u8>,

    pub signature_info: SignatureInfo,

    #[serde(default)]
    pub signature_value: Vec<u8>,

    /// Bytes covered by `signature_value`, as produced by the codec.
    #[serde(default)]
    pub signed_portion: Vec<u8>,
}

impl Data {
    pub fn new(name: Name, signature_info: SignatureInfo) -> Self {
        Self {
            name,
            content_type: ContentType::Blob,
            content: Vec::new(),
            signature_info,
            signature_value: Vec::new(),
            signed_portion: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,

    #[serde(default)]
    pub can_be_prefix: bool,

    #[serde(default)]
    pub must_be_fresh: bool,

    #[serde(default = "default_lifetime")]
    pub lifetime: Duration,

    #[serde(default)]
    pub signature_info: Option<SignatureInfo>,

    #[serde(default)]
    pub signature_value: Vec<u8>,

    #[serde(default)]
    pub signed_portion: Vec<u8>,
}

fn default_lifetime() -> Duration {
    DEFAULT_INTEREST_LIFETIME
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            can_be_prefix: false,
            must_be_fresh: false,
            lifetime: DEFAULT_INTEREST_LIFETIME,
            signature_info: None,
            signature_value: Vec::new(),
            signed_portion: Vec::new(),
        }
    }
}

/// Which rule set a packet is checked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketKind {
    Data,
    Interest,
}

impl FromStr for PacketKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "data" => Self::Data,
            "interest" => Self::Interest,
            _ => bail!("unknown packet kind {:?}", s),
        })
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("data"),
            Self::Interest => f.write_str("interest"),
        }
    }
}

/// Common view over packets that carry a signature.
pub trait SignedPacket {
    const KIND: PacketKind;

    fn name(&self) -> &Name;
    fn signature_info(&self) -> Option<&SignatureInfo>;
    fn signed_portion(&self) -> &[u8];
    fn signature_value(&self) -> &[u8];
}

impl SignedPacket for Data {
    const KIND: PacketKind = PacketKind::Data;

    fn name(&self) -> &Name {
        &self.name
    }

    fn signature_info(&self) -> Option<&SignatureInfo> {
        Some(&self.signature_info)
    }

    fn signed_portion(&self) -> &[u8] {
        &self.signed_portion
    }

    fn signature_value(&self) -> &[u8] {
        &self.signature_value
    }
}

impl SignedPacket for Interest {
    const KIND: PacketKind = PacketKind::Interest;

    fn name(&self) -> &Name {
        &self.name
    }

    fn signature_info(&self) -> Option<&SignatureInfo> {
        self.signature_info.as_ref()
    }

    fn signed_portion(&self) -> &[u8] {
        &self.signed_portion
    }

    fn signature_value(&self) -> &[u8] {
        &self.signature_value
    }
}
