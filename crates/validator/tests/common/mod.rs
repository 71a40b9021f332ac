// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use const_oid::db::rfc5912::SECP_256_R_1;
use der::{Decode, Encode};
use parking_lot::Mutex;
use sec1::pkcs8::PrivateKeyInfo;
use zeroize::Zeroizing;

use ndn_validator::crypto::PrivateKeyInfoExt;
use ndn_validator::packet::{ContentType, ValidityPeriod};
use ndn_validator::{
    init_tracing, Certificate, CertificateStore, Codec, Config, Data, FetchStrategy, Interest,
    ManualClock, Name, SignatureInfo, SignatureType, Transport, TransportError, ValidationError,
    Validator,
};

pub static TRACING: Once = Once::new();

/// Milliseconds since the epoch the manual clock starts at.
pub const NOW: u64 = 1_700_000_000_000;

pub fn n(s: &str) -> Name {
    s.parse().unwrap()
}

/// JSON stand-in for the TLV wire format.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode_data(&self, wire: &[u8]) -> anyhow::Result<Data> {
        let mut data: Data = serde_json::from_slice(wire)?;
        data.signed_portion = data_signed_portion(&data);
        Ok(data)
    }
}

pub fn data_signed_portion(data: &Data) -> Vec<u8> {
    serde_json::to_vec(&(
        &data.name,
        data.content_type,
        &data.content,
        &data.signature_info,
    ))
    .unwrap()
}

pub fn interest_signed_portion(interest: &Interest) -> Vec<u8> {
    serde_json::to_vec(&(&interest.name, &interest.signature_info)).unwrap()
}

pub fn encode(data: &Data) -> Vec<u8> {
    serde_json::to_vec(data).unwrap()
}

/// A P-256 key and the certificate naming it.
pub struct Identity {
    key: Zeroizing<Vec<u8>>,
    pub cert: Certificate,
}

impl Identity {
    /// A self-signed certificate.
    pub fn root(cert_name: &str) -> Self {
        let key = generate();
        let locator = n(cert_name);
        let cert = certificate(cert_name, &key, &key, locator, forever());
        Self { key, cert }
    }

    pub fn issued(cert_name: &str, issuer: &Identity) -> Self {
        Self::issued_with(cert_name, issuer, forever())
    }

    pub fn issued_with(cert_name: &str, issuer: &Identity, validity: ValidityPeriod) -> Self {
        let key = generate();
        let cert = certificate(
            cert_name,
            &key,
            &issuer.key,
            issuer.cert.name().clone(),
            validity,
        );
        Self { key, cert }
    }

    /// Certificate claiming to be signed by `locator` while signed by its own key.
    pub fn claiming(cert_name: &str, locator: &str) -> Self {
        let key = generate();
        let cert = certificate(cert_name, &key, &key, n(locator), forever());
        Self { key, cert }
    }

    pub fn name(&self) -> &Name {
        self.cert.name()
    }

    pub fn sign(&self, body: &[u8]) -> Vec<u8> {
        sign(&self.key, body)
    }

    pub fn sign_data(&self, name: &str) -> Data {
        let info = SignatureInfo::new(SignatureType::Sha256WithEcdsa)
            .with_key_name(self.cert.name().clone());
        let mut data = Data::new(n(name), info);
        data.content = Vec::from(&b"payload"[..]);
        data.signed_portion = data_signed_portion(&data);
        data.signature_value = self.sign(&data.signed_portion);
        data
    }

    pub fn sign_interest(&self, name: &str, timestamp: Option<u64>) -> Interest {
        let mut info = SignatureInfo::new(SignatureType::Sha256WithEcdsa)
            .with_key_name(self.cert.name().clone());
        info.timestamp = timestamp;

        let mut interest = Interest::new(n(name));
        interest.signature_info = Some(info);
        interest.signed_portion = interest_signed_portion(&interest);
        interest.signature_value = self.sign(&interest.signed_portion);
        interest
    }

    pub fn wire(&self) -> Vec<u8> {
        encode(self.cert.data())
    }

    pub fn base64(&self) -> String {
        general_purpose::STANDARD.encode(self.wire())
    }
}

pub fn forever() -> ValidityPeriod {
    ValidityPeriod::new(0, u64::MAX)
}

fn generate() -> Zeroizing<Vec<u8>> {
    PrivateKeyInfo::generate(SECP_256_R_1).unwrap()
}

fn sign(key: &[u8], body: &[u8]) -> Vec<u8> {
    let pki = PrivateKeyInfo::from_der(key).unwrap();
    pki.sign(body, SignatureType::Sha256WithEcdsa).unwrap()
}

fn certificate(
    cert_name: &str,
    subject_key: &[u8],
    issuer_key: &[u8],
    locator: Name,
    validity: ValidityPeriod,
) -> Certificate {
    let pki = PrivateKeyInfo::from_der(subject_key).unwrap();
    let spki = pki.public_key().unwrap().to_vec().unwrap();

    let info = SignatureInfo::new(SignatureType::Sha256WithEcdsa)
        .with_key_name(locator)
        .with_validity(validity);
    let mut data = Data::new(n(cert_name), info);
    data.content_type = ContentType::Key;
    data.content = spki;
    data.signed_portion = data_signed_portion(&data);
    data.signature_value = sign(issuer_key, &data.signed_portion);
    Certificate::try_from(data).unwrap()
}

/// Serves published certificates by prefix and counts every Interest.
#[derive(Default)]
pub struct Network {
    published: Mutex<BTreeMap<Name, Vec<u8>>>,
    calls: AtomicUsize,
    silent: bool,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A network that never answers.
    pub fn silent() -> Arc<Self> {
        Arc::new(Self {
            silent: true,
            ..Default::default()
        })
    }

    pub fn publish(&self, identity: &Identity) {
        self.publish_raw(identity.name().clone(), identity.wire());
    }

    pub fn publish_raw(&self, name: Name, wire: Vec<u8>) {
        self.published.lock().insert(name, wire);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for Network {
    async fn express_interest(&self, interest: &Interest) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.silent {
            return std::future::pending().await;
        }

        self.published
            .lock()
            .range(interest.name.clone()..)
            .next()
            .filter(|(name, _)| interest.name.is_prefix_of(name))
            .map(|(_, wire)| wire.clone())
            .ok_or_else(|| TransportError::Nack(format!("no route to {}", interest.name)))
    }
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(UNIX_EPOCH + Duration::from_millis(NOW)))
}

pub fn store(clock: Arc<ManualClock>) -> Arc<CertificateStore> {
    Arc::new(CertificateStore::with_clock(Arc::new(JsonCodec), clock))
}

pub fn validator(schema: &str, store: Arc<CertificateStore>, strategy: FetchStrategy) -> Validator {
    TRACING.call_once(init_tracing);
    let config: Config = toml::from_str(schema).unwrap();
    Validator::from_config(&config, store, strategy).unwrap()
}

/// Hierarchical data rule trusting `anchor`.
pub fn hierarchical_schema(anchor: &Identity) -> String {
    format!(
        r#"
        [[rule]]
        id = "hierarchy"
        for = "data"

        [[rule.checker]]
        type = "hierarchical"
        sig-type = "ecdsa-sha256"

        [[trust-anchor]]
        type = "base64"
        base64-string = "{}"
        "#,
        anchor.base64()
    )
}

/// Counts callback invocations of one validation.
#[derive(Clone, Default)]
pub struct Calls {
    pub success: Arc<AtomicUsize>,
    pub failure: Arc<AtomicUsize>,
}

impl Calls {
    pub fn on_success<T: 'static>(&self) -> impl FnOnce(&T) + Send + 'static {
        let count = self.success.clone();
        move |_: &T| {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn on_failure(&self) -> impl FnOnce(&ValidationError) + Send + 'static {
        let count = self.failure.clone();
        move |_: &ValidationError| {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn get(&self) -> (usize, usize) {
        (
            self.success.load(Ordering::SeqCst),
            self.failure.load(Ordering::SeqCst),
        )
    }
}
