// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Retrieval of certificates named by key locators.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::certificate::Certificate;
use crate::codec::decode_certificate;
use crate::error::{ErrorCode, ValidationError};
use crate::name::Name;
use crate::packet::Interest;
use crate::store::CertificateStore;

/// Retries after the first attempt before giving up on a certificate.
pub const DEFAULT_RETRIES: u32 = 3;

/// A pending fetch for one certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateRequest {
    pub interest: Interest,
    pub retries_remaining: u32,
}

impl CertificateRequest {
    pub fn new(name: Name) -> Self {
        let mut interest = Interest::new(name);
        interest.can_be_prefix = true;
        interest.must_be_fresh = true;
        Self {
            interest,
            retries_remaining: DEFAULT_RETRIES,
        }
    }

    pub fn name(&self) -> &Name {
        &self.interest.name
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network nack: {0}")]
    Nack(String),
}

/// Sends one Interest and waits for the encoded Data answering it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn express_interest(&self, interest: &Interest) -> Result<Vec<u8>, TransportError>;
}

#[derive(Clone)]
pub enum FetchStrategy {
    Network(Arc<dyn Transport>),
    /// Only certificates already in the store can be used.
    Offline,
}

type Shared = Arc<OnceCell<Result<Certificate, ValidationError>>>;

pub struct CertificateFetcher {
    store: Arc<CertificateStore>,
    strategy: FetchStrategy,
    in_flight: Mutex<HashMap<Name, Shared>>,
}

impl CertificateFetcher {
    pub fn new(store: Arc<CertificateStore>, strategy: FetchStrategy) -> Self {
        Self {
            store,
            strategy,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn offline(store: Arc<CertificateStore>) -> Self {
        Self::new(store, FetchStrategy::Offline)
    }

    pub fn store(&self) -> &Arc<CertificateStore> {
        &self.store
    }

    /// Resolves `request` to a certificate.
    ///
    /// The unverified cache is consulted first. Concurrent requests for the
    /// same name share a single retrieval; a retrieved certificate is placed
    /// in the unverified cache before it is returned.
    pub async fn fetch(&self, request: CertificateRequest) -> Result<Certificate, ValidationError> {
        if let Some(cert) = self.store.find_unverified(request.name()) {
            debug!("found {} in the unverified cache", cert.name());
            return Ok(cert);
        }

        let name = request.name().clone();
        let shared = self.in_flight.lock().entry(name.clone()).or_default().clone();
        let result = shared.get_or_init(|| self.retrieve(request)).await.clone();

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&name).map_or(false, |s| Arc::ptr_eq(s, &shared)) {
            in_flight.remove(&name);
        }

        result
    }

    async fn retrieve(&self, request: CertificateRequest) -> Result<Certificate, ValidationError> {
        match &self.strategy {
            FetchStrategy::Offline => Err(ValidationError::new(
                ErrorCode::CannotRetrieveCertificate,
                format!("{} is not available offline", request.name()),
            )),
            FetchStrategy::Network(transport) => {
                self.retrieve_from(transport.as_ref(), request).await
            }
        }
    }

    async fn retrieve_from(
        &self,
        transport: &dyn Transport,
        mut request: CertificateRequest,
    ) -> Result<Certificate, ValidationError> {
        loop {
            debug!("fetching {}", request.name());
            let lifetime = request.interest.lifetime;
            let attempt = transport.express_interest(&request.interest);
            let answer = tokio::time::timeout(lifetime, attempt)
                .await
                .unwrap_or(Err(TransportError::Timeout));

            match answer {
                Ok(wire) => {
                    let cert = decode_certificate(self.store.codec().as_ref(), &wire).map_err(|e| {
                        ValidationError::new(
                            ErrorCode::MalformedCertificate,
                            format!("{}: {:#}", request.name(), e),
                        )
                    })?;
                    self.store.cache_unverified(cert.clone());
                    return Ok(cert);
                }

                Err(e) if request.retries_remaining > 0 => {
                    request.retries_remaining -= 1;
                    debug!(
                        "fetching {} failed ({}), {} retries left",
                        request.name(),
                        e,
                        request.retries_remaining
                    );
                }

                Err(e) => {
                    warn!("giving up on {}: {}", request.name(), e);
                    return Err(ValidationError::new(
                        ErrorCode::CannotRetrieveCertificate,
                        format!("{}: {}", request.name(), e),
                    ));
                }
            }
        }
    }
}
