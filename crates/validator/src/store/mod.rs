// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Shared certificate storage: trust anchors plus the verified and
//! unverified caches.

pub mod anchors;
pub mod cache;

pub use self::anchors::TrustAnchorContainer;
pub use self::cache::{CertificateCache, UNVERIFIED_LIFETIME, VERIFIED_LIFETIME};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::debug;

use crate::certificate::Certificate;
use crate::clock::{Clock, SystemClock};
use crate::codec::Codec;
use crate::name::Name;

/// Certificates known to a validator, shared by every validation flow.
///
/// Each part sits behind its own lock, so lookups in one cache never wait
/// on a refresh of the anchors.
pub struct CertificateStore {
    anchors: Mutex<TrustAnchorContainer>,
    verified: Mutex<CertificateCache>,
    unverified: Mutex<CertificateCache>,
    codec: Arc<dyn Codec>,
    clock: Arc<dyn Clock>,
}

impl CertificateStore {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self::with_clock(codec, Arc::new(SystemClock))
    }

    pub fn with_clock(codec: Arc<dyn Codec>, clock: Arc<dyn Clock>) -> Self {
        Self {
            anchors: Mutex::new(TrustAnchorContainer::new()),
            verified: Mutex::new(CertificateCache::new(VERIFIED_LIFETIME)),
            unverified: Mutex::new(CertificateCache::new(UNVERIFIED_LIFETIME)),
            codec,
            clock,
        }
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn add_anchor(&self, group_id: &str, certificate: Certificate) -> Result<()> {
        self.anchors.lock().insert(group_id, certificate)
    }

    pub fn add_dynamic_anchors(
        &self,
        group_id: &str,
        path: &Path,
        is_dir: bool,
        refresh: Option<Duration>,
    ) -> Result<()> {
        let now = self.now();
        self.anchors
            .lock()
            .insert_dynamic(group_id, path, is_dir, refresh, self.codec.as_ref(), now)
    }

    pub fn find_anchor(&self, prefix: &Name) -> Option<Certificate> {
        let now = self.now();
        self.anchors.lock().find(prefix, self.codec.as_ref(), now)
    }

    /// An anchor or verified certificate under `prefix`.
    pub fn find_trusted(&self, prefix: &Name) -> Option<Certificate> {
        self.find_anchor(prefix).or_else(|| {
            let now = self.now();
            self.verified.lock().find(prefix, now)
        })
    }

    pub fn find_unverified(&self, prefix: &Name) -> Option<Certificate> {
        let now = self.now();
        self.unverified.lock().find(prefix, now)
    }

    pub fn is_certificate_known(&self, prefix: &Name) -> bool {
        self.find_trusted(prefix).is_some() || self.find_unverified(prefix).is_some()
    }

    pub fn cache_verified(&self, certificate: Certificate) {
        debug!("caching verified certificate {}", certificate.name());
        let now = self.now();
        self.unverified.lock().remove(certificate.name());
        self.verified.lock().insert(certificate, now);
    }

    pub fn cache_unverified(&self, certificate: Certificate) {
        debug!("caching unverified certificate {}", certificate.name());
        let now = self.now();
        self.unverified.lock().insert(certificate, now);
    }

    pub fn reset_anchors(&self) {
        self.anchors.lock().clear();
    }

    pub fn reset_verified_certificates(&self) {
        self.verified.lock().clear();
    }
}
