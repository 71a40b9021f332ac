// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use crate::certificate::Certificate;
use crate::name::Name;

/// Lifetime of a certificate in the verified cache.
pub const VERIFIED_LIFETIME: Duration = Duration::from_secs(3600);

/// Lifetime of a fetched certificate that has not been verified yet.
pub const UNVERIFIED_LIFETIME: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
struct Entry {
    certificate: Certificate,
    expires: u64,
}

/// Certificates ordered by name, each expiring at the earlier of its
/// `notAfter` and its insertion time plus the cache lifetime.
#[derive(Clone, Debug)]
pub struct CertificateCache {
    entries: BTreeMap<Name, Entry>,
    lifetime: Duration,
}

impl CertificateCache {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            lifetime,
        }
    }

    pub fn insert(&mut self, certificate: Certificate, now: u64) {
        let limit = now.saturating_add(self.lifetime.as_millis() as u64);
        let expires = certificate.validity().not_after.min(limit);
        if expires <= now {
            debug!("not caching expired certificate {}", certificate.name());
            return;
        }

        self.entries.insert(
            certificate.name().clone(),
            Entry {
                certificate,
                expires,
            },
        );
    }

    /// First unexpired certificate whose name starts with `prefix`.
    pub fn find(&mut self, prefix: &Name, now: u64) -> Option<Certificate> {
        self.purge(now);
        self.entries
            .range(prefix.clone()..)
            .next()
            .filter(|(name, _)| prefix.is_prefix_of(name))
            .map(|(_, entry)| entry.certificate.clone())
    }

    pub fn remove(&mut self, name: &Name) -> Option<Certificate> {
        self.entries.remove(name).map(|e| e.certificate)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge(&mut self, now: u64) {
        self.entries.retain(|_, entry| entry.expires > now);
    }
}
