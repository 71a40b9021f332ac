// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Freshness of signed Interests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::config::ReplayConfig;
use crate::error::{ErrorCode, ValidationError};
use crate::name::Name;

#[derive(Clone, Copy, Debug)]
struct Entry {
    timestamp: u64,
    recorded_at: u64,
}

/// Last accepted timestamp per signing key.
#[derive(Debug)]
pub struct ReplayGuard {
    config: ReplayConfig,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<Name, Entry>>,
}

impl ReplayGuard {
    pub fn new(config: ReplayConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// A key seen before needs a strictly newer timestamp; a new key needs one
    /// within the grace interval of the current time.
    pub fn is_fresh(&self, key: &Name, timestamp: u64) -> bool {
        match self.entries.lock().get(key) {
            Some(last) => timestamp > last.timestamp,
            None => {
                let now = self.clock.now_millis();
                let grace = self.config.grace_interval;
                now.saturating_sub(grace) <= timestamp && timestamp <= now.saturating_add(grace)
            }
        }
    }

    /// Returns the timestamp to record once the Interest validates.
    pub fn check(&self, key: &Name, timestamp: Option<u64>) -> Result<u64, ValidationError> {
        let timestamp = timestamp.ok_or_else(|| {
            ValidationError::new(ErrorCode::StaleTimestamp, "signed interest has no timestamp")
        })?;

        if self.is_fresh(key, timestamp) {
            Ok(timestamp)
        } else {
            Err(ValidationError::new(
                ErrorCode::StaleTimestamp,
                format!("timestamp {} from {} is not fresh", timestamp, key),
            ))
        }
    }

    pub fn record(&self, key: Name, timestamp: u64) {
        let now = self.clock.now_millis();
        let max = self.config.max_tracked_keys.max(1);
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) && entries.len() >= max {
            let ttl = self.config.key_timestamp_ttl;
            entries.retain(|_, e| now.saturating_sub(e.recorded_at) < ttl);

            if entries.len() >= max {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.timestamp)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    debug!("evicting timestamp of {}", oldest);
                    entries.remove(&oldest);
                }
            }
            debug_assert!(entries.len() < max);
        }

        entries.insert(
            key,
            Entry {
                timestamp,
                recorded_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
