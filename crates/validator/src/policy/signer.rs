// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::debug;

use crate::certificate::Certificate;
use crate::codec::{certificate_from_base64, read_certificate_file, Codec};
use crate::config::SignerConfig;

use super::rule::Resolve;

/// Where a pinned certificate comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signer {
    File(PathBuf),
    Base64(String),
}

impl Signer {
    pub(crate) fn from_config(config: &SignerConfig, resolve: Resolve<'_>) -> Self {
        match config {
            SignerConfig::File { file_name } => Self::File(resolve(file_name)),
            SignerConfig::Base64 { base64_string } => Self::Base64(base64_string.clone()),
        }
    }

    fn id(&self) -> String {
        match self {
            Self::File(path) => format!("file:{}", path.display()),
            Self::Base64(text) => format!("base64:{}", text),
        }
    }
}

/// Parsed pinned certificates keyed by their source.
pub struct SignerCache {
    codec: Arc<dyn Codec>,
    certs: Mutex<HashMap<String, Certificate>>,
}

impl SignerCache {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            codec,
            certs: Mutex::new(HashMap::new()),
        }
    }

    pub fn load(&self, signer: &Signer) -> Result<Certificate> {
        let id = signer.id();
        if let Some(cert) = self.certs.lock().get(&id) {
            return Ok(cert.clone());
        }

        let cert = match signer {
            Signer::File(path) => read_certificate_file(self.codec.as_ref(), path)?,
            Signer::Base64(text) => certificate_from_base64(self.codec.as_ref(), text)?,
        };
        debug!("loaded pinned certificate {}", cert.name());
        self.certs.lock().insert(id, cert.clone());
        Ok(cert)
    }

    pub fn len(&self) -> usize {
        self.certs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.lock().is_empty()
    }
}
