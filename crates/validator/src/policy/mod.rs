// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Rule based trust schema.
//!
//! Rules are tried in schema order for the packet kind; the first rule whose
//! filters all accept the packet name is selected and every one of its
//! checkers must accept the signer.

mod rule;
mod signer;

pub use self::rule::{Accepted, Checker, CheckerKind, Filter, HyperRelation, NameRelation, Rule};
pub use self::signer::{Signer, SignerCache};

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::certificate::Certificate;
use crate::codec::{certificate_from_base64, Codec};
use crate::config::{Config, TrustAnchorConfig};
use crate::error::{ErrorCode, ValidationError};
use crate::fetcher::CertificateRequest;
use crate::name::Name;
use crate::packet::{PacketKind, SignatureInfo};
use crate::store::CertificateStore;

/// Group holding anchors given inline in the schema.
const STATIC_GROUP: &str = "static";

/// The signer a schema authorized for a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authorization {
    pub rule_id: String,
    pub key_name: Name,
    pub pinned: Option<Certificate>,
}

/// Compiled rules of a schema, without its trust anchors.
pub struct TrustSchema {
    rules: Vec<Rule>,
    signers: SignerCache,
}

impl TrustSchema {
    pub fn from_config(config: &Config, codec: Arc<dyn Codec>) -> Result<Self> {
        let resolve = |path: &std::path::Path| config.resolve(path);
        let rules = config
            .rules
            .iter()
            .map(|r| Rule::compile(r, &resolve))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            signers: SignerCache::new(codec),
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn find_rule(&self, kind: PacketKind, name: &Name) -> Option<&Rule> {
        self.rules.iter().find(|r| r.matches(kind, name))
    }

    /// Decides whether the key named in `info` may sign `object_name`.
    pub fn check(
        &self,
        kind: PacketKind,
        object_name: &Name,
        info: Option<&SignatureInfo>,
    ) -> Result<Authorization, ValidationError> {
        let (info, key_name) = match info.and_then(|i| i.key_name().map(|k| (i, k))) {
            Some((info, key)) if !key.is_empty() => (info, key),
            _ => {
                return Err(ValidationError::new(
                    ErrorCode::MissingKeyLocator,
                    format!("{} has no key name", object_name),
                ))
            }
        };

        let rule = self.find_rule(kind, object_name).ok_or_else(|| {
            ValidationError::new(
                ErrorCode::NoMatchingRule,
                format!("no {} rule for {}", kind, object_name),
            )
        })?;
        debug!("{} matched rule {:?}", object_name, rule.id());

        let accepted = rule
            .check(object_name, key_name, info.signature_type, &self.signers)
            .map_err(|reason| {
                ValidationError::new(
                    ErrorCode::PolicyError,
                    format!("rule {:?}: {}", rule.id(), reason),
                )
            })?;

        Ok(Authorization {
            rule_id: rule.id().to_string(),
            key_name: key_name.clone(),
            pinned: accepted.pinned,
        })
    }
}

/// What the validator should do next with a packet or certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Accept without verifying anything.
    Bypass,
    /// The signer is a trust anchor; the chain ends here.
    Anchor(CertificateRequest, Certificate),
    /// The signer's certificate has to be found.
    Fetch(CertificateRequest),
}

pub struct PolicyEngine {
    schema: TrustSchema,
    store: Arc<CertificateStore>,
    accept_all: bool,
}

impl PolicyEngine {
    pub fn new(schema: TrustSchema, store: Arc<CertificateStore>) -> Self {
        Self {
            schema,
            store,
            accept_all: false,
        }
    }

    /// Compiles the rules of `config` and loads its trust anchors into `store`.
    pub fn from_config(config: &Config, store: Arc<CertificateStore>) -> Result<Self> {
        let schema = TrustSchema::from_config(config, store.codec().clone())?;
        let mut accept_all = false;

        for anchor in &config.trust_anchors {
            match anchor {
                TrustAnchorConfig::File { file_name, refresh } => {
                    let path = config.resolve(file_name);
                    store.add_dynamic_anchors(&path.display().to_string(), &path, false, *refresh)?;
                }
                TrustAnchorConfig::Dir { dir, refresh } => {
                    let path = config.resolve(dir);
                    store.add_dynamic_anchors(&path.display().to_string(), &path, true, *refresh)?;
                }
                TrustAnchorConfig::Base64 { base64_string } => {
                    let cert = certificate_from_base64(store.codec().as_ref(), base64_string)
                        .context("invalid base64 trust anchor")?;
                    store.add_anchor(STATIC_GROUP, cert)?;
                }
                TrustAnchorConfig::Any => {
                    info!("trust anchor type \"any\": signatures will not be checked");
                    accept_all = true;
                }
            }
        }

        Ok(Self {
            schema,
            store,
            accept_all,
        })
    }

    pub fn schema(&self) -> &TrustSchema {
        &self.schema
    }

    pub fn store(&self) -> &Arc<CertificateStore> {
        &self.store
    }

    pub fn accepts_all(&self) -> bool {
        self.accept_all
    }

    pub fn evaluate(
        &self,
        object_name: &Name,
        kind: PacketKind,
        info: Option<&SignatureInfo>,
    ) -> Result<Decision, ValidationError> {
        if self.accept_all {
            return Ok(Decision::Bypass);
        }

        let auth = self.schema.check(kind, object_name, info)?;
        let request = CertificateRequest::new(auth.key_name.clone());

        if let Some(pinned) = auth.pinned {
            debug!("{} is signed by pinned {}", object_name, pinned.name());
            return Ok(Decision::Anchor(request, pinned));
        }

        match self.store.find_anchor(&auth.key_name) {
            Some(anchor) => {
                debug!("{} is signed by trust anchor {}", object_name, anchor.name());
                Ok(Decision::Anchor(request, anchor))
            }
            None => Ok(Decision::Fetch(request)),
        }
    }
}
