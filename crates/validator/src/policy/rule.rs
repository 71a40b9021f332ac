// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::certificate::{extract_identity, Certificate};
use crate::config::{CheckerConfig, FilterConfig, HyperRelationConfig, KeyLocatorConfig, RuleConfig};
use crate::name::Name;
use crate::packet::{PacketKind, SignatureType};
use crate::pattern::NamePattern;

use super::signer::{Signer, SignerCache};

/// Maps file names in the schema to paths on disk.
pub(crate) type Resolve<'a> = &'a dyn Fn(&Path) -> PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameRelation {
    Equal,
    IsPrefixOf,
    IsStrictPrefixOf,
}

impl NameRelation {
    /// Whether `a <relation> b` holds.
    pub fn holds(self, a: &Name, b: &Name) -> bool {
        match self {
            Self::Equal => a == b,
            Self::IsPrefixOf => a.is_prefix_of(b),
            Self::IsStrictPrefixOf => a.size() < b.size() && a.is_prefix_of(b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::IsPrefixOf => "is-prefix-of",
            Self::IsStrictPrefixOf => "is-strict-prefix-of",
        }
    }
}

impl FromStr for NameRelation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "equal" => Self::Equal,
            "is-prefix-of" => Self::IsPrefixOf,
            "is-strict-prefix-of" => Self::IsStrictPrefixOf,
            _ => bail!("unknown name relation {:?}", s),
        })
    }
}

impl fmt::Display for NameRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub enum Filter {
    /// `name <relation> packet name`
    Relation { name: Name, relation: NameRelation },
    Regex(NamePattern),
}

impl Filter {
    fn compile(config: &FilterConfig) -> Result<Self> {
        let FilterConfig::Name {
            name,
            relation,
            regex,
        } = config;

        match (name, relation, regex) {
            (Some(name), Some(relation), None) => Ok(Self::Relation {
                name: name.clone(),
                relation: *relation,
            }),
            (Some(_), None, None) => bail!("name filter is missing its relation"),
            (None, None, Some(regex)) => Ok(Self::Regex(NamePattern::new(regex)?)),
            _ => bail!("name filter needs either name and relation, or regex"),
        }
    }

    pub fn matches(&self, packet_name: &Name) -> bool {
        match self {
            Self::Relation { name, relation } => relation.holds(name, packet_name),
            Self::Regex(pattern) => pattern.is_match(packet_name),
        }
    }
}

/// Extracts sub-names from the key name and the packet name and relates them.
#[derive(Clone, Debug)]
pub struct HyperRelation {
    key: NamePattern,
    key_expand: String,
    relation: NameRelation,
    packet: NamePattern,
    packet_expand: String,
}

impl HyperRelation {
    fn compile(config: &HyperRelationConfig) -> Result<Self> {
        Ok(Self {
            key: NamePattern::new(&config.k_regex)?,
            key_expand: config.k_expand.clone(),
            relation: config.h_relation,
            packet: NamePattern::new(&config.p_regex)?,
            packet_expand: config.p_expand.clone(),
        })
    }

    /// Identity prefix of the signer must be a prefix of the packet name.
    pub fn hierarchical() -> Result<Self> {
        Ok(Self {
            key: NamePattern::new("^(<>*)<KEY><>{1,3}$")?,
            key_expand: "\\1".into(),
            relation: NameRelation::IsPrefixOf,
            packet: NamePattern::new("^(<>*)$")?,
            packet_expand: "\\1".into(),
        })
    }

    fn check(&self, packet_name: &Name, key_name: &Name) -> Result<(), String> {
        let expand = |pattern: &NamePattern, template: &str, name: &Name| -> Result<Name, String> {
            pattern
                .captures(name)
                .ok_or_else(|| format!("{} does not match {}", name, pattern))?
                .expand(template)
                .map_err(|e| format!("cannot expand {:?} for {}: {}", template, name, e))
        };

        let key = expand(&self.key, &self.key_expand, key_name)?;
        let packet = expand(&self.packet, &self.packet_expand, packet_name)?;
        if self.relation.holds(&key, &packet) {
            Ok(())
        } else {
            Err(format!("{} is not {} {}", key, self.relation, packet))
        }
    }
}

#[derive(Clone, Debug)]
pub enum CheckerKind {
    FixedSigner(Vec<Signer>),
    Hierarchical(HyperRelation),
    /// `name <relation> identity of the key locator`
    Relation { name: Name, relation: NameRelation },
    Regex(NamePattern),
    HyperRelation(HyperRelation),
}

#[derive(Clone, Debug)]
pub struct Checker {
    sig_type: Option<SignatureType>,
    kind: CheckerKind,
}

/// What an accepting checker learned about the signer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Accepted {
    /// Set by fixed-signer checkers: the pinned certificate that terminates the chain.
    pub pinned: Option<Certificate>,
}

impl Checker {
    fn compile(config: &CheckerConfig, resolve: Resolve<'_>) -> Result<Self> {
        let (sig_type, kind) = match config {
            CheckerConfig::Hierarchical { sig_type } => {
                (*sig_type, CheckerKind::Hierarchical(HyperRelation::hierarchical()?))
            }

            CheckerConfig::FixedSigner { sig_type, signer } => {
                if signer.is_empty() {
                    bail!("fixed-signer checker lists no signer");
                }
                let signers = signer.iter().map(|s| Signer::from_config(s, resolve)).collect();
                (*sig_type, CheckerKind::FixedSigner(signers))
            }

            CheckerConfig::Customized {
                sig_type,
                key_locator:
                    KeyLocatorConfig::Name {
                        name,
                        relation,
                        regex,
                        hyper_relation,
                    },
            } => {
                let kind = match (name, relation, regex, hyper_relation) {
                    (Some(name), Some(relation), None, None) => CheckerKind::Relation {
                        name: name.clone(),
                        relation: *relation,
                    },
                    (Some(_), None, None, None) => bail!("key locator is missing its relation"),
                    (None, None, Some(regex), None) => CheckerKind::Regex(NamePattern::new(regex)?),
                    (None, None, None, Some(hyper)) => {
                        CheckerKind::HyperRelation(HyperRelation::compile(hyper)?)
                    }
                    _ => bail!("key locator needs exactly one of name, regex or hyper-relation"),
                };
                (*sig_type, kind)
            }
        };

        Ok(Self { sig_type, kind })
    }

    pub fn kind(&self) -> &CheckerKind {
        &self.kind
    }

    /// Decides whether `key_name` may sign `packet_name`.
    pub fn check(
        &self,
        packet_name: &Name,
        key_name: &Name,
        sig_type: SignatureType,
        signers: &SignerCache,
    ) -> Result<Accepted, String> {
        if let Some(expected) = self.sig_type {
            if expected != sig_type {
                return Err(format!("signature type {} is not {}", sig_type, expected));
            }
        }

        match &self.kind {
            CheckerKind::FixedSigner(pinned) => {
                let mut problems = Vec::new();
                for signer in pinned {
                    match signers.load(signer) {
                        Ok(cert) if cert.name() == key_name => {
                            return Ok(Accepted { pinned: Some(cert) })
                        }
                        Ok(_) => {}
                        Err(e) => problems.push(format!("{:#}", e)),
                    }
                }
                let mut reason = format!("{} is not a pinned signer", key_name);
                if !problems.is_empty() {
                    reason = format!("{} ({})", reason, problems.join("; "));
                }
                Err(reason)
            }

            CheckerKind::Hierarchical(hyper) | CheckerKind::HyperRelation(hyper) => {
                hyper.check(packet_name, key_name).map(|()| Accepted::default())
            }

            CheckerKind::Relation { name, relation } => {
                let identity = extract_identity(key_name)
                    .ok_or_else(|| format!("{} is not a key or certificate name", key_name))?;
                if relation.holds(name, &identity) {
                    Ok(Accepted::default())
                } else {
                    Err(format!(
                        "{} is not {} {} (key locator {})",
                        name, relation, identity, key_name
                    ))
                }
            }

            CheckerKind::Regex(pattern) => {
                if pattern.is_match(key_name) {
                    Ok(Accepted::default())
                } else {
                    Err(format!("{} does not match {}", key_name, pattern))
                }
            }
        }
    }
}

/// One `[[rule]]` of the schema.
#[derive(Clone, Debug)]
pub struct Rule {
    id: String,
    kind: PacketKind,
    filters: Vec<Filter>,
    checkers: Vec<Checker>,
}

impl Rule {
    pub(crate) fn compile(config: &RuleConfig, resolve: Resolve<'_>) -> Result<Self> {
        let context = || format!("invalid rule {:?}", config.id);

        if config.checkers.is_empty() {
            return Err(anyhow!("rule has no checker")).with_context(context);
        }

        let filters = config
            .filters
            .iter()
            .map(Filter::compile)
            .collect::<Result<Vec<_>>>()
            .with_context(context)?;
        let checkers = config
            .checkers
            .iter()
            .map(|c| Checker::compile(c, resolve))
            .collect::<Result<Vec<_>>>()
            .with_context(context)?;

        Ok(Self {
            id: config.id.clone(),
            kind: config.kind,
            filters,
            checkers,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn checkers(&self) -> &[Checker] {
        &self.checkers
    }

    pub fn matches(&self, kind: PacketKind, name: &Name) -> bool {
        self.kind == kind && self.filters.iter().all(|f| f.matches(name))
    }

    /// Runs every checker; the first rejection wins. The pinned certificate of
    /// a fixed-signer checker, if any, is carried through.
    pub fn check(
        &self,
        packet_name: &Name,
        key_name: &Name,
        sig_type: SignatureType,
        signers: &SignerCache,
    ) -> Result<Accepted, String> {
        let mut accepted = Accepted::default();
        for checker in &self.checkers {
            let result = checker.check(packet_name, key_name, sig_type, signers)?;
            if result.pinned.is_some() {
                accepted = result;
            }
        }
        Ok(accepted)
    }
}
