// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! TOML trust schema.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::name::Name;
use crate::packet::{PacketKind, SignatureType};
use crate::policy::NameRelation;

/// Period used when a refresh value is zero or cannot be parsed.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(3600);

#[derive(Clone, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,

    #[serde(default, rename = "trust-anchor")]
    pub trust_anchors: Vec<TrustAnchorConfig>,

    /// Longest certificate chain a validation may build.
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Freshness settings for signed Interests.
    #[serde(default)]
    pub command_interest: ReplayConfig,

    /// Directory relative file names are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trust schema {}", path.display()))?;
        let mut config: Config = toml::from_str(&text).context("failed to parse trust schema")?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub id: String,

    #[serde(rename = "for")]
    pub kind: PacketKind,

    /// All filters must accept the packet name for the rule to apply.
    #[serde(default, rename = "filter")]
    pub filters: Vec<FilterConfig>,

    /// All checkers must accept the signer.
    #[serde(default, rename = "checker")]
    pub checkers: Vec<CheckerConfig>,
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum FilterConfig {
    Name {
        #[serde(default)]
        name: Option<Name>,
        #[serde(default)]
        relation: Option<NameRelation>,
        #[serde(default)]
        regex: Option<String>,
    },
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum CheckerConfig {
    Customized {
        #[serde(default, rename = "sig-type")]
        sig_type: Option<SignatureType>,
        #[serde(rename = "key-locator")]
        key_locator: KeyLocatorConfig,
    },
    Hierarchical {
        #[serde(default, rename = "sig-type")]
        sig_type: Option<SignatureType>,
    },
    FixedSigner {
        #[serde(default, rename = "sig-type")]
        sig_type: Option<SignatureType>,
        #[serde(default)]
        signer: Vec<SignerConfig>,
    },
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum KeyLocatorConfig {
    Name {
        #[serde(default)]
        name: Option<Name>,
        #[serde(default)]
        relation: Option<NameRelation>,
        #[serde(default)]
        regex: Option<String>,
        #[serde(default, rename = "hyper-relation")]
        hyper_relation: Option<HyperRelationConfig>,
    },
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct HyperRelationConfig {
    pub k_regex: String,
    pub k_expand: String,
    pub h_relation: NameRelation,
    pub p_regex: String,
    pub p_expand: String,
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum SignerConfig {
    File {
        #[serde(rename = "file-name")]
        file_name: PathBuf,
    },
    Base64 {
        #[serde(rename = "base64-string")]
        base64_string: String,
    },
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum TrustAnchorConfig {
    File {
        #[serde(rename = "file-name")]
        file_name: PathBuf,
        #[serde(default, deserialize_with = "from_refresh_string")]
        refresh: Option<Duration>,
    },
    Base64 {
        #[serde(rename = "base64-string")]
        base64_string: String,
    },
    Dir {
        dir: PathBuf,
        #[serde(default, deserialize_with = "from_refresh_string")]
        refresh: Option<Duration>,
    },
    /// Accept every packet without checking signatures.
    Any,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ReplayConfig {
    /// Allowed distance, in milliseconds, between the clock and the first
    /// timestamp seen from a key.
    pub grace_interval: u64,

    /// Milliseconds after which a key's last timestamp is forgotten.
    pub key_timestamp_ttl: u64,

    pub max_tracked_keys: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            grace_interval: 3_000,
            key_timestamp_ttl: 3_600_000,
            max_tracked_keys: 1_000,
        }
    }
}

/// Parses `<n>h`, `<n>m` or `<n>s`; anything else, zero or an overflowing
/// period is one hour.
pub fn parse_refresh(s: &str) -> Duration {
    let re = match Regex::new(r"^(\d+)([hms])$") {
        Ok(re) => re,
        Err(_) => return DEFAULT_REFRESH,
    };
    let Some(caps) = re.captures(s.trim()) else {
        return DEFAULT_REFRESH;
    };
    let n: u64 = match caps[1].parse() {
        Ok(n) if n > 0 => n,
        _ => return DEFAULT_REFRESH,
    };
    let unit = match &caps[2] {
        "h" => 3600,
        "m" => 60,
        _ => 1,
    };
    n.checked_mul(unit)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_REFRESH)
}

fn from_refresh_string<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(Some(parse_refresh(&s)))
}
