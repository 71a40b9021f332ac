// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

#![warn(rust_2018_idioms, unused_lifetimes, unused_qualifications, clippy::all)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use confargs::{prefix_char_filter, Toml};
use tracing::debug;

use ndn_validator::config::TrustAnchorConfig;
use ndn_validator::policy::CheckerKind;
use ndn_validator::validator::DEFAULT_MAX_DEPTH;
use ndn_validator::{
    init_tracing, Codec, Config, Data, Name, PacketKind, SignatureInfo, SignatureType, TrustSchema,
};

/// Inspect an NDN trust schema.
///
/// Any command-line options listed here may be specified by one or
/// more configuration files, which can be used by passing the
/// name of the file on the command-line with the syntax `@config.toml`.
/// The configuration file must contain valid TOML table mapping argument
/// names to their values.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the trust schema.
    #[arg(short, long, env = "NDN_TRUST_SCHEMA")]
    schema: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Compile every rule and list the schema contents.
    Lint,

    /// Decide whether a key may sign a packet, without verifying anything.
    Check {
        #[arg(long = "for", default_value = "data")]
        kind: PacketKind,

        /// Packet name, e.g. `/root/alice/doc1`.
        #[arg(long)]
        name: Name,

        /// Name in the packet's key locator.
        #[arg(long)]
        key_locator: Name,

        #[arg(long, default_value = "ecdsa-sha256")]
        sig_type: SignatureType,
    },
}

/// Pinned certificates are not decoded by this tool.
struct NoCodec;

impl Codec for NoCodec {
    fn decode_data(&self, _: &[u8]) -> anyhow::Result<Data> {
        bail!("certificate decoding is not available in ndn-trust")
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = confargs::args::<Toml>(prefix_char_filter::<'@'>)
        .context("Failed to parse config")
        .map(Args::parse_from)?;
    debug!("loading trust schema {}", args.schema.display());

    let config = Config::from_file(&args.schema)?;
    let schema = TrustSchema::from_config(&config, Arc::new(NoCodec))
        .with_context(|| format!("invalid trust schema {}", args.schema.display()))?;

    match args.command {
        Command::Lint => lint(&config, &schema),
        Command::Check {
            kind,
            name,
            key_locator,
            sig_type,
        } => {
            let info = SignatureInfo::new(sig_type).with_key_name(key_locator);
            match schema.check(kind, &name, Some(&info)) {
                Ok(auth) => println!("accepted by rule {:?}", auth.rule_id),
                Err(e) => bail!("rejected: {}", e),
            }
        }
    }

    Ok(())
}

fn lint(config: &Config, schema: &TrustSchema) {
    for rule in schema.rules() {
        let checkers: Vec<&str> = rule
            .checkers()
            .iter()
            .map(|c| match c.kind() {
                CheckerKind::FixedSigner(_) => "fixed-signer",
                CheckerKind::Hierarchical(_) => "hierarchical",
                CheckerKind::Relation { .. } => "relation",
                CheckerKind::Regex(_) => "regex",
                CheckerKind::HyperRelation(_) => "hyper-relation",
            })
            .collect();
        println!("rule {:?} for {}: {}", rule.id(), rule.kind(), checkers.join(", "));
    }

    for anchor in &config.trust_anchors {
        match anchor {
            TrustAnchorConfig::File { file_name, refresh } => {
                let path = config.resolve(file_name);
                match refresh {
                    Some(r) => println!("anchor file {} (refresh {:?})", path.display(), r),
                    None => println!("anchor file {}", path.display()),
                }
            }
            TrustAnchorConfig::Dir { dir, refresh } => {
                let path = config.resolve(dir);
                match refresh {
                    Some(r) => println!("anchor dir {} (refresh {:?})", path.display(), r),
                    None => println!("anchor dir {}", path.display()),
                }
            }
            TrustAnchorConfig::Base64 { .. } => println!("anchor inline certificate"),
            TrustAnchorConfig::Any => println!("anchor any: signatures are not checked"),
        }
    }

    let replay = &config.command_interest;
    println!(
        "max depth {}, grace interval {} ms, key timestamp ttl {} ms, max tracked keys {}",
        config.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        replay.grace_interval,
        replay.key_timestamp_ttl,
        replay.max_tracked_keys
    );
}
