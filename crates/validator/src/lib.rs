// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Trust schema driven signature validation for Named Data Networking packets.
//!
//! A [`Validator`] takes a received [`Data`] or signed [`Interest`], asks the
//! [`PolicyEngine`] which key may sign it, fetches the certificate chain up to
//! a configured trust anchor and verifies every signature on the way back down.

#![warn(rust_2018_idioms, unused_lifetimes, unused_qualifications, clippy::all)]

pub mod certificate;
pub mod clock;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fetcher;
pub mod name;
pub mod packet;
pub mod pattern;
pub mod policy;
pub mod replay;
pub mod state;
pub mod store;
pub mod validator;

pub use certificate::Certificate;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::Codec;
pub use config::Config;
pub use crypto::{CryptoVerifier, KeyVerifier};
pub use error::{ErrorCode, ValidationError};
pub use fetcher::{CertificateFetcher, CertificateRequest, FetchStrategy, Transport, TransportError};
pub use name::{Component, Name};
pub use packet::{Data, Interest, KeyLocator, PacketKind, SignatureInfo, SignatureType};
pub use pattern::NamePattern;
pub use policy::{Decision, PolicyEngine, TrustSchema};
pub use replay::ReplayGuard;
pub use state::{Outcome, ValidationState};
pub use store::CertificateStore;
pub use validator::Validator;

pub fn init_tracing() {
    if std::env::var("RUST_LOG_JSON").is_ok() {
        tracing_subscriber::fmt::fmt()
            .json()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
