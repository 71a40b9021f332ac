// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Per-packet validation context.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info};

use crate::certificate::Certificate;
use crate::crypto::CryptoVerifier;
use crate::error::{ErrorCode, ValidationError};
use crate::name::Name;
use crate::packet::{Data, Interest, PacketKind, SignatureInfo, SignedPacket};

pub type DataCallback = Box<dyn FnOnce(&Data) + Send>;
pub type InterestCallback = Box<dyn FnOnce(&Interest) + Send>;
pub type FailureCallback = Box<dyn FnOnce(&ValidationError) + Send>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Success,
    Failure(ValidationError),
}

enum Original {
    Data {
        data: Data,
        on_success: Option<DataCallback>,
    },
    Interest {
        interest: Interest,
        on_success: Vec<InterestCallback>,
    },
}

/// State of one validation flow.
///
/// The certificate chain grows at the front: index 0 is the certificate
/// closest to the trust anchor and the last entry signs the original packet.
pub struct ValidationState {
    original: Original,
    on_failure: Option<FailureCallback>,
    chain: Vec<Certificate>,
    seen: HashSet<Name>,
    outcome: Outcome,
}

impl fmt::Debug for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationState")
            .field("kind", &self.kind())
            .field("name", self.name())
            .field("depth", &self.depth())
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl ValidationState {
    pub fn for_data(data: Data, on_success: DataCallback, on_failure: FailureCallback) -> Self {
        Self::new(
            Original::Data {
                data,
                on_success: Some(on_success),
            },
            on_failure,
        )
    }

    pub fn for_interest(
        interest: Interest,
        on_success: InterestCallback,
        on_failure: FailureCallback,
    ) -> Self {
        Self::new(
            Original::Interest {
                interest,
                on_success: vec![on_success],
            },
            on_failure,
        )
    }

    fn new(original: Original, on_failure: FailureCallback) -> Self {
        Self {
            original,
            on_failure: Some(on_failure),
            chain: Vec::new(),
            seen: HashSet::new(),
            outcome: Outcome::Pending,
        }
    }

    /// Registers another consumer of a validated Interest.
    ///
    /// Has no effect on a Data state.
    pub fn add_success_callback(&mut self, callback: InterestCallback) {
        if let Original::Interest { on_success, .. } = &mut self.original {
            on_success.push(callback);
        }
    }

    pub fn kind(&self) -> PacketKind {
        match &self.original {
            Original::Data { .. } => PacketKind::Data,
            Original::Interest { .. } => PacketKind::Interest,
        }
    }

    pub fn name(&self) -> &Name {
        match &self.original {
            Original::Data { data, .. } => data.name(),
            Original::Interest { interest, .. } => interest.name(),
        }
    }

    pub fn signature_info(&self) -> Option<&SignatureInfo> {
        match &self.original {
            Original::Data { data, .. } => data.signature_info(),
            Original::Interest { interest, .. } => interest.signature_info(),
        }
    }

    pub fn data(&self) -> Option<&Data> {
        match &self.original {
            Original::Data { data, .. } => Some(data),
            Original::Interest { .. } => None,
        }
    }

    pub fn interest(&self) -> Option<&Interest> {
        match &self.original {
            Original::Interest { interest, .. } => Some(interest),
            Original::Data { .. } => None,
        }
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match &self.outcome {
            Outcome::Failure(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == Outcome::Pending
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    pub fn certificate_chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Returns whether `name` was requested before, recording it otherwise.
    pub fn has_seen_certificate_name(&mut self, name: &Name) -> bool {
        !self.seen.insert(name.clone())
    }

    pub fn add_certificate(&mut self, certificate: Certificate) {
        self.chain.insert(0, certificate);
    }

    fn set_outcome(&mut self, outcome: Outcome) {
        assert!(
            self.outcome == Outcome::Pending,
            "validation outcome for {} already set",
            self.name()
        );
        self.outcome = outcome;
    }

    pub fn fail(&mut self, error: ValidationError) {
        info!("validation of {} failed: {}", self.name(), error);
        self.set_outcome(Outcome::Failure(error.clone()));
        if let Some(on_failure) = self.on_failure.take() {
            on_failure(&error);
        }
    }

    fn succeed(&mut self) {
        self.set_outcome(Outcome::Success);
        self.on_failure = None;
        match &mut self.original {
            Original::Data { data, on_success } => {
                if let Some(cb) = on_success.take() {
                    cb(&*data);
                }
            }
            Original::Interest {
                interest,
                on_success,
            } => {
                for cb in on_success.drain(..) {
                    cb(&*interest);
                }
            }
        }
    }

    /// Accepts the packet without any signature check.
    pub fn bypass(&mut self) {
        debug!("signature check of {} bypassed", self.name());
        self.succeed();
    }

    /// Verifies the original packet with `certificate`, finishing the flow
    /// either way. Returns whether the packet was accepted.
    pub fn verify_original_packet(
        &mut self,
        certificate: &Certificate,
        verifier: &dyn CryptoVerifier,
    ) -> bool {
        let ok = match &self.original {
            Original::Data { data, .. } => verify_packet(data, certificate, verifier),
            Original::Interest { interest, .. } => verify_packet(interest, certificate, verifier),
        };

        if ok {
            info!("validated {} with {}", self.name(), certificate.name());
            self.succeed();
        } else {
            let info = format!("signature of {} with {}", self.name(), certificate.name());
            self.fail(ValidationError::new(ErrorCode::InvalidSignature, info));
        }
        ok
    }

    /// Verifies the chain from `trusted` down, returning the certificate that
    /// should have signed the original packet.
    ///
    /// On the first bad signature the chain is cut before that certificate
    /// and the flow fails.
    pub fn verify_certificate_chain(
        &mut self,
        trusted: &Certificate,
        verifier: &dyn CryptoVerifier,
    ) -> Option<Certificate> {
        let mut signer = trusted;
        let mut bad = None;

        for (i, cert) in self.chain.iter().enumerate() {
            if !verify_packet(cert.data(), signer, verifier) {
                bad = Some((i, format!("certificate {} with {}", cert.name(), signer.name())));
                break;
            }
            debug!("certificate {} is signed by {}", cert.name(), signer.name());
            signer = cert;
        }

        match bad {
            None => Some(signer.clone()),
            Some((i, info)) => {
                self.chain.truncate(i);
                self.fail(ValidationError::new(ErrorCode::InvalidSignature, info));
                None
            }
        }
    }
}

fn verify_packet<P: SignedPacket>(
    packet: &P,
    certificate: &Certificate,
    verifier: &dyn CryptoVerifier,
) -> bool {
    let Some(info) = packet.signature_info() else {
        return false;
    };
    verifier.verify(
        info.signature_type,
        packet.signed_portion(),
        packet.signature_value(),
        certificate.public_key(),
    )
}
