// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Chain building and verification for one packet at a time.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::certificate::Certificate;
use crate::config::Config;
use crate::crypto::{CryptoVerifier, KeyVerifier};
use crate::error::{ErrorCode, ValidationError};
use crate::fetcher::{CertificateFetcher, FetchStrategy};
use crate::packet::{Data, Interest, PacketKind};
use crate::policy::{Decision, PolicyEngine};
use crate::replay::ReplayGuard;
use crate::state::{Outcome, ValidationState};
use crate::store::CertificateStore;

pub const DEFAULT_MAX_DEPTH: usize = 25;

pub struct Validator {
    policy: PolicyEngine,
    fetcher: CertificateFetcher,
    replay: Arc<ReplayGuard>,
    verifier: Arc<dyn CryptoVerifier>,
    max_depth: usize,
}

impl Validator {
    pub fn new(policy: PolicyEngine, fetcher: CertificateFetcher, replay: ReplayGuard) -> Self {
        Self {
            policy,
            fetcher,
            replay: Arc::new(replay),
            verifier: Arc::new(KeyVerifier),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Builds a validator whose policy, anchors and limits come from `config`.
    ///
    /// The store's clock is shared with the replay guard.
    pub fn from_config(
        config: &Config,
        store: Arc<CertificateStore>,
        strategy: FetchStrategy,
    ) -> Result<Self> {
        let policy = PolicyEngine::from_config(config, store.clone())?;
        let replay = ReplayGuard::new(config.command_interest, store.clock().clone());
        let fetcher = CertificateFetcher::new(store, strategy);

        let mut validator = Self::new(policy, fetcher, replay);
        if let Some(depth) = config.max_depth {
            validator.set_max_depth(depth);
        }
        Ok(validator)
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn CryptoVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn set_max_depth(&mut self, depth: usize) {
        self.max_depth = depth;
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn store(&self) -> &Arc<CertificateStore> {
        self.fetcher.store()
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.replay
    }

    /// Validates `data`, calling exactly one of the callbacks.
    ///
    /// The finished state is returned so the chain can be inspected.
    pub async fn validate_data<S, F>(
        &self,
        data: Data,
        on_success: S,
        on_failure: F,
    ) -> ValidationState
    where
        S: FnOnce(&Data) + Send + 'static,
        F: FnOnce(&ValidationError) + Send + 'static,
    {
        let mut state = ValidationState::for_data(data, Box::new(on_success), Box::new(on_failure));
        self.start(&mut state).await;
        state
    }

    /// Validates a signed Interest, including the freshness of its timestamp.
    pub async fn validate_interest<S, F>(
        &self,
        interest: Interest,
        on_success: S,
        on_failure: F,
    ) -> ValidationState
    where
        S: FnOnce(&Interest) + Send + 'static,
        F: FnOnce(&ValidationError) + Send + 'static,
    {
        let signer = interest
            .signature_info
            .as_ref()
            .and_then(|info| info.key_name().map(|key| (key.clone(), info.timestamp)));

        let mut state =
            ValidationState::for_interest(interest, Box::new(on_success), Box::new(on_failure));

        // Without a key name the policy reports the missing locator.
        if let Some((key, timestamp)) = signer {
            match self.replay.check(&key, timestamp) {
                Ok(timestamp) => {
                    let replay = self.replay.clone();
                    state.add_success_callback(Box::new(move |_: &Interest| {
                        replay.record(key, timestamp)
                    }));
                }
                Err(e) => {
                    state.fail(e);
                    return state;
                }
            }
        }

        self.start(&mut state).await;
        state
    }

    pub async fn check_data(&self, data: Data) -> Result<Data, ValidationError> {
        let state = self
            .validate_data(data, |_: &Data| {}, |_: &ValidationError| {})
            .await;
        finish(&state, |s| s.data().cloned())
    }

    pub async fn check_interest(&self, interest: Interest) -> Result<Interest, ValidationError> {
        let state = self
            .validate_interest(interest, |_: &Interest| {}, |_: &ValidationError| {})
            .await;
        finish(&state, |s| s.interest().cloned())
    }

    async fn start(&self, state: &mut ValidationState) {
        debug!("validating {} {}", state.kind(), state.name());
        match self
            .policy
            .evaluate(state.name(), state.kind(), state.signature_info())
        {
            Ok(decision) => self.follow(decision, state).await,
            Err(e) => state.fail(e),
        }
    }

    async fn follow(&self, mut decision: Decision, state: &mut ValidationState) {
        loop {
            let (request, anchor) = match decision {
                Decision::Bypass => return state.bypass(),
                Decision::Anchor(request, anchor) => (request, Some(anchor)),
                Decision::Fetch(request) => (request, None),
            };

            if state.depth() >= self.max_depth {
                let info = format!("{} certificates before {}", state.depth(), request.name());
                return state.fail(ValidationError::new(ErrorCode::ExceededDepthLimit, info));
            }

            if state.has_seen_certificate_name(request.name()) {
                let info = format!("{} requested twice", request.name());
                return state.fail(ValidationError::new(ErrorCode::LoopDetected, info));
            }

            let trusted = anchor.or_else(|| self.store().find_trusted(request.name()));
            if let Some(trusted) = trusted {
                return self.verify(&trusted, state);
            }

            debug!("retrieving {} for {}", request.name(), state.name());
            let cert = match self.fetcher.fetch(request).await {
                Ok(cert) => cert,
                Err(e) => return state.fail(e),
            };

            let now = self.store().now();
            if !cert.is_valid_at(now) {
                let info = format!("{} is valid {}", cert.name(), cert.validity());
                return state.fail(ValidationError::new(ErrorCode::ExpiredCertificate, info));
            }

            decision = match self.policy.evaluate(
                cert.name(),
                PacketKind::Data,
                Some(cert.signature_info()),
            ) {
                Ok(decision) => decision,
                Err(e) => return state.fail(e),
            };
            state.add_certificate(cert);
        }
    }

    fn verify(&self, trusted: &Certificate, state: &mut ValidationState) {
        let verifier = self.verifier.as_ref();
        let Some(signer) = state.verify_certificate_chain(trusted, verifier) else {
            return;
        };

        if state.verify_original_packet(&signer, verifier) {
            for cert in state.certificate_chain() {
                self.store().cache_verified(cert.clone());
            }
            info!(
                "{} trusted through {} certificate(s) under {}",
                state.name(),
                state.depth(),
                trusted.name()
            );
        }
    }
}

fn finish<T>(
    state: &ValidationState,
    packet: impl FnOnce(&ValidationState) -> Option<T>,
) -> Result<T, ValidationError> {
    let unfinished = || ValidationError::new(ErrorCode::PolicyError, "validation did not finish");
    match state.outcome() {
        Outcome::Success => packet(state).ok_or_else(unfinished),
        Outcome::Failure(e) => Err(e.clone()),
        Outcome::Pending => Err(unfinished()),
    }
}
