// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Reason a validation flow failed.
///
/// Every failure callback receives exactly one of these, wrapped in a
/// [`ValidationError`] carrying a human readable detail.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[error("no matching rule")]
    NoMatchingRule,

    #[error("missing key locator")]
    MissingKeyLocator,

    #[error("policy error")]
    PolicyError,

    #[error("cannot retrieve certificate")]
    CannotRetrieveCertificate,

    #[error("malformed certificate")]
    MalformedCertificate,

    #[error("expired certificate")]
    ExpiredCertificate,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("loop detected in certification chain")]
    LoopDetected,

    #[error("exceeded validation depth limit")]
    ExceededDepthLimit,

    #[error("stale timestamp")]
    StaleTimestamp,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{code} ({info})")]
pub struct ValidationError {
    pub code: ErrorCode,
    pub info: String,
}

impl ValidationError {
    pub fn new(code: ErrorCode, info: impl Into<String>) -> Self {
        Self {
            code,
            info: info.into(),
        }
    }
}

impl From<ErrorCode> for ValidationError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, String::new())
    }
}
