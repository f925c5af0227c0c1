use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use crate::classify::reply_code;

/// Why an address was reported as not deliverable.
///
/// Malformed addresses have no variant here: they are dropped during triage
/// and never reach the result map.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The domain has no resolvable mail exchanger.
    BadDomain,
    /// The session deadline elapsed before the server answered.
    ConnectionTimeout,
    /// Refused, reset, unreachable, or an unusable greeting/HELO exchange.
    ConnectionError,
    /// Explicit 550-class rejection of the recipient (or sender).
    ProtocolReject,
    /// Greylisting, unexpected codes or malformed payloads.
    ProtocolUndetermined,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadDomain => "bad_domain",
            Self::ConnectionTimeout => "connection_timeout",
            Self::ConnectionError => "connection_error",
            Self::ProtocolReject => "protocol_reject",
            Self::ProtocolUndetermined => "protocol_undetermined",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one input address.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub email: String,
    pub is_valid: bool,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub error_kind: Option<ErrorKind>,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub raw_detail: Option<String>,
    /// Mail exchanger whose session produced the verdict.
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    pub exchange: Option<String>,
    #[cfg_attr(feature = "with-serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub transcript: Vec<String>,
}

impl VerificationResult {
    pub fn valid(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            is_valid: true,
            error_kind: None,
            raw_detail: None,
            exchange: None,
            transcript: Vec::new(),
        }
    }

    pub fn invalid(email: impl Into<String>, kind: ErrorKind, detail: Option<String>) -> Self {
        Self {
            email: email.into(),
            is_valid: false,
            error_kind: Some(kind),
            raw_detail: detail,
            exchange: None,
            transcript: Vec::new(),
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    pub fn with_transcript(mut self, transcript: Vec<String>) -> Self {
        self.transcript = transcript;
        self
    }

    /// SMTP status code found at the start of the raw detail, when there is one.
    pub fn reply_code(&self) -> Option<u16> {
        self.raw_detail.as_deref().and_then(reply_code)
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_valid, self.error_kind) {
            (true, _) => write!(f, "{}: valid", self.email),
            (false, Some(kind)) => match &self.raw_detail {
                Some(detail) => write!(f, "{}: invalid ({kind}: {})", self.email, detail.trim_end()),
                None => write!(f, "{}: invalid ({kind})", self.email),
            },
            (false, None) => write!(f, "{}: invalid", self.email),
        }
    }
}

/// Final address → verdict mapping, ordered by address.
pub type ResultMap = BTreeMap<String, VerificationResult>;
