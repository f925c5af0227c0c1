use std::borrow::Cow;
use std::time::Duration;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 25;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// Configuration knobs for [`validate_all`](crate::validate_all) and
/// [`VerificationCoordinator`](crate::VerificationCoordinator).
///
/// The envelope sender has no default: it is the identity servers see in
/// `MAIL FROM` and must be chosen by the caller.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    pub from_address: String,
    pub helo_name: Option<String>,
    /// Deadline for a whole session, from connect to the last reply.
    pub timeout: Duration,
    pub port: u16,
    pub max_candidates: usize,
    pub max_concurrent_domains: Option<usize>,
}

impl ProbeOptions {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
            helo_name: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            port: DEFAULT_PORT,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            max_concurrent_domains: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    pub fn with_helo_name(mut self, helo_name: impl Into<String>) -> Self {
        self.helo_name = Some(helo_name.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn with_max_concurrent_domains(mut self, limit: usize) -> Self {
        self.max_concurrent_domains = Some(limit);
        self
    }

    /// Name announced in `HELO`. Falls back to the sender's domain, then to
    /// `localhost`.
    pub fn helo_name(&self) -> Cow<'_, str> {
        if let Some(name) = self.helo_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Cow::Borrowed(name);
        }
        match self.from_address.rsplit_once('@') {
            Some((_, domain)) if !domain.is_empty() => Cow::Borrowed(domain),
            _ => Cow::Borrowed("localhost"),
        }
    }

    pub(crate) fn candidate_limit(&self) -> usize {
        self.max_candidates.max(1)
    }
}
