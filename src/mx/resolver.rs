use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};

use super::{MxCandidate, MxError};

/// DNS collaborator: returns the raw MX answer for a domain, in whatever
/// order the server produced it.
#[async_trait]
pub trait LookupMx: Send + Sync {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxCandidate>, ResolveError>;
}

#[async_trait]
impl LookupMx for TokioAsyncResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxCandidate>, ResolveError> {
        let lookup = match self.mx_lookup(domain).await {
            Ok(lookup) => lookup,
            Err(err) if matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        Ok(lookup
            .iter()
            .map(|mx| MxCandidate::new(mx.preference(), normalize_exchange(mx.exchange().to_utf8())))
            .collect())
    }
}

#[cfg(test)]
#[async_trait]
impl LookupMx for crate::mx::tests::StubResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxCandidate>, ResolveError> {
        self.calls.lock().unwrap().push(domain.to_string());
        (self.on_lookup)(domain)
    }
}

/// Resolves domains to ordered mail-exchanger candidates.
#[derive(Debug, Clone)]
pub struct MxResolver<R> {
    lookup: R,
}

impl MxResolver<TokioAsyncResolver> {
    /// Uses the system resolver configuration (`/etc/resolv.conf` on Unix).
    pub fn from_system_conf() -> Result<Self, MxError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(MxError::resolver_init)?;
        Ok(Self::new(resolver))
    }
}

impl<R: LookupMx> MxResolver<R> {
    pub fn new(lookup: R) -> Self {
        Self { lookup }
    }

    pub fn lookup(&self) -> &R {
        &self.lookup
    }

    pub async fn resolve(&self, domain: &str) -> Result<Vec<MxCandidate>, MxError> {
        resolve_with(&self.lookup, domain).await
    }
}

/// Looks up `domain` through `resolver` and returns its candidates sorted by
/// ascending priority. Equal priorities keep the resolver's order; identical
/// records are collapsed. No retry happens here.
pub async fn resolve_with<R>(resolver: &R, domain: &str) -> Result<Vec<MxCandidate>, MxError>
where
    R: LookupMx + ?Sized,
{
    let ascii = normalize_domain(domain)?;
    let mut candidates = resolver
        .lookup_mx(&ascii)
        .await
        .map_err(|err| MxError::lookup(&ascii, err))?;

    let mut seen = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.clone()));
    candidates.sort_by_key(|candidate| candidate.priority);

    if candidates.is_empty() {
        return Err(MxError::NoRecords { domain: ascii });
    }
    debug!(domain = %ascii, count = candidates.len(), "resolved MX candidates");
    Ok(candidates)
}

pub fn normalize_domain(domain: &str) -> Result<String, MxError> {
    let trimmed = domain.trim();
    if trimmed.is_empty() {
        return Err(MxError::EmptyDomain);
    }
    idna::domain_to_ascii(trimmed).map_err(MxError::idna)
}

pub fn normalize_exchange(exchange: String) -> String {
    let trimmed = exchange.trim_end_matches('.');
    trimmed.to_ascii_lowercase()
}
