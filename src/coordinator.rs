use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use trust_dns_resolver::TokioAsyncResolver;

use crate::error::VerifyError;
use crate::mx::{LookupMx, MxResolver};
use crate::options::ProbeOptions;
use crate::transport::{Connector, TcpConnector};
use crate::triage::{TriageMap, domain_of, triage};
use crate::types::{ErrorKind, ResultMap, VerificationResult};
use crate::verifier::DomainVerifier;

/// Verifies a batch of addresses, one task per domain.
///
/// Domains run concurrently (optionally capped by
/// [`ProbeOptions::max_concurrent_domains`]) and never share sessions. Each
/// task returns its own partial map, merged here once every task is done.
pub struct VerificationCoordinator<R, C> {
    triage: TriageMap,
    verifier: DomainVerifier<R, C>,
    options: Arc<ProbeOptions>,
}

impl VerificationCoordinator<TokioAsyncResolver, TcpConnector> {
    /// Uses the system DNS configuration and plain TCP on `options.port`.
    pub fn new<I, S>(emails: I, options: ProbeOptions) -> Result<Self, VerifyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let resolver = MxResolver::from_system_conf()?;
        Self::from_parts(emails, options, resolver, TcpConnector)
    }
}

impl<R, C> VerificationCoordinator<R, C>
where
    R: LookupMx + 'static,
    C: Connector + 'static,
{
    pub fn with_collaborators<I, S>(
        emails: I,
        options: ProbeOptions,
        lookup: R,
        connector: C,
    ) -> Result<Self, VerifyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_parts(emails, options, MxResolver::new(lookup), connector)
    }

    fn from_parts<I, S>(
        emails: I,
        options: ProbeOptions,
        resolver: MxResolver<R>,
        connector: C,
    ) -> Result<Self, VerifyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if domain_of(&options.from_address).is_none() {
            return Err(VerifyError::invalid_sender(&options.from_address));
        }
        let options = Arc::new(options);
        let verifier = DomainVerifier::new(
            Arc::new(resolver),
            Arc::new(connector),
            Arc::clone(&options),
        );
        Ok(Self {
            triage: triage(emails),
            verifier,
            options,
        })
    }

    pub fn triage(&self) -> &TriageMap {
        &self.triage
    }

    /// Runs every domain and returns once all of them have finished.
    ///
    /// The map holds exactly one entry per address that survived triage. A
    /// domain whose task dies is reported as `ConnectionError` for each of its
    /// addresses; other domains are unaffected.
    pub async fn validate_all(&self) -> ResultMap {
        let limiter = self
            .options
            .max_concurrent_domains
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let mut buckets = Vec::with_capacity(self.triage.len());
        let mut tasks = Vec::with_capacity(self.triage.len());
        for (domain, bucket) in self.triage.iter() {
            let verifier = self.verifier.clone();
            let limiter = limiter.clone();
            let task_domain = domain.clone();
            let task_bucket = bucket.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                verifier.verify(&task_domain, &task_bucket).await
            }));
            buckets.push((domain, bucket));
        }

        let mut results = ResultMap::new();
        for ((domain, bucket), joined) in buckets.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(partial) => results.extend(partial),
                Err(err) => {
                    warn!(domain = %domain, error = %err, "domain verification task failed");
                    let detail = format!("verification task failed: {err}");
                    for email in bucket {
                        results.insert(
                            email.clone(),
                            VerificationResult::invalid(
                                email.as_str(),
                                ErrorKind::ConnectionError,
                                Some(detail.clone()),
                            ),
                        );
                    }
                }
            }
        }

        let valid = results.values().filter(|r| r.is_valid).count();
        info!(
            domains = self.triage.len(),
            addresses = results.len(),
            valid,
            "verification complete"
        );
        results
    }
}

/// One-shot helper: builds a coordinator on the system resolver and runs it.
pub async fn validate_all<I, S>(emails: I, options: ProbeOptions) -> Result<ResultMap, VerifyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let coordinator = VerificationCoordinator::new(emails, options)?;
    Ok(coordinator.validate_all().await)
}
