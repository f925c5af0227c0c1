//! Per-domain verification with mail-exchanger fallback.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::mx::{LookupMx, MxCandidate, MxResolver};
use crate::options::ProbeOptions;
use crate::session::{ProbeSession, SessionFailure};
use crate::transport::Connector;
use crate::types::{ErrorKind, ResultMap, VerificationResult};

/// Verifies every address of one domain. Holds shared handles only, so it
/// is cheap to clone into one task per domain; no session state outlives a
/// single [`verify`](Self::verify) call.
pub struct DomainVerifier<R, C> {
    resolver: Arc<MxResolver<R>>,
    connector: Arc<C>,
    options: Arc<ProbeOptions>,
}

impl<R, C> Clone for DomainVerifier<R, C> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            connector: Arc::clone(&self.connector),
            options: Arc::clone(&self.options),
        }
    }
}

impl<R: LookupMx, C: Connector> DomainVerifier<R, C> {
    pub fn new(
        resolver: Arc<MxResolver<R>>,
        connector: Arc<C>,
        options: Arc<ProbeOptions>,
    ) -> Self {
        Self {
            resolver,
            connector,
            options,
        }
    }

    /// Resolves `domain`, picks the first candidate (by priority) that
    /// completes a greeting and `HELO`, then checks each address of `bucket`
    /// against it with one fresh session per address.
    ///
    /// Resolution failure marks the whole bucket `BadDomain` without any
    /// connection attempt. If no candidate is usable, the whole bucket gets the
    /// kind and detail of the last failure seen.
    #[instrument(skip_all, fields(domain = %domain, addresses = bucket.len()))]
    pub async fn verify(&self, domain: &str, bucket: &[String]) -> ResultMap {
        let mut results = ResultMap::new();
        let Some((first, rest)) = bucket.split_first() else {
            return results;
        };

        let candidates = match self.resolver.resolve(domain).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(error = %err, "MX resolution failed");
                let detail = err.to_string();
                for email in bucket {
                    results.insert(
                        email.clone(),
                        VerificationResult::invalid(
                            email.as_str(),
                            ErrorKind::BadDomain,
                            Some(detail.clone()),
                        ),
                    );
                }
                return results;
            }
        };

        let (candidate, session) = match self.select_candidate(&candidates).await {
            Ok(selected) => selected,
            Err(failure) => {
                warn!(last_error = %failure, "no usable mail exchanger");
                for email in bucket {
                    results.insert(email.clone(), failure.to_result(email));
                }
                return results;
            }
        };

        let from = self.options.from_address.as_str();
        results.insert(first.clone(), session.verify_recipient(from, first).await);
        for email in rest {
            let result =
                match ProbeSession::establish(self.connector.as_ref(), candidate, &self.options)
                    .await
                {
                    Ok(session) => session.verify_recipient(from, email).await,
                    Err(failure) => failure.to_result(email),
                };
            results.insert(email.clone(), result);
        }

        let valid = results.values().filter(|r| r.is_valid).count();
        info!(exchange = %candidate.exchange, valid, total = results.len(), "domain verified");
        results
    }

    /// Tries candidates in order until one reaches `HeloAcked`.
    async fn select_candidate<'c>(
        &self,
        candidates: &'c [MxCandidate],
    ) -> Result<(&'c MxCandidate, ProbeSession<C::Transport>), SessionFailure> {
        let mut last_failure = None;
        for candidate in candidates.iter().take(self.options.candidate_limit()) {
            match ProbeSession::establish(self.connector.as_ref(), candidate, &self.options).await
            {
                Ok(session) => return Ok((candidate, session)),
                Err(failure) => {
                    warn!(
                        exchange = %candidate.exchange,
                        priority = candidate.priority,
                        error = %failure,
                        "mail exchanger unusable, trying next candidate"
                    );
                    last_failure = Some(failure);
                }
            }
        }
        Err(last_failure.unwrap_or_else(|| SessionFailure {
            exchange: String::new(),
            kind: ErrorKind::ConnectionError,
            detail: "no mail exchanger candidates".to_string(),
            transcript: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use trust_dns_resolver::error::ResolveError;

    use super::*;
    use crate::mx::tests::StubResolver;
    use crate::transport::mock::{HostScript, MockConnector};

    fn verifier(
        resolver: StubResolver,
        connector: MockConnector,
    ) -> DomainVerifier<StubResolver, MockConnector> {
        let options = ProbeOptions::new("probe@sender.test").with_timeout_ms(500);
        DomainVerifier::new(
            Arc::new(MxResolver::new(resolver)),
            Arc::new(connector),
            Arc::new(options),
        )
    }

    fn bucket(addresses: &[&str]) -> Vec<String> {
        addresses.iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn no_mx_records_marks_bucket_bad_domain_without_connecting() {
        let spy = MockConnector::always_accepting();
        let verifier = verifier(StubResolver::new(|_| Ok(Vec::new())), spy.clone());
        let results = verifier
            .verify("nodomain.test", &bucket(&["a@nodomain.test", "b@nodomain.test"]))
            .await;
        assert_eq!(results.len(), 2);
        for result in results.values() {
            assert!(!result.is_valid);
            assert_eq!(result.error_kind, Some(ErrorKind::BadDomain));
        }
        assert!(spy.connects().is_empty());
    }

    #[tokio::test]
    async fn resolver_error_marks_bucket_bad_domain_without_connecting() {
        let spy = MockConnector::always_accepting();
        let verifier = verifier(
            StubResolver::new(|_| Err(ResolveError::from("servfail"))),
            spy.clone(),
        );
        let results = verifier
            .verify("broken.test", &bucket(&["a@broken.test", "b@broken.test"]))
            .await;
        assert_eq!(results.len(), 2);
        for result in results.values() {
            assert_eq!(result.error_kind, Some(ErrorKind::BadDomain));
            assert!(result.raw_detail.as_deref().is_some_and(|d| d.contains("servfail")));
        }
        assert!(spy.connects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_next_candidate_after_timeout() {
        let resolver = StubResolver::from_table(vec![(
            "good.com",
            vec![
                MxCandidate::new(20, "mx2.good.com"),
                MxCandidate::new(10, "mx1.good.com"),
            ],
        )]);
        let connector = MockConnector::new()
            .host("mx1.good.com", HostScript::silent())
            .host("mx2.good.com", HostScript::accept_all());
        let verifier = verifier(resolver, connector.clone());

        let results = verifier
            .verify("good.com", &bucket(&["a@good.com", "b@good.com"]))
            .await;
        assert!(results.values().all(|r| r.is_valid));
        assert!(
            results
                .values()
                .all(|r| r.exchange.as_deref() == Some("mx2.good.com"))
        );
        // mx1 tried once, then never again for the second address.
        assert_eq!(
            connector.connects(),
            vec!["mx1.good.com", "mx2.good.com", "mx2.good.com"]
        );
        assert_eq!(connector.closes("mx1.good.com"), 1);
        assert_eq!(connector.closes("mx2.good.com"), 2);
    }

    #[tokio::test]
    async fn exhausted_candidates_report_last_error() {
        let resolver = StubResolver::from_table(vec![(
            "down.com",
            vec![
                MxCandidate::new(10, "mx1.down.com"),
                MxCandidate::new(20, "mx2.down.com"),
            ],
        )]);
        let connector = MockConnector::new()
            .host("mx1.down.com", HostScript::Refuse)
            .host("mx2.down.com", HostScript::Refuse);
        let verifier = verifier(resolver, connector.clone());

        let results = verifier.verify("down.com", &bucket(&["a@down.com"])).await;
        let result = &results["a@down.com"];
        assert_eq!(result.error_kind, Some(ErrorKind::ConnectionError));
        assert!(
            result
                .raw_detail
                .as_deref()
                .is_some_and(|d| d.contains("mx2.down.com"))
        );
        assert_eq!(connector.connects(), vec!["mx1.down.com", "mx2.down.com"]);
    }

    #[tokio::test]
    async fn rejection_is_scoped_to_its_address() {
        let resolver =
            StubResolver::from_table(vec![("mixed.com", vec![MxCandidate::new(10, "mx.mixed.com")])]);
        let connector = MockConnector::new().host(
            "mx.mixed.com",
            HostScript::reject_recipients(&["ghost@mixed.com"]),
        );
        let verifier = verifier(resolver, connector);

        let results = verifier
            .verify(
                "mixed.com",
                &bucket(&["ghost@mixed.com", "real@mixed.com"]),
            )
            .await;
        assert_eq!(
            results["ghost@mixed.com"].error_kind,
            Some(ErrorKind::ProtocolReject)
        );
        assert!(results["real@mixed.com"].is_valid);
    }

    #[tokio::test]
    async fn candidate_cap_limits_attempts() {
        let resolver = StubResolver::from_table(vec![(
            "many.com",
            (0..10)
                .map(|i| MxCandidate::new(i, format!("mx{i}.many.com")))
                .collect(),
        )]);
        let connector = MockConnector::new();
        let options = ProbeOptions::new("probe@sender.test").with_max_candidates(2);
        let verifier = DomainVerifier::new(
            Arc::new(MxResolver::new(resolver)),
            Arc::new(connector.clone()),
            Arc::new(options),
        );

        let results = verifier.verify("many.com", &bucket(&["a@many.com"])).await;
        assert_eq!(results.len(), 1);
        assert_eq!(connector.connects(), vec!["mx0.many.com", "mx1.many.com"]);
    }
}
