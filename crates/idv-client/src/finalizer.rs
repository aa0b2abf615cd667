//! Finalizer - consumes a delivered result exactly once

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use idv_core::{
    Attribution, Clock, DeliveryPath, HandshakeOutcome, RejectReason, ResultMessage, SharedResultStore,
    VerificationResult, VerificationSession, VerifyRequest,
};

use crate::config::HandshakeConfig;
use crate::oracle::{OracleError, VerificationOracle};

/// Resubmission policy for transient oracle failures
#[derive(Debug, Clone)]
struct RetryPolicy {
    retries: u32,
    backoff: Duration,
    session_ttl: chrono::Duration,
}

/// Single-flight consumer for one session's result
///
/// Both delivery paths may call [`Finalizer::consume`] for the same result,
/// in any order and concurrently. The first caller for a result belonging to
/// this session wins and performs the oracle submission; everyone else is a
/// no-op. All callers share one task scheduler and one page, so a flag is
/// enough; no cross-process lock is involved.
pub struct Finalizer {
    oracle: Arc<dyn VerificationOracle>,
    store: SharedResultStore,
    clock: Arc<dyn Clock>,
    session: VerificationSession,
    policy: RetryPolicy,
    processing: AtomicBool,
}

impl Finalizer {
    pub fn new(
        oracle: Arc<dyn VerificationOracle>,
        store: SharedResultStore,
        clock: Arc<dyn Clock>,
        session: VerificationSession,
        config: &HandshakeConfig,
    ) -> Self {
        Self {
            oracle,
            store,
            clock,
            session,
            policy: RetryPolicy {
                retries: config.transient_retries,
                backoff: config.retry_backoff,
                session_ttl: config.session_ttl_chrono(),
            },
            processing: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &VerificationSession {
        &self.session
    }

    /// Whether some caller has already claimed this session's result
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Consume a result delivered on `path`
    ///
    /// Returns the outcome to the caller that won the guard, and `None` to
    /// every other caller as well as for messages that do not belong to this
    /// session (mismatched token or created before the session started).
    pub async fn consume(
        &self,
        message: ResultMessage,
        path: DeliveryPath,
    ) -> Option<HandshakeOutcome> {
        match self.session.attribute(&message, path) {
            Attribution::Accepted => {}
            attribution => {
                warn!(
                    session_token = %self.session.session_token,
                    message = %message,
                    path = ?path,
                    attribution = ?attribution,
                    "Ignored result for another session"
                );
                return None;
            }
        }

        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(session_token = %self.session.session_token, "Duplicate delivery ignored");
            return None;
        }

        // A late duplicate on the other path must find nothing
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear shared store before submission");
        }

        let outcome = match message {
            ResultMessage::Result(result) => self.submit(&result).await,
            ResultMessage::Error(error) => {
                warn!(
                    session_token = %self.session.session_token,
                    reason = %error.reason,
                    "Provider redirect was incomplete; not contacting oracle"
                );
                HandshakeOutcome::Rejected(RejectReason::Incomplete(error.reason))
            }
        };

        info!(
            session_token = %self.session.session_token,
            verified = outcome.is_verified(),
            outcome = ?outcome,
            "Handshake finalized"
        );

        Some(outcome)
    }

    /// Every resubmission carries the identical request, which the oracle
    /// answers with the verdict it already gave if the first one got lost.
    async fn submit(&self, result: &VerificationResult) -> HandshakeOutcome {
        let request = VerifyRequest::from(result);
        let mut resubmissions = 0;

        loop {
            match self.oracle.verify_result(&request).await {
                Ok(response) if response.verified => {
                    return HandshakeOutcome::Verified(response.claims.unwrap_or_default());
                }
                Ok(response) => {
                    let reason = response
                        .reason
                        .unwrap_or_else(|| "rejected by verification service".to_string());
                    return HandshakeOutcome::Rejected(RejectReason::Verification(reason));
                }
                Err(OracleError::Transient(e)) => {
                    if self.session_expired() {
                        warn!(error = %e, "Oracle unavailable and session expired");
                        return HandshakeOutcome::TimedOut;
                    }
                    if resubmissions >= self.policy.retries {
                        warn!(error = %e, attempts = resubmissions + 1, "Oracle unavailable; giving up");
                        return HandshakeOutcome::Rejected(RejectReason::Transient);
                    }
                    resubmissions += 1;
                    debug!(error = %e, attempt = resubmissions, "Oracle unavailable; resubmitting");
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Err(OracleError::Rejected(e)) => {
                    return HandshakeOutcome::Rejected(RejectReason::Verification(e));
                }
                Err(OracleError::Protocol(e)) => {
                    warn!(error = %e, "Unintelligible oracle response");
                    return HandshakeOutcome::Rejected(RejectReason::Transient);
                }
            }
        }
    }

    fn session_expired(&self) -> bool {
        self.session.is_expired(self.clock.now(), self.policy.session_ttl)
    }
}
