//! Initiator - starts a handshake and waits for its result
//!
//! ```text
//! Idle -> Preparing -> AwaitingResult -> Completed
//!                  \                 \-> Cancelled
//!                   \                 \-> Failed(TimedOut)
//!                    \-> Failed(ProviderError)
//! ```
//!
//! While awaiting, two independent tasks race into the attempt's
//! [`Finalizer`]: one polls the shared store on an interval, the other
//! listens on the cross-context channel. Their failure modes are
//! orthogonal, so they are kept separate rather than unified.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use idv_core::{
    ChannelListener, Clock, CrossContextChannel, DeliveryPath, HandshakeError, HandshakeOutcome,
    Result, ResultMessage, SessionToken, SharedResultStore, VerificationSession,
};

use crate::config::HandshakeConfig;
use crate::finalizer::Finalizer;
use crate::opener::{ContextOpener, ProviderLaunch};
use crate::oracle::VerificationOracle;

/// Why an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    TimedOut,
    ProviderError,
}

/// Where the Initiator is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiatorState {
    Idle,
    Preparing,
    AwaitingResult(SessionToken),
    Completed,
    Cancelled,
    Failed(FailureKind),
}

impl InitiatorState {
    /// Whether an attempt is in flight
    pub fn is_active(&self) -> bool {
        matches!(self, InitiatorState::Preparing | InitiatorState::AwaitingResult(_))
    }
}

/// Cancellation hooks for the attempt in flight
struct ActiveAttempt {
    cancel: watch::Sender<bool>,
    tasks: Vec<AbortHandle>,
}

/// Orchestrates one handshake attempt at a time
pub struct Initiator {
    oracle: Arc<dyn VerificationOracle>,
    opener: Arc<dyn ContextOpener>,
    store: SharedResultStore,
    clock: Arc<dyn Clock>,
    config: HandshakeConfig,
    state: watch::Sender<InitiatorState>,
    active: Mutex<Option<ActiveAttempt>>,
}

impl Initiator {
    pub fn new(
        oracle: Arc<dyn VerificationOracle>,
        opener: Arc<dyn ContextOpener>,
        store: SharedResultStore,
        clock: Arc<dyn Clock>,
        config: HandshakeConfig,
    ) -> Self {
        let (state, _) = watch::channel(InitiatorState::Idle);
        Self {
            oracle,
            opener,
            store,
            clock,
            config,
            state,
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> InitiatorState {
        self.state.borrow().clone()
    }

    /// Observe lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<InitiatorState> {
        self.state.subscribe()
    }

    /// Run one handshake attempt to its terminal outcome
    ///
    /// Errors are returned only when no child context was opened
    /// (`Failed(ProviderError)`), or when an attempt is already running.
    /// Everything after the child opens resolves to a [`HandshakeOutcome`].
    pub async fn begin(&self) -> Result<HandshakeOutcome> {
        let claimed = self.state.send_if_modified(|state| {
            if state.is_active() {
                false
            } else {
                *state = InitiatorState::Preparing;
                true
            }
        });
        if !claimed {
            return Err(HandshakeError::AlreadyInProgress);
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        *self.lock_active() = Some(ActiveAttempt {
            cancel: cancel_tx,
            tasks: Vec::new(),
        });

        let result = self.run_attempt(&mut cancel_rx).await;

        // Whatever happened, stop both suspension points
        if let Some(attempt) = self.lock_active().take() {
            for task in attempt.tasks {
                task.abort();
            }
        }

        let next = match &result {
            Ok(HandshakeOutcome::Aborted) => InitiatorState::Cancelled,
            Ok(HandshakeOutcome::TimedOut) => InitiatorState::Failed(FailureKind::TimedOut),
            Ok(_) => InitiatorState::Completed,
            Err(_) => InitiatorState::Failed(FailureKind::ProviderError),
        };
        if matches!(next, InitiatorState::Cancelled | InitiatorState::Failed(FailureKind::TimedOut)) {
            // A Bridge write from this attempt must not be mistaken for the next one's
            if let Err(e) = self.store.clear().await {
                warn!(error = %e, "Failed to clear shared store after attempt");
            }
        }
        self.transition(next);

        result
    }

    /// Start a fresh attempt after a non-verified outcome
    ///
    /// The previous session is never reused.
    pub async fn retry(&self) -> Result<HandshakeOutcome> {
        self.begin().await
    }

    /// Cancel the attempt in flight
    ///
    /// Stops the store poll and detaches the channel listener immediately;
    /// the running `begin()` then clears the store and returns
    /// [`HandshakeOutcome::Aborted`]. The child context is left alone.
    /// Returns whether there was anything to cancel.
    pub fn cancel(&self) -> bool {
        let guard = self.lock_active();
        let Some(attempt) = guard.as_ref() else {
            return false;
        };
        for task in &attempt.tasks {
            task.abort();
        }
        attempt.cancel.send_replace(true);
        info!("Handshake cancelled by user");
        true
    }

    async fn run_attempt(&self, cancel_rx: &mut watch::Receiver<bool>) -> Result<HandshakeOutcome> {
        let started_at = self.clock.now();

        // A previous aborted run may have left a result behind
        self.store.clear().await?;

        let grant = tokio::select! {
            grant = self.oracle.create_session(&self.config.return_endpoint) => grant,
            _ = cancelled(cancel_rx) => return Ok(HandshakeOutcome::Aborted),
        };
        let grant = grant.map_err(|e| {
            warn!(oracle = self.oracle.description(), error = %e, "Could not obtain verification session");
            HandshakeError::Provider(e.to_string())
        })?;

        let session = VerificationSession {
            session_token: grant.session_token,
            encrypted_request: grant.encrypted_request,
            integrity_tag: grant.integrity_tag,
            return_endpoint: self.config.return_endpoint.clone(),
            issued_at: started_at,
        };
        info!(session_token = %session.session_token, "Verification session created");

        let (opener_handle, listener) = CrossContextChannel::open();
        let listener = match self.config.trusted_origin() {
            Some(origin) => listener.trust_origin(origin),
            None => listener,
        };

        let launch = ProviderLaunch::for_session(self.config.provider_url.clone(), &session);
        self.opener.open(launch, opener_handle).await.map_err(|e| {
            warn!(error = %e, "Could not open verification context");
            HandshakeError::ContextOpen(e.to_string())
        })?;
        self.transition(InitiatorState::AwaitingResult(session.session_token.clone()));

        let finalizer = Arc::new(Finalizer::new(
            self.oracle.clone(),
            self.store.clone(),
            self.clock.clone(),
            session,
            &self.config,
        ));

        // Capacity 1: the finalizer yields at most one outcome
        let (outcome_tx, mut outcome_rx) = mpsc::channel(1);
        let poll = tokio::spawn(poll_store(
            self.store.clone(),
            finalizer.clone(),
            self.config.poll_interval,
            outcome_tx.clone(),
        ));
        let listen = tokio::spawn(listen_channel(listener, finalizer.clone(), outcome_tx));
        self.register_tasks(&[&poll, &listen]);

        let timeout = tokio::time::sleep(self.config.result_timeout);
        tokio::pin!(timeout);
        let mut deadline_passed = false;

        loop {
            tokio::select! {
                Some(outcome) = outcome_rx.recv() => return Ok(outcome),
                _ = &mut timeout, if !deadline_passed => {
                    // A result that already arrived gets to finish its submission
                    if finalizer.is_processing() {
                        deadline_passed = true;
                        continue;
                    }
                    warn!(
                        session_token = %finalizer.session().session_token,
                        timeout = ?self.config.result_timeout,
                        "No verification result received"
                    );
                    return Ok(HandshakeOutcome::TimedOut);
                }
                _ = cancelled(cancel_rx) => return Ok(HandshakeOutcome::Aborted),
            }
        }
    }

    fn register_tasks(&self, tasks: &[&JoinHandle<()>]) {
        let mut guard = self.lock_active();
        if let Some(attempt) = guard.as_mut() {
            let already_cancelled = *attempt.cancel.borrow();
            for task in tasks {
                let handle = task.abort_handle();
                if already_cancelled {
                    handle.abort();
                }
                attempt.tasks.push(handle);
            }
        }
    }

    fn transition(&self, next: InitiatorState) {
        let previous = self.state.send_replace(next.clone());
        debug!(from = ?previous, to = ?next, "Initiator state changed");
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveAttempt>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Resolves once the attempt is cancelled; never resolves otherwise
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Periodic check of the shared store
async fn poll_store(
    store: SharedResultStore,
    finalizer: Arc<Finalizer>,
    interval: Duration,
    outcome_tx: mpsc::Sender<HandshakeOutcome>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match store.take().await {
            Ok(Some(message)) => {
                if let Some(outcome) = deliver(&finalizer, message, DeliveryPath::Store).await {
                    let _ = outcome_tx.send(outcome).await;
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Shared store check failed"),
        }
    }
}

/// Listener for cross-context messages
async fn listen_channel(
    mut listener: ChannelListener,
    finalizer: Arc<Finalizer>,
    outcome_tx: mpsc::Sender<HandshakeOutcome>,
) {
    while let Some(message) = listener.recv().await {
        if let Some(outcome) = deliver(&finalizer, message, DeliveryPath::Channel).await {
            let _ = outcome_tx.send(outcome).await;
            return;
        }
    }
    debug!("Child context dropped its opener reference; relying on shared store");
}

async fn deliver(
    finalizer: &Finalizer,
    message: ResultMessage,
    path: DeliveryPath,
) -> Option<HandshakeOutcome> {
    debug!(path = ?path, message = %message, "Result observed");
    finalizer.consume(message, path).await
}
