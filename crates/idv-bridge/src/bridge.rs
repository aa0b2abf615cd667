//! Bridge - publishes the provider's redirect back to the opener

use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use idv_core::{
    ChannelError, Clock, ErrorResult, ResultMessage, SharedResultStore, VerificationResult,
};

use crate::context::ChildContext;
use crate::redirect::RedirectParams;

/// Default pause between publishing and closing the context
pub const DEFAULT_CLOSE_DELAY: Duration = Duration::from_millis(1500);

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How long to keep the page up after publishing, so the user sees
    /// feedback and the channel send can land
    pub close_delay: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            close_delay: DEFAULT_CLOSE_DELAY,
        }
    }
}

impl BridgeConfig {
    /// Read `IDV_BRIDGE_CLOSE_DELAY_MS`, falling back to the default
    pub fn from_env() -> Self {
        let close_delay = env::var("IDV_BRIDGE_CLOSE_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CLOSE_DELAY);

        Self { close_delay }
    }
}

/// What happened to the cross-context send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelDelivery {
    Sent,
    /// No opener reference survived
    NoOpener,
    /// The opener stopped listening before we tried
    OpenerClosed,
    Failed(ChannelError),
}

/// Summary of one page load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReport {
    pub message: ResultMessage,
    pub stored: bool,
    pub delivery: ChannelDelivery,
    pub closed: bool,
}

/// The return page logic
///
/// Stateless between page loads. Each call to [`Bridge::handle_redirect`]
/// makes at most one store write and at most one channel send, and never
/// retries: a consumed provider redirect cannot be replayed.
pub struct Bridge {
    store: SharedResultStore,
    clock: Arc<dyn Clock>,
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(store: SharedResultStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config: BridgeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the message for a parsed redirect
    ///
    /// Incomplete redirects become `ERROR` messages carrying whatever
    /// token could be recovered.
    pub fn build_message(&self, params: RedirectParams) -> ResultMessage {
        let created_at = self.clock.now_millis();
        let session_token = params.session_token();

        match params.into_redirect() {
            Ok(redirect) => ResultMessage::Result(VerificationResult {
                session_token: redirect.token_version_id.into(),
                encrypted_payload: redirect.enc_data,
                integrity_tag: redirect.integrity_value,
                created_at,
            }),
            Err(e) => ResultMessage::Error(ErrorResult {
                session_token,
                reason: e.to_string(),
                created_at,
            }),
        }
    }

    /// Handle one provider redirect landing in `context`
    pub async fn handle_redirect(&self, redirect_url: &str, context: &dyn ChildContext) -> BridgeReport {
        let message = match RedirectParams::parse(redirect_url) {
            Ok(params) => self.build_message(params),
            Err(e) => ResultMessage::Error(ErrorResult {
                session_token: Default::default(),
                reason: e.to_string(),
                created_at: self.clock.now_millis(),
            }),
        };

        match &message {
            ResultMessage::Result(r) => {
                info!(session_token = %r.session_token, "Provider redirect received")
            }
            ResultMessage::Error(e) => {
                warn!(session_token = %e.session_token, reason = %e.reason, "Incomplete provider redirect")
            }
        }

        let stored = match self.store.publish(&message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to publish result to shared store");
                false
            }
        };

        let delivery = self.deliver(context, &message);

        tokio::time::sleep(self.config.close_delay).await;

        let closed = match context.close() {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Bridge context stayed open");
                false
            }
        };

        BridgeReport {
            message,
            stored,
            delivery,
            closed,
        }
    }

    /// Fire-and-forget send to the opener; failures are logged and swallowed
    fn deliver(&self, context: &dyn ChildContext, message: &ResultMessage) -> ChannelDelivery {
        let Some(opener) = context.opener() else {
            debug!("No opener reference; relying on shared store");
            return ChannelDelivery::NoOpener;
        };

        if opener.is_closed() {
            debug!("Opener no longer listening; relying on shared store");
            return ChannelDelivery::OpenerClosed;
        }

        match opener.post(context.origin(), message.clone()) {
            Ok(()) => ChannelDelivery::Sent,
            Err(e) => {
                warn!(error = %e, "Cross-context send failed; relying on shared store");
                ChannelDelivery::Failed(e)
            }
        }
    }
}
