//! Simulated browser for handshake tests
//!
//! `SimulatedProvider` stands in for the window opener plus the provider:
//! when the Initiator opens a child context, it (optionally) waits for the
//! "user" to finish and then runs the real Bridge against the redirect.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use idv_bridge::{Bridge, BridgeConfig, BridgeReport, SpawnedContext};
use idv_client::{
    ContextOpener, HandshakeConfig, Initiator, MockOracle, OpenError, ProviderLaunch,
};
use idv_core::{
    MemoryStorage, OpenerHandle, ProfileStorage, SharedResultStore, SystemClock,
};

pub const ORIGIN: &str = "http://localhost:3000";
pub const RETURN_ENDPOINT: &str = "http://localhost:3000/identity/bridge";
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const USER_DELAY: Duration = Duration::from_secs(20);

/// How the child context can talk back to its opener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Open,
    Blocked,
    NoOpener,
}

/// What the provider redirects back with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Complete,
    MissingIntegrity,
    /// Only `enc_data` survives; nothing identifies the session
    Tokenless,
    /// `token_version_id` is lost but `request_no` is echoed
    RequestNoOnly,
}

#[derive(Debug, Clone, Copy)]
struct Script {
    channel: ChannelMode,
    redirect: RedirectMode,
    shared_profile: bool,
    automatic: bool,
    user_delay: Duration,
}

pub struct SimulatedProvider {
    profile: Arc<dyn ProfileStorage>,
    script: Script,
    launches: Mutex<Vec<ProviderLaunch>>,
    openers: Mutex<Vec<OpenerHandle>>,
    reports: Arc<Mutex<Vec<BridgeReport>>>,
    store_at_open: Mutex<Vec<bool>>,
}

impl SimulatedProvider {
    pub fn new(profile: Arc<dyn ProfileStorage>) -> Self {
        Self {
            profile,
            script: Script {
                channel: ChannelMode::Open,
                redirect: RedirectMode::Complete,
                shared_profile: true,
                automatic: true,
                user_delay: USER_DELAY,
            },
            launches: Mutex::new(Vec::new()),
            openers: Mutex::new(Vec::new()),
            reports: Arc::new(Mutex::new(Vec::new())),
            store_at_open: Mutex::new(Vec::new()),
        }
    }

    pub fn channel(mut self, mode: ChannelMode) -> Self {
        self.script.channel = mode;
        self
    }

    pub fn redirect(mut self, mode: RedirectMode) -> Self {
        self.script.redirect = mode;
        self
    }

    /// The Bridge writes to a store the Initiator cannot see
    pub fn separate_profile(mut self) -> Self {
        self.script.shared_profile = false;
        self
    }

    /// Open the context but never complete verification on our own
    pub fn manual(mut self) -> Self {
        self.script.automatic = false;
        self
    }

    pub fn launches(&self) -> Vec<ProviderLaunch> {
        self.launches.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<BridgeReport> {
        self.reports.lock().unwrap().clone()
    }

    /// The opener handle given to the `index`-th context
    pub fn opener(&self, index: usize) -> OpenerHandle {
        self.openers.lock().unwrap()[index].clone()
    }

    /// Whether the store held anything when each context was opened
    pub fn store_occupied_at_open(&self) -> Vec<bool> {
        self.store_at_open.lock().unwrap().clone()
    }

    /// Complete verification for the `index`-th launch, now
    pub async fn complete_launch(&self, index: usize) -> BridgeReport {
        let launch = self.launches.lock().unwrap()[index].clone();
        let opener = self.openers.lock().unwrap()[index].clone();
        let report = run_bridge(
            self.bridge_store(),
            context_for(self.script.channel, opener),
            redirect_url(&launch, self.script.redirect),
        )
        .await;
        self.reports.lock().unwrap().push(report.clone());
        report
    }

    fn bridge_store(&self) -> SharedResultStore {
        if self.script.shared_profile {
            SharedResultStore::new(self.profile.clone())
        } else {
            SharedResultStore::new(Arc::new(MemoryStorage::new()))
        }
    }
}

#[async_trait]
impl ContextOpener for SimulatedProvider {
    async fn open(&self, launch: ProviderLaunch, opener: OpenerHandle) -> Result<(), OpenError> {
        let occupied = SharedResultStore::new(self.profile.clone())
            .peek()
            .await
            .map(|m| m.is_some())
            .unwrap_or(true);
        self.store_at_open.lock().unwrap().push(occupied);
        self.launches.lock().unwrap().push(launch.clone());
        self.openers.lock().unwrap().push(opener.clone());

        if !self.script.automatic {
            return Ok(());
        }

        let store = self.bridge_store();
        let context = context_for(self.script.channel, opener);
        let url = redirect_url(&launch, self.script.redirect);
        let delay = self.script.user_delay;
        let reports = self.reports.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let report = run_bridge(store, context, url).await;
            reports.lock().unwrap().push(report);
        });

        Ok(())
    }
}

/// An opener whose every attempt is stopped by a popup blocker
pub struct BlockedOpener;

#[async_trait]
impl ContextOpener for BlockedOpener {
    async fn open(&self, _launch: ProviderLaunch, _opener: OpenerHandle) -> Result<(), OpenError> {
        Err(OpenError::Blocked("popup blocked".into()))
    }
}

fn context_for(mode: ChannelMode, opener: OpenerHandle) -> SpawnedContext {
    match mode {
        ChannelMode::Open => SpawnedContext::new(ORIGIN, Some(opener)),
        ChannelMode::Blocked => {
            SpawnedContext::new(ORIGIN, Some(OpenerHandle::blocked("cross-origin opener policy")))
        }
        ChannelMode::NoOpener => SpawnedContext::new(ORIGIN, None),
    }
}

async fn run_bridge(store: SharedResultStore, context: SpawnedContext, url: String) -> BridgeReport {
    Bridge::new(store, Arc::new(SystemClock))
        .with_config(BridgeConfig {
            close_delay: Duration::from_millis(1500),
        })
        .handle_redirect(&url, &context)
        .await
}

pub fn redirect_url(launch: &ProviderLaunch, mode: RedirectMode) -> String {
    let token = launch.session_token.as_str();
    match mode {
        RedirectMode::Complete => format!(
            "{}?enc_data=payload-{}&token_version_id={}&integrity_value=iv-{}",
            RETURN_ENDPOINT, token, token, token
        ),
        RedirectMode::MissingIntegrity => format!(
            "{}?enc_data=payload-{}&token_version_id={}",
            RETURN_ENDPOINT, token, token
        ),
        RedirectMode::Tokenless => format!("{}?enc_data=payload-{}", RETURN_ENDPOINT, token),
        RedirectMode::RequestNoOnly => {
            let request_no = launch
                .form_fields()
                .into_iter()
                .find(|(name, _)| *name == "request_no")
                .map(|(_, value)| value.to_string())
                .unwrap_or_default();
            format!(
                "{}?enc_data=payload-{}&integrity_value=iv-{}&request_no={}",
                RETURN_ENDPOINT, token, token, request_no
            )
        }
    }
}

pub fn config() -> HandshakeConfig {
    HandshakeConfig::default()
        .with_return_endpoint(RETURN_ENDPOINT)
        .with_poll_interval(POLL_INTERVAL)
        .with_result_timeout(Duration::from_secs(300))
}

pub fn profile() -> Arc<dyn ProfileStorage> {
    Arc::new(MemoryStorage::new())
}

pub fn initiator(
    oracle: Arc<MockOracle>,
    opener: Arc<dyn ContextOpener>,
    profile: Arc<dyn ProfileStorage>,
    config: HandshakeConfig,
) -> Initiator {
    Initiator::new(
        oracle,
        opener,
        SharedResultStore::new(profile),
        Arc::new(SystemClock),
        config,
    )
}
