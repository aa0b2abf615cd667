//! Development Oracle Server Binary
//!
//! Runs the oracle HTTP server for local verification handshakes.

use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use idv_oracle::{
    create_router, AppState, IntegrityKey, KeySource, MemorySessionStore, OracleConfig, SessionStore,
};

#[tokio::main]
async fn main() {
    // Initialize logging
    let log_level = env::var("IDV_ORACLE_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    // Configuration
    let port: u16 = env::var("IDV_ORACLE_PORT")
        .unwrap_or_else(|_| "8080".into())
        .parse()
        .expect("IDV_ORACLE_PORT must be a valid port number");

    let session_ttl_secs: i64 = env::var("IDV_ORACLE_SESSION_TTL_SECS")
        .unwrap_or_else(|_| "600".into())
        .parse()
        .expect("IDV_ORACLE_SESSION_TTL_SECS must be a number of seconds");

    let configured = env::var("IDV_ORACLE_INTEGRITY_KEY").ok();
    let (key, source) = IntegrityKey::load(configured.as_deref())
        .expect("IDV_ORACLE_INTEGRITY_KEY must be a base64-encoded secret");
    if let KeySource::Ephemeral(secret) = &source {
        warn!("IDV_ORACLE_INTEGRITY_KEY not set, using an ephemeral key printed to stdout");
        // Logs go to stderr; the secret only ever goes to stdout
        println!("IDV_ORACLE_INTEGRITY_KEY={}", secret);
    }

    let config = OracleConfig {
        session_ttl: chrono::Duration::seconds(session_ttl_secs),
    };
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

    info!(
        port = port,
        session_ttl_secs = session_ttl_secs,
        "Starting verification oracle"
    );

    // Expired sessions can never verify; drop them periodically
    let purge_store = store.clone();
    let ttl = config.session_ttl;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(e) = purge_store.purge_issued_before(chrono::Utc::now() - ttl).await {
                warn!(error = %e, "Session purge failed");
            }
        }
    });

    // Create application state
    let state = Arc::new(AppState { key, store, config });

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "Oracle listening");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
