//! # IDV Client
//!
//! The opener side of the identity-verification handshake.
//!
//! - [`Initiator`] mints a session with the backend oracle, opens the
//!   provider in a separate context, and waits on both delivery channels
//! - [`Finalizer`] consumes the delivered result exactly once and submits it
//!   to the oracle
//! - [`VerificationOracle`] is the seam to the backend, with an HTTP client
//!   and a scripted mock
//!
//! ## Usage
//!
//! ```ignore
//! use idv_client::{HandshakeConfig, HttpOracle, Initiator};
//!
//! let initiator = Initiator::new(
//!     Arc::new(HttpOracle::new("https://api.example.com")),
//!     Arc::new(my_window_opener),
//!     SharedResultStore::new(profile_storage),
//!     Arc::new(SystemClock),
//!     HandshakeConfig::from_env(),
//! );
//!
//! let outcome = initiator.begin().await?;
//! println!("{}", outcome.render().headline);
//! ```

pub mod config;
pub mod finalizer;
pub mod initiator;
pub mod opener;
pub mod oracle;

pub use config::HandshakeConfig;
pub use finalizer::Finalizer;
pub use initiator::{FailureKind, Initiator, InitiatorState};
pub use opener::{ContextOpener, OpenError, ProviderLaunch};
pub use oracle::{HttpOracle, MockOracle, OracleError, VerificationOracle};
