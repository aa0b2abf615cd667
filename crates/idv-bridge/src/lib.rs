//! Bridge
//!
//! The page the verification provider redirects to after the user finishes
//! inside the spawned context. It turns the redirect into a
//! [`ResultMessage`](idv_core::ResultMessage) and hands it back to the
//! opener over both delivery channels:
//!
//! 1. Write to the [`SharedResultStore`](idv_core::SharedResultStore) (durable)
//! 2. Post over the cross-context channel if an opener reference survives
//!    (best effort; failures are logged and swallowed)
//! 3. After a short delay, ask the context to close itself (best effort)
//!
//! ## Usage
//!
//! ```ignore
//! use idv_bridge::{Bridge, SpawnedContext};
//!
//! let bridge = Bridge::new(store, Arc::new(SystemClock));
//! let report = bridge.handle_redirect(&landing_url, &context).await;
//! ```

pub mod bridge;
pub mod context;
pub mod error;
pub mod redirect;

pub use bridge::{Bridge, BridgeConfig, BridgeReport, ChannelDelivery};
pub use context::{ChildContext, CloseError, SpawnedContext};
pub use error::{BridgeError, Result};
pub use redirect::{ProviderRedirect, RedirectParams};
