//! Hit Tracker - analytics hit builder with offline store-and-forward delivery.
//!
//! This library assembles tracking hits from key/value parameters, filters
//! them through the user's consent mode, splits oversized hits into
//! multi-hit fragments and delivers them over HTTP, falling back to a local
//! SQLite store when delivery is not possible.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Tracker                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Buffer    │──▶│   Builder   │──▶│   Sender    │──▶ HTTP│
//! │  │ (params)    │   │ (privacy,   │   │ (send or    │        │
//! │  └─────────────┘   │  slicing)   │   │  store)     │        │
//! │                    └─────────────┘   └─────────────┘        │
//! │                                             │  ▲            │
//! │                                             ▼  │            │
//! │  ┌─────────────┐                     ┌─────────────┐        │
//! │  │Transparency │◀── delegate ─────── │   Storage   │        │
//! │  │    Log      │                     │  (SQLite)   │        │
//! │  └─────────────┘                     └─────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Builds and sends run one at a time on a single queue worker, so hits
//! leave in the order they were dispatched.
//!
//! # Example
//!
//! ```no_run
//! use hit_tracker::{keys, ParamOption, Tracker, TrackerConfig};
//!
//! let config = TrackerConfig::default().with(keys::SITE, "552987");
//! let tracker = Tracker::new(config).expect("Failed to create tracker");
//!
//! tracker.set_param("p", "home", ParamOption::default().encode());
//! tracker.dispatch();
//! tracker.wait_until_idle();
//! ```

pub mod config;
pub mod connectivity;
pub mod context;
pub mod core;
pub mod delegate;
pub mod delivery;
pub mod offline;
pub mod plugin;
pub mod technical;
pub mod tracker;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use config::{keys, ConfigError, StorageMode, TrackerConfig};
pub use connectivity::{AlwaysOnline, Connectivity, ManualConnectivity};
pub use context::{ContextError, TrackerContext};
pub use core::{ParamOption, ParamValue, Privacy, PrivacyMode, ValueSource};
pub use delegate::{HitStatus, TrackerDelegate};
pub use delivery::{HttpTransport, Transport, TransportError};
pub use offline::{Hit, Storage, StorageError};
pub use plugin::{Plugin, PluginRegistry};
pub use tracker::Tracker;
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Consent notice shown by the CLI `privacy show` command.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                  HIT TRACKER - PRIVACY DECLARATION               ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  Every hit is filtered through the active consent mode before    ║
║  it is sent or stored:                                           ║
║                                                                  ║
║    none        all parameters are sent                           ║
║    optin       all parameters, tagged vc=1 / vm=optin            ║
║    optout      only technical keys, idclient=opt-out             ║
║    no-consent  only technical keys, idclient=Consent-NO          ║
║    exempt      audience-measurement keys only                    ║
║                                                                  ║
║  A consent choice expires after 397 days.                        ║
║                                                                  ║
║  You can view delivery statistics anytime with:                  ║
║    hit-tracker status                                            ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
