//! # apiban-nft-client - APIBAN feed to nftables synchronizer
//!
//! Pulls the APIBAN banned-address feed page by page and adds every address
//! to a named nftables set that is bound to drop rules. Meant to run from a
//! scheduler; each invocation is one bounded run.
//!
//! ## Features
//!
//! - **Incremental** - Resumes from the persisted feed cursor (LKID)
//! - **Self-Bootstrapping** - Creates the set and its drop rules when missing
//! - **Weekly Flush** - Empties the set every 7 days and re-pulls the feed
//! - **Bounded** - At most 24 feed requests per run
//! - **Crash-Safe** - The cursor is only persisted once the feed is drained
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     apiban-nft-client                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── --config, --log, --verify, FULL                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_json)                                        │
//! │    └── apikey, lkid, version, flush, dataset, setname       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls)                                 │
//! │    └── FeedClient trait, ApibanClient                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Sync (flush policy, paging loop)                           │
//! │    └── Bootstrap (set + drop rules on first run)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (Firewall trait)                                  │
//! │    └── NftablesBackend (nft CLI, JSON listings)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use apiban_nft_client::bootstrap::ensure_set;
//! use apiban_nft_client::config::ApibanConfig;
//! use apiban_nft_client::enforcer::{check_root, create_backend};
//! use apiban_nft_client::fetcher::{ApibanClient, ClientOptions};
//! use apiban_nft_client::sync::{SyncOptions, Syncer};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     check_root()?;
//!
//!     let now = chrono::Utc::now().timestamp();
//!     let mut config = ApibanConfig::load(None, now)?;
//!
//!     let firewall = create_backend(Duration::from_secs(30));
//!     let set = ensure_set(&firewall, &config.set_name).await?;
//!
//!     let feed = ApibanClient::new(ClientOptions::default())?;
//!     let report = Syncer::new(&firewall, &feed, SyncOptions::default())
//!         .run(&mut config, &set, now)
//!         .await?;
//!     println!("added {} addresses", report.added);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`bootstrap`] - Set and drop-rule creation
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - External command execution with deadlines
//! - [`config`] - Configuration document loading and persistence
//! - [`enforcer`] - Firewall abstraction and the nftables backend
//! - [`error`] - Error kinds and exit codes
//! - [`fetcher`] - HTTP client for the banned-address feed
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`logging`] - Log sink setup
//! - [`sync`] - The synchronization loop
//! - [`validation`] - Address and identifier checks

pub mod bootstrap;
pub mod cli;
pub mod cmd_abstraction;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod fetcher;
pub mod lock;
pub mod logging;
pub mod sync;
pub mod validation;

pub use cli::Cli;
pub use config::ApibanConfig;
pub use error::ApibanError;
