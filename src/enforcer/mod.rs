//! Firewall adapter: the operations the sync loop and bootstrap need from
//! the host packet filter, and the nftables implementation of them.

mod nftables;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

pub use nftables::NftablesBackend;

use crate::cmd_abstraction::{args_to_strings, CommandExecutor, RealCommandExecutor};
use crate::error::ApibanError;

/// Locations probed for the nft binary before falling back to PATH lookup
const NFT_CANDIDATES: &[&str] = &["/usr/sbin/nft", "/sbin/nft", "/usr/bin/nft"];

/// A live nftables set as last listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetHandle {
    pub family: String,
    pub table: String,
    pub name: String,
    /// Element count at the time of listing
    pub element_count: usize,
}

impl fmt::Display for SetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.family, self.table, self.name)
    }
}

/// A chain returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRef {
    pub family: String,
    pub table: String,
    pub name: String,
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.family, self.table, self.name)
    }
}

/// Resolved chain details, enough to scope a set and a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDetails {
    pub family: String,
    pub table: String,
    pub chain: String,
}

/// Trait for firewall backends
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Look up a set by name
    async fn list_set(&self, name: &str) -> Result<SetHandle>;

    /// Remove every element from the set
    async fn flush_set(&self, set: &SetHandle) -> Result<()>;

    /// Add a single address to the set
    async fn add_element(&self, set: &SetHandle, ip: &str) -> Result<()>;

    /// Base chains hooked on input, in backend order
    async fn ingress_chains(&self) -> Result<Vec<ChainRef>>;

    /// Base chains hooked on output, in backend order
    async fn egress_chains(&self) -> Result<Vec<ChainRef>>;

    async fn chain_details(&self, chain: &ChainRef) -> Result<ChainDetails>;

    /// Create an empty set in the chain's table
    async fn add_set(&self, chain: &ChainDetails, name: &str) -> Result<()>;

    /// Drop packets whose source is in the set
    async fn add_ingress_rule(&self, chain: &ChainDetails, name: &str) -> Result<()>;

    /// Drop packets whose destination is in the set
    async fn add_egress_rule(&self, chain: &ChainDetails, name: &str) -> Result<()>;
}

/// Path to the nft binary
pub fn nft_path() -> &'static str {
    static NFT: OnceLock<&'static str> = OnceLock::new();
    NFT.get_or_init(|| {
        NFT_CANDIDATES
            .iter()
            .copied()
            .find(|p| Path::new(p).exists())
            .unwrap_or("nft")
    })
}

/// Create the nftables backend with a per-command deadline
pub fn create_backend(timeout: std::time::Duration) -> NftablesBackend<RealCommandExecutor> {
    NftablesBackend::new(RealCommandExecutor::with_timeout(timeout))
}

/// Execute a command through an executor and return stdout
pub(crate) async fn exec_cmd_with_executor<E: CommandExecutor + ?Sized>(
    executor: &E,
    program: &str,
    args: &[&str],
) -> Result<String> {
    let output = executor.execute(program, &args_to_strings(args)).await?;

    if output.success {
        Ok(output.stdout)
    } else {
        anyhow::bail!("{} {} failed: {}", program, args.join(" "), output.stderr.trim())
    }
}

/// Check if running as root (effective UID == 0)
///
/// Managing nftables requires CAP_NET_ADMIN; UID 0 covers the usual case of
/// running from a root cron job or systemd timer.
pub fn check_root() -> Result<(), ApibanError> {
    // SAFETY: geteuid() is a simple syscall that reads the effective user ID.
    // It has no preconditions, never fails, and doesn't modify any state.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        return Err(ApibanError::Permission(
            "This operation requires root privileges. Please run with sudo.\n\
             Alternatively, ensure the process has the CAP_NET_ADMIN capability."
                .to_string(),
        ));
    }
    Ok(())
}
