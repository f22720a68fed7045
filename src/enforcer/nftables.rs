//! nftables backend implementation.
//!
//! Reads go through `nft -j` (JSON output); mutations are single `nft`
//! commands so that each one succeeds or fails on its own.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{exec_cmd_with_executor, nft_path, ChainDetails, ChainRef, Firewall, SetHandle};
use crate::cmd_abstraction::CommandExecutor;
use crate::validation::{is_safe_nft_element, is_valid_identifier, validate_ip};

/// Families that can carry an IP drop set
const IP_FAMILIES: &[&str] = &["ip", "ip6", "inet"];

/// Top-level `nft -j` document
#[derive(Debug, Deserialize)]
struct NftDocument {
    #[serde(default)]
    nftables: Vec<NftEntry>,
}

/// One entry of the `nftables` array; only sets and chains are of interest
#[derive(Debug, Default, Deserialize)]
struct NftEntry {
    set: Option<NftSet>,
    chain: Option<NftChain>,
}

#[derive(Debug, Deserialize)]
struct NftSet {
    family: String,
    table: String,
    name: String,
    #[serde(default)]
    elem: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NftChain {
    family: String,
    table: String,
    name: String,
    #[serde(rename = "type")]
    chain_type: Option<String>,
    hook: Option<String>,
}

impl NftChain {
    fn is_filter_hook(&self, hook: &str) -> bool {
        self.hook.as_deref() == Some(hook)
            && self.chain_type.as_deref() == Some("filter")
            && IP_FAMILIES.contains(&self.family.as_str())
    }

    fn to_ref(&self) -> ChainRef {
        ChainRef {
            family: self.family.clone(),
            table: self.table.clone(),
            name: self.name.clone(),
        }
    }
}

fn parse_document(output: &str) -> Result<Vec<NftEntry>> {
    let doc: NftDocument =
        serde_json::from_str(output).context("Failed to parse nft JSON output")?;
    Ok(doc.nftables)
}

/// Set element type for a family
fn addr_type(family: &str) -> &'static str {
    if family == "ip6" {
        "ipv6_addr"
    } else {
        "ipv4_addr"
    }
}

/// Packet selector for a family
fn addr_selector(family: &str) -> &'static str {
    if family == "ip6" {
        "ip6"
    } else {
        "ip"
    }
}

fn ensure_identifier(kind: &str, value: &str) -> Result<()> {
    if !is_valid_identifier(value) {
        anyhow::bail!("Refusing unsafe nftables {} name: {:?}", kind, value);
    }
    Ok(())
}

fn ensure_chain(chain: &ChainDetails) -> Result<()> {
    if !IP_FAMILIES.contains(&chain.family.as_str()) {
        anyhow::bail!("Unsupported nftables family: {:?}", chain.family);
    }
    ensure_identifier("table", &chain.table)?;
    ensure_identifier("chain", &chain.chain)
}

/// nftables backend
pub struct NftablesBackend<E: CommandExecutor> {
    executor: E,
}

impl<E: CommandExecutor> NftablesBackend<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    async fn nft(&self, args: &[&str]) -> Result<String> {
        debug!("nft {}", args.join(" "));
        exec_cmd_with_executor(&self.executor, nft_path(), args).await
    }

    async fn chains_with_hook(&self, hook: &str) -> Result<Vec<ChainRef>> {
        let output = self.nft(&["-j", "list", "chains"]).await?;
        Ok(parse_document(&output)?
            .into_iter()
            .filter_map(|entry| entry.chain)
            .filter(|chain| chain.is_filter_hook(hook))
            .map(|chain| chain.to_ref())
            .collect())
    }

    async fn add_rule(&self, chain: &ChainDetails, name: &str, direction: &str) -> Result<()> {
        ensure_chain(chain)?;
        ensure_identifier("set", name)?;
        let set_ref = format!("@{}", name);
        self.nft(&[
            "insert",
            "rule",
            &chain.family,
            &chain.table,
            &chain.chain,
            addr_selector(&chain.family),
            direction,
            &set_ref,
            "drop",
        ])
        .await?;
        Ok(())
    }
}

#[async_trait]
impl<E: CommandExecutor> Firewall for NftablesBackend<E> {
    async fn list_set(&self, name: &str) -> Result<SetHandle> {
        ensure_identifier("set", name)?;

        let output = self.nft(&["-j", "list", "sets"]).await?;
        let located = parse_document(&output)?
            .into_iter()
            .filter_map(|entry| entry.set)
            .find(|set| set.name == name)
            .with_context(|| format!("set {} not found", name))?;

        let output = self
            .nft(&["-j", "list", "set", &located.family, &located.table, name])
            .await?;
        let listed = parse_document(&output)?
            .into_iter()
            .filter_map(|entry| entry.set)
            .find(|set| set.name == name)
            .with_context(|| format!("set {} vanished while listing", name))?;

        Ok(SetHandle {
            family: listed.family,
            table: listed.table,
            name: listed.name,
            element_count: listed.elem.len(),
        })
    }

    async fn flush_set(&self, set: &SetHandle) -> Result<()> {
        self.nft(&["flush", "set", &set.family, &set.table, &set.name]).await?;
        Ok(())
    }

    async fn add_element(&self, set: &SetHandle, ip: &str) -> Result<()> {
        let addr = validate_ip(ip)?.to_string();
        if !is_safe_nft_element(&addr) {
            anyhow::bail!("Refusing unsafe nftables element: {:?}", addr);
        }
        let element = format!("{{ {} }}", addr);
        self.nft(&["add", "element", &set.family, &set.table, &set.name, &element])
            .await?;
        Ok(())
    }

    async fn ingress_chains(&self) -> Result<Vec<ChainRef>> {
        self.chains_with_hook("input").await
    }

    async fn egress_chains(&self) -> Result<Vec<ChainRef>> {
        self.chains_with_hook("output").await
    }

    async fn chain_details(&self, chain: &ChainRef) -> Result<ChainDetails> {
        let output = self
            .nft(&["-j", "list", "chain", &chain.family, &chain.table, &chain.name])
            .await?;
        let found = parse_document(&output)?
            .into_iter()
            .filter_map(|entry| entry.chain)
            .find(|c| c.name == chain.name)
            .with_context(|| format!("chain {} not found", chain))?;

        Ok(ChainDetails {
            family: found.family,
            table: found.table,
            chain: found.name,
        })
    }

    async fn add_set(&self, chain: &ChainDetails, name: &str) -> Result<()> {
        ensure_chain(chain)?;
        ensure_identifier("set", name)?;
        let spec = format!("{{ type {} ; }}", addr_type(&chain.family));
        self.nft(&["add", "set", &chain.family, &chain.table, name, &spec]).await?;
        Ok(())
    }

    async fn add_ingress_rule(&self, chain: &ChainDetails, name: &str) -> Result<()> {
        self.add_rule(chain, name, "saddr").await
    }

    async fn add_egress_rule(&self, chain: &ChainDetails, name: &str) -> Result<()> {
        self.add_rule(chain, name, "daddr").await
    }
}
