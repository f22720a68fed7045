//! One-shot creation of the drop set and its rules.
//!
//! Runs only when the configured set cannot be listed. The set is created in
//! the table of the first input-hooked filter chain; drop rules are then
//! bound on the input chain and, when one exists, the first output chain.
//! Rule failures are reported but do not stop the run: a populated set
//! without a rule can be fixed by hand, a missing cursor cannot.

use tracing::{error, info, warn};

use crate::enforcer::{ChainDetails, Firewall, SetHandle};
use crate::error::ApibanError;

/// Return a handle to `set_name`, creating the set and its rules if needed.
pub async fn ensure_set<F: Firewall + ?Sized>(
    firewall: &F,
    set_name: &str,
) -> Result<SetHandle, ApibanError> {
    match firewall.list_set(set_name).await {
        Ok(set) => return Ok(set),
        Err(e) => {
            warn!("Cannot verify nftables set {}: {:#}", set_name, e);
            info!("Trying to create set {}", set_name);
        }
    }

    bootstrap(firewall, set_name).await?;

    let set = firewall
        .list_set(set_name)
        .await
        .map_err(|e| {
            error!("Still cannot verify nftables set {}", set_name);
            ApibanError::SetUnavailable {
                set: set_name.to_string(),
                reason: format!("{:#}", e),
            }
        })?;

    info!("{} verified", set);
    Ok(set)
}

/// Create the set and bind the drop rules.
pub async fn bootstrap<F: Firewall + ?Sized>(firewall: &F, set_name: &str) -> Result<(), ApibanError> {
    info!("Attempting to add set and rules");

    let ingress = firewall
        .ingress_chains()
        .await
        .map_err(|e| ApibanError::BootstrapNoChain(format!("{:#}", e)))?;
    let first = ingress
        .first()
        .ok_or_else(|| ApibanError::BootstrapNoChain("no input chain found".to_string()))?;
    info!(
        "Found input chains: {}",
        ingress.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
    );

    let details = firewall
        .chain_details(first)
        .await
        .map_err(|e| ApibanError::BootstrapNoChain(format!("input chain {}: {:#}", first, e)))?;

    info!("Creating set {} in {} {}", set_name, details.table, details.chain);
    firewall
        .add_set(&details, set_name)
        .await
        .map_err(|e| ApibanError::BootstrapSetCreate {
            set: set_name.to_string(),
            reason: format!("{:#}", e),
        })?;

    info!("Creating input rule {} in {} {}", set_name, details.table, details.chain);
    if let Err(e) = firewall.add_ingress_rule(&details, set_name).await {
        report_rule_failure("input", set_name, &details, &e);
    }

    bind_egress(firewall, set_name).await;
    Ok(())
}

/// Bind the egress rule if an output chain exists. Never fails.
async fn bind_egress<F: Firewall + ?Sized>(firewall: &F, set_name: &str) {
    let egress = match firewall.egress_chains().await {
        Ok(chains) => chains,
        Err(e) => {
            warn!("Error finding output chain: {:#}", e);
            return;
        }
    };

    let Some(first) = egress.first() else {
        info!("No output chain found, skipping output rule");
        return;
    };

    let details = match firewall.chain_details(first).await {
        Ok(details) => details,
        Err(e) => {
            warn!("Error finding output chain details for {}: {:#}", first, e);
            return;
        }
    };

    info!("Creating output rule {} in {} {}", set_name, details.table, details.chain);
    if let Err(e) = firewall.add_egress_rule(&details, set_name).await {
        report_rule_failure("output", set_name, &details, &e);
    }
}

fn report_rule_failure(direction: &str, set_name: &str, chain: &ChainDetails, err: &anyhow::Error) {
    warn!(
        "Unable to create {} rule in {} {}: {:#}",
        direction, chain.table, chain.chain, err
    );
    warn!("{} rule failed. Set created though... continuing.", direction);
    warn!("*** PLEASE MANUALLY CREATE A RULE FOR THE {} SET", set_name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcer::mock::{chain, MockFirewall};

    #[tokio::test]
    async fn test_existing_set_is_returned_without_bootstrap() {
        let fw = MockFirewall::new();
        let set = ensure_set(&fw, "apiban").await.unwrap();
        assert_eq!(set.name, "apiban");
        assert_eq!(fw.calls(), vec!["list_set apiban"]);
    }

    #[tokio::test]
    async fn test_bootstrap_ingress_rule_failure_is_not_fatal() {
        let mut fw = MockFirewall::without_set();
        fw.ingress = vec![chain("ip", "filter", "input")];
        fw.fail_ingress_rule = true;

        let set = ensure_set(&fw, "apiban").await.unwrap();
        assert_eq!(set.name, "apiban");
        assert_eq!(
            fw.calls(),
            vec![
                "list_set apiban",
                "ingress_chains",
                "chain_details ip filter input",
                "add_set ip filter apiban",
                "add_ingress_rule input apiban",
                "egress_chains",
                "chain_details inet filter output",
                "add_egress_rule output apiban",
                "list_set apiban",
            ]
        );
    }

    #[tokio::test]
    async fn test_bootstrap_no_ingress_chain() {
        let mut fw = MockFirewall::without_set();
        fw.ingress = vec![];

        let err = ensure_set(&fw, "apiban").await.unwrap_err();
        assert!(matches!(err, ApibanError::BootstrapNoChain(_)));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(fw.count_calls("add_set"), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_set_create_failure() {
        let mut fw = MockFirewall::without_set();
        fw.fail_add_set = true;

        let err = ensure_set(&fw, "apiban").await.unwrap_err();
        assert!(matches!(err, ApibanError::BootstrapSetCreate { .. }));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(fw.count_calls("add_ingress_rule"), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_uses_first_ingress_chain() {
        let mut fw = MockFirewall::without_set();
        fw.ingress = vec![chain("inet", "first", "input"), chain("ip", "second", "INPUT")];

        ensure_set(&fw, "apiban").await.unwrap();
        assert!(fw.calls().contains(&"add_set inet first apiban".to_string()));
        assert_eq!(fw.count_calls("chain_details ip second"), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_without_egress_chain() {
        let mut fw = MockFirewall::without_set();
        fw.egress = vec![];

        ensure_set(&fw, "apiban").await.unwrap();
        assert_eq!(fw.count_calls("add_egress_rule"), 0);
        assert_eq!(fw.count_calls("egress_chains"), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_egress_rule_failure_is_not_fatal() {
        let mut fw = MockFirewall::without_set();
        fw.fail_egress_rule = true;

        assert!(ensure_set(&fw, "apiban").await.is_ok());
        assert_eq!(fw.count_calls("add_egress_rule"), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_reverify_failure() {
        let fw = MockFirewall::without_set();
        // add_set "succeeds" but the set still cannot be listed
        *fw.fail_list.lock().unwrap() = true;

        let err = ensure_set(&fw, "apiban").await.unwrap_err();
        assert!(matches!(err, ApibanError::SetUnavailable { .. }));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(fw.count_calls("list_set"), 2);
    }
}
