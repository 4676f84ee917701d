//! Private token demonstration
//!
//! Provisions an account on every configured node, then runs the token
//! lifecycle privately between the creator and participants while the last
//! node watches from outside the group.

use anyhow::{Context, Result};
use quorum_private_token::{
    run_concurrently, AccountProvisioner, DemoConfig, InMemoryLedger, NodeIdentity, PublicKey, RunReport,
    TransactionRouter, Web3LedgerClient, Web3Provisioner,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

async fn provision<P: AccountProvisioner>(provisioner: &P, config: &DemoConfig) -> Result<Vec<NodeIdentity>> {
    let mut rng = StdRng::from_entropy();
    let mut nodes = Vec::with_capacity(config.nodes.len());
    for node in &config.nodes {
        let identity = provisioner
            .create_account(&node.name, &node.url, PublicKey::new(node.public_key.clone()), &mut rng)
            .await
            .with_context(|| format!("provisioning {}", node.name))?;
        nodes.push(identity);
    }
    Ok(nodes)
}

/// One fresh set of accounts per run
async fn provision_runs<P: AccountProvisioner>(provisioner: &P, config: &DemoConfig) -> Result<Vec<Vec<NodeIdentity>>> {
    let mut sets = Vec::with_capacity(config.runs);
    for run in 0..config.runs {
        log::debug!("provisioning accounts for run {}", run);
        sets.push(provision(provisioner, config).await?);
    }
    Ok(sets)
}

/// Fails fast when a configured node does not answer
async fn check_connections(client: &Web3LedgerClient, config: &DemoConfig) -> Result<()> {
    for node in &config.nodes {
        let version = client
            .client_version(&node.url)
            .await
            .with_context(|| format!("connecting to {} at {}", node.name, node.url))?;
        log::info!("Connected to {} at {}: {}", node.name, node.url, version);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let config = DemoConfig::from_env()?;
    config.validate()?;
    let bytecode = config.load_bytecode()?;

    println!("🔐 Quorum Private Token Demo");
    println!("===========================");
    println!();

    let reports = if config.simulate {
        log::info!("running against the in-memory ledger");
        let ledger = Arc::new(InMemoryLedger::new());
        for node in &config.nodes {
            ledger.register_node(node.url.clone(), PublicKey::new(node.public_key.clone()));
        }
        let node_sets = provision_runs(ledger.as_ref(), &config).await?;
        let router = TransactionRouter::new(ledger, bytecode);
        run_concurrently(router, config.token.clone(), node_sets).await?
    } else {
        let client = Web3LedgerClient::new(config.ledger_config());
        check_connections(&client, &config).await?;
        let node_sets = provision_runs(&Web3Provisioner, &config).await?;
        let router = TransactionRouter::new(Arc::new(client), bytecode);
        run_concurrently(router, config.token.clone(), node_sets).await?
    };

    println!("{}", serde_json::to_string_pretty(&reports)?);

    if reports.iter().all(RunReport::is_successful) {
        println!("✅ All runs completed as expected");
        Ok(())
    } else {
        for report in &reports {
            for violation in &report.violations {
                eprintln!("❌ integrity violation at step {} on {}: {}", violation.step, violation.node, violation.message);
            }
        }
        eprintln!("❌ Demonstration finished with unexpected outcomes");
        std::process::exit(1);
    }
}
