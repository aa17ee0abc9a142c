//! Recovery-wallet coordination client.
//!
//! This library coordinates creation and governance of a multi-party,
//! on-chain recovery wallet: a custodial construct guarded by trusted member
//! addresses that, after a configurable inactivity period, transfers
//! monitored assets to fallback destinations. It keeps a client process
//! consistent with slow, eventually-confirmed, multi-step on-chain state
//! while multiple independent signers interact with the same logical
//! workflow from different sessions.
//!
//! # Features
//!
//! - **Creation state machine**: propose → multi-signature collection →
//!   finalize → token approval → completion, with cross-session resume
//! - **Vote lifecycle coordination**: governance proposals, quorum tracking
//!   recomputed from the latest wallet list, optimistic local marks
//!   superseded by authoritative reads
//! - **Simulate-then-submit writes**: every mutation is dry-run first and
//!   submitted with the simulator's exact prepared transaction
//! - **Two-tier state cache**: a 5-minute ephemeral tier plus a 30-day
//!   durable registry that survives restarts
//! - **Approval reconciliation**: per-(wallet, token) authorization checks
//!   aggregated into a remediation warning that only ever over-warns
//! - **Best-effort mirroring**: external persistence upserts that never fail
//!   an on-chain-confirmed result
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rollback_wallet_client::{ClientConfig, RecoveryClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     rollback_wallet_client::init_tracing();
//!
//!     let config = Arc::new(ClientConfig::testnet());
//!     let client = RecoveryClient::new(config)?;
//!
//!     client.health_check().await?;
//!
//!     if let Some(cached) = client
//!         .resolve_wallet("0x1234567890abcdef1234567890abcdef12345678")
//!         .await
//!     {
//!         println!("Recovery wallet: {:?}", cached.summary.recovery_wallet);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Propose a wallet creation
//!
//! ```rust,no_run
//! use rollback_wallet_client::{ClientConfig, CreationForm, RecoveryClient};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RecoveryClient::new(Arc::new(ClientConfig::testnet()))?;
//! let machine = client.creation_machine("0x1234567890abcdef1234567890abcdef12345678");
//!
//! let form = CreationForm {
//!     member_wallets: vec![
//!         "0x1234567890abcdef1234567890abcdef12345678".to_string(),
//!         "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd".to_string(),
//!     ],
//!     inactivity_threshold_secs: 2_592_000,
//!     monitored_tokens: vec![],
//!     randomized_distribution: false,
//!     fallback_wallet: "0x00000000000000000000000000000000000000ff".to_string(),
//!     agent_wallet: "0x00000000000000000000000000000000000000fe".to_string(),
//! };
//!
//! let status = machine.propose_creation(form).await?;
//! println!("Step: {:?}, request: {:?}", status.step, status.request_id);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod approvals;
pub mod config;
pub mod creation;
pub mod error;
pub mod mirror;
pub mod read_gateway;
pub mod retry;
pub mod rpc;
pub mod store;
pub mod types;
pub mod votes;
pub mod write_gateway;

pub use approvals::{ApprovalReconciler, ApprovalReport, ApprovalWarning, TokenApprovalStatus};
pub use config::{ClientConfig, Network};
pub use creation::{CreationStatus, CreationStep, WalletCreationStateMachine};
pub use error::{RecoveryError, Result};
pub use mirror::{ConfigMirror, HttpConfigMirror, MirrorConfig, MirrorRecord};
pub use read_gateway::ChainReadGateway;
pub use retry::RetryStrategy;
pub use rpc::ChainRpcClient;
pub use store::StateStore;
pub use types::{
    Address, CachedSummary, ContractCall, CreationForm, ExecutionReceipt, MonitoredToken,
    MonitoredTokenSpec, PersistentWalletInfo, RollbackWalletConfig, SummarySource, TokenKind,
    TransactionHash, TxStatus, UserVoteMark, Vote, VoteKind, VoteStatus, WalletCreationRequest,
    WalletEntry, WalletRole, WalletSummary,
};
pub use votes::{VoteLifecycleCoordinator, VoteView};
pub use write_gateway::ChainWriteGateway;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use types::{normalize_address, SummarySource as Source};

/// Initialize tracing from the environment filter, defaulting to `info`
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Main client combining gateways, the state store, and the workflow
/// coordinators into a single unified interface.
///
/// This is the primary entry point for consuming presentation layers.
#[derive(Clone)]
pub struct RecoveryClient {
    /// Read gateway
    reads: ChainReadGateway,
    /// Write gateway
    writes: ChainWriteGateway,
    /// Shared two-tier state store
    store: Arc<StateStore>,
    /// Optional persistence mirror
    mirror: Option<Arc<HttpConfigMirror>>,
    /// Raw RPC transport
    rpc: ChainRpcClient,
    /// Configuration
    config: Arc<ClientConfig>,
}

impl RecoveryClient {
    /// Create a new recovery client
    pub fn new(config: Arc<ClientConfig>) -> Result<Self> {
        config.validate()?;

        info!(
            "Initializing recovery client for network: {:?}",
            config.network
        );

        let rpc = ChainRpcClient::new(&config)?;
        let reads = ChainReadGateway::new(rpc.clone(), &config);
        let writes = ChainWriteGateway::new(rpc.clone(), &config);
        let store = Arc::new(StateStore::new(&config));
        let mirror = HttpConfigMirror::from_config(&config)?.map(Arc::new);

        Ok(Self {
            reads,
            writes,
            store,
            mirror,
            rpc,
            config,
        })
    }

    /// Get the read gateway
    pub fn reads(&self) -> &ChainReadGateway {
        &self.reads
    }

    /// Get the write gateway
    pub fn writes(&self) -> &ChainWriteGateway {
        &self.writes
    }

    /// Get the shared state store
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Get configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build a creation state machine acting as the given session address
    pub fn creation_machine(&self, session_address: &str) -> WalletCreationStateMachine {
        let mirror = self
            .mirror
            .clone()
            .map(|m| m as Arc<dyn ConfigMirror>);
        WalletCreationStateMachine::new(
            self.reads.clone(),
            self.writes.clone(),
            self.store.clone(),
            mirror,
            session_address.to_string(),
        )
    }

    /// Build a vote coordinator for a resolved recovery wallet
    pub fn vote_coordinator(&self, recovery_wallet: &str) -> VoteLifecycleCoordinator {
        VoteLifecycleCoordinator::new(
            self.reads.clone(),
            self.writes.clone(),
            self.store.clone(),
            recovery_wallet.to_string(),
            Duration::from_millis(self.config.vote_refresh_delay_ms),
        )
    }

    /// Build an approval reconciler
    pub fn approval_reconciler(&self) -> ApprovalReconciler {
        ApprovalReconciler::new(self.reads.clone())
    }

    /// Resolve the recovery wallet for an owner address.
    ///
    /// Read path: ephemeral cache, then chain, then the durable registry as
    /// a fallback that avoids a full on-chain re-scan. Every successful chain
    /// resolution refreshes both tiers.
    pub async fn resolve_wallet(&self, owner: &str) -> Option<CachedSummary> {
        if let Some(cached) = self.store.get(owner) {
            return Some(cached);
        }

        let (exists, wallet) = self.reads.has_rollback_wallet(owner).await;
        if exists {
            if let Some(wallet) = wallet {
                match self.reads.get_system_config(&wallet).await {
                    Ok(config) => {
                        let summary = WalletSummary {
                            recovery_wallet: Some(wallet),
                            threshold_secs: config.threshold_secs,
                            randomized: config.randomized,
                            fallback_wallet: config.fallback_wallet,
                            agent_wallet: config.agent_wallet,
                            active: true,
                        };
                        self.store
                            .set(owner, summary, WalletRole::Owner, Source::Contract);
                        return self.store.get(owner);
                    }
                    Err(e) => {
                        // Fall through to the registry rather than surface a
                        // read failure on a navigation path
                        tracing::warn!("System-config read failed for {}: {:?}", wallet, e);
                    }
                }
            }
        }

        let info = self.store.get_persistent(owner)?;
        let summary = WalletSummary {
            recovery_wallet: Some(info.recovery_wallet.clone()),
            threshold_secs: info.threshold_secs,
            randomized: false,
            fallback_wallet: info.fallback_wallet.clone(),
            agent_wallet: info.agent_wallet.clone(),
            active: info.active,
        };
        self.store
            .set(&normalize_address(owner), summary, info.role, Source::Registry);
        self.store.get(owner)
    }

    /// Build the full approval report for a resolved recovery wallet
    pub async fn approval_report(&self, recovery_wallet: &str) -> ApprovalReport {
        let wallets = self.reads.get_all_wallets(recovery_wallet).await;
        let tokens = self.reads.get_monitored_tokens(recovery_wallet).await;
        self.approval_reconciler()
            .reconcile(recovery_wallet, &wallets, &tokens)
            .await
    }

    /// Health check - verify connectivity to the chain RPC endpoint
    pub async fn health_check(&self) -> Result<bool> {
        self.rpc.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Arc<ClientConfig> {
        Arc::new(
            ClientConfig::testnet()
                .with_request_timeout(Duration::from_secs(10))
                .with_max_read_retries(1),
        )
    }

    #[test]
    fn test_recovery_client_creation() {
        let config = create_test_config();
        let client = RecoveryClient::new(config);
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_config_access() {
        let config = create_test_config();
        let client = RecoveryClient::new(config.clone()).unwrap();
        assert_eq!(client.config().network, config.network);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ClientConfig::testnet();
        config.max_read_retries = 0;

        let result = RecoveryClient::new(Arc::new(config));
        assert!(result.is_err());
    }

    #[test]
    fn test_coordinator_construction() {
        let client = RecoveryClient::new(create_test_config()).unwrap();
        let machine =
            client.creation_machine("0x1234567890abcdef1234567890abcdef12345678");
        assert_eq!(machine.step(), CreationStep::Idle);

        let coordinator =
            client.vote_coordinator("0x1111111111111111111111111111111111111111");
        assert_eq!(
            coordinator.recovery_wallet(),
            "0x1111111111111111111111111111111111111111"
        );
    }
}
