//! Token-approval reconciliation across the (wallet × token) cross-product.
//!
//! For each member wallet and monitored token, reads whether the recovery
//! contract is authorized to move that wallet's holdings: a non-zero
//! allowance for fungible tokens, a blanket operator approval for
//! non-fungible ones. A token counts as approved system-wide when **any**
//! wallet shows approval for it; distribution only needs to move funds from
//! wallets that still hold them. A failed pair read counts as unapproved, so
//! failures bias toward over-warning, never under-warning.

use crate::read_gateway::ChainReadGateway;
use crate::types::{Address, MonitoredToken, TokenKind, WalletEntry};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Approval state of one (wallet, token) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairApproval {
    /// Member wallet address
    pub wallet: Address,
    /// Token contract address
    pub token: Address,
    /// Token kind
    pub kind: TokenKind,
    /// Whether the recovery contract may move this wallet's holdings
    pub approved: bool,
    /// Whether the read failed (the pair is then reported unapproved)
    pub read_failed: bool,
}

/// Aggregated approval state of one monitored token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenApprovalStatus {
    /// Token contract address
    pub token: Address,
    /// Token kind
    pub kind: TokenKind,
    /// Short display label for warning surfaces
    pub label: String,
    /// Approved system-wide (at least one wallet shows approval)
    pub approved: bool,
    /// Number of wallets showing approval
    pub approved_wallets: usize,
}

/// Warning signal prompting the user toward remediation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalWarning {
    /// Whether any monitored token lacks approval
    pub should_warn: bool,
    /// Number of unapproved tokens
    pub unapproved_count: usize,
    /// Labels of the unapproved tokens
    pub unapproved_token_labels: Vec<String>,
}

/// Full reconciliation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalReport {
    /// Per-pair results
    pub pairs: Vec<PairApproval>,
    /// Per-token aggregation
    pub tokens: Vec<TokenApprovalStatus>,
    /// System-wide warning signal
    pub warning: ApprovalWarning,
}

impl ApprovalReport {
    /// Whole-system readiness: every monitored token approved somewhere
    pub fn is_ready(&self) -> bool {
        !self.warning.should_warn
    }
}

/// Short display label for a token address: `0x1234…cdef`.
///
/// Counts characters, not bytes; a malformed non-ASCII address from a bad
/// chain response must not panic a display path.
fn token_label(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    } else {
        address.to_string()
    }
}

/// Aggregate per-pair results into per-token statuses and the warning signal
pub fn aggregate_pairs(pairs: &[PairApproval], tokens: &[MonitoredToken]) -> ApprovalReport {
    let mut statuses = Vec::with_capacity(tokens.len());

    for token in tokens {
        let approved_wallets = pairs
            .iter()
            .filter(|p| p.token == token.address && p.approved)
            .count();

        statuses.push(TokenApprovalStatus {
            token: token.address.clone(),
            kind: token.kind,
            label: token_label(&token.address),
            approved: approved_wallets > 0,
            approved_wallets,
        });
    }

    let unapproved: Vec<String> = statuses
        .iter()
        .filter(|s| !s.approved)
        .map(|s| s.label.clone())
        .collect();

    ApprovalReport {
        pairs: pairs.to_vec(),
        warning: ApprovalWarning {
            should_warn: !unapproved.is_empty(),
            unapproved_count: unapproved.len(),
            unapproved_token_labels: unapproved,
        },
        tokens: statuses,
    }
}

/// Reconciler computing readiness for a resolved recovery wallet
#[derive(Clone)]
pub struct ApprovalReconciler {
    reads: ChainReadGateway,
}

impl ApprovalReconciler {
    /// Create a new reconciler
    pub fn new(reads: ChainReadGateway) -> Self {
        Self { reads }
    }

    /// Read one (wallet, token) pair; a failed read reports unapproved
    async fn read_pair(
        &self,
        recovery_wallet: &str,
        wallet: &str,
        token: &MonitoredToken,
    ) -> PairApproval {
        let outcome = match token.kind {
            TokenKind::Fungible => self
                .reads
                .get_token_allowance(&token.address, wallet, recovery_wallet)
                .await
                .map(|allowance| allowance > 0),
            TokenKind::NonFungible => self
                .reads
                .is_approved_for_all(&token.address, wallet, recovery_wallet)
                .await,
        };

        match outcome {
            Ok(approved) => PairApproval {
                wallet: wallet.to_string(),
                token: token.address.clone(),
                kind: token.kind,
                approved,
                read_failed: false,
            },
            Err(e) => {
                warn!(
                    "Approval read failed for ({}, {}), counting as unapproved: {:?}",
                    wallet, token.address, e
                );
                PairApproval {
                    wallet: wallet.to_string(),
                    token: token.address.clone(),
                    kind: token.kind,
                    approved: false,
                    read_failed: true,
                }
            }
        }
    }

    /// Build the full cross-product and aggregate readiness.
    ///
    /// Obsolete wallets and inactive tokens are excluded from the product;
    /// they no longer participate in distribution.
    pub async fn reconcile(
        &self,
        recovery_wallet: &str,
        wallets: &[WalletEntry],
        tokens: &[MonitoredToken],
    ) -> ApprovalReport {
        let live_wallets: Vec<&WalletEntry> = wallets.iter().filter(|w| !w.obsolete).collect();
        let live_tokens: Vec<MonitoredToken> =
            tokens.iter().filter(|t| t.active).cloned().collect();

        debug!(
            "Reconciling approvals: {} wallets x {} tokens",
            live_wallets.len(),
            live_tokens.len()
        );

        let mut reads = Vec::with_capacity(live_wallets.len() * live_tokens.len());
        for wallet in &live_wallets {
            for token in &live_tokens {
                reads.push(self.read_pair(recovery_wallet, &wallet.address, token));
            }
        }

        let pairs = join_all(reads).await;
        aggregate_pairs(&pairs, &live_tokens)
    }
}
