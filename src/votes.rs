//! Governance vote lifecycle coordination.
//!
//! Issues governance proposals (agent change, threshold change, emergency
//! wallet retirement) through the simulate-then-submit gateway and reconciles
//! optimistic local "I voted" marks with the authoritative approval count
//! read from chain. Local marks are purely informational: the next
//! authoritative read supersedes them whenever they disagree.
//!
//! The quorum denominator is the number of non-obsolete member wallets *at
//! read time*; it can change between reads, so it is recomputed from the
//! latest wallet list on every refresh and never cached.

use crate::error::{RecoveryError, Result};
use crate::read_gateway::ChainReadGateway;
use crate::store::StateStore;
use crate::types::{
    is_valid_address, Address, ContractCall, ExecutionReceipt, UserVoteMark, Vote, VoteKind,
    VoteStatus, WalletEntry, MIN_INACTIVITY_THRESHOLD_SECS,
};
use crate::write_gateway::ChainWriteGateway;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Displayable view of a vote after reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteView {
    /// The vote as read from chain
    pub vote: Vote,
    /// Derived status
    pub status: VoteStatus,
    /// Emergency flag (wallet-retirement votes)
    pub is_emergency: bool,
    /// Approvals required for execution, from the latest wallet list
    pub required_approvals: u32,
    /// Whether the chain-counted approvals reached the quorum
    pub ready_to_execute: bool,
    /// This session's own mark, when not contradicted by chain state
    pub user_mark: Option<UserVoteMark>,
}

/// Derive the displayable status of a vote at a given unix time
pub fn derive_status(vote: &Vote, now: u64) -> VoteStatus {
    if vote.executed {
        VoteStatus::Executed
    } else if now >= vote.expiration() {
        VoteStatus::Expired
    } else {
        VoteStatus::Active
    }
}

/// Quorum denominator: the current count of non-obsolete member wallets
pub fn required_approvals(wallets: &[WalletEntry]) -> u32 {
    wallets.iter().filter(|w| !w.obsolete).count() as u32
}

/// Coordinator for the vote lifecycle of one resolved recovery wallet
#[derive(Clone)]
pub struct VoteLifecycleCoordinator {
    reads: ChainReadGateway,
    writes: ChainWriteGateway,
    store: Arc<StateStore>,
    recovery_wallet: Address,
    /// Optimistic local overlay, keyed by vote id
    marks: Arc<Mutex<HashMap<u64, UserVoteMark>>>,
    /// Vote ids observed in the last authoritative read
    known_votes: Arc<Mutex<HashSet<u64>>>,
    /// Vote ids already seen in executed state
    seen_executed: Arc<Mutex<HashSet<u64>>>,
    /// Single-flight guard for this session's write operations
    in_flight: Arc<AtomicBool>,
    /// Delay before the post-confirm authoritative re-read
    refresh_delay: Duration,
}

impl VoteLifecycleCoordinator {
    /// Create a coordinator for a resolved recovery wallet
    pub fn new(
        reads: ChainReadGateway,
        writes: ChainWriteGateway,
        store: Arc<StateStore>,
        recovery_wallet: Address,
        refresh_delay: Duration,
    ) -> Self {
        Self {
            reads,
            writes,
            store,
            recovery_wallet,
            marks: Arc::new(Mutex::new(HashMap::new())),
            known_votes: Arc::new(Mutex::new(HashSet::new())),
            seen_executed: Arc::new(Mutex::new(HashSet::new())),
            in_flight: Arc::new(AtomicBool::new(false)),
            refresh_delay,
        }
    }

    /// Execute a write under the single-flight guard.
    ///
    /// Arming the guard is the only way into the simulate-submit handoff;
    /// it is cleared unconditionally on settlement so a failure never
    /// deadlocks the next attempt.
    async fn execute_guarded(&self, call: ContractCall) -> Result<ExecutionReceipt> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RecoveryError::OperationInFlight);
        }

        let result = self.writes.execute(&call).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    /// Issue a governance vote
    pub async fn request_vote(
        &self,
        kind: VoteKind,
        target_address: &str,
        target_value: u64,
    ) -> Result<ExecutionReceipt> {
        match kind {
            VoteKind::AgentChange | VoteKind::ObsoleteWallet => {
                if !is_valid_address(target_address) {
                    return Err(RecoveryError::Validation(format!(
                        "Malformed target address: {}",
                        target_address
                    )));
                }
            }
            VoteKind::ThresholdChange => {
                if target_value < MIN_INACTIVITY_THRESHOLD_SECS {
                    return Err(RecoveryError::Validation(format!(
                        "Threshold must be at least {} seconds",
                        MIN_INACTIVITY_THRESHOLD_SECS
                    )));
                }
            }
        }

        info!(
            "Requesting {} vote on {} (value: {})",
            kind, self.recovery_wallet, target_value
        );

        let call = ContractCall::new(self.recovery_wallet.clone(), "requestVote")
            .arg(json!(kind))
            .arg(json!(target_address))
            .arg(json!(target_value));

        self.execute_guarded(call).await
    }

    /// Request an agent-wallet change
    pub async fn request_agent_change(&self, new_agent: &str) -> Result<ExecutionReceipt> {
        self.request_vote(VoteKind::AgentChange, new_agent, 0).await
    }

    /// Request an inactivity-threshold change, given in whole days
    pub async fn request_threshold_change(&self, days: u64) -> Result<ExecutionReceipt> {
        let target_value = days * 86_400;
        self.request_vote(VoteKind::ThresholdChange, &self.recovery_wallet, target_value)
            .await
    }

    /// Request emergency retirement of a member wallet
    pub async fn request_wallet_retirement(&self, wallet: &str) -> Result<ExecutionReceipt> {
        self.request_vote(VoteKind::ObsoleteWallet, wallet, 0).await
    }

    /// Confirm (approve or reject) a previously observed vote.
    ///
    /// On success the session records an optimistic mark for immediate
    /// feedback, then schedules a delayed authoritative re-read to let the
    /// chain view catch up.
    pub async fn confirm_vote(&self, vote_id: u64, approve: bool) -> Result<ExecutionReceipt> {
        if !self.known_votes.lock().unwrap().contains(&vote_id) {
            return Err(RecoveryError::Validation(format!(
                "Unknown vote id: {}",
                vote_id
            )));
        }

        info!(
            "Confirming vote {} on {} (approve: {})",
            vote_id, self.recovery_wallet, approve
        );

        let call = ContractCall::new(self.recovery_wallet.clone(), "confirmVote")
            .arg(json!(vote_id))
            .arg(json!(approve));

        let receipt = self.execute_guarded(call).await?;

        let mark = if approve {
            UserVoteMark::Approved
        } else {
            UserVoteMark::Rejected
        };
        self.marks.lock().unwrap().insert(vote_id, mark);

        // Let the chain view catch up, then supersede the optimistic mark
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(coordinator.refresh_delay).await;
            let _ = coordinator.refresh_votes().await;
        });

        Ok(receipt)
    }

    /// Authoritative refresh: re-read votes and wallets, rebuild views, and
    /// discard local marks contradicted by chain state.
    pub async fn refresh_votes(&self) -> Vec<VoteView> {
        let votes = self.reads.get_all_votes(&self.recovery_wallet).await;
        let wallets = self.reads.get_all_wallets(&self.recovery_wallet).await;
        let required = required_approvals(&wallets);
        let now = chrono::Utc::now().timestamp() as u64;

        {
            let mut known = self.known_votes.lock().unwrap();
            known.clear();
            known.extend(votes.iter().map(|v| v.vote_id));
        }

        // A newly executed vote mutated wallet config; stale summaries must
        // not be served past this point.
        let newly_executed: Vec<u64> = {
            let mut seen = self.seen_executed.lock().unwrap();
            votes
                .iter()
                .filter(|v| v.executed && seen.insert(v.vote_id))
                .map(|v| v.vote_id)
                .collect()
        };
        if !newly_executed.is_empty() {
            debug!("Votes newly executed: {:?}", newly_executed);
            self.store.invalidate_all();
        }

        let mut marks = self.marks.lock().unwrap();
        votes
            .into_iter()
            .map(|vote| {
                let status = derive_status(&vote, now);
                // The chain is authoritative; terminal votes drop their mark
                if status != VoteStatus::Active {
                    marks.remove(&vote.vote_id);
                }
                let user_mark = marks.get(&vote.vote_id).copied();
                VoteView {
                    status,
                    is_emergency: vote.is_emergency(),
                    required_approvals: required,
                    ready_to_execute: required > 0 && vote.approvals_received >= required,
                    user_mark,
                    vote,
                }
            })
            .collect()
    }

    /// This session's mark for a vote, if any survives reconciliation
    pub fn user_mark(&self, vote_id: u64) -> Option<UserVoteMark> {
        self.marks.lock().unwrap().get(&vote_id).copied()
    }

    /// The recovery wallet this coordinator governs
    pub fn recovery_wallet(&self) -> &str {
        &self.recovery_wallet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(executed: bool, created_at: u64, expires_at: Option<u64>) -> Vote {
        Vote {
            vote_id: 1,
            kind: VoteKind::ThresholdChange,
            target_address: "0x0000000000000000000000000000000000000002".to_string(),
            target_value: 864_000,
            initiator: "0x0000000000000000000000000000000000000001".to_string(),
            approvals_received: 0,
            created_at,
            expires_at,
            executed,
        }
    }

    fn entry(address: &str, obsolete: bool) -> WalletEntry {
        WalletEntry {
            address: address.to_string(),
            last_activity: 0,
            priority: 0,
            obsolete,
            next_in_line: None,
        }
    }

    #[test]
    fn test_status_executed_wins() {
        let v = vote(true, 1_000, Some(500));
        assert_eq!(derive_status(&v, 2_000), VoteStatus::Executed);
    }

    #[test]
    fn test_status_expired_at_boundary() {
        let v = vote(false, 1_000, Some(2_000));
        assert_eq!(derive_status(&v, 1_999), VoteStatus::Active);
        assert_eq!(derive_status(&v, 2_000), VoteStatus::Expired);
    }

    #[test]
    fn test_status_derived_expiration_without_chain_field() {
        let v = vote(false, 1_000, None);
        let derived_expiry = 1_000 + crate::types::DEFAULT_VOTE_LIFETIME_SECS;
        assert_eq!(derive_status(&v, derived_expiry - 1), VoteStatus::Active);
        assert_eq!(derive_status(&v, derived_expiry), VoteStatus::Expired);
    }

    #[test]
    fn test_required_approvals_counts_non_obsolete_only() {
        let wallets = vec![
            entry("0x01", false),
            entry("0x02", true),
            entry("0x03", false),
        ];
        assert_eq!(required_approvals(&wallets), 2);
    }

    #[test]
    fn test_required_approvals_tracks_latest_list() {
        // The denominator must follow the latest read, not a cached one
        let first = vec![entry("0x01", false), entry("0x02", false), entry("0x03", false)];
        let second = vec![entry("0x01", false), entry("0x02", true), entry("0x03", false)];
        assert_eq!(required_approvals(&first), 3);
        assert_eq!(required_approvals(&second), 2);
    }

    #[test]
    fn test_required_approvals_empty_list() {
        assert_eq!(required_approvals(&[]), 0);
    }
}
