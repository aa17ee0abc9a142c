//! Common types used across the recovery-wallet coordination client.
//!
//! This module defines the data structures for creation requests, wallet
//! entries, monitored tokens, governance votes, and the derived summaries
//! held by the state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// On-chain account address (0x-prefixed, 40 hex digits, case-insensitive)
pub type Address = String;

/// Transaction hash type
pub type TransactionHash = String;

/// Minimum inactivity threshold accepted by the system (3 days)
pub const MIN_INACTIVITY_THRESHOLD_SECS: u64 = 259_200;

/// Maximum number of member wallets per recovery wallet
pub const MAX_MEMBER_WALLETS: usize = 5;

/// Maximum number of monitored tokens per system
pub const MAX_MONITORED_TOKENS: usize = 3;

/// Fallback vote lifetime used when the chain does not expose an expiration
pub const DEFAULT_VOTE_LIFETIME_SECS: u64 = 7 * 86_400;

/// Case-fold an address for use as a map key.
///
/// On-chain addresses compare case-insensitively, so every keyed lookup in
/// the client goes through this.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Check that an address is well-formed: 0x-prefixed, 40 hex digits
pub fn is_valid_address(address: &str) -> bool {
    let address = address.trim();
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Token kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Fungible token (allowance-based approval)
    Fungible,
    /// Non-fungible token (blanket operator approval)
    NonFungible,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Fungible => write!(f, "fungible"),
            TokenKind::NonFungible => write!(f, "non-fungible"),
        }
    }
}

/// A token under monitoring by the recovery system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredToken {
    /// Token contract address
    pub address: Address,
    /// Token kind
    pub kind: TokenKind,
    /// Whether the token is currently active in the system
    pub active: bool,
}

/// Token selection submitted with a creation proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTokenSpec {
    /// Token contract address
    pub address: Address,
    /// Token kind
    pub kind: TokenKind,
}

/// Form data submitted to propose a recovery-wallet creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationForm {
    /// Member wallets, ordered; 1..=5 entries
    pub member_wallets: Vec<Address>,
    /// Inactivity threshold in seconds; must be at least 3 days
    pub inactivity_threshold_secs: u64,
    /// Tokens to monitor; up to 3
    pub monitored_tokens: Vec<MonitoredTokenSpec>,
    /// Whether rolled-back assets are distributed randomly among members
    pub randomized_distribution: bool,
    /// Fallback wallet receiving assets when no member is eligible
    pub fallback_wallet: Address,
    /// Agent wallet operating the recovery contract
    pub agent_wallet: Address,
}

/// A pending multi-signature creation request as read from chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletCreationRequest {
    /// Request identifier assigned by the contract
    pub request_id: u64,
    /// Address that proposed the creation
    pub proposer: Address,
    /// Member wallets, ordered
    pub member_wallets: Vec<Address>,
    /// Inactivity threshold in seconds
    pub inactivity_threshold_secs: u64,
    /// Tokens to monitor
    pub monitored_tokens: Vec<MonitoredTokenSpec>,
    /// Randomized-distribution flag
    pub randomized_distribution: bool,
    /// Fallback wallet
    pub fallback_wallet: Address,
    /// Agent wallet
    pub agent_wallet: Address,
    /// Addresses that have signed so far (always includes the proposer)
    pub signers: Vec<Address>,
    /// Whether the request has been executed (finalized)
    pub executed: bool,
}

impl WalletCreationRequest {
    /// Number of signatures collected so far
    pub fn signature_count(&self) -> usize {
        self.signers.len()
    }

    /// Number of signatures required to finalize
    pub fn signatures_needed(&self) -> usize {
        self.member_wallets.len()
    }

    /// A request is finalizable once every member wallet has signed
    pub fn can_finalize(&self) -> bool {
        !self.executed && self.signature_count() >= self.signatures_needed()
    }

    /// Whether the given address has already signed this request
    pub fn has_signed(&self, address: &str) -> bool {
        let needle = normalize_address(address);
        self.signers.iter().any(|s| normalize_address(s) == needle)
    }

    /// Whether the given address is one of the member wallets
    pub fn is_member(&self, address: &str) -> bool {
        let needle = normalize_address(address);
        self.member_wallets
            .iter()
            .any(|w| normalize_address(w) == needle)
    }
}

/// Configuration of a deployed recovery wallet, read-only to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackWalletConfig {
    /// Inactivity threshold in seconds
    pub threshold_secs: u64,
    /// Randomized-distribution flag
    pub randomized: bool,
    /// Fallback wallet
    pub fallback_wallet: Address,
    /// Agent wallet
    pub agent_wallet: Address,
    /// Treasury wallet
    pub treasury_wallet: Address,
}

/// A member wallet entry in the recovery system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEntry {
    /// Member wallet address
    pub address: Address,
    /// Unix timestamp of last observed activity
    pub last_activity: u64,
    /// Priority position in the distribution order
    pub priority: u32,
    /// Whether the wallet has been retired from the system
    pub obsolete: bool,
    /// Next wallet in the distribution line, if any
    pub next_in_line: Option<Address>,
}

/// Governance vote kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoteKind {
    /// Change the agent wallet
    AgentChange,
    /// Change the inactivity threshold
    ThresholdChange,
    /// Retire a member wallet (emergency)
    ObsoleteWallet,
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteKind::AgentChange => write!(f, "agent-change"),
            VoteKind::ThresholdChange => write!(f, "threshold-change"),
            VoteKind::ObsoleteWallet => write!(f, "obsolete-wallet"),
        }
    }
}

/// A governance vote as read from chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    /// Position in the on-chain vote list
    pub vote_id: u64,
    /// Vote kind
    pub kind: VoteKind,
    /// Target address (agent wallet or wallet to retire)
    pub target_address: Address,
    /// Target value (new threshold in seconds, when applicable)
    pub target_value: u64,
    /// Address that initiated the vote
    pub initiator: Address,
    /// Approvals counted by the chain
    pub approvals_received: u32,
    /// Unix timestamp at which the vote was created
    pub created_at: u64,
    /// Authoritative expiration timestamp, when the chain exposes one
    pub expires_at: Option<u64>,
    /// Whether the vote has been executed
    pub executed: bool,
}

impl Vote {
    /// Effective expiration: the chain's field when present and non-zero,
    /// otherwise derived as creation time plus the default lifetime.
    pub fn expiration(&self) -> u64 {
        match self.expires_at {
            Some(at) if at > 0 => at,
            _ => self.created_at + DEFAULT_VOTE_LIFETIME_SECS,
        }
    }

    /// Retirement votes carry emergency semantics on every surface
    pub fn is_emergency(&self) -> bool {
        self.kind == VoteKind::ObsoleteWallet
    }
}

/// Displayable vote status derived from chain state and the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteStatus {
    /// Vote is still open for approvals
    Active,
    /// Vote reached its expiration before executing
    Expired,
    /// Vote was executed by the chain
    Executed,
}

/// This session's own action on a vote; informational only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVoteMark {
    /// The user approved the vote in this session
    Approved,
    /// The user rejected the vote in this session
    Rejected,
}

/// Caller's relationship to a recovery wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletRole {
    /// The address owns the recovery wallet
    Owner,
    /// The address is a member wallet
    Member,
    /// No known relationship
    None,
}

/// Where a wallet summary was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    /// Resolved from an authoritative chain read
    Contract,
    /// Resolved from the local durable registry
    Registry,
}

/// Derived summary of a resolved recovery wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSummary {
    /// Recovery-wallet contract address, when resolved
    pub recovery_wallet: Option<Address>,
    /// Inactivity threshold in seconds
    pub threshold_secs: u64,
    /// Randomized-distribution flag
    pub randomized: bool,
    /// Fallback wallet
    pub fallback_wallet: Address,
    /// Agent wallet
    pub agent_wallet: Address,
    /// Whether the recovery wallet is active
    pub active: bool,
}

/// Ephemeral-tier cache record (5-minute horizon)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSummary {
    /// Derived wallet summary
    pub summary: WalletSummary,
    /// Caller's role for this wallet
    pub role: WalletRole,
    /// Where the summary came from
    pub source: SummarySource,
    /// When the summary was fetched
    pub fetched_at: DateTime<Utc>,
    /// When the entry stops being served
    pub expires_at: DateTime<Utc>,
}

/// Durable-tier registry record (30-day horizon)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentWalletInfo {
    /// Owning address (case-folded)
    pub owner: Address,
    /// Recovery-wallet contract address
    pub recovery_wallet: Address,
    /// Caller's role for this wallet
    pub role: WalletRole,
    /// Where the record came from
    pub source: SummarySource,
    /// Agent wallet
    pub agent_wallet: Address,
    /// Fallback wallet
    pub fallback_wallet: Address,
    /// Inactivity threshold in seconds
    pub threshold_secs: u64,
    /// Whether the recovery wallet was active at last refresh
    pub active: bool,
    /// Last time this record was written
    pub last_updated: DateTime<Utc>,
}

/// Transaction status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxStatus {
    /// Transaction is pending inclusion
    Pending,
    /// Transaction was included and succeeded
    Success,
    /// Transaction was included and failed
    Failed,
    /// Transaction not found
    NotFound,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Pending => write!(f, "PENDING"),
            TxStatus::Success => write!(f, "SUCCESS"),
            TxStatus::Failed => write!(f, "FAILED"),
            TxStatus::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}

/// A contract call to be simulated and submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractCall {
    /// Contract address to call
    pub contract: Address,
    /// Function name to invoke
    pub function: String,
    /// Function arguments as JSON values
    pub args: Vec<serde_json::Value>,
    /// Payment attached to the call, in base units
    #[serde(default)]
    pub value: u64,
}

impl ContractCall {
    /// Build a call with no attached payment
    pub fn new(contract: impl Into<Address>, function: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            function: function.into(),
            args: Vec::new(),
            value: 0,
        }
    }

    /// Append an argument
    pub fn arg(mut self, value: serde_json::Value) -> Self {
        self.args.push(value);
        self
    }

    /// Attach a payment
    pub fn with_value(mut self, value: u64) -> Self {
        self.value = value;
        self
    }
}

/// Receipt for a confirmed transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    /// Transaction hash
    pub tx_hash: TransactionHash,
    /// Terminal status
    pub status: TxStatus,
    /// Block in which the transaction was included
    pub block: Option<u64>,
    /// Result value returned by the call, when any
    pub result: Option<serde_json::Value>,
    /// Error message when the transaction failed
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_case::test_case;

    #[test_case("0x1234567890abcdef1234567890ABCDEF12345678", true; "mixed case")]
    #[test_case(" 0x1234567890abcdef1234567890abcdef12345678 ", true; "surrounding whitespace")]
    #[test_case("0x123", false; "too short")]
    #[test_case("1234567890abcdef1234567890abcdef12345678", false; "missing prefix")]
    #[test_case("0x1234567890abcdef1234567890abcdef1234567g", false; "non hex digit")]
    #[test_case("", false; "empty")]
    fn test_address_validation(address: &str, expected: bool) {
        assert_eq!(is_valid_address(address), expected);
    }

    #[test]
    fn test_address_normalization() {
        assert_eq!(
            normalize_address("0xABCdef0000000000000000000000000000000001"),
            "0xabcdef0000000000000000000000000000000001"
        );
        assert_eq!(normalize_address("  0xABC  "), "0xabc");
    }

    fn request_with_signers(members: usize, signers: usize) -> WalletCreationRequest {
        WalletCreationRequest {
            request_id: 1,
            proposer: "0x0000000000000000000000000000000000000001".to_string(),
            member_wallets: (0..members)
                .map(|i| format!("0x{:040x}", i + 1))
                .collect(),
            inactivity_threshold_secs: MIN_INACTIVITY_THRESHOLD_SECS,
            monitored_tokens: vec![],
            randomized_distribution: false,
            fallback_wallet: "0x00000000000000000000000000000000000000ff".to_string(),
            agent_wallet: "0x00000000000000000000000000000000000000fe".to_string(),
            signers: (0..signers).map(|i| format!("0x{:040x}", i + 1)).collect(),
            executed: false,
        }
    }

    #[test]
    fn test_can_finalize_requires_all_signatures() {
        assert!(!request_with_signers(2, 1).can_finalize());
        assert!(request_with_signers(2, 2).can_finalize());
        assert!(request_with_signers(1, 1).can_finalize());
    }

    #[test]
    fn test_executed_request_not_finalizable() {
        let mut request = request_with_signers(2, 2);
        request.executed = true;
        assert!(!request.can_finalize());
    }

    #[test]
    fn test_has_signed_case_insensitive() {
        let request = request_with_signers(2, 1);
        let signer_upper = request.signers[0].to_ascii_uppercase().replace("0X", "0x");
        assert!(request.has_signed(&signer_upper));
        assert!(!request.has_signed("0x00000000000000000000000000000000000000aa"));
    }

    #[test]
    fn test_vote_expiration_prefers_chain_field() {
        let mut vote = Vote {
            vote_id: 0,
            kind: VoteKind::ThresholdChange,
            target_address: "0x0000000000000000000000000000000000000002".to_string(),
            target_value: 864_000,
            initiator: "0x0000000000000000000000000000000000000001".to_string(),
            approvals_received: 0,
            created_at: 1_700_000_000,
            expires_at: Some(1_700_100_000),
            executed: false,
        };
        assert_eq!(vote.expiration(), 1_700_100_000);

        vote.expires_at = None;
        assert_eq!(
            vote.expiration(),
            1_700_000_000 + DEFAULT_VOTE_LIFETIME_SECS
        );

        // A zero from the chain means "not exposed", not "already expired"
        vote.expires_at = Some(0);
        assert_eq!(
            vote.expiration(),
            1_700_000_000 + DEFAULT_VOTE_LIFETIME_SECS
        );
    }

    #[test]
    fn test_emergency_flag() {
        let vote = Vote {
            vote_id: 3,
            kind: VoteKind::ObsoleteWallet,
            target_address: "0x0000000000000000000000000000000000000009".to_string(),
            target_value: 0,
            initiator: "0x0000000000000000000000000000000000000001".to_string(),
            approvals_received: 1,
            created_at: 0,
            expires_at: None,
            executed: false,
        };
        assert!(vote.is_emergency());
    }

    #[test]
    fn test_tx_status_display() {
        assert_eq!(TxStatus::Pending.to_string(), "PENDING");
        assert_eq!(TxStatus::NotFound.to_string(), "NOT_FOUND");
    }

    #[test]
    fn test_contract_call_builder() {
        let call = ContractCall::new("0xabc", "finalizeWalletCreation")
            .arg(serde_json::json!(7))
            .with_value(1_000);
        assert_eq!(call.function, "finalizeWalletCreation");
        assert_eq!(call.args.len(), 1);
        assert_eq!(call.value, 1_000);
    }
}
