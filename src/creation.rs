//! Wallet-creation lifecycle state machine.
//!
//! Drives the multi-step creation workflow: propose, collect member
//! signatures, finalize with the initialization fee, approve monitored
//! tokens, complete. Every transition that submits a transaction runs under
//! a single-flight guard, and every step's precondition is re-validated
//! against a fresh chain read rather than trusted from the step before —
//! other signers may have acted concurrently from other sessions, and the
//! contract, not this client, is the final arbiter.

use crate::error::{RecoveryError, Result};
use crate::mirror::{mirror_best_effort, ConfigMirror, MirrorConfig, MirrorRecord};
use crate::read_gateway::ChainReadGateway;
use crate::store::StateStore;
use crate::types::{
    is_valid_address, normalize_address, Address, ContractCall, CreationForm, SummarySource,
    WalletCreationRequest, WalletRole, WalletSummary, MAX_MEMBER_WALLETS, MAX_MONITORED_TOKENS,
    MIN_INACTIVITY_THRESHOLD_SECS,
};
use crate::write_gateway::ChainWriteGateway;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Steps of the creation workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationStep {
    /// No creation in progress
    Idle,
    /// Propose transaction in flight
    Proposing,
    /// Waiting for the remaining member signatures
    PendingSignatures,
    /// Every member has signed; finalize is available
    ReadyToFinalize,
    /// Finalize transaction in flight
    Finalizing,
    /// Wallet deployed; token approvals outstanding
    ApprovingTokens,
    /// Workflow complete
    Completed,
    /// A confirmed failure; recoverable via `reset_state`
    Error(String),
}

/// Snapshot of the machine's current position
#[derive(Debug, Clone)]
pub struct CreationStatus {
    /// Current step
    pub step: CreationStep,
    /// Request id assigned by the contract, once proposed
    pub request_id: Option<u64>,
    /// Signatures collected, as last observed on chain
    pub signature_count: usize,
    /// Signatures required (member-wallet count)
    pub total_signers_needed: usize,
    /// Deployed recovery-wallet address, once finalized
    pub wallet_address: Option<Address>,
    /// Whether the external mirror accepted the configuration
    pub mirrored: bool,
}

/// Internal mutable state
#[derive(Debug, Clone)]
struct MachineState {
    step: CreationStep,
    request_id: Option<u64>,
    signature_count: usize,
    total_signers_needed: usize,
    wallet_address: Option<Address>,
    form: Option<CreationForm>,
    mirrored: bool,
}

impl MachineState {
    fn idle() -> Self {
        Self {
            step: CreationStep::Idle,
            request_id: None,
            signature_count: 0,
            total_signers_needed: 0,
            wallet_address: None,
            form: None,
            mirrored: false,
        }
    }
}

/// Validate a creation form locally; never touches the network
pub fn validate_form(form: &CreationForm) -> Result<()> {
    if form.member_wallets.is_empty() {
        return Err(RecoveryError::Validation(
            "At least one member wallet is required".to_string(),
        ));
    }
    if form.member_wallets.len() > MAX_MEMBER_WALLETS {
        return Err(RecoveryError::Validation(format!(
            "At most {} member wallets are allowed",
            MAX_MEMBER_WALLETS
        )));
    }
    for wallet in &form.member_wallets {
        if !is_valid_address(wallet) {
            return Err(RecoveryError::Validation(format!(
                "Malformed member wallet address: {:?}",
                wallet
            )));
        }
    }
    if !is_valid_address(&form.fallback_wallet) {
        return Err(RecoveryError::Validation(
            "Malformed fallback wallet address".to_string(),
        ));
    }
    if !is_valid_address(&form.agent_wallet) {
        return Err(RecoveryError::Validation(
            "Malformed agent wallet address".to_string(),
        ));
    }
    if form.inactivity_threshold_secs < MIN_INACTIVITY_THRESHOLD_SECS {
        return Err(RecoveryError::Validation(format!(
            "Inactivity threshold must be at least {} seconds (3 days)",
            MIN_INACTIVITY_THRESHOLD_SECS
        )));
    }
    if form.monitored_tokens.len() > MAX_MONITORED_TOKENS {
        return Err(RecoveryError::Validation(format!(
            "At most {} monitored tokens are allowed",
            MAX_MONITORED_TOKENS
        )));
    }
    for token in &form.monitored_tokens {
        if !is_valid_address(&token.address) {
            return Err(RecoveryError::Validation(format!(
                "Malformed token address: {:?}",
                token.address
            )));
        }
    }
    Ok(())
}

/// State machine coordinating one creation workflow for one session
#[derive(Clone)]
pub struct WalletCreationStateMachine {
    reads: ChainReadGateway,
    writes: ChainWriteGateway,
    store: Arc<StateStore>,
    mirror: Option<Arc<dyn ConfigMirror>>,
    /// Registry contract receiving creation calls
    registry_contract: Address,
    /// Address acting in this session (proposer or signer)
    session_address: Address,
    state: Arc<Mutex<MachineState>>,
    /// Single-flight guard: armed before simulate, cleared on settlement
    in_flight: Arc<AtomicBool>,
}

impl WalletCreationStateMachine {
    /// Create a machine for the given session address
    pub fn new(
        reads: ChainReadGateway,
        writes: ChainWriteGateway,
        store: Arc<StateStore>,
        mirror: Option<Arc<dyn ConfigMirror>>,
        session_address: Address,
    ) -> Self {
        let registry_contract = reads.registry_contract().to_string();
        Self {
            reads,
            writes,
            store,
            mirror,
            registry_contract,
            session_address,
            state: Arc::new(Mutex::new(MachineState::idle())),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Snapshot of the current status
    pub fn status(&self) -> CreationStatus {
        let state = self.state.lock().unwrap();
        CreationStatus {
            step: state.step.clone(),
            request_id: state.request_id,
            signature_count: state.signature_count,
            total_signers_needed: state.total_signers_needed,
            wallet_address: state.wallet_address.clone(),
            mirrored: state.mirrored,
        }
    }

    /// Current step
    pub fn step(&self) -> CreationStep {
        self.state.lock().unwrap().step.clone()
    }

    /// Explicit recovery from `Error` (or abandonment of a flow) back to idle.
    ///
    /// Resets local flags only; an already-submitted transaction cannot be
    /// cancelled on-chain.
    pub fn reset_state(&self) {
        info!("Resetting creation state machine to idle");
        *self.state.lock().unwrap() = MachineState::idle();
        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn set_step(&self, step: CreationStep) {
        self.state.lock().unwrap().step = step;
    }

    fn fail(&self, message: impl Into<String>) -> RecoveryError {
        self.fail_with(RecoveryError::Submission(message.into()))
    }

    /// Land in the `Error` step while preserving the error kind, so callers
    /// can still tell a simulation rejection from a dropped submission
    fn fail_with(&self, error: RecoveryError) -> RecoveryError {
        let message = error.to_string();
        warn!("Creation step failed: {}", message);
        self.set_step(CreationStep::Error(message));
        error
    }

    /// Arm the single-flight guard, or refuse when a submission is in flight
    fn arm(&self) -> Result<()> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| RecoveryError::OperationInFlight)
    }

    /// Clear the guard; called unconditionally on settlement
    fn disarm(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Apply chain-observed signature counts and pick the matching step.
    ///
    /// Local memory is always subordinate to what the chain reports.
    fn apply_request(&self, request: &WalletCreationRequest) {
        let mut state = self.state.lock().unwrap();
        state.request_id = Some(request.request_id);
        state.signature_count = request.signature_count();
        state.total_signers_needed = request.signatures_needed();
        state.step = if request.can_finalize() {
            CreationStep::ReadyToFinalize
        } else {
            CreationStep::PendingSignatures
        };
        debug!(
            "Request {}: {}/{} signatures, step {:?}",
            request.request_id, state.signature_count, state.total_signers_needed, state.step
        );
    }

    /// Propose a recovery-wallet creation.
    ///
    /// Validates locally before any network call; a validation failure leaves
    /// the machine untouched. On confirmation the proposer counts as the
    /// first signature.
    pub async fn propose_creation(&self, form: CreationForm) -> Result<CreationStatus> {
        validate_form(&form)?;

        {
            let state = self.state.lock().unwrap();
            if !matches!(state.step, CreationStep::Idle) {
                return Err(RecoveryError::Validation(format!(
                    "Cannot propose from step {:?}",
                    state.step
                )));
            }
        }

        self.arm()?;
        self.set_step(CreationStep::Proposing);
        info!(
            "Proposing wallet creation: {} members, threshold {}s",
            form.member_wallets.len(),
            form.inactivity_threshold_secs
        );

        let call = ContractCall::new(self.registry_contract.clone(), "proposeWalletCreation")
            .arg(json!({
                "memberWallets": form.member_wallets,
                "inactivityThresholdSecs": form.inactivity_threshold_secs,
                "monitoredTokens": form.monitored_tokens,
                "randomizedDistribution": form.randomized_distribution,
                "fallbackWallet": form.fallback_wallet,
                "agentWallet": form.agent_wallet,
            }));

        let result = self.writes.execute(&call).await;
        self.disarm();

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.fail_with(e)),
        };

        let request_id = receipt
            .result
            .as_ref()
            .and_then(|r| r["requestId"].as_u64())
            .ok_or_else(|| self.fail("Propose confirmed without a request id"))?;

        self.state.lock().unwrap().form = Some(form.clone());

        // Derive the step from a fresh read; fall back to the known shape of
        // a just-confirmed proposal (proposer signed) if the read degrades.
        match self.reads.get_creation_request(request_id).await {
            Ok(Some(request)) => self.apply_request(&request),
            _ => {
                let mut state = self.state.lock().unwrap();
                state.request_id = Some(request_id);
                state.signature_count = 1;
                state.total_signers_needed = form.member_wallets.len();
                state.step = if form.member_wallets.len() > 1 {
                    CreationStep::PendingSignatures
                } else {
                    CreationStep::ReadyToFinalize
                };
            }
        }

        Ok(self.status())
    }

    /// Sign a pending creation request.
    ///
    /// After confirmation the request is re-read and the transition derived
    /// from the fresh signature count, tolerating concurrent signers.
    pub async fn sign_creation(&self, request_id: u64) -> Result<CreationStatus> {
        let request = self
            .reads
            .get_creation_request(request_id)
            .await?
            .ok_or(RecoveryError::RequestNotFound(request_id))?;

        if request.executed {
            return Err(RecoveryError::Validation(format!(
                "Request {} is already finalized",
                request_id
            )));
        }
        if request.has_signed(&self.session_address) {
            return Err(RecoveryError::Validation(format!(
                "{} has already signed request {}",
                self.session_address, request_id
            )));
        }

        self.arm()?;
        info!(
            "Signing creation request {} as {}",
            request_id, self.session_address
        );

        let call = ContractCall::new(self.registry_contract.clone(), "signWalletCreation")
            .arg(json!(request_id));

        let result = self.writes.execute(&call).await;
        self.disarm();

        if let Err(e) = result {
            return Err(self.fail_with(e));
        }

        let refreshed = self
            .reads
            .get_creation_request(request_id)
            .await?
            .ok_or(RecoveryError::RequestNotFound(request_id))?;
        self.apply_request(&refreshed);

        Ok(self.status())
    }

    /// Finalize a fully signed request, paying the initialization fee.
    ///
    /// The precondition is re-validated against a fresh read; the fee is read
    /// at call time and attached to the transaction.
    pub async fn finalize_creation(&self, request_id: u64) -> Result<CreationStatus> {
        let request = self
            .reads
            .get_creation_request(request_id)
            .await?
            .ok_or(RecoveryError::RequestNotFound(request_id))?;

        if !request.can_finalize() {
            return Err(RecoveryError::Validation(format!(
                "Request {} has {}/{} signatures",
                request_id,
                request.signature_count(),
                request.signatures_needed()
            )));
        }

        let fee = self.reads.get_initialization_fee().await?;

        self.arm()?;
        self.set_step(CreationStep::Finalizing);
        info!(
            "Finalizing creation request {} (fee: {})",
            request_id, fee
        );

        let call = ContractCall::new(self.registry_contract.clone(), "finalizeWalletCreation")
            .arg(json!(request_id))
            .with_value(fee);

        let result = self.writes.execute(&call).await;
        self.disarm();

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.fail_with(e)),
        };

        let wallet_address = receipt
            .result
            .as_ref()
            .and_then(|r| r["wallet"].as_str())
            .map(String::from)
            .ok_or_else(|| self.fail("Finalize confirmed without a wallet address"))?;

        info!("Recovery wallet deployed: {}", wallet_address);

        {
            let mut state = self.state.lock().unwrap();
            state.wallet_address = Some(wallet_address.clone());
            state.request_id = Some(request_id);
            state.step = CreationStep::ApprovingTokens;
        }

        // The deployed summary is immediately cacheable for this session.
        // Any member may finalize, so the role follows the proposer check
        // rather than assuming ownership.
        let role = if normalize_address(&request.proposer)
            == normalize_address(&self.session_address)
        {
            WalletRole::Owner
        } else {
            WalletRole::Member
        };
        self.store.set(
            &self.session_address,
            WalletSummary {
                recovery_wallet: Some(wallet_address),
                threshold_secs: request.inactivity_threshold_secs,
                randomized: request.randomized_distribution,
                fallback_wallet: request.fallback_wallet.clone(),
                agent_wallet: request.agent_wallet.clone(),
                active: true,
            },
            role,
            SummarySource::Contract,
        );

        Ok(self.status())
    }

    /// Complete the workflow after token approvals.
    ///
    /// Associates an agent identity and mirrors the configuration to the
    /// external persistence service, both best-effort: a mirror failure is
    /// recorded, never fatal to a flow the chain has already confirmed.
    pub async fn complete_creation(&self) -> Result<CreationStatus> {
        let (wallet_address, form) = {
            let state = self.state.lock().unwrap();
            if state.step != CreationStep::ApprovingTokens {
                return Err(RecoveryError::Validation(format!(
                    "Cannot complete from step {:?}",
                    state.step
                )));
            }
            (state.wallet_address.clone(), state.form.clone())
        };

        let wallet_address = wallet_address.ok_or_else(|| {
            RecoveryError::Validation("No deployed wallet address recorded".to_string())
        })?;

        let agent_wallet_key = format!("agent:{}", normalize_address(&wallet_address));
        debug!("Associated agent identity {}", agent_wallet_key);

        let mirrored = if let Some(form) = form {
            let record = MirrorRecord {
                owner_address: normalize_address(&self.session_address),
                wallet_addresses: form.member_wallets.clone(),
                rollback_config: MirrorConfig {
                    threshold_secs: form.inactivity_threshold_secs,
                    randomized: form.randomized_distribution,
                    fallback_wallet: form.fallback_wallet.clone(),
                    agent_wallet: form.agent_wallet.clone(),
                },
                agent_wallet_key: Some(agent_wallet_key),
            };
            mirror_best_effort(self.mirror.as_deref(), &record).await
        } else {
            // Resumed cross-session flows have no local form to mirror
            debug!("No local form captured, skipping mirror upsert");
            false
        };

        {
            let mut state = self.state.lock().unwrap();
            state.mirrored = mirrored;
            state.step = CreationStep::Completed;
        }

        info!(
            "Creation workflow completed for {} (mirrored: {})",
            wallet_address, mirrored
        );
        Ok(self.status())
    }

    /// Re-enter a workflow discovered from a previous, possibly cross-session
    /// attempt, deriving the step from chain-observed signature counts.
    pub async fn resume_pending(&self, request_id: u64) -> Result<CreationStatus> {
        let request = self
            .reads
            .get_creation_request(request_id)
            .await?
            .ok_or(RecoveryError::RequestNotFound(request_id))?;

        if request.executed {
            return Err(RecoveryError::Validation(format!(
                "Request {} was already finalized",
                request_id
            )));
        }

        info!(
            "Resuming pending creation request {} ({}/{} signatures)",
            request_id,
            request.signature_count(),
            request.signatures_needed()
        );
        self.apply_request(&request);
        Ok(self.status())
    }

    /// Find a pending request this session's address participates in
    pub async fn discover_pending(&self) -> Option<WalletCreationRequest> {
        self.reads
            .get_all_creation_requests()
            .await
            .into_iter()
            .find(|r| !r.executed && r.is_member(&self.session_address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MonitoredTokenSpec, TokenKind};

    fn valid_form(members: usize) -> CreationForm {
        CreationForm {
            member_wallets: (0..members).map(|i| format!("0x{:040x}", i + 1)).collect(),
            inactivity_threshold_secs: 2_592_000,
            monitored_tokens: vec![MonitoredTokenSpec {
                address: format!("0x{:040x}", 0xaa),
                kind: TokenKind::Fungible,
            }],
            randomized_distribution: false,
            fallback_wallet: format!("0x{:040x}", 0xff),
            agent_wallet: format!("0x{:040x}", 0xfe),
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_form() {
        assert!(validate_form(&valid_form(2)).is_ok());
        assert!(validate_form(&valid_form(5)).is_ok());
    }

    #[test]
    fn test_validate_rejects_short_threshold() {
        let mut form = valid_form(2);
        form.inactivity_threshold_secs = MIN_INACTIVITY_THRESHOLD_SECS - 1;
        assert!(matches!(
            validate_form(&form),
            Err(RecoveryError::Validation(_))
        ));

        // Exactly three days is the accepted minimum
        form.inactivity_threshold_secs = MIN_INACTIVITY_THRESHOLD_SECS;
        assert!(validate_form(&form).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_members() {
        let mut form = valid_form(1);
        form.member_wallets.clear();
        assert!(validate_form(&form).is_err());
    }

    #[test]
    fn test_validate_rejects_too_many_members() {
        assert!(validate_form(&valid_form(6)).is_err());
    }

    #[test]
    fn test_validate_rejects_blank_member() {
        let mut form = valid_form(2);
        form.member_wallets[1] = "".to_string();
        assert!(validate_form(&form).is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_fallback() {
        let mut form = valid_form(2);
        form.fallback_wallet = "0x123".to_string();
        assert!(validate_form(&form).is_err());
    }

    #[test]
    fn test_validate_rejects_too_many_tokens() {
        let mut form = valid_form(2);
        form.monitored_tokens = (0..4)
            .map(|i| MonitoredTokenSpec {
                address: format!("0x{:040x}", 0xb0 + i),
                kind: TokenKind::Fungible,
            })
            .collect();
        assert!(validate_form(&form).is_err());
    }
}
