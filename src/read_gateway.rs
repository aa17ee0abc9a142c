//! Typed read access to the on-chain recovery-registry views.
//!
//! Every read is pure request/response, retried a bounded number of times.
//! Collection and existence reads degrade to empty/`None` when the chain is
//! unreachable so navigation never breaks on a flaky endpoint; reads whose
//! result gates a state transition (creation requests, initialization fee)
//! propagate their error instead.

use crate::config::ClientConfig;
use crate::error::{RecoveryError, Result};
use crate::retry::RetryStrategy;
use crate::rpc::ChainRpcClient;
use crate::types::{
    Address, MonitoredToken, RollbackWalletConfig, Vote, WalletCreationRequest, WalletEntry,
};
use serde_json::{json, Value};
use tracing::warn;

/// Read gateway over the recovery-registry contract views
#[derive(Clone)]
pub struct ChainReadGateway {
    /// RPC transport
    rpc: ChainRpcClient,
    /// Registry contract address
    registry_contract: Address,
    /// Retry strategy for reads
    retry_strategy: RetryStrategy,
}

impl ChainReadGateway {
    /// Create a new read gateway
    pub fn new(rpc: ChainRpcClient, config: &ClientConfig) -> Self {
        Self {
            rpc,
            registry_contract: config.registry_contract.clone(),
            retry_strategy: RetryStrategy::from_config(config),
        }
    }

    /// Issue a contract view call with bounded retry.
    ///
    /// Exhausted retries surface as `RecoveryError::Read` so callers see one
    /// variant for "the chain could not be read", whatever the transport said.
    async fn view(&self, method: &str, mut params: Value) -> Result<Value> {
        params["contract"] = json!(self.registry_contract);
        self.retry_strategy
            .retry(|| self.rpc.call(method, params.clone()))
            .await
            .map_err(|e| RecoveryError::Read(format!("{}: {}", method, e)))
    }

    /// Get the recovery wallet owned by an address, if any
    pub async fn get_user_wallet(&self, owner: &str) -> Option<Address> {
        match self.view("getUserWallet", json!({ "owner": owner })).await {
            Ok(result) => result["wallet"].as_str().map(String::from),
            Err(e) => {
                warn!("getUserWallet degraded to none: {:?}", e);
                None
            }
        }
    }

    /// Whether an address has a recovery wallet, and its address when it does
    pub async fn has_rollback_wallet(&self, owner: &str) -> (bool, Option<Address>) {
        match self
            .view("hasRollbackWallet", json!({ "owner": owner }))
            .await
        {
            Ok(result) => {
                let exists = result["exists"].as_bool().unwrap_or(false);
                let wallet = result["wallet"].as_str().map(String::from);
                (exists, wallet)
            }
            Err(e) => {
                warn!("hasRollbackWallet degraded to false: {:?}", e);
                (false, None)
            }
        }
    }

    /// Get a pending creation request by id.
    ///
    /// Errors propagate: the creation state machine derives transitions from
    /// this read and must not mistake an outage for an absent request.
    pub async fn get_creation_request(&self, id: u64) -> Result<Option<WalletCreationRequest>> {
        let result = self.view("getCreationRequest", json!({ "id": id })).await?;

        if result["request"].is_null() {
            return Ok(None);
        }
        let request = serde_json::from_value(result["request"].clone())
            .map_err(|e| RecoveryError::InvalidResponse(e.to_string()))?;
        Ok(Some(request))
    }

    /// Get all pending creation requests
    pub async fn get_all_creation_requests(&self) -> Vec<WalletCreationRequest> {
        match self.view("getAllCreationRequests", json!({})).await {
            Ok(result) => serde_json::from_value(result["requests"].clone()).unwrap_or_else(|e| {
                warn!("Malformed creation-request list: {}", e);
                Vec::new()
            }),
            Err(e) => {
                warn!("getAllCreationRequests degraded to empty: {:?}", e);
                Vec::new()
            }
        }
    }

    /// Get the fee required to finalize a creation request.
    ///
    /// Errors propagate: finalize must not submit with a guessed payment.
    pub async fn get_initialization_fee(&self) -> Result<u64> {
        let result = self.view("getInitializationFee", json!({})).await?;

        result["fee"].as_u64().ok_or_else(|| {
            RecoveryError::InvalidResponse("Missing fee in response".to_string())
        })
    }

    /// Get the configuration of a deployed recovery wallet
    pub async fn get_system_config(&self, wallet: &str) -> Result<RollbackWalletConfig> {
        let result = self
            .view("getSystemConfig", json!({ "wallet": wallet }))
            .await?;

        serde_json::from_value(result["config"].clone())
            .map_err(|e| RecoveryError::InvalidResponse(e.to_string()))
    }

    /// Get all member-wallet entries of a recovery wallet
    pub async fn get_all_wallets(&self, wallet: &str) -> Vec<WalletEntry> {
        match self.view("getAllWallets", json!({ "wallet": wallet })).await {
            Ok(result) => serde_json::from_value(result["wallets"].clone()).unwrap_or_else(|e| {
                warn!("Malformed wallet list: {}", e);
                Vec::new()
            }),
            Err(e) => {
                warn!("getAllWallets degraded to empty: {:?}", e);
                Vec::new()
            }
        }
    }

    /// Get the tokens monitored by a recovery wallet
    pub async fn get_monitored_tokens(&self, wallet: &str) -> Vec<MonitoredToken> {
        match self
            .view("getMonitoredTokens", json!({ "wallet": wallet }))
            .await
        {
            Ok(result) => serde_json::from_value(result["tokens"].clone()).unwrap_or_else(|e| {
                warn!("Malformed token list: {}", e);
                Vec::new()
            }),
            Err(e) => {
                warn!("getMonitoredTokens degraded to empty: {:?}", e);
                Vec::new()
            }
        }
    }

    /// Get all governance votes of a recovery wallet
    pub async fn get_all_votes(&self, wallet: &str) -> Vec<Vote> {
        match self.view("getAllVotes", json!({ "wallet": wallet })).await {
            Ok(result) => serde_json::from_value(result["votes"].clone()).unwrap_or_else(|e| {
                warn!("Malformed vote list: {}", e);
                Vec::new()
            }),
            Err(e) => {
                warn!("getAllVotes degraded to empty: {:?}", e);
                Vec::new()
            }
        }
    }

    /// Get a fungible token's allowance granted to a spender.
    ///
    /// Errors propagate so the approval reconciler can count the pair as
    /// unapproved rather than silently approved.
    pub async fn get_token_allowance(
        &self,
        token: &str,
        owner: &str,
        spender: &str,
    ) -> Result<u128> {
        let result = self
            .rpc
            .call(
                "getTokenAllowance",
                json!({ "token": token, "owner": owner, "spender": spender }),
            )
            .await?;

        let raw = result["allowance"].as_str().ok_or_else(|| {
            RecoveryError::InvalidResponse("Missing allowance in response".to_string())
        })?;
        raw.parse::<u128>()
            .map_err(|e| RecoveryError::InvalidResponse(format!("Bad allowance value: {}", e)))
    }

    /// Whether an operator holds blanket approval over an owner's collection
    pub async fn is_approved_for_all(
        &self,
        token: &str,
        owner: &str,
        operator: &str,
    ) -> Result<bool> {
        let result = self
            .rpc
            .call(
                "isApprovedForAll",
                json!({ "token": token, "owner": owner, "operator": operator }),
            )
            .await?;

        result["approved"].as_bool().ok_or_else(|| {
            RecoveryError::InvalidResponse("Missing approved in response".to_string())
        })
    }

    /// Get a token balance in base units
    pub async fn get_token_balance(&self, token: &str, owner: &str) -> Result<u128> {
        let result = self
            .rpc
            .call(
                "getTokenBalance",
                json!({ "token": token, "owner": owner }),
            )
            .await?;

        let raw = result["balance"].as_str().ok_or_else(|| {
            RecoveryError::InvalidResponse("Missing balance in response".to_string())
        })?;
        raw.parse::<u128>()
            .map_err(|e| RecoveryError::InvalidResponse(format!("Bad balance value: {}", e)))
    }

    /// Registry contract this gateway reads from
    pub fn registry_contract(&self) -> &str {
        &self.registry_contract
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_gateway_creation() {
        let config = ClientConfig::testnet();
        let rpc = ChainRpcClient::new(&config).unwrap();
        let gateway = ChainReadGateway::new(rpc, &config);
        assert_eq!(gateway.registry_contract(), config.registry_contract);
    }

    // Behavior against a live endpoint is covered by the wiremock suites in
    // tests/integration_tests.rs.
}
