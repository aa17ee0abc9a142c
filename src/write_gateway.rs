//! Simulate-then-submit transaction execution.
//!
//! Every mutation goes through the same strictly ordered steps: dry-run the
//! call against current chain state, submit only on simulation success using
//! the exact prepared transaction the simulator returned, then poll for block
//! inclusion. Simulation rejections and submission failures surface as
//! distinct error variants so callers can tell "the contract would reject
//! this" apart from "the network dropped it".
//!
//! This gateway never retries a write and provides no cross-session mutual
//! exclusion; the single-flight guard lives with the caller that owns the
//! logical operation.

use crate::config::ClientConfig;
use crate::error::{RecoveryError, Result};
use crate::rpc::ChainRpcClient;
use crate::types::{ContractCall, ExecutionReceipt, TransactionHash, TxStatus};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Outcome of the simulate step
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    /// Prepared transaction returned by the simulator; submitted verbatim
    pub prepared_tx: String,
    /// Fee estimated by the simulator, in base units
    pub estimated_fee: u64,
}

/// Write gateway executing contract calls against the chain
#[derive(Clone)]
pub struct ChainWriteGateway {
    /// RPC transport
    rpc: ChainRpcClient,
    /// Confirmation polling interval
    poll_interval: Duration,
    /// Confirmation wait timeout
    tx_timeout: Duration,
}

impl ChainWriteGateway {
    /// Create a new write gateway
    pub fn new(rpc: ChainRpcClient, config: &ClientConfig) -> Self {
        Self {
            rpc,
            poll_interval: Duration::from_millis(config.tx_poll_interval_ms),
            tx_timeout: Duration::from_secs(config.tx_timeout_secs),
        }
    }

    /// Dry-run a call against current chain state
    pub async fn simulate(&self, call: &ContractCall) -> Result<SimulationOutcome> {
        info!("Simulating call: {}::{}", call.contract, call.function);

        let params = json!({
            "contract": call.contract,
            "function": call.function,
            "args": call.args,
            "value": call.value.to_string(),
        });

        let result = self.rpc.call("simulateCall", params).await?;

        let success = result["success"].as_bool().unwrap_or(false);
        if !success {
            let message = result["error"]
                .as_str()
                .unwrap_or("Unknown simulation error")
                .to_string();
            warn!("Simulation rejected {}: {}", call.function, message);
            return Err(RecoveryError::Simulation(message));
        }

        let prepared_tx = result["preparedTransaction"]
            .as_str()
            .ok_or_else(|| {
                RecoveryError::InvalidResponse(
                    "Missing preparedTransaction in simulation".to_string(),
                )
            })?
            .to_string();

        let estimated_fee = result["estimatedFee"]
            .as_str()
            .and_then(|f| f.parse::<u64>().ok())
            .unwrap_or(0);

        debug!(
            "Simulation succeeded for {} (estimated fee: {})",
            call.function, estimated_fee
        );

        Ok(SimulationOutcome {
            prepared_tx,
            estimated_fee,
        })
    }

    /// Submit a prepared transaction, exactly once
    pub async fn submit(&self, prepared_tx: &str) -> Result<TransactionHash> {
        info!("Submitting transaction");

        let params = json!({ "transaction": prepared_tx });
        let result = self.rpc.call("submitTransaction", params).await?;

        let hash = result["hash"]
            .as_str()
            .ok_or_else(|| {
                RecoveryError::InvalidResponse("Missing hash in submit response".to_string())
            })?
            .to_string();

        let status = result["status"].as_str().unwrap_or("PENDING");
        info!("Transaction submitted: {} (status: {})", hash, status);

        Ok(hash)
    }

    /// Get the current status and receipt of a transaction
    pub async fn get_transaction(&self, tx_hash: &str) -> Result<ExecutionReceipt> {
        debug!("Fetching transaction: {}", tx_hash);

        let params = json!({ "hash": tx_hash });
        let result = self.rpc.call("getTransaction", params).await?;

        let status_str = result["status"].as_str().ok_or_else(|| {
            RecoveryError::InvalidResponse("Missing status in transaction response".to_string())
        })?;

        let status = match status_str {
            "SUCCESS" => TxStatus::Success,
            "FAILED" => TxStatus::Failed,
            "NOT_FOUND" => {
                return Err(RecoveryError::TransactionNotFound(tx_hash.to_string()))
            }
            _ => TxStatus::Pending,
        };

        Ok(ExecutionReceipt {
            tx_hash: tx_hash.to_string(),
            status,
            block: result["block"].as_u64(),
            result: (!result["result"].is_null()).then(|| result["result"].clone()),
            error: result["error"].as_str().map(String::from),
        })
    }

    /// Poll until the transaction reaches a terminal status or the
    /// configured timeout elapses.
    ///
    /// A stalled transaction cannot be cancelled on-chain; on timeout the
    /// caller only resets its local flags.
    pub async fn await_confirmation(&self, tx_hash: &str) -> Result<ExecutionReceipt> {
        info!(
            "Awaiting confirmation of {} (timeout: {:?})",
            tx_hash, self.tx_timeout
        );

        let start = Instant::now();

        loop {
            if start.elapsed() >= self.tx_timeout {
                warn!("Confirmation wait timed out: {}", tx_hash);
                return Err(RecoveryError::TransactionTimeout(
                    self.tx_timeout.as_secs(),
                ));
            }

            match self.get_transaction(tx_hash).await {
                Ok(receipt) => match receipt.status {
                    TxStatus::Success => {
                        info!("Transaction confirmed: {}", tx_hash);
                        return Ok(receipt);
                    }
                    TxStatus::Failed => {
                        let message = receipt
                            .error
                            .clone()
                            .unwrap_or_else(|| "Transaction failed".to_string());
                        warn!("Transaction failed: {} ({})", tx_hash, message);
                        return Err(RecoveryError::Submission(message));
                    }
                    TxStatus::Pending | TxStatus::NotFound => {
                        debug!("Transaction still pending: {}", tx_hash);
                    }
                },
                Err(RecoveryError::TransactionNotFound(_)) => {
                    debug!("Transaction not yet in a block: {}", tx_hash);
                }
                Err(e) => {
                    // Transient read failures while polling are not terminal
                    debug!("Error polling transaction: {:?}", e);
                }
            }

            sleep(self.poll_interval).await;
        }
    }

    /// Execute a call end to end: simulate, submit the prepared transaction,
    /// await confirmation.
    pub async fn execute(&self, call: &ContractCall) -> Result<ExecutionReceipt> {
        let simulation = self.simulate(call).await?;
        let hash = self.submit(&simulation.prepared_tx).await?;
        self.await_confirmation(&hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_gateway_creation() {
        let config = ClientConfig::testnet().with_tx_config(250, 15);
        let rpc = ChainRpcClient::new(&config).unwrap();
        let gateway = ChainWriteGateway::new(rpc, &config);
        assert_eq!(gateway.poll_interval, Duration::from_millis(250));
        assert_eq!(gateway.tx_timeout, Duration::from_secs(15));
    }

    // Simulate/submit/confirm ordering is covered end to end by the wiremock
    // suites in tests/integration_tests.rs.
}
