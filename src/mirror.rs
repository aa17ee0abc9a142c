//! Best-effort mirroring of wallet configuration to an external persistence
//! service.
//!
//! The mirror is a convenience for other surfaces; the chain remains the
//! source of truth. Failures here are logged and reported on their own error
//! channel, and must never roll back or fail an on-chain-confirmed result.

use crate::config::ClientConfig;
use crate::error::{RecoveryError, Result};
use crate::types::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Record upserted into the persistence mirror
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRecord {
    /// Owning address
    pub owner_address: Address,
    /// Member-wallet addresses
    pub wallet_addresses: Vec<Address>,
    /// Rollback configuration snapshot
    pub rollback_config: MirrorConfig,
    /// Agent wallet key/identity
    pub agent_wallet_key: Option<String>,
}

/// Configuration snapshot carried by a mirror record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    /// Inactivity threshold in seconds
    pub threshold_secs: u64,
    /// Randomized-distribution flag
    pub randomized: bool,
    /// Fallback wallet
    pub fallback_wallet: Address,
    /// Agent wallet
    pub agent_wallet: Address,
}

/// Seam for the persistence mirror, so flows can run without one configured
#[async_trait]
pub trait ConfigMirror: Send + Sync {
    /// Upsert a wallet-configuration record, best-effort
    async fn upsert(&self, record: &MirrorRecord) -> Result<()>;
}

/// HTTP-backed mirror posting upserts to a configured endpoint
#[derive(Clone)]
pub struct HttpConfigMirror {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpConfigMirror {
    /// Create a mirror from config; `None` when no endpoint is configured
    pub fn from_config(config: &ClientConfig) -> Result<Option<Self>> {
        let Some(endpoint) = config.mirror_url.clone() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(RecoveryError::Network)?;

        Ok(Some(Self { client, endpoint }))
    }
}

#[async_trait]
impl ConfigMirror for HttpConfigMirror {
    async fn upsert(&self, record: &MirrorRecord) -> Result<()> {
        debug!("Mirroring wallet config for {}", record.owner_address);

        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(|e| RecoveryError::Reconciliation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RecoveryError::Reconciliation(format!(
                "Mirror rejected upsert ({}): {}",
                status, body
            )));
        }

        info!("Mirrored wallet config for {}", record.owner_address);
        Ok(())
    }
}

/// Run a mirror upsert without letting its outcome affect the caller.
///
/// Returns whether the mirror accepted the record; absence of mirroring is
/// recorded, never fatal.
pub async fn mirror_best_effort(
    mirror: Option<&dyn ConfigMirror>,
    record: &MirrorRecord,
) -> bool {
    let Some(mirror) = mirror else {
        debug!("No persistence mirror configured, skipping upsert");
        return false;
    };

    match mirror.upsert(record).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Persistence mirror upsert failed (non-fatal): {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingMirror;

    #[async_trait]
    impl ConfigMirror for FailingMirror {
        async fn upsert(&self, _record: &MirrorRecord) -> Result<()> {
            Err(RecoveryError::Reconciliation("mirror down".to_string()))
        }
    }

    struct AcceptingMirror;

    #[async_trait]
    impl ConfigMirror for AcceptingMirror {
        async fn upsert(&self, _record: &MirrorRecord) -> Result<()> {
            Ok(())
        }
    }

    fn record() -> MirrorRecord {
        MirrorRecord {
            owner_address: "0x0000000000000000000000000000000000000001".to_string(),
            wallet_addresses: vec!["0x0000000000000000000000000000000000000002".to_string()],
            rollback_config: MirrorConfig {
                threshold_secs: 2_592_000,
                randomized: false,
                fallback_wallet: "0x00000000000000000000000000000000000000ff".to_string(),
                agent_wallet: "0x00000000000000000000000000000000000000fe".to_string(),
            },
            agent_wallet_key: Some("agent-key".to_string()),
        }
    }

    #[tokio::test]
    async fn test_mirror_failure_is_not_fatal() {
        assert!(!mirror_best_effort(Some(&FailingMirror), &record()).await);
    }

    #[tokio::test]
    async fn test_mirror_success_reported() {
        assert!(mirror_best_effort(Some(&AcceptingMirror), &record()).await);
    }

    #[tokio::test]
    async fn test_missing_mirror_skips() {
        assert!(!mirror_best_effort(None, &record()).await);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert!(json.get("ownerAddress").is_some());
        assert!(json.get("walletAddresses").is_some());
        assert!(json["rollbackConfig"].get("fallbackWallet").is_some());
    }
}
