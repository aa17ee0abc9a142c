//! Process-wide two-tier state store for derived wallet summaries.
//!
//! The ephemeral tier is a short-lived (5-minute) map rebuilt per session;
//! the durable tier is a long-lived (30-day) registry of minimal wallet
//! identity/config, persisted as a single versioned JSON record so a restart
//! can re-resolve a wallet address without a full on-chain re-scan.
//!
//! Expiry is checked lazily on read; there is no background sweep. Writers do
//! not coordinate beyond the lock: entries are address-keyed derived data,
//! and the next expiry-driven re-read heals any transient disagreement.

use crate::config::ClientConfig;
use crate::types::{
    normalize_address, Address, CachedSummary, PersistentWalletInfo, SummarySource, WalletRole,
    WalletSummary,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Schema version of the durable registry record
const REGISTRY_VERSION: u32 = 1;

/// Durable registry record persisted as one namespaced JSON document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryRecord {
    /// Schema version for forward-compatible evolution
    version: u32,
    /// Last time any wallet entry was refreshed
    last_refresh: DateTime<Utc>,
    /// Wallet entries keyed by case-folded owner address
    wallets: HashMap<String, PersistentWalletInfo>,
}

impl RegistryRecord {
    fn empty() -> Self {
        Self {
            version: REGISTRY_VERSION,
            last_refresh: Utc::now(),
            wallets: HashMap::new(),
        }
    }
}

/// Two-tier state store shared across the process
pub struct StateStore {
    /// Ephemeral tier, keyed by case-folded owner address
    ephemeral: RwLock<HashMap<String, CachedSummary>>,
    /// Durable tier
    registry: RwLock<RegistryRecord>,
    /// Ephemeral time-to-live
    ephemeral_ttl: Duration,
    /// Durable time-to-live
    persistent_ttl: Duration,
    /// Where the durable record is persisted; in-memory only when unset
    registry_path: Option<PathBuf>,
}

impl StateStore {
    /// Create a store from config, loading the durable record when a path is
    /// configured.
    pub fn new(config: &ClientConfig) -> Self {
        let registry = match &config.registry_path {
            Some(path) => Self::load_registry(path),
            None => RegistryRecord::empty(),
        };

        Self {
            ephemeral: RwLock::new(HashMap::new()),
            registry: RwLock::new(registry),
            ephemeral_ttl: Duration::seconds(config.ephemeral_ttl_secs as i64),
            persistent_ttl: Duration::seconds(config.persistent_ttl_secs as i64),
            registry_path: config.registry_path.clone(),
        }
    }

    /// Load the durable record from disk; any failure or unknown schema
    /// version starts an empty registry rather than erroring.
    fn load_registry(path: &PathBuf) -> RegistryRecord {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<RegistryRecord>(&raw) {
                Ok(record) if record.version == REGISTRY_VERSION => {
                    info!(
                        "Loaded wallet registry: {} entries",
                        record.wallets.len()
                    );
                    record
                }
                Ok(record) => {
                    warn!(
                        "Unknown registry version {}, starting empty",
                        record.version
                    );
                    RegistryRecord::empty()
                }
                Err(e) => {
                    warn!("Malformed wallet registry, starting empty: {}", e);
                    RegistryRecord::empty()
                }
            },
            Err(_) => RegistryRecord::empty(),
        }
    }

    /// Persist the durable record; failures are logged and never fatal
    fn save_registry(&self, record: &RegistryRecord) {
        let Some(path) = &self.registry_path else {
            return;
        };
        match serde_json::to_string_pretty(record) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("Failed to persist wallet registry: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize wallet registry: {}", e),
        }
    }

    /// Get a cached summary, if present and not expired
    pub fn get(&self, address: &str) -> Option<CachedSummary> {
        self.get_at(address, Utc::now())
    }

    /// Clock-injected read path; expired entries are deleted on access
    pub(crate) fn get_at(&self, address: &str, now: DateTime<Utc>) -> Option<CachedSummary> {
        let key = normalize_address(address);

        let expired = {
            let tier = self.ephemeral.read().unwrap();
            match tier.get(&key) {
                Some(entry) if now < entry.expires_at => return Some(entry.clone()),
                Some(_) => true,
                None => return None,
            }
        };

        if expired {
            debug!("Evicting expired cache entry: {}", key);
            self.ephemeral.write().unwrap().remove(&key);
        }
        None
    }

    /// Write an ephemeral entry; upserts the durable projection whenever the
    /// summary carries a resolved recovery-wallet address.
    pub fn set(&self, address: &str, summary: WalletSummary, role: WalletRole, source: SummarySource) {
        self.set_at(address, summary, role, source, Utc::now())
    }

    /// Clock-injected write path
    pub(crate) fn set_at(
        &self,
        address: &str,
        summary: WalletSummary,
        role: WalletRole,
        source: SummarySource,
        now: DateTime<Utc>,
    ) {
        let key = normalize_address(address);

        if let Some(recovery_wallet) = summary.recovery_wallet.clone() {
            self.set_persistent_at(
                &key,
                PersistentWalletInfo {
                    owner: key.clone(),
                    recovery_wallet,
                    role,
                    source,
                    agent_wallet: summary.agent_wallet.clone(),
                    fallback_wallet: summary.fallback_wallet.clone(),
                    threshold_secs: summary.threshold_secs,
                    active: summary.active,
                    last_updated: now,
                },
                now,
            );
        }

        let entry = CachedSummary {
            summary,
            role,
            source,
            fetched_at: now,
            expires_at: now + self.ephemeral_ttl,
        };
        self.ephemeral.write().unwrap().insert(key, entry);
    }

    /// Remove one ephemeral entry
    pub fn invalidate(&self, address: &str) {
        let key = normalize_address(address);
        debug!("Invalidating cache entry: {}", key);
        self.ephemeral.write().unwrap().remove(&key);
    }

    /// Clear the entire ephemeral tier.
    ///
    /// Used after a governance mutation whose effects must not be served
    /// stale. The durable tier deliberately survives this.
    pub fn invalidate_all(&self) {
        info!("Clearing ephemeral cache tier");
        self.ephemeral.write().unwrap().clear();
    }

    /// Get the durable record for an owner, if present and within the horizon
    pub fn get_persistent(&self, address: &str) -> Option<PersistentWalletInfo> {
        self.get_persistent_at(address, Utc::now())
    }

    /// Clock-injected durable read; stale records are removed on access
    pub(crate) fn get_persistent_at(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Option<PersistentWalletInfo> {
        let key = normalize_address(address);

        let stale = {
            let registry = self.registry.read().unwrap();
            match registry.wallets.get(&key) {
                Some(info) if now - info.last_updated < self.persistent_ttl => {
                    return Some(info.clone())
                }
                Some(_) => true,
                None => return None,
            }
        };

        if stale {
            debug!("Evicting stale registry entry: {}", key);
            let mut registry = self.registry.write().unwrap();
            registry.wallets.remove(&key);
            self.save_registry(&registry);
        }
        None
    }

    /// Upsert a durable record
    pub fn set_persistent(&self, address: &str, info: PersistentWalletInfo) {
        self.set_persistent_at(address, info, Utc::now())
    }

    /// Clock-injected durable write
    pub(crate) fn set_persistent_at(
        &self,
        address: &str,
        info: PersistentWalletInfo,
        now: DateTime<Utc>,
    ) {
        let key = normalize_address(address);
        let mut registry = self.registry.write().unwrap();
        registry.wallets.insert(key, info);
        registry.last_refresh = now;
        self.save_registry(&registry);
    }

    /// Remove a durable record
    pub fn remove_persistent(&self, address: &str) {
        let key = normalize_address(address);
        let mut registry = self.registry.write().unwrap();
        if registry.wallets.remove(&key).is_some() {
            self.save_registry(&registry);
        }
    }

    /// Explicit registry reset; the only bulk clear of the durable tier
    pub fn reset_registry(&self) {
        info!("Resetting durable wallet registry");
        let mut registry = self.registry.write().unwrap();
        *registry = RegistryRecord::empty();
        self.save_registry(&registry);
    }

    /// Number of live (possibly expired) ephemeral entries
    pub fn ephemeral_len(&self) -> usize {
        self.ephemeral.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> StateStore {
        StateStore::new(&ClientConfig::testnet())
    }

    fn summary(recovery_wallet: Option<&str>) -> WalletSummary {
        WalletSummary {
            recovery_wallet: recovery_wallet.map(String::from),
            threshold_secs: 2_592_000,
            randomized: false,
            fallback_wallet: "0x00000000000000000000000000000000000000ff".to_string(),
            agent_wallet: "0x00000000000000000000000000000000000000fe".to_string(),
            active: true,
        }
    }

    const OWNER: &str = "0xABCabcABCabcABCabcABCabcABCabcABCabcABCa";
    const WALLET: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn test_set_then_get_roundtrip() {
        let store = test_store();
        store.set(OWNER, summary(Some(WALLET)), WalletRole::Owner, SummarySource::Contract);

        let cached = store.get(OWNER).expect("entry should be cached");
        assert_eq!(cached.summary.recovery_wallet.as_deref(), Some(WALLET));
        assert_eq!(cached.role, WalletRole::Owner);
        assert_eq!(cached.source, SummarySource::Contract);
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let store = test_store();
        let now = Utc::now();
        store.set_at(OWNER, summary(Some(WALLET)), WalletRole::Owner, SummarySource::Contract, now);

        // Different case, four minutes later: still served
        let later = now + Duration::minutes(4);
        assert!(store
            .get_at(&OWNER.to_ascii_lowercase(), later)
            .is_some());

        // Past the five-minute horizon: lazily evicted
        let expired = now + Duration::minutes(6);
        assert!(store.get_at(OWNER, expired).is_none());
        assert_eq!(store.ephemeral_len(), 0);
    }

    #[test]
    fn test_expired_entry_deleted_on_access() {
        let store = test_store();
        let now = Utc::now();
        store.set_at(OWNER, summary(None), WalletRole::Member, SummarySource::Contract, now);
        assert_eq!(store.ephemeral_len(), 1);

        assert!(store.get_at(OWNER, now + Duration::minutes(10)).is_none());
        assert_eq!(store.ephemeral_len(), 0);
    }

    #[test]
    fn test_durable_tier_is_superset_when_wallet_resolved() {
        let store = test_store();
        store.set(OWNER, summary(Some(WALLET)), WalletRole::Owner, SummarySource::Contract);

        let info = store.get_persistent(OWNER).expect("durable projection");
        assert_eq!(info.recovery_wallet, WALLET);
        assert_eq!(info.role, WalletRole::Owner);
        assert_eq!(info.source, SummarySource::Contract);
        assert_eq!(info.threshold_secs, 2_592_000);
    }

    #[test]
    fn test_no_durable_upsert_without_resolved_wallet() {
        let store = test_store();
        store.set(OWNER, summary(None), WalletRole::None, SummarySource::Contract);
        assert!(store.get_persistent(OWNER).is_none());
    }

    #[test]
    fn test_invalidate_single_key() {
        let store = test_store();
        store.set(OWNER, summary(Some(WALLET)), WalletRole::Owner, SummarySource::Contract);
        store.set(WALLET, summary(None), WalletRole::Member, SummarySource::Contract);

        store.invalidate(OWNER);
        assert!(store.get(OWNER).is_none());
        assert!(store.get(WALLET).is_some());
    }

    #[test]
    fn test_invalidate_all_preserves_durable_tier() {
        let store = test_store();
        store.set(OWNER, summary(Some(WALLET)), WalletRole::Owner, SummarySource::Contract);

        store.invalidate_all();
        assert!(store.get(OWNER).is_none());
        // The durable tier is the fallback used to re-resolve without a scan
        assert!(store.get_persistent(OWNER).is_some());
    }

    #[test]
    fn test_durable_tier_lazy_expiry() {
        let store = test_store();
        let now = Utc::now();
        store.set_at(OWNER, summary(Some(WALLET)), WalletRole::Owner, SummarySource::Contract, now);

        assert!(store.get_persistent_at(OWNER, now + Duration::days(29)).is_some());
        assert!(store.get_persistent_at(OWNER, now + Duration::days(31)).is_none());
        // Deleted on access
        assert!(store.get_persistent_at(OWNER, now).is_none());
    }

    #[test]
    fn test_remove_persistent_and_reset() {
        let store = test_store();
        store.set(OWNER, summary(Some(WALLET)), WalletRole::Owner, SummarySource::Contract);

        store.remove_persistent(OWNER);
        assert!(store.get_persistent(OWNER).is_none());

        store.set(OWNER, summary(Some(WALLET)), WalletRole::Owner, SummarySource::Contract);
        store.reset_registry();
        assert!(store.get_persistent(OWNER).is_none());
    }

    #[test]
    fn test_registry_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("rollback-registry-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("registry.json");

        let config = ClientConfig::testnet().with_registry_path(&path);
        {
            let store = StateStore::new(&config);
            store.set(OWNER, summary(Some(WALLET)), WalletRole::Owner, SummarySource::Contract);
        }

        let reloaded = StateStore::new(&config);
        let info = reloaded.get_persistent(OWNER).expect("survives restart");
        assert_eq!(info.recovery_wallet, WALLET);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_registry_version_starts_empty() {
        let dir = std::env::temp_dir().join(format!("rollback-registry-v-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("registry.json");
        std::fs::write(
            &path,
            r#"{"version": 99, "last_refresh": "2026-01-01T00:00:00Z", "wallets": {}}"#,
        )
        .unwrap();

        let config = ClientConfig::testnet().with_registry_path(&path);
        let store = StateStore::new(&config);
        assert!(store.get_persistent(OWNER).is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
