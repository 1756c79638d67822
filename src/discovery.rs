use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::FACTORY_VAR_PREFIX;
use crate::db::IndexStore;
use crate::error::Result;
use crate::hub::ChainClient;

/// Reconciles the factory AA's declared market set against the index.
///
/// Event-triggered, never polled: one pass per hub connection generation
/// (startup after history replay, then every reconnect). A pass that fails
/// half-way self-heals on the next trigger because "known" is defined by the
/// store alone.
pub struct DiscoveryService {
    chain: Arc<dyn ChainClient>,
    store: IndexStore,
    factory_aa: String,
}

impl DiscoveryService {
    pub fn new(chain: Arc<dyn ChainClient>, store: IndexStore, factory_aa: String) -> Self {
        Self { chain, store, factory_aa }
    }

    /// Run one discovery pass per connection generation.
    pub async fn run(self, mut status_rx: watch::Receiver<u64>) {
        loop {
            if *status_rx.borrow_and_update() > 0 {
                // The factory itself is watched so new deployments replay into
                // the local node between passes.
                if let Err(e) = self.chain.watch_address(&self.factory_aa).await {
                    warn!("factory watch registration failed: {e}");
                }
                match self.discover_new_markets().await {
                    Ok(new) if !new.is_empty() => {
                        info!(count = new.len(), "discovery pass onboarded new markets");
                    }
                    Ok(_) => {}
                    Err(e) => error!("discovery pass failed: {e}"),
                }
            }
            if status_rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// One reconciliation pass. Returns the addresses newly onboarded.
    pub async fn discover_new_markets(&self) -> Result<Vec<String>> {
        let factory_vars = self.chain.read_state_vars(&self.factory_aa).await?;

        let candidates: Vec<String> = factory_vars
            .keys()
            .filter_map(|name| name.strip_prefix(FACTORY_VAR_PREFIX))
            .map(String::from)
            .collect();

        let known = self.store.known_addresses().await?;
        let new_markets: Vec<String> = candidates
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|addr| !known.contains(addr))
            .collect();

        if new_markets.is_empty() {
            return Ok(Vec::new());
        }

        // Watch registrations go out concurrently; one address failing must not
        // hold up the rest.
        let watches = new_markets.iter().map(|addr| {
            let chain = Arc::clone(&self.chain);
            async move {
                if let Err(e) = chain.watch_address(addr).await {
                    warn!(address = %addr, "watch registration failed: {e}");
                }
            }
        });
        join_all(watches).await;

        let created_at = now_secs() as i64;
        let mut onboarded = Vec::with_capacity(new_markets.len());
        for addr in new_markets {
            match self.store.insert_market(&addr, created_at).await {
                Ok(()) => onboarded.push(addr),
                // Not retried in-pass: the address stays unknown and
                // re-surfaces as a candidate on the next trigger.
                Err(e) => warn!(address = %addr, "index insert failed: {e}"),
            }
        }

        Ok(onboarded)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::db::store::test_support::memory_store;
    use crate::error::AppError;
    use crate::types::MarketInfo;

    struct MockChain {
        factory_vars: HashMap<String, Value>,
        watched: Mutex<Vec<String>>,
        fail_watch: HashSet<String>,
    }

    impl MockChain {
        fn with_markets(addresses: &[&str]) -> Self {
            let factory_vars = addresses
                .iter()
                .map(|a| (format!("{FACTORY_VAR_PREFIX}{a}"), json!(1)))
                .collect();
            Self { factory_vars, watched: Mutex::new(Vec::new()), fail_watch: HashSet::new() }
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn read_state_vars(&self, _address: &str) -> Result<HashMap<String, Value>> {
            Ok(self.factory_vars.clone())
        }

        async fn watch_address(&self, address: &str) -> Result<()> {
            if self.fail_watch.contains(address) {
                return Err(AppError::Hub(format!("watch refused for {address}")));
            }
            self.watched.lock().unwrap().push(address.to_string());
            Ok(())
        }

        async fn get_market_info(&self, _address: &str) -> Result<MarketInfo> {
            Ok(MarketInfo::default())
        }

        async fn get_hourly_closes(&self, _address: &str, _limit: u32) -> Result<Vec<f64>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn discovers_inserts_and_watches_factory_markets() {
        let store = memory_store().await;
        let chain = Arc::new(MockChain::with_markets(&["AA_A", "AA_B"]));
        let service =
            DiscoveryService::new(Arc::clone(&chain) as Arc<dyn ChainClient>, store.clone(), "FACTORY".to_string());

        let mut onboarded = service.discover_new_markets().await.unwrap();
        onboarded.sort();
        assert_eq!(onboarded, vec!["AA_A", "AA_B"]);

        let known = store.known_addresses().await.unwrap();
        assert!(known.contains("AA_A") && known.contains("AA_B"));

        let mut watched = chain.watched.lock().unwrap().clone();
        watched.sort();
        assert_eq!(watched, vec!["AA_A", "AA_B"]);
    }

    #[tokio::test]
    async fn second_pass_with_unchanged_factory_is_a_noop() {
        let store = memory_store().await;
        let chain = Arc::new(MockChain::with_markets(&["AA_A"]));
        let service =
            DiscoveryService::new(Arc::clone(&chain) as Arc<dyn ChainClient>, store.clone(), "FACTORY".to_string());

        assert_eq!(service.discover_new_markets().await.unwrap().len(), 1);
        assert!(service.discover_new_markets().await.unwrap().is_empty());

        // no duplicate rows either
        assert_eq!(store.known_addresses().await.unwrap().len(), 1);
        // and no duplicate watch registrations
        assert_eq!(chain.watched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn watch_failure_does_not_block_other_candidates() {
        let store = memory_store().await;
        let mut chain = MockChain::with_markets(&["AA_BAD", "AA_GOOD"]);
        chain.fail_watch.insert("AA_BAD".to_string());
        let chain = Arc::new(chain);
        let service =
            DiscoveryService::new(Arc::clone(&chain) as Arc<dyn ChainClient>, store.clone(), "FACTORY".to_string());

        let onboarded = service.discover_new_markets().await.unwrap();
        // both still onboarded into the index; only the watch call failed
        assert_eq!(onboarded.len(), 2);
        assert_eq!(chain.watched.lock().unwrap().as_slice(), ["AA_GOOD"]);
    }

    #[tokio::test]
    async fn non_prefixed_factory_vars_are_ignored() {
        let store = memory_store().await;
        let mut chain = MockChain::with_markets(&["AA_A"]);
        chain.factory_vars.insert("creation_fee".to_string(), json!(5000));
        let service = DiscoveryService::new(
            Arc::new(chain) as Arc<dyn ChainClient>,
            store.clone(),
            "FACTORY".to_string(),
        );

        let onboarded = service.discover_new_markets().await.unwrap();
        assert_eq!(onboarded, vec!["AA_A"]);
    }
}
