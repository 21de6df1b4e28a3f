//! Mock ownership sources for integration testing.
//!
//! Deterministic `BalanceSource` / `CollectibleSource` implementations
//! returning scripted data — all in-memory with no external
//! dependencies, fully controllable from test code.

use alloy_primitives::{Address, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use assetwatch::engine::reconcile::Detector;
use assetwatch::registry::ContractRegistry;
use assetwatch::sources::{ApiCollectible, BalanceSource, CollectibleSource};
use assetwatch::store::MemoryStore;
use assetwatch::types::{parse_address, AccountSnapshot, BalanceMap, ChainId};

pub const OWNER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const DAI: &str = "0x6B175474E89094C44Da98b954EedeAC495271d0F";
pub const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
pub const BAYC: &str = "0xBC4CA0EdA7647A8aB7C2061c2E118A18a936f13D";

pub fn addr(s: &str) -> Address {
    parse_address(s).unwrap()
}

pub fn api_item(contract: &str, token_id: &str) -> ApiCollectible {
    ApiCollectible {
        token_id: token_id.to_string(),
        contract_address: contract.to_string(),
        name: format!("Item {token_id}"),
        description: "integration fixture".to_string(),
        image_url: format!("https://img.example.com/{token_id}.png"),
    }
}

/// Scriptable balance source.
pub struct MockBalanceSource {
    balances: Mutex<BalanceMap>,
    /// If set, all fetches return this error.
    force_error: Mutex<Option<String>>,
}

impl MockBalanceSource {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(BalanceMap::new()),
            force_error: Mutex::new(None),
        }
    }

    pub fn set_balance(&self, contract: &str, amount: u64) {
        self.balances
            .lock()
            .unwrap()
            .insert(addr(contract), U256::from(amount));
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }
}

#[async_trait]
impl BalanceSource for MockBalanceSource {
    async fn fetch_balances(&self, _owner: Address, candidates: &[Address]) -> Result<BalanceMap> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        let table = self.balances.lock().unwrap();
        Ok(candidates
            .iter()
            .filter_map(|c| table.get(c).map(|v| (*c, *v)))
            .collect())
    }
}

/// Scriptable marketplace source.
pub struct MockMarketplace {
    owned: Mutex<Vec<ApiCollectible>>,
    force_error: Mutex<Option<String>>,
}

impl MockMarketplace {
    pub fn new() -> Self {
        Self {
            owned: Mutex::new(Vec::new()),
            force_error: Mutex::new(None),
        }
    }

    pub fn set_owned(&self, items: Vec<ApiCollectible>) {
        *self.owned.lock().unwrap() = items;
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }
}

#[async_trait]
impl CollectibleSource for MockMarketplace {
    async fn fetch_owned(&self, _owner: Address) -> Result<Vec<ApiCollectible>> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        Ok(self.owned.lock().unwrap().clone())
    }
}

/// Fully wired detector over mocks, plus every knob a test needs.
pub struct Harness {
    pub detector: Arc<Detector>,
    pub store: Arc<MemoryStore>,
    pub balances: Arc<MockBalanceSource>,
    pub marketplace: Arc<MockMarketplace>,
    pub account_tx: watch::Sender<AccountSnapshot>,
}

impl Harness {
    /// Detector wired to mock sources with the default owner active on
    /// mainnet.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let balances = Arc::new(MockBalanceSource::new());
        let marketplace = Arc::new(MockMarketplace::new());
        let (account_tx, account_rx) = watch::channel(AccountSnapshot {
            address: Some(addr(OWNER)),
            chain: ChainId::MAINNET,
        });

        let detector = Arc::new(Detector::new(
            Arc::new(ContractRegistry::builtin()),
            balances.clone(),
            marketplace.clone(),
            store.clone(),
            account_rx,
        ));

        Self {
            detector,
            store,
            balances,
            marketplace,
            account_tx,
        }
    }
}
