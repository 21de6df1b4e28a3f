//! Static contract registry.
//!
//! Maps contract address → {symbol, decimals, fungible}. Loaded once at
//! startup — either the compiled-in mainnet table or a TOML override
//! file — and read-only thereafter. Used to enumerate fungible-token
//! detection candidates and to annotate newly discovered tokens.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::types::parse_address;

/// Metadata for one registered contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractMeta {
    pub symbol: String,
    pub decimals: u8,
    /// ERC-20-style balance-bearing contract (vs. an ERC-721 collection).
    pub fungible: bool,
}

/// TOML shape of one registry entry.
#[derive(Debug, Deserialize)]
struct RegistryEntry {
    address: String,
    symbol: String,
    decimals: u8,
    #[serde(default = "default_fungible")]
    fungible: bool,
}

fn default_fungible() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(rename = "contract")]
    contracts: Vec<RegistryEntry>,
}

/// Well-known mainnet contracts compiled into the binary. A registry
/// file replaces (not extends) this table.
const BUILTIN: &[(&str, &str, u8, bool)] = &[
    ("0x6B175474E89094C44Da98b954EedeAC495271d0F", "DAI", 18, true),
    ("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "USDC", 6, true),
    ("0xdAC17F958D2ee523a2206206994597C13D831ec7", "USDT", 6, true),
    ("0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599", "WBTC", 8, true),
    ("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", "WETH", 18, true),
    ("0x514910771AF9Ca656af840dff83E8264EcF986CA", "LINK", 18, true),
    ("0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984", "UNI", 18, true),
    ("0x7Fc66500c84A76Ad7e9c93437bFc5Ac33E2DDaE9", "AAVE", 18, true),
    ("0xD533a949740bb3306d119CC777fa900bA034cd52", "CRV", 18, true),
    ("0x0D8775F648430679A709E98d2b0Cb6250d2887EF", "BAT", 18, true),
    ("0xc00e94Cb662C3520282E6f5717214004A7f26888", "COMP", 18, true),
    ("0x9f8F72aA9304c8B593d555F12eF6589cC3A579A2", "MKR", 18, true),
    ("0x0F5D2fB29fb7d3CFeE444a200298f468908cC942", "MANA", 18, true),
    ("0xBC4CA0EdA7647A8aB7C2061c2E118A18a936f13D", "BAYC", 0, false),
    ("0xb47e3cd837dDF8e4c57F05d70Ab865de6e193BBB", "PUNK", 0, false),
];

/// In-memory registry, injected wherever contract metadata is needed.
/// No hidden global: callers hold an `Arc<ContractRegistry>`.
pub struct ContractRegistry {
    contracts: HashMap<Address, ContractMeta>,
}

impl ContractRegistry {
    /// Build the compiled-in mainnet registry.
    pub fn builtin() -> Self {
        let contracts = BUILTIN
            .iter()
            .filter_map(|(addr, symbol, decimals, fungible)| {
                let address = parse_address(addr).ok()?;
                Some((
                    address,
                    ContractMeta {
                        symbol: symbol.to_string(),
                        decimals: *decimals,
                        fungible: *fungible,
                    },
                ))
            })
            .collect();
        Self { contracts }
    }

    /// Load a registry from a TOML file of `[[contract]]` entries.
    pub fn from_toml_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read registry file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse registry file: {path}"))
    }

    fn from_toml_str(contents: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(contents)?;
        let mut contracts = HashMap::with_capacity(file.contracts.len());
        for entry in file.contracts {
            let address = parse_address(&entry.address)
                .with_context(|| format!("Bad registry address: {}", entry.address))?;
            contracts.insert(
                address,
                ContractMeta {
                    symbol: entry.symbol,
                    decimals: entry.decimals,
                    fungible: entry.fungible,
                },
            );
        }
        Ok(Self { contracts })
    }

    /// Look up metadata for a contract.
    pub fn lookup(&self, address: &Address) -> Option<&ContractMeta> {
        self.contracts.get(address)
    }

    /// Every fungible contract address in the registry, minus the given
    /// already-tracked set. Pure, no failure modes, no side effects.
    pub fn candidate_fungible_tokens(&self, exclude: &HashSet<Address>) -> Vec<Address> {
        self.contracts
            .iter()
            .filter(|(addr, meta)| meta.fungible && !exclude.contains(*addr))
            .map(|(addr, _)| *addr)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
