// src/networks.rs
use alloy::primitives::{address, Address, U256};
use serde::Serialize;
use thiserror::Error;

pub const POLYGON: u64 = 137;
pub const POLYGON_MUMBAI: u64 = 80001;
pub const HARDHAT: u64 = 31337;
pub const POLYGON_AMOY: u64 = 80002;
pub const BASE_SEPOLIA: u64 = 84532;
pub const ARBITRUM_SEPOLIA: u64 = 421614;
pub const OPTIMISM_SEPOLIA: u64 = 11155420;
pub const FLOW_EVM_TESTNET: u64 = 545;
pub const CITREA_TESTNET: u64 = 5115;

pub const DEFAULT_CHAIN_ID: u64 = POLYGON;

const HERMES: &str = "https://hermes.pyth.network";

/// Fee recipient used for the production Polygon deployment.
const POLYGON_FEE_RECIPIENT: Address = address!("742d35Cc6634C0532925a3b8D91C92b73b98a2ed");

/// 0.001 ETH in wei.
pub const MIN_ETH_TIP: U256 = U256::from_limbs([1_000_000_000_000_000, 0, 0, 0]);
/// 1 USDC (6 decimals).
pub const MIN_USDC_TIP: U256 = U256::from_limbs([1_000_000, 0, 0, 0]);
/// 10 ETH in wei.
pub const MAX_ETH_TIP: U256 = U256::from_limbs([10_000_000_000_000_000_000, 0, 0, 0]);
/// 10,000 USDC.
pub const MAX_USDC_TIP: U256 = U256::from_limbs([10_000_000_000, 0, 0, 0]);

/// Platform fee in basis points (2.5%).
pub const PLATFORM_FEE_BPS: u32 = 250;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Unsupported network: {0}")]
    Unsupported(u64),
    #[error("No {contract} address configured for chain ID {chain_id}")]
    MissingContract {
        chain_id: u64,
        contract: &'static str,
    },
    #[error("No deploy configuration found for chain ID {0}")]
    NoDeployConfig(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contract {
    TipJar,
    Usdc,
}

impl Contract {
    fn label(self) -> &'static str {
        match self {
            Contract::TipJar => "TipJar",
            Contract::Usdc => "USDC",
        }
    }
}

/// Which TipJar ABI the deployment on a network speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Flavour {
    /// Fees, token allow-list, `CreatorWithdrawal`.
    Full,
    /// No fees, `Withdrawal`.
    Simple,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub key: &'static str,
    pub name: &'static str,
    pub rpc_url: &'static str,
    pub block_explorer: &'static str,
    pub faucet: Option<&'static str>,
    pub native_currency: NativeCurrency,
    /// Zero until the contract is deployed on this network.
    pub tip_jar: Address,
    pub flavour: Flavour,
    pub usdc: Option<Address>,
    pub pyth_endpoint: &'static str,
    pub subgraph_endpoint: &'static str,
}

const MATIC: NativeCurrency = NativeCurrency {
    name: "MATIC",
    symbol: "MATIC",
    decimals: 18,
};

const ETH: NativeCurrency = NativeCurrency {
    name: "ETH",
    symbol: "ETH",
    decimals: 18,
};

pub static NETWORKS: &[NetworkConfig] = &[
    NetworkConfig {
        chain_id: POLYGON,
        key: "polygon",
        name: "Polygon",
        rpc_url: "https://polygon-rpc.com",
        block_explorer: "https://polygonscan.com",
        faucet: None,
        native_currency: MATIC,
        tip_jar: Address::ZERO,
        flavour: Flavour::Full,
        usdc: Some(address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174")),
        pyth_endpoint: HERMES,
        subgraph_endpoint: "https://api.thegraph.com/subgraphs/name/clapcoin/tips-polygon",
    },
    NetworkConfig {
        chain_id: POLYGON_MUMBAI,
        key: "polygonMumbai",
        name: "Polygon Mumbai",
        rpc_url: "https://rpc-mumbai.maticvigil.com",
        block_explorer: "https://mumbai.polygonscan.com",
        faucet: None,
        native_currency: MATIC,
        tip_jar: Address::ZERO,
        flavour: Flavour::Full,
        usdc: Some(address!("326C977E6efc84E512bB9C30f76E30c160eD06FB")),
        pyth_endpoint: HERMES,
        subgraph_endpoint: "https://api.thegraph.com/subgraphs/name/clapcoin/tips-mumbai",
    },
    NetworkConfig {
        chain_id: HARDHAT,
        key: "hardhat",
        name: "Hardhat",
        rpc_url: "http://127.0.0.1:8546",
        block_explorer: "",
        faucet: None,
        native_currency: ETH,
        tip_jar: Address::ZERO,
        flavour: Flavour::Full,
        // mock USDC is deployed per session, so there is no fixed address
        usdc: None,
        pyth_endpoint: HERMES,
        subgraph_endpoint: "",
    },
    NetworkConfig {
        chain_id: POLYGON_AMOY,
        key: "polygonAmoy",
        name: "Polygon Amoy",
        rpc_url: "https://rpc-amoy.polygon.technology",
        block_explorer: "https://amoy.polygonscan.com",
        faucet: Some("https://faucet.polygon.technology/"),
        native_currency: MATIC,
        tip_jar: Address::ZERO,
        flavour: Flavour::Simple,
        usdc: Some(address!("41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582")),
        pyth_endpoint: HERMES,
        subgraph_endpoint: "",
    },
    NetworkConfig {
        chain_id: BASE_SEPOLIA,
        key: "baseSepolia",
        name: "Base Sepolia",
        rpc_url: "https://sepolia.base.org",
        block_explorer: "https://sepolia.basescan.org",
        faucet: Some("https://www.alchemy.com/faucets/base-sepolia"),
        native_currency: ETH,
        tip_jar: Address::ZERO,
        flavour: Flavour::Simple,
        usdc: Some(address!("036CbD53842c5426634e7929541eC2318f3dCF7e")),
        pyth_endpoint: HERMES,
        subgraph_endpoint: "",
    },
    NetworkConfig {
        chain_id: ARBITRUM_SEPOLIA,
        key: "arbitrumSepolia",
        name: "Arbitrum Sepolia",
        rpc_url: "https://sepolia-rollup.arbitrum.io/rpc",
        block_explorer: "https://sepolia.arbiscan.io",
        faucet: Some("https://www.alchemy.com/faucets/arbitrum-sepolia"),
        native_currency: ETH,
        tip_jar: Address::ZERO,
        flavour: Flavour::Simple,
        usdc: Some(address!("75faf114eafb1BDbe2F0316DF893fd58CE46AA4d")),
        pyth_endpoint: HERMES,
        subgraph_endpoint: "",
    },
    NetworkConfig {
        chain_id: OPTIMISM_SEPOLIA,
        key: "optimismSepolia",
        name: "Optimism Sepolia",
        rpc_url: "https://sepolia.optimism.io",
        block_explorer: "https://sepolia-optimism.etherscan.io",
        faucet: Some("https://www.alchemy.com/faucets/optimism-sepolia"),
        native_currency: ETH,
        tip_jar: Address::ZERO,
        flavour: Flavour::Simple,
        usdc: Some(address!("5fd84259d66Cd46123540766Be93DFE6D43130D7")),
        pyth_endpoint: HERMES,
        subgraph_endpoint: "",
    },
    NetworkConfig {
        chain_id: FLOW_EVM_TESTNET,
        key: "flowEVMTestnet",
        name: "Flow EVM Testnet",
        rpc_url: "https://testnet.evm.nodes.onflow.org",
        block_explorer: "https://evm-testnet.flowscan.org",
        faucet: Some("https://testnet-faucet.onflow.org/"),
        native_currency: NativeCurrency {
            name: "FLOW",
            symbol: "FLOW",
            decimals: 18,
        },
        tip_jar: Address::ZERO,
        flavour: Flavour::Simple,
        usdc: None,
        pyth_endpoint: HERMES,
        subgraph_endpoint: "",
    },
    NetworkConfig {
        chain_id: CITREA_TESTNET,
        key: "citreaTestnet",
        name: "Citrea Testnet",
        rpc_url: "https://rpc.testnet.citrea.xyz",
        block_explorer: "https://explorer.testnet.citrea.xyz",
        faucet: None,
        native_currency: NativeCurrency {
            name: "cBTC",
            symbol: "cBTC",
            decimals: 18,
        },
        tip_jar: Address::ZERO,
        flavour: Flavour::Simple,
        usdc: None,
        pyth_endpoint: HERMES,
        subgraph_endpoint: "",
    },
];

impl NetworkConfig {
    /// Explorer link for a transaction, if the network has an explorer.
    pub fn tx_url(&self, tx_hash: &str) -> Option<String> {
        if self.block_explorer.is_empty() {
            return None;
        }
        Some(format!("{}/tx/{}", self.block_explorer, tx_hash))
    }

    pub fn address_url(&self, address: &Address) -> Option<String> {
        if self.block_explorer.is_empty() {
            return None;
        }
        Some(format!("{}/address/{:#x}", self.block_explorer, address))
    }

    /// Fee the deployment skims off each tip, in basis points.
    pub fn platform_fee_bps(&self) -> u32 {
        match self.flavour {
            Flavour::Full => PLATFORM_FEE_BPS,
            Flavour::Simple => 0,
        }
    }

    pub fn summary(&self) -> NetworkSummary {
        NetworkSummary {
            chain_id: self.chain_id,
            key: self.key,
            name: self.name,
            rpc_url: self.rpc_url,
            block_explorer: self.block_explorer,
            faucet: self.faucet,
            native_currency: self.native_currency,
            tip_jar: format!("{:#x}", self.tip_jar),
            flavour: self.flavour,
            platform_fee_bps: self.platform_fee_bps(),
            usdc: self.usdc.map(|a| format!("{:#x}", a)),
        }
    }
}

/// Serializable view of a network for the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSummary {
    pub chain_id: u64,
    pub key: &'static str,
    pub name: &'static str,
    pub rpc_url: &'static str,
    pub block_explorer: &'static str,
    pub faucet: Option<&'static str>,
    pub native_currency: NativeCurrency,
    pub tip_jar: String,
    pub flavour: Flavour,
    pub platform_fee_bps: u32,
    pub usdc: Option<String>,
}

pub fn network_config(chain_id: u64) -> Result<&'static NetworkConfig, NetworkError> {
    NETWORKS
        .iter()
        .find(|n| n.chain_id == chain_id)
        .ok_or(NetworkError::Unsupported(chain_id))
}

pub fn is_supported(chain_id: u64) -> bool {
    NETWORKS.iter().any(|n| n.chain_id == chain_id)
}

pub fn supported_chain_ids() -> Vec<u64> {
    NETWORKS.iter().map(|n| n.chain_id).collect()
}

pub fn contract_address(chain_id: u64, contract: Contract) -> Result<Address, NetworkError> {
    let network = network_config(chain_id)?;
    match contract {
        Contract::TipJar => Ok(network.tip_jar),
        Contract::Usdc => network.usdc.ok_or(NetworkError::MissingContract {
            chain_id,
            contract: contract.label(),
        }),
    }
}

/// USDC address for a network, `None` when the network has no USDC deployment.
pub fn usdc_address(chain_id: u64) -> Result<Option<Address>, NetworkError> {
    Ok(network_config(chain_id)?.usdc)
}

/// Unknown chains use the Polygon endpoint.
pub fn pyth_endpoint(chain_id: u64) -> &'static str {
    network_config(chain_id)
        .or_else(|_| network_config(POLYGON))
        .map(|n| n.pyth_endpoint)
        .unwrap_or(HERMES)
}

pub fn subgraph_endpoint(chain_id: u64) -> &'static str {
    network_config(chain_id)
        .map(|n| n.subgraph_endpoint)
        .unwrap_or("")
}

/// Post-deploy settings for a TipJar deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    pub chain_id: u64,
    pub fee_recipient: Address,
    pub usdc: Option<Address>,
    pub min_eth_tip: U256,
    pub min_usdc_tip: U256,
    /// Local chains skip block explorer verification.
    pub verify: bool,
}

pub fn deploy_config(chain_id: u64, deployer: Address) -> Result<DeployConfig, NetworkError> {
    let (fee_recipient, usdc) = match chain_id {
        POLYGON => (POLYGON_FEE_RECIPIENT, usdc_address(chain_id)?),
        POLYGON_MUMBAI => (deployer, usdc_address(chain_id)?),
        HARDHAT => (deployer, None),
        other => return Err(NetworkError::NoDeployConfig(other)),
    };

    Ok(DeployConfig {
        chain_id,
        fee_recipient,
        usdc,
        min_eth_tip: MIN_ETH_TIP,
        min_usdc_tip: MIN_USDC_TIP,
        verify: chain_id != HARDHAT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_chain_is_an_error() {
        assert_eq!(network_config(1).unwrap_err(), NetworkError::Unsupported(1));
        assert_eq!(
            contract_address(56, Contract::TipJar).unwrap_err(),
            NetworkError::Unsupported(56)
        );
        assert_eq!(usdc_address(10).unwrap_err(), NetworkError::Unsupported(10));
        assert!(!is_supported(1));
    }

    #[test]
    fn lookups_for_known_chains() {
        let polygon = network_config(POLYGON).unwrap();
        assert_eq!(polygon.name, "Polygon");
        assert_eq!(
            contract_address(POLYGON, Contract::Usdc).unwrap(),
            address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174")
        );
        assert_eq!(usdc_address(FLOW_EVM_TESTNET).unwrap(), None);
        assert_eq!(
            contract_address(CITREA_TESTNET, Contract::Usdc).unwrap_err(),
            NetworkError::MissingContract {
                chain_id: CITREA_TESTNET,
                contract: "USDC"
            }
        );
        assert_eq!(supported_chain_ids().len(), NETWORKS.len());
        assert_eq!(polygon.flavour, Flavour::Full);
        assert_eq!(network_config(BASE_SEPOLIA).unwrap().flavour, Flavour::Simple);
    }

    #[test]
    fn endpoints_fall_back() {
        assert_eq!(pyth_endpoint(999_999), HERMES);
        assert_eq!(subgraph_endpoint(999_999), "");
        assert!(subgraph_endpoint(POLYGON).contains("tips-polygon"));
    }

    #[test]
    fn explorer_links() {
        let amoy = network_config(POLYGON_AMOY).unwrap();
        assert_eq!(
            amoy.tx_url("0xabc").as_deref(),
            Some("https://amoy.polygonscan.com/tx/0xabc")
        );
        assert!(network_config(HARDHAT).unwrap().tx_url("0xabc").is_none());

        let creator = address!("00000000000000000000000000000000000000Bb");
        assert_eq!(
            amoy.address_url(&creator).as_deref(),
            Some("https://amoy.polygonscan.com/address/0x00000000000000000000000000000000000000bb")
        );
        assert!(network_config(HARDHAT).unwrap().address_url(&creator).is_none());
    }

    #[test]
    fn fees_follow_the_deployment_flavour() {
        let polygon = network_config(POLYGON).unwrap();
        assert_eq!(polygon.platform_fee_bps(), 250);
        assert_eq!(polygon.summary().platform_fee_bps, PLATFORM_FEE_BPS);
        assert_eq!(network_config(BASE_SEPOLIA).unwrap().platform_fee_bps(), 0);
    }

    #[test]
    fn local_chain_has_no_usdc() {
        assert_eq!(usdc_address(HARDHAT).unwrap(), None);
        assert_eq!(
            contract_address(HARDHAT, Contract::Usdc).unwrap_err(),
            NetworkError::MissingContract {
                chain_id: HARDHAT,
                contract: "USDC"
            }
        );
        assert_eq!(network_config(HARDHAT).unwrap().summary().usdc, None);
    }

    #[test]
    fn deploy_config_per_chain() {
        let deployer = address!("00000000000000000000000000000000000000d1");

        let mainnet = deploy_config(POLYGON, deployer).unwrap();
        assert_eq!(mainnet.fee_recipient, POLYGON_FEE_RECIPIENT);
        assert!(mainnet.usdc.is_some());
        assert!(mainnet.verify);

        let local = deploy_config(HARDHAT, deployer).unwrap();
        assert_eq!(local.fee_recipient, deployer);
        assert_eq!(local.usdc, None);
        assert!(!local.verify);
        assert_eq!(local.min_eth_tip, U256::from(10u64).pow(U256::from(15)));

        assert_eq!(
            deploy_config(BASE_SEPOLIA, deployer).unwrap_err(),
            NetworkError::NoDeployConfig(BASE_SEPOLIA)
        );
    }
}
