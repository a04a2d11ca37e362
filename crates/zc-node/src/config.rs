//! Node configuration.

use crate::Args;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zc_consensus::{Network, ZerocoinParams};

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network whose zerocoin rules apply.
    pub network: Network,
    /// JSON file holding the exported block index, genesis first.
    pub chain_index: PathBuf,
    /// Where to write the index back after accumulators were recalculated.
    #[serde(default)]
    pub export_index: Option<PathBuf>,
    /// Compare the incrementally built state with a fresh rebuild.
    #[serde(default)]
    pub self_check: bool,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Parameter overrides.
    #[serde(default)]
    pub zerocoin: ZerocoinOverrides,
}

/// Optional overrides of the network's zerocoin parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZerocoinOverrides {
    pub coins_per_group: Option<u32>,
    pub mint_confirmations: Option<u32>,
    pub spend_v15_start_height: Option<u32>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parse a network name as accepted on the command line.
pub fn parse_network(name: &str) -> Result<Network> {
    match name.to_lowercase().as_str() {
        "mainnet" => Ok(Network::Mainnet),
        "testnet" => Ok(Network::Testnet),
        "regtest" => Ok(Network::Regtest),
        other => bail!("Unknown network: {other}"),
    }
}

impl NodeConfig {
    /// Load configuration from file and CLI args.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default_for_network(parse_network(&args.network)?)
        };

        // Override with CLI args
        config.network = parse_network(&args.network)?;

        if let Some(ref chain_index) = args.chain_index {
            config.chain_index = chain_index.clone();
        }
        if let Some(ref export) = args.export_index {
            config.export_index = Some(export.clone());
        }
        if args.self_check {
            config.self_check = true;
        }
        if let Some(ref level) = args.log_level {
            config.log_level = level.clone();
        }

        Ok(config)
    }

    /// Create default config for a network.
    pub fn default_for_network(network: Network) -> Self {
        Self {
            network,
            chain_index: PathBuf::from(format!("zc-{network}-index.json")),
            export_index: None,
            self_check: false,
            log_level: default_log_level(),
            zerocoin: ZerocoinOverrides::default(),
        }
    }

    /// Network parameters with the configured overrides applied.
    pub fn zerocoin_params(&self) -> Result<ZerocoinParams> {
        let mut params = ZerocoinParams::for_network(self.network);
        if let Some(n) = self.zerocoin.coins_per_group {
            params.coins_per_group = n;
        }
        if let Some(n) = self.zerocoin.mint_confirmations {
            params.mint_confirmations = n;
        }
        if let Some(h) = self.zerocoin.spend_v15_start_height {
            params.spend_v15_start_height = h;
        }
        params.validate().context("Invalid zerocoin parameters")?;
        Ok(params)
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["zc-node"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default_for_network(Network::Mainnet);
        assert_eq!(config.network, Network::Mainnet);
        assert!(config.chain_index.to_string_lossy().contains("mainnet"));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config =
            NodeConfig::load(&dir.path().join("absent.toml"), &args(&["--network", "testnet"]))
                .unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert!(!config.self_check);
    }

    #[test]
    fn test_load_file_then_cli_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zc-node.toml");

        let mut saved = NodeConfig::default_for_network(Network::Regtest);
        saved.chain_index = PathBuf::from("from-file.json");
        saved.zerocoin.coins_per_group = Some(3);
        saved.save(&path).unwrap();

        let config = NodeConfig::load(
            &path,
            &args(&["--network", "regtest", "--self-check", "--log-level", "debug"]),
        )
        .unwrap();
        assert_eq!(config.chain_index, PathBuf::from("from-file.json"));
        assert!(config.self_check);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.zerocoin_params().unwrap().coins_per_group, 3);

        let config = NodeConfig::load(
            &path,
            &args(&["--network", "regtest", "--chain-index", "cli.json"]),
        )
        .unwrap();
        assert_eq!(config.chain_index, PathBuf::from("cli.json"));
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let mut config = NodeConfig::default_for_network(Network::Regtest);
        config.zerocoin.coins_per_group = Some(0);
        assert!(config.zerocoin_params().is_err());
        assert!(parse_network("devnet").is_err());
    }
}
