//! Node: loads the block index and rebuilds the zerocoin state from it.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use zc_consensus::{CoinDenomination, GroupId, ZerocoinParams};
use zc_state::{ActiveChain, BlockIndex, ChainStateManager};

/// One coin group as reported after the rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub denomination: CoinDenomination,
    pub id: GroupId,
    pub first_height: u32,
    pub last_height: u32,
    pub n_coins: u32,
}

/// Outcome of a node run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    pub height: Option<u32>,
    /// Heights whose cached accumulators were recomputed.
    pub changed_blocks: BTreeSet<u32>,
    /// Self-check verdict, when requested.
    pub self_check: Option<bool>,
    pub groups: Vec<GroupSummary>,
}

pub struct Node {
    config: NodeConfig,
    params: ZerocoinParams,
    shutdown: Arc<AtomicBool>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let params = config.zerocoin_params()?;
        Ok(Self {
            config,
            params,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Ask the running rebuild to stop at the next block boundary.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Load the index, rebuild the tracker and optionally self check.
    pub async fn run(&self) -> Result<NodeReport> {
        let blocks = load_index(&self.config.chain_index)?;
        info!(blocks = blocks.len(), path = ?self.config.chain_index, "Block index loaded");
        let chain = ActiveChain::from_blocks(blocks).context("Block index is not a chain")?;

        let params = self.params.clone();
        let shutdown = self.shutdown_handle();
        let self_check = self.config.self_check;

        let (manager, changed_blocks, verdict) = tokio::task::spawn_blocking(move || {
            let (manager, changes) =
                ChainStateManager::from_index_with_shutdown(params, chain, shutdown)?;
            let verdict = if self_check {
                Some(manager.test_validity()?)
            } else {
                None
            };
            Ok::<_, zc_state::StateError>((manager, changes, verdict))
        })
        .await
        .context("Rebuild task failed")??;

        if verdict == Some(false) {
            warn!("Self check found zerocoin state divergence");
        }

        if let Some(ref path) = self.config.export_index {
            save_index(path, &manager.export_index())?;
            info!(path = ?path, "Block index exported");
        }

        Ok(report(&manager, changed_blocks, verdict))
    }
}

fn report(
    manager: &ChainStateManager,
    changed_blocks: BTreeSet<u32>,
    self_check: Option<bool>,
) -> NodeReport {
    let groups = manager.with_read(|_, zerocoin| {
        CoinDenomination::ALL
            .into_iter()
            .flat_map(|denomination| {
                zerocoin
                    .groups_of(denomination)
                    .map(move |(id, group)| GroupSummary {
                        denomination,
                        id,
                        first_height: group.first_block.height,
                        last_height: group.last_block.height,
                        n_coins: group.n_coins,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    });

    NodeReport {
        height: manager.tip_height(),
        changed_blocks,
        self_check,
        groups,
    }
}

/// Read a JSON block index.
pub fn load_index(path: &Path) -> Result<Vec<BlockIndex>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read block index {}", path.display()))?;
    serde_json::from_str(&content).context("Failed to parse block index")
}

/// Write a JSON block index.
pub fn save_index(path: &Path, blocks: &[BlockIndex]) -> Result<()> {
    let content = serde_json::to_string_pretty(blocks)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write block index {}", path.display()))?;
    Ok(())
}
