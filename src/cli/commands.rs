//! CLI commands for the chain
//!
//! Implements all command handlers for the CLI interface.

use crate::config::{ChainOptions, Network};
use crate::core::{Address, Block, Chain, KeyVerifier};
use crate::covenant::Sha256NameHasher;
use crate::mining::{BlockAssembler, Mempool};
use crate::storage::{FileStore, StorageConfig};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub chain: Chain,
    pub mempool: Mempool,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open the chain stored in `data_dir`, creating it if needed
    pub fn new(data_dir: PathBuf, network: Network) -> CliResult<Self> {
        let store = FileStore::open(StorageConfig::in_dir(&data_dir))?;
        let chain = Chain::open(
            ChainOptions::new(network),
            Box::new(store),
            Arc::new(KeyVerifier),
            Arc::new(Sha256NameHasher),
        )?;

        Ok(Self {
            chain,
            mempool: Mempool::default(),
            data_dir,
        })
    }
}

/// Display chain info
pub fn cmd_info(state: &AppState) -> CliResult<()> {
    let chain = &state.chain;
    let tip = chain.tip();

    println!("⛓️  Chain Info ({})", chain.network());
    println!("   ├─ Data directory: {:?}", state.data_dir);
    println!("   ├─ Height: {}", tip.height);
    println!("   ├─ Tip: {}", tip.block_hash);
    println!("   ├─ Chain work: {}", tip.chain_work);
    println!("   ├─ Names: {}", chain.name_count());
    println!("   ├─ Tree root: {}", chain.tree_root());
    println!(
        "   └─ Pending tree updates: {}",
        chain.pending_tree_updates()
    );

    Ok(())
}

/// Connect blocks from a JSON file, reorganizing if they fork the main chain
pub fn cmd_import(state: &mut AppState, path: &Path) -> CliResult<()> {
    let reader = BufReader::new(fs::File::open(path)?);
    let blocks: Vec<Block> = serde_json::from_reader(reader)?;

    let fresh: Vec<Block> = blocks
        .into_iter()
        .filter(|block| state.chain.height_of(&block.hash()).is_none())
        .collect();
    let Some(first) = fresh.first() else {
        println!("📭 No new blocks in {:?}", path);
        return Ok(());
    };

    let fork_height = state
        .chain
        .height_of(&first.header.prev_hash)
        .ok_or("first new block does not attach to the main chain")?;

    if fork_height == state.chain.height() {
        for block in &fresh {
            let outcome = state.chain.connect_block(block)?;
            println!(
                "   #{} | {} | {} tx",
                outcome.height,
                outcome.hash.short(),
                block.transactions.len()
            );
        }
    } else {
        let outcome = state.chain.reorganize(fork_height, &fresh)?;
        println!(
            "🔀 Reorganized at height {}: {} blocks replaced by {}",
            outcome.fork_height,
            outcome.disconnected.len(),
            outcome.connected.len()
        );
    }

    println!("📥 Imported from {:?}", path);
    println!("   Height: {}", state.chain.height());
    Ok(())
}

/// Show the state of a name
pub fn cmd_name(state: &AppState, name: &str) -> CliResult<()> {
    let name_hash = state.chain.hash_name(name.as_bytes());
    println!("🏷️  {} ({})", name, name_hash);

    let Some(info) = state.chain.name_info(&name_hash) else {
        println!("   Not found: the name is available to open");
        return Ok(());
    };

    let ns = &info.state;
    println!("   ├─ Phase: {}", info.phase);
    println!("   ├─ Opened at: {}", ns.height);
    println!("   ├─ Registered: {}", ns.registered);
    println!("   ├─ Owner: {}", ns.owner);
    println!("   ├─ Price: {}", ns.value);
    println!("   ├─ Highest bid: {}", ns.highest);
    println!("   ├─ Renewals: {}", ns.renewals);
    println!("   ├─ Data: {}", hex::encode(&ns.data));
    if let Some(transfer) = &ns.transfer {
        println!(
            "   ├─ Transferring to {} since {}",
            transfer.address, transfer.height
        );
    }
    if let Some(revoked) = ns.revoked {
        println!("   ├─ Revoked at: {}", revoked);
    }
    if info.expired {
        println!("   └─ Expired");
    } else {
        println!("   └─ Expires at: {}", info.expires_at);
    }

    Ok(())
}

/// Show the balance of an address
pub fn cmd_balance(state: &AppState, address: &str) -> CliResult<()> {
    let address = Address::from_str(address)?;
    let balance = state.chain.balance(&address);
    let coins = state.chain.coins_for(&address);

    println!("💰 Balance for {}", address);
    println!("   Spendable: {}", balance.spendable);
    println!("   Locked: {}", balance.locked);
    println!("   Coins: {}", coins.len());

    if !coins.is_empty() {
        println!("\n   Transaction outputs:");
        for (outpoint, coin) in coins.iter().take(10) {
            println!(
                "   └─ {} = {} ({})",
                outpoint, coin.value, coin.covenant.kind
            );
        }
        if coins.len() > 10 {
            println!("   ... and {} more", coins.len() - 10);
        }
    }

    Ok(())
}

/// List tree commitments
pub fn cmd_roots(state: &AppState, count: usize) -> CliResult<()> {
    let commitments: Vec<_> = state.chain.commitments().collect();

    println!("🌳 Tree commitments:");
    for commitment in commitments.iter().rev().take(count) {
        println!(
            "   #{} | {} | block {}",
            commitment.height,
            commitment.root,
            commitment.block_hash.short()
        );
    }

    Ok(())
}

/// Disconnect blocks from the tip
pub fn cmd_rollback(state: &mut AppState, blocks: u32) -> CliResult<()> {
    println!("⏪ Rolling back {} block(s)", blocks);

    for _ in 0..blocks {
        let height = state.chain.height();
        let block = state.chain.disconnect_tip()?;
        println!("   #{} | {} disconnected", height, block.hash().short());
    }

    println!("   Height: {}", state.chain.height());
    Ok(())
}

/// Assemble and connect empty-pool blocks paying `address`
pub fn cmd_mine(state: &mut AppState, address: &str, count: u32) -> CliResult<()> {
    let address = Address::from_str(address)?;
    let bits = state.chain.network().genesis_bits();
    let assembler = BlockAssembler::new(address.clone(), bits);

    println!("⛏️  Assembling {} block(s) for {}", count, address);

    for _ in 0..count {
        let time = chrono::Utc::now().timestamp() as u64;
        let (block, stats) = assembler.assemble(&state.chain, &state.mempool, time)?;
        let outcome = state.chain.connect_block(&block)?;
        state.mempool.add_block(&block, &state.chain);

        println!("\n   Block {} connected!", outcome.height);
        println!("   ├─ Hash: {}", outcome.hash.short());
        println!("   ├─ Transactions: {}", stats.included + 1);
        if let Some(commitment) = &outcome.commitment {
            println!("   ├─ Tree root: {}", commitment.root);
        }
        println!("   └─ Time: {}ms", stats.time_ms);
    }

    let balance = state.chain.balance(&address);
    println!("\n💰 New balance: {}", balance.total());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mine_rollback_and_import() {
        let dir = tempfile::tempdir().unwrap();
        let miner = Address::new(0, vec![7; 20]).to_string();

        let mut state = AppState::new(dir.path().to_path_buf(), Network::Regtest).unwrap();
        cmd_mine(&mut state, &miner, 3).unwrap();
        assert_eq!(state.chain.height(), 3);

        let blocks: Vec<Block> = (1..=3)
            .map(|h| state.chain.get_block(h).unwrap().unwrap())
            .collect();
        let export = dir.path().join("blocks.json");
        fs::write(&export, serde_json::to_vec(&blocks).unwrap()).unwrap();

        cmd_rollback(&mut state, 2).unwrap();
        assert_eq!(state.chain.height(), 1);
        drop(state);

        let mut state = AppState::new(dir.path().to_path_buf(), Network::Regtest).unwrap();
        assert_eq!(state.chain.height(), 1);
        cmd_import(&mut state, &export).unwrap();
        assert_eq!(state.chain.height(), 3);
        assert_eq!(state.chain.tip_hash(), blocks[2].hash());
    }

    #[test]
    fn test_import_rejects_claim_covenant() {
        let dir = tempfile::tempdir().unwrap();
        let miner = Address::new(0, vec![7; 20]);

        let mut source = Chain::new(ChainOptions::new(Network::Regtest)).unwrap();
        let block = source.build_block(vec![], miner, 1, 1).unwrap();
        source.connect_block(&block).unwrap();

        let mut json = serde_json::to_value(vec![block]).unwrap();
        json[0]["transactions"][0]["outputs"][0]["covenant"]["type"] = serde_json::json!(1);
        let export = dir.path().join("claim.json");
        fs::write(&export, serde_json::to_vec(&json).unwrap()).unwrap();

        let mut state = AppState::new(dir.path().join("chain"), Network::Regtest).unwrap();
        let err = cmd_import(&mut state, &export).unwrap_err();
        assert!(err.to_string().contains("Unknown covenant type 1"));
        assert_eq!(state.chain.height(), 0);
    }

    #[test]
    fn test_unknown_name_reports_available() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(dir.path().to_path_buf(), Network::Regtest).unwrap();
        cmd_name(&state, "example").unwrap();
        cmd_roots(&state, 5).unwrap();
        cmd_info(&state).unwrap();
    }
}
