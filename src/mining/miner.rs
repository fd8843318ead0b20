//! Block assembly
//!
//! Turns the mempool into a candidate block on the current tip. There is no
//! proof-of-work search: the assembled block carries the requested bits and
//! is ready to connect.

use crate::core::{Address, Block, BlockchainError, Chain, MAX_BLOCK_TXS};
use log::info;
use std::time::Instant;

use super::mempool::Mempool;

/// Assembly statistics
#[derive(Debug, Clone)]
pub struct AssemblyStats {
    /// Mempool transactions considered
    pub candidates: usize,
    /// Transactions that made it into the block
    pub included: usize,
    pub fees: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
}

/// Builds blocks paying a fixed reward address
pub struct BlockAssembler {
    pub address: Address,
    pub bits: u32,
    pub max_transactions: usize,
}

impl BlockAssembler {
    pub fn new(address: Address, bits: u32) -> Self {
        Self {
            address,
            bits,
            max_transactions: MAX_BLOCK_TXS - 1,
        }
    }

    pub fn with_max_transactions(mut self, max_transactions: usize) -> Self {
        self.max_transactions = max_transactions;
        self
    }

    /// Assemble a block from the best-paying pool transactions that still
    /// verify together on the tip
    pub fn assemble(
        &self,
        chain: &Chain,
        mempool: &Mempool,
        time: u64,
    ) -> Result<(Block, AssemblyStats), BlockchainError> {
        let start = Instant::now();

        let candidates = mempool.get_transactions(mempool.len());
        let candidate_count = candidates.len();
        let selected = chain.select_transactions(candidates, self.max_transactions);
        let included = selected.len();

        let block = chain.build_block(selected, self.address.clone(), time, self.bits)?;
        let reward = chain.network().block_reward();
        let fees = block.transactions[0]
            .output_value()
            .unwrap_or(reward)
            .saturating_sub(reward);

        let stats = AssemblyStats {
            candidates: candidate_count,
            included,
            fees,
            time_ms: start.elapsed().as_millis(),
        };

        info!(
            "Assembled block at height {} with {} of {} pool transactions ({} fees)",
            chain.height() + 1,
            included,
            candidate_count,
            fees
        );

        Ok((block, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainOptions, MempoolOptions, Network};
    use crate::core::{Input, Output, Transaction, TrustedVerifier};
    use std::sync::Arc;

    #[test]
    fn test_assemble_includes_pool() {
        let options = ChainOptions::new(Network::Regtest);
        let mut chain = Chain::with_verifier(options, Arc::new(TrustedVerifier)).unwrap();
        let assembler = BlockAssembler::new(Address::new(0, vec![7; 20]), 1);
        let mut pool = Mempool::new(MempoolOptions::default());

        let mut coinbases = Vec::new();
        for time in 1..=3 {
            let (block, stats) = assembler.assemble(&chain, &pool, time).unwrap();
            assert_eq!(stats.included, 0);
            chain.connect_block(&block).unwrap();
            coinbases.push(block.transactions[0].clone());
        }

        let reward = chain.network().block_reward();
        let tx = Transaction::new(
            vec![Input::new(coinbases[0].outpoint(0))],
            vec![Output::new(reward - 2_500, Address::new(0, vec![8; 20]))],
        );
        pool.add_transaction(tx.clone(), &chain).unwrap();

        let (block, stats) = assembler.assemble(&chain, &pool, 4).unwrap();
        assert_eq!(stats.included, 1);
        assert_eq!(stats.fees, 2_500);
        assert_eq!(block.transactions[1], tx);
        chain.connect_block(&block).unwrap();
        assert_eq!(chain.height(), 4);
    }
}
