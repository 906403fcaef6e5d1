// The chain container: an append-only sequence of blocks headed by a
// locally mined genesis. Validation lives here; the peer decides what to
// do with rejects (usually answer with a change request).

use thiserror::Error;

use crate::consensus::difficulty::Difficulty;
use crate::crypto::hash::sha256_hex;
use crate::primitives::block::{Block, BlockParseError, GENESIS_DATA};

/// Terminator appended after every block in a chain dump payload.
pub const BLOCK_TERMINATOR: &str = "END";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockRejected {
    #[error("block signature does not match the sender address")]
    SignatureMismatch,
    #[error("declared hash does not match the block contents")]
    TamperedHash,
    #[error("previous hash does not match the chain tail")]
    PreviousHashMismatch,
    #[error("hash does not satisfy the declared difficulty")]
    InvalidProof,
    #[error("block already present in the chain")]
    Duplicate,
}

pub struct Chain {
    pub blocks: Vec<Block>,
}

impl Chain {
    /// Create a chain headed by a freshly mined genesis block.
    pub fn with_genesis(timestamp: String) -> Chain {
        let mut genesis = Block::new(
            0,
            timestamp,
            GENESIS_DATA.to_string(),
            "0".to_string(),
            GENESIS_DATA.to_string(),
            Difficulty::Easy,
        );
        genesis.mine();
        Chain {
            blocks: vec![genesis],
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tail(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn tail_hash(&self) -> String {
        self.tail().hash.clone()
    }

    /// Everything after the genesis block.
    pub fn non_genesis(&self) -> &[Block] {
        &self.blocks[1..]
    }

    /// Validate `block` against the current tail and append it.
    ///
    /// `declared_hash` is the hash the sender claims for the block;
    /// `sender_addr`, when present, must hash to the block's signature.
    pub fn add_block(
        &mut self,
        block: Block,
        declared_hash: &str,
        sender_addr: Option<&str>,
    ) -> Result<(), BlockRejected> {
        if let Some(addr) = sender_addr
            && block.signature != sha256_hex(addr.as_bytes())
        {
            return Err(BlockRejected::SignatureMismatch);
        }

        let computed = block.compute_hash();
        if declared_hash != computed {
            return Err(BlockRejected::TamperedHash);
        }

        let last = self.tail();
        if block.previous_hash != last.compute_hash() && last.data != GENESIS_DATA {
            return Err(BlockRejected::PreviousHashMismatch);
        }

        if !block.difficulty.is_met_by(&computed) {
            return Err(BlockRejected::InvalidProof);
        }

        if self.blocks.iter().any(|b| b.compute_hash() == computed) {
            return Err(BlockRejected::Duplicate);
        }

        self.blocks.push(block);
        Ok(())
    }

    /// Whole-chain check: every non-genesis block hashes to its stored
    /// hash and links to its predecessor.
    pub fn is_valid(&self) -> bool {
        for i in 1..self.blocks.len() {
            let curr = &self.blocks[i];
            let prev = &self.blocks[i - 1];
            if curr.hash != curr.compute_hash() || curr.previous_hash != prev.compute_hash() {
                return false;
            }
        }
        true
    }

    /// Swap the non-genesis suffix for `blocks`. The local genesis block
    /// always stays at the head.
    pub fn replace_tail(&mut self, blocks: Vec<Block>) {
        self.blocks.truncate(1);
        self.blocks.extend(blocks);
    }

    /// Serialize every non-genesis block, each followed by the terminator.
    pub fn dump(&self) -> String {
        let mut data = String::new();
        for block in self.non_genesis() {
            data.push_str(&block.serialize());
            data.push_str(BLOCK_TERMINATOR);
        }
        data
    }
}

/// Parse a chain-dump payload back into blocks. Any malformed block
/// rejects the whole payload.
pub fn parse_chain_dump(data: &str) -> Result<Vec<Block>, BlockParseError> {
    data.split(BLOCK_TERMINATOR)
        .filter(|part| !part.is_empty())
        .map(Block::parse)
        .collect()
}

/// Validity of a received (genesis-less) chain: non-empty, every block
/// hashes to its declared hash, and adjacent blocks link up.
pub fn validate_sequence(blocks: &[Block]) -> bool {
    if blocks.is_empty() {
        return false;
    }
    for (i, curr) in blocks.iter().enumerate() {
        if curr.hash != curr.compute_hash() {
            return false;
        }
        if i > 0 && curr.previous_hash != blocks[i - 1].compute_hash() {
            return false;
        }
    }
    true
}
