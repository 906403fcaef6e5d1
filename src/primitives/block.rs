// Data Structures: Block
//
// A block embeds one serialized transaction and links to its predecessor
// by hash. The canonical hash covers (index, timestamp, previous_hash,
// nonce, data); signature, difficulty and mine_time ride along for
// validation and retargeting but are not part of the preimage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::difficulty::Difficulty;
use crate::crypto::hash::{merkle_root, sha256_hex};

/// Data payload and signature of the chain head.
pub const GENESIS_DATA: &str = "Genesis Block";

/// Stop-flag check cadence during the nonce search.
const MINE_CHECK_INTERVAL: u64 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub index: u64,
    pub timestamp: String,
    /// Serialized transaction payload (or the genesis literal).
    pub data: String,
    pub previous_hash: String,
    /// Hash of the mining peer's address.
    pub signature: String,
    pub difficulty: Difficulty,
    pub nonce: u64,
    /// Observed wall-clock seconds spent mining; -1 until set.
    pub mine_time: f64,
    pub hash: String,
    /// Carried but not consulted by consensus.
    pub mrkl_root: String,
}

/// Wire form: a flat JSON object whose values are all strings.
#[derive(Serialize, Deserialize)]
struct BlockWire {
    hash: String,
    index: String,
    timestamp: String,
    mine_time: String,
    data: String,
    previous_hash: String,
    signature: String,
    difficulty: String,
    nonce: String,
}

#[derive(Debug, Error)]
pub enum BlockParseError {
    #[error("malformed block JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("block field {0} is not a number")]
    BadNumber(&'static str),
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: String,
        data: String,
        previous_hash: String,
        signature: String,
        difficulty: Difficulty,
    ) -> Self {
        let mrkl_root = merkle_root(std::slice::from_ref(&data));
        let mut block = Block {
            index,
            timestamp,
            data,
            previous_hash,
            signature,
            difficulty,
            nonce: 0,
            mine_time: -1.0,
            hash: String::new(),
            mrkl_root,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Canonical hash over (index ‖ timestamp ‖ previous_hash ‖ nonce ‖ data).
    pub fn compute_hash(&self) -> String {
        let preimage = format!(
            "{}{}{}{}{}",
            self.index, self.timestamp, self.previous_hash, self.nonce, self.data
        );
        sha256_hex(preimage.as_bytes())
    }

    /// Proof of work: walk the nonce upward until the hash satisfies the
    /// difficulty predicate. Returns false if `keep_going` flipped off
    /// before a solution was found; the caller discards the block then.
    pub fn mine_until(&mut self, keep_going: &AtomicBool) -> bool {
        if !keep_going.load(Ordering::Relaxed) {
            return false;
        }
        let started = Instant::now();
        loop {
            self.hash = self.compute_hash();
            if self.difficulty.is_met_by(&self.hash) {
                break;
            }
            self.nonce = self.nonce.wrapping_add(1);
            if self.nonce.is_multiple_of(MINE_CHECK_INTERVAL) {
                if !keep_going.load(Ordering::Relaxed) {
                    return false;
                }
                std::thread::yield_now();
            }
        }
        self.mine_time = round2(started.elapsed().as_secs_f64());
        true
    }

    /// Uninterruptible variant for startup and tests.
    pub fn mine(&mut self) {
        self.mine_until(&AtomicBool::new(true));
    }

    /// Serialize to the wire JSON. The embedded hash is re-derived so it
    /// always reflects the current nonce.
    pub fn serialize(&self) -> String {
        let wire = BlockWire {
            hash: self.compute_hash(),
            index: self.index.to_string(),
            timestamp: self.timestamp.clone(),
            mine_time: self.mine_time.to_string(),
            data: self.data.clone(),
            previous_hash: self.previous_hash.clone(),
            signature: self.signature.clone(),
            difficulty: self.difficulty.to_string(),
            nonce: self.nonce.to_string(),
        };
        serde_json::to_string(&wire).expect("block serializes to JSON")
    }

    /// Parse a wire block. The `hash` field of the result is the sender's
    /// declared hash, which `Chain::add_block` checks against the
    /// recomputed one.
    pub fn parse(data: &str) -> Result<Block, BlockParseError> {
        let wire: BlockWire = serde_json::from_str(data)?;
        let index = wire
            .index
            .parse()
            .map_err(|_| BlockParseError::BadNumber("index"))?;
        let nonce = wire
            .nonce
            .parse()
            .map_err(|_| BlockParseError::BadNumber("nonce"))?;
        let mine_time = wire
            .mine_time
            .parse()
            .map_err(|_| BlockParseError::BadNumber("mine_time"))?;

        let mrkl_root = merkle_root(std::slice::from_ref(&wire.data));
        Ok(Block {
            index,
            timestamp: wire.timestamp,
            data: wire.data,
            previous_hash: wire.previous_hash,
            signature: wire.signature,
            difficulty: Difficulty::parse(&wire.difficulty),
            nonce,
            mine_time,
            hash: wire.hash,
            mrkl_root,
        })
    }
}

fn round2(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_block(data: &str) -> Block {
        Block::new(
            1,
            "2024-04-19 10:00:00.000000".to_string(),
            data.to_string(),
            "0".to_string(),
            "miner-sig".to_string(),
            Difficulty::Easy,
        )
    }

    #[test]
    fn test_mine_finds_easy_proof() {
        let mut block = test_block("x");
        block.mine();
        assert!(block.hash.starts_with("00000"));
        assert_eq!(block.hash, block.compute_hash());
        assert!(block.mine_time >= 0.0);
    }

    #[test]
    fn test_mine_until_aborts_when_stopped() {
        let mut block = test_block("abort me");
        block.difficulty = Difficulty::Hard;
        let keep_going = AtomicBool::new(false);
        assert!(!block.mine_until(&keep_going));
        assert_eq!(block.mine_time, -1.0);
    }

    #[test]
    fn test_serialize_rederives_hash() {
        let mut block = test_block("y");
        block.nonce = 42;
        // The stored hash is stale; the serialized one must not be.
        let parsed = Block::parse(&block.serialize()).unwrap();
        assert_eq!(parsed.hash, block.compute_hash());
        assert_eq!(parsed.nonce, 42);
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut block = test_block("z");
        block.mine();
        let parsed = Block::parse(&block.serialize()).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn test_wire_values_are_strings() {
        let block = test_block("w");
        let json = block.serialize();
        assert!(json.contains("\"index\":\"1\""));
        assert!(json.contains("\"nonce\":\"0\""));
        assert!(json.contains("\"mine_time\":\"-1\""));
        assert!(json.contains("\"difficulty\":\"easy\""));
    }

    #[test]
    fn test_parse_rejects_bad_numbers() {
        let json = r#"{"hash":"h","index":"one","timestamp":"t","mine_time":"-1","data":"d","previous_hash":"0","signature":"s","difficulty":"easy","nonce":"0"}"#;
        assert!(matches!(
            Block::parse(json),
            Err(BlockParseError::BadNumber("index"))
        ));
    }

    #[test]
    fn test_mrkl_root_of_single_payload_is_payload() {
        let block = test_block("only");
        assert_eq!(block.mrkl_root, "only");
    }
}
