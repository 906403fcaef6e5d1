// Mining loop: wait for the pool to fill, take the oldest transaction,
// search for a nonce on the blocking thread pool, self-validate, then
// hand the block to the network layer for broadcast.
//
// Racing miners are resolved implicitly: the first accepted block wins,
// and losers discover the mismatch when their candidate fails validation
// or a received block triggers conflict resolution.

use std::time::Duration;

use colored::*;
use tokio::time::sleep;

use crate::net::peer::{Peer, now_string};
use crate::primitives::block::Block;

/// Pool size that triggers a mining round.
pub const POOL_THRESHOLD: usize = 3;

/// Idle poll period while the pool is below threshold.
const IDLE_POLL: Duration = Duration::from_millis(500);

pub async fn run(peer: Peer) {
    while peer.is_connected() {
        peer.wait_conflict_resolved().await;
        if !peer.is_connected() {
            break;
        }
        match mine_once(&peer).await {
            Some(block) => peer.broadcast_block(block.serialize()).await,
            None => sleep(IDLE_POLL).await,
        }
    }
}

/// One mining round. Returns the accepted block, or None when the pool
/// is below threshold, the peer disconnected mid-search, or the candidate
/// failed self-validation (in which case the pool is left untouched).
pub(crate) async fn mine_once(peer: &Peer) -> Option<Block> {
    let candidate = {
        let state = peer.inner.state.lock().await;
        if state.pool.len() < POOL_THRESHOLD {
            return None;
        }
        // Oldest pending transaction becomes the block body.
        let data = state.pool[0].serialize();
        Block::new(
            state.chain.len() as u64,
            now_string(),
            data,
            state.chain.tail_hash(),
            peer.signature().to_string(),
            state.difficulty,
        )
    };

    // The nonce search runs off the async runtime; `connected` doubles as
    // its keep-going flag so shutdown aborts the search promptly.
    let keep_going = peer.inner.connected.clone();
    let (block, completed) = tokio::task::spawn_blocking(move || {
        let mut block = candidate;
        let completed = block.mine_until(&keep_going);
        (block, completed)
    })
    .await
    .ok()?;

    if !completed || !peer.is_connected() {
        // Disconnected during mining; discard the candidate.
        return None;
    }

    println!(
        "{} {} mined a block in {} seconds",
        "[miner]".bright_magenta().bold(),
        peer.my_ip(),
        block.mine_time
    );

    let mut state = peer.inner.state.lock().await;
    state.difficulty = state.difficulty.adjust(block.mine_time);
    let declared_hash = block.hash.clone();
    match state.chain.add_block(block.clone(), &declared_hash, None) {
        Ok(()) => {
            state.pool.pop_front();
            Some(block)
        }
        Err(e) => {
            // Usually a race: a gossiped block extended the chain while
            // we were searching. Keep the transaction and start over.
            eprintln!(
                "{} candidate failed validation: {e}",
                "[miner]".yellow().bold()
            );
            None
        }
    }
}
