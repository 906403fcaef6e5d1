// Peer orchestrator: owns the chain, the transaction pool and the peer
// set, and wires the listener, heartbeat and mining workers into one
// node. All shared state sits behind a single mutex; the three lifecycle
// flags are atomics so workers can poll them without contention.
//
// Message handlers return structured outcomes and the dispatcher performs
// any reply send, so protocol semantics stay testable without sockets.

use std::collections::{HashMap, VecDeque};
use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colored::*;
use rand::Rng;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio::time::sleep;

use crate::config::{HEARTBEAT_SECS, PeerConfig};
use crate::consensus::chain::{Chain, parse_chain_dump, validate_sequence};
use crate::consensus::difficulty::Difficulty;
use crate::crypto::hash::{FILE_NOT_FOUND, hash_file, sha256_hex};
use crate::miner;
use crate::net::protocol::{self, Message, TrackerMessage};
use crate::primitives::block::Block;
use crate::primitives::transaction::{Transaction, TxKind};

/// Demo song registered by the synthetic transaction worker.
const SYNTH_SONG: &str = "welcome_to_new_york";

/// How often conflict-barrier waiters re-check the flag in case a
/// notification slipped past them.
const BARRIER_RECHECK: Duration = Duration::from_millis(200);

pub(crate) struct PeerState {
    pub(crate) chain: Chain,
    pub(crate) pool: VecDeque<Transaction>,
    pub(crate) peers: Vec<String>,
    /// Join-time chain votes: normalized-dump digest → (count, blocks).
    chain_votes: HashMap<String, ChainVote>,
    pub(crate) difficulty: Difficulty,
}

struct ChainVote {
    count: usize,
    blocks: Vec<Block>,
}

pub(crate) struct PeerInner {
    pub(crate) cfg: PeerConfig,
    my_ip: String,
    name: String,
    signature: String,
    pub(crate) state: Mutex<PeerState>,
    pub(crate) connected: Arc<AtomicBool>,
    local_bc_built: AtomicBool,
    conflict_solve: AtomicBool,
    conflict_notify: Notify,
}

#[derive(Clone)]
pub struct Peer {
    pub(crate) inner: Arc<PeerInner>,
}

/// Outcome of ingesting a `NEW_BLOCK:` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockIngress {
    Added,
    /// Failed validation; the dispatcher answers with `REQ_CHANGE:`.
    Rejected,
    UnknownSender,
    ParseFailed,
}

/// Outcome of a `REQ_CHANGE:` chain offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChainOffer {
    Replaced,
    KeptLocal,
    Invalid,
    UnknownSender,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("song file not found under the songs directory")]
    SongMissing,
    #[error("no ownership record exists for this song")]
    UnknownSong,
    #[error("only the current owner can transfer a license")]
    NotOwner,
    #[error("cannot transfer a license to yourself")]
    SelfTransfer,
    #[error("the recipient already holds this license")]
    AlreadyOwner,
}

pub(crate) fn now_string() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

impl Peer {
    /// Build a peer with a freshly mined genesis chain. Does not touch
    /// the network until `start`.
    pub fn new(cfg: PeerConfig) -> Peer {
        let my_ip = cfg.host_ip.clone();
        let signature = sha256_hex(my_ip.as_bytes());
        let name = format!("{my_ip}@4119.com");
        let state = PeerState {
            chain: Chain::with_genesis(now_string()),
            pool: VecDeque::new(),
            peers: Vec::new(),
            chain_votes: HashMap::new(),
            difficulty: cfg.initial_difficulty,
        };
        Peer {
            inner: Arc::new(PeerInner {
                cfg,
                my_ip,
                name,
                signature,
                state: Mutex::new(state),
                connected: Arc::new(AtomicBool::new(false)),
                local_bc_built: AtomicBool::new(false),
                conflict_solve: AtomicBool::new(true),
                conflict_notify: Notify::new(),
            }),
        }
    }

    pub fn my_ip(&self) -> &str {
        &self.inner.my_ip
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn signature(&self) -> &str {
        &self.inner.signature
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    pub fn local_chain_built(&self) -> bool {
        self.inner.local_bc_built.load(Ordering::Relaxed)
    }

    /// Bind the listener, launch the workers and announce ourselves to
    /// the tracker. A bind failure is the one fatal startup error.
    pub async fn start(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind((self.inner.cfg.bind_ip.as_str(), self.inner.cfg.peer_port)).await?;
        println!(
            "{} {} listening on {}:{}",
            "[peer]".bright_green().bold(),
            self.inner.my_ip,
            self.inner.cfg.bind_ip,
            self.inner.cfg.peer_port
        );

        self.init_peer_log();
        self.inner.connected.store(true, Ordering::Relaxed);

        let accept = self.clone();
        tokio::spawn(async move { accept.listen(listener).await });

        let heart = self.clone();
        tokio::spawn(async move { heart.heartbeat().await });

        let mine = self.clone();
        tokio::spawn(async move { miner::miner::run(mine).await });

        if self.inner.cfg.synthetic_tx {
            let synth = self.clone();
            tokio::spawn(async move { synth.synthetic_transactions().await });
        }

        if let Err(e) =
            protocol::send_plain(&self.inner.cfg.tracker_addr, TrackerMessage::Join.as_str()).await
        {
            eprintln!(
                "{} error connecting to tracker: {e}",
                "[peer]".bright_red().bold()
            );
        }
        Ok(())
    }

    /// Stay in the mesh for `stay` (or until killed), then leave.
    pub async fn run_for(&self, stay: Option<Duration>) {
        match stay {
            Some(duration) => sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
        self.leave().await;
    }

    /// Send `LEAVE`, stop the workers and emit the final chain log.
    pub async fn leave(&self) {
        println!(
            "{} {} is leaving the network",
            "[peer]".bright_yellow().bold(),
            self.inner.my_ip
        );
        if let Err(e) =
            protocol::send_plain(&self.inner.cfg.tracker_addr, TrackerMessage::Leave.as_str()).await
        {
            eprintln!(
                "{} error leaving the tracker: {e}",
                "[peer]".bright_red().bold()
            );
        }
        self.inner.connected.store(false, Ordering::Relaxed);
        self.inner.conflict_notify.notify_waiters();

        let state = self.inner.state.lock().await;
        self.write_final_chain_log(&state.chain);
        // Truncated console view, the way the front end renders it.
        let blocks = &state.chain.blocks;
        let shown = if blocks.len() > 10 {
            println!(
                "{} chain too long, truncating to last 10 blocks",
                "[peer]".bright_black()
            );
            &blocks[blocks.len() - 10..]
        } else {
            &blocks[..]
        };
        println!(
            "{} final blockchain, length {}:",
            "[peer]".bright_green().bold(),
            blocks.len()
        );
        for block in shown {
            println!("{}", block.serialize());
        }
    }

    async fn listen(&self, listener: TcpListener) {
        loop {
            if !self.is_connected() {
                break;
            }
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let peer = self.clone();
                    let sender = addr.ip().to_string();
                    tokio::spawn(async move { peer.handle_connection(stream, sender).await });
                }
                Err(e) => {
                    eprintln!("{} accept error: {e}", "[peer]".bright_red().bold());
                }
            }
        }
    }

    /// Read framed messages until the sender closes the connection.
    async fn handle_connection(&self, mut stream: TcpStream, sender: String) {
        loop {
            match protocol::read_frame(&mut stream).await {
                Ok(Some(payload)) => self.dispatch(&payload, &sender).await,
                Ok(None) => break,
                Err(e) => {
                    eprintln!(
                        "{} error during communication with {sender}: {e}",
                        "[peer]".bright_red().bold()
                    );
                    break;
                }
            }
        }
    }

    pub(crate) async fn dispatch(&self, payload: &str, sender: &str) {
        let Some(msg) = Message::parse(payload) else {
            eprintln!(
                "{} unrecognized message from {sender}, dropped",
                "[peer]".yellow().bold()
            );
            return;
        };

        match msg {
            Message::PeerList(list) => self.handle_peer_list(list).await,
            Message::NewBlock(body) => {
                if self.handle_new_block(&body, sender).await == BlockIngress::Rejected {
                    let dump = self.inner.state.lock().await.chain.dump();
                    self.send_to_peer(sender, &Message::RequestChange(dump)).await;
                    println!(
                        "{} sent block chain to {sender}, requesting change",
                        "[peer]".bright_blue()
                    );
                }
            }
            Message::NewTransaction(body) => {
                self.handle_transaction(&body, sender).await;
            }
            Message::RequestChain => {
                let dump = {
                    let state = self.inner.state.lock().await;
                    if state.chain.len() == 1 {
                        println!(
                            "{} {} has no block chain to send",
                            "[peer]".bright_black(),
                            self.inner.my_ip
                        );
                        return;
                    }
                    state.chain.dump()
                };
                self.send_to_peer(sender, &Message::ChainDump(dump)).await;
                println!(
                    "{} sent local blockchain to {sender}",
                    "[peer]".bright_blue()
                );
            }
            Message::ChainDump(body) => {
                if !self.local_chain_built() {
                    self.handle_chain_dump(&body, sender).await;
                }
            }
            Message::RequestChange(body) => {
                self.inner.conflict_solve.store(false, Ordering::Relaxed);
                self.handle_req_change(&body, sender).await;
                self.inner.conflict_solve.store(true, Ordering::Relaxed);
                self.inner.conflict_notify.notify_waiters();
            }
        }
    }

    /// Reconcile the tracker's membership broadcast against the local
    /// peer set. The local set never contains this peer itself, so a
    /// received list one longer than ours is the steady state.
    pub(crate) async fn handle_peer_list(&self, received: Vec<String>) {
        let mut to_request = Vec::new();
        {
            let mut state = self.inner.state.lock().await;
            println!(
                "{} {} received peer list with {} peers",
                "[peer]".bright_blue(),
                self.inner.my_ip,
                received.len()
            );

            if state.peers.is_empty() && received.len() > 1 {
                // Joining: adopt everyone else and ask each for the chain.
                for peer in &received {
                    if *peer != self.inner.my_ip {
                        state.peers.push(peer.clone());
                    }
                }
                to_request = state.peers.clone();
                self.append_peer_log(&state.peers);
            } else if received.len() == state.peers.len() {
                // A peer left; find it by set difference.
                let gone: Vec<String> = state
                    .peers
                    .iter()
                    .filter(|p| !received.contains(p))
                    .cloned()
                    .collect();
                for peer in gone {
                    println!(
                        "{} {} removing {peer} from its peer list",
                        "[peer]".bright_blue(),
                        self.inner.my_ip
                    );
                    state.peers.retain(|p| *p != peer);
                }
                self.append_peer_log(&state.peers);
            } else if received.len() == state.peers.len() + 2 {
                // A peer joined; the tracker appends new members last.
                if let Some(new_peer) = received.last() {
                    if state.peers.contains(new_peer) || *new_peer == self.inner.my_ip {
                        eprintln!(
                            "{} {} received a redundant peer: {new_peer}",
                            "[peer]".yellow().bold(),
                            self.inner.my_ip
                        );
                    } else {
                        state.peers.push(new_peer.clone());
                        println!(
                            "{} {new_peer} joined the network",
                            "[peer]".bright_blue()
                        );
                        self.append_peer_log(&state.peers);
                    }
                }
            } else if received.len() == 1 && received.first() == Some(&self.inner.my_ip) {
                // Bootstrap echo: we are the only member so far.
            } else {
                eprintln!(
                    "{} unexpected peer list delta: {} known, {} received",
                    "[peer]".yellow().bold(),
                    state.peers.len(),
                    received.len()
                );
            }
        }

        for peer in to_request {
            self.send_to_peer(&peer, &Message::RequestChain).await;
            println!(
                "{} sent request bc message to {peer}",
                "[peer]".bright_blue()
            );
        }
    }

    /// Pool a transaction gossiped by a known peer.
    pub(crate) async fn handle_transaction(&self, body: &str, sender: &str) {
        let mut state = self.inner.state.lock().await;
        if !state.peers.iter().any(|p| p == sender) {
            eprintln!(
                "{} suspicious transaction from unknown sender {sender}!",
                "[peer]".bright_red().bold()
            );
            return;
        }
        match Transaction::parse(body) {
            Ok(tx) => {
                state.pool.push_back(tx);
                println!(
                    "{} received new transaction from {sender}, pool size: {}",
                    "[peer]".bright_blue(),
                    state.pool.len()
                );
            }
            Err(e) => {
                eprintln!(
                    "{} undecodable transaction from {sender}: {e}",
                    "[peer]".yellow().bold()
                );
            }
        }
    }

    /// Validate and append a gossiped block; on success the declared mine
    /// time drives the next difficulty step.
    pub(crate) async fn handle_new_block(&self, body: &str, sender: &str) -> BlockIngress {
        let mut state = self.inner.state.lock().await;
        if !state.peers.iter().any(|p| p == sender) {
            eprintln!(
                "{} suspicious block from unknown sender {sender}!",
                "[peer]".bright_red().bold()
            );
            return BlockIngress::UnknownSender;
        }

        let block = match Block::parse(body) {
            Ok(block) => block,
            Err(e) => {
                eprintln!(
                    "{} undecodable block from {sender}: {e}",
                    "[peer]".yellow().bold()
                );
                return BlockIngress::ParseFailed;
            }
        };
        let declared_hash = block.hash.clone();
        let mine_time = block.mine_time;

        match state.chain.add_block(block, &declared_hash, Some(sender)) {
            Ok(()) => {
                state.difficulty = state.difficulty.adjust(mine_time);
                println!(
                    "{} {} added a block from {sender}, chain length: {}",
                    "[peer]".bright_green().bold(),
                    self.inner.my_ip,
                    state.chain.len()
                );
                BlockIngress::Added
            }
            Err(e) => {
                eprintln!(
                    "{} rejected block from {sender}: {e} (local tail index {})",
                    "[peer]".yellow().bold(),
                    state.chain.tail().index
                );
                BlockIngress::Rejected
            }
        }
    }

    /// Join-time bootstrap: tally chain copies until one payload reaches
    /// a majority of the peer set, then adopt it.
    pub(crate) async fn handle_chain_dump(&self, body: &str, sender: &str) {
        let blocks = match parse_chain_dump(body) {
            Ok(blocks) => blocks,
            Err(e) => {
                eprintln!(
                    "{} undecodable chain from {sender}: {e}",
                    "[peer]".yellow().bold()
                );
                return;
            }
        };
        println!(
            "{} received a blockchain sent by {sender}",
            "[peer]".bright_blue()
        );

        let mut state = self.inner.state.lock().await;
        // Vote on the normalized re-serialization, not the raw payload,
        // so formatting differences between senders cannot split votes.
        let normalized: String = blocks
            .iter()
            .map(|b| format!("{}END", b.serialize()))
            .collect();
        let key = sha256_hex(normalized.as_bytes());

        let majority = state.peers.len().div_ceil(2).max(1);
        let vote = state
            .chain_votes
            .entry(key.clone())
            .or_insert_with(|| ChainVote { count: 0, blocks });
        vote.count += 1;

        if vote.count >= majority {
            let winner = state
                .chain_votes
                .remove(&key)
                .map(|v| v.blocks)
                .unwrap_or_default();
            state.chain_votes.clear();
            self.inner.local_bc_built.store(true, Ordering::Relaxed);
            state.chain.replace_tail(winner);
            println!(
                "{} local blockchain built, length: {}",
                "[peer]".bright_green().bold(),
                state.chain.len()
            );
        }
    }

    /// Conflict resolution: longer chains win; equal lengths fall back to
    /// the lexicographically smaller tail hash. The local genesis always
    /// survives.
    pub(crate) async fn handle_req_change(&self, body: &str, sender: &str) -> ChainOffer {
        let mut state = self.inner.state.lock().await;
        if !state.peers.iter().any(|p| p == sender) {
            eprintln!(
                "{} suspicious change request from unknown sender {sender}!",
                "[peer]".bright_red().bold()
            );
            return ChainOffer::UnknownSender;
        }
        println!(
            "{} received request change from {sender}",
            "[peer]".bright_blue()
        );

        let received = match parse_chain_dump(body) {
            Ok(blocks) => blocks,
            Err(e) => {
                eprintln!(
                    "{} undecodable chain from {sender}: {e}",
                    "[peer]".yellow().bold()
                );
                return ChainOffer::Invalid;
            }
        };
        if !validate_sequence(&received) {
            eprintln!(
                "{} received a blockchain from {sender} but it might be tampered",
                "[peer]".yellow().bold()
            );
            return ChainOffer::Invalid;
        }

        let local_len = state.chain.len() - 1;
        if received.len() > local_len {
            state.chain.replace_tail(received);
            println!(
                "{} updated local blockchain from {sender} as it's longer",
                "[peer]".bright_green().bold()
            );
            ChainOffer::Replaced
        } else if received.len() == local_len {
            let received_tail = &received[received.len() - 1].hash;
            if *received_tail < state.chain.tail().hash {
                state.chain.replace_tail(received);
                println!(
                    "{} updated local blockchain from {sender}: same length, smaller hash",
                    "[peer]".bright_green().bold()
                );
                ChainOffer::Replaced
            } else {
                println!(
                    "{} blockchain from {sender} has same length but larger hash, ignored",
                    "[peer]".bright_black()
                );
                ChainOffer::KeptLocal
            }
        } else {
            println!(
                "{} blockchain from {sender} is shorter than the local one, ignored",
                "[peer]".bright_black()
            );
            ChainOffer::KeptLocal
        }
    }

    /// Front-end API: register ownership of a song present in the songs
    /// directory.
    pub async fn submit_register(
        &self,
        user: &str,
        song_name: &str,
        signature: &str,
    ) -> Result<(), SubmitError> {
        if user.trim().is_empty() {
            return Err(SubmitError::EmptyField("user name"));
        }
        if song_name.trim().is_empty() {
            return Err(SubmitError::EmptyField("song name"));
        }

        let path = self.inner.cfg.songs_dir.join(format!("{song_name}.mp3"));
        let song_hash = hash_file(&path);
        if song_hash == FILE_NOT_FOUND {
            return Err(SubmitError::SongMissing);
        }

        let tx = Transaction::register(
            user.to_string(),
            song_name.to_string(),
            song_hash,
            now_string(),
            signature.to_string(),
        );
        self.queue_and_broadcast(tx).await;
        Ok(())
    }

    /// Front-end API: transfer a song license to another user. The checks
    /// here are advisory; the mining validator is authoritative.
    pub async fn submit_transfer(
        &self,
        owner: &str,
        song_name: &str,
        recipient: &str,
        signature: &str,
    ) -> Result<(), SubmitError> {
        if owner.trim().is_empty() {
            return Err(SubmitError::EmptyField("owner"));
        }
        if song_name.trim().is_empty() {
            return Err(SubmitError::EmptyField("song name"));
        }
        if recipient.trim().is_empty() {
            return Err(SubmitError::EmptyField("recipient"));
        }
        if recipient == owner {
            return Err(SubmitError::SelfTransfer);
        }

        let path = self.inner.cfg.songs_dir.join(format!("{song_name}.mp3"));
        let song_hash = hash_file(&path);
        if song_hash == FILE_NOT_FOUND {
            return Err(SubmitError::SongMissing);
        }

        {
            let state = self.inner.state.lock().await;
            match resolve_song_owner(&state.chain, song_name) {
                None => return Err(SubmitError::UnknownSong),
                Some(current) if current != owner => return Err(SubmitError::NotOwner),
                Some(current) if current == recipient => return Err(SubmitError::AlreadyOwner),
                Some(_) => {}
            }
        }

        let tx = Transaction::transfer(
            owner.to_string(),
            song_name.to_string(),
            song_hash,
            recipient.to_string(),
            now_string(),
            signature.to_string(),
        );
        self.queue_and_broadcast(tx).await;
        Ok(())
    }

    /// Current owner of a song, resolved from the newest matching record.
    pub async fn song_owner(&self, song_name: &str) -> Option<String> {
        let state = self.inner.state.lock().await;
        resolve_song_owner(&state.chain, song_name)
    }

    /// Serialized view of the last `n` blocks, for front-end display.
    pub async fn chain_tail(&self, n: usize) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let blocks = &state.chain.blocks;
        let start = blocks.len().saturating_sub(n);
        blocks[start..].iter().map(|b| b.serialize()).collect()
    }

    async fn queue_and_broadcast(&self, tx: Transaction) {
        let payload = tx.serialize();
        let peers = {
            let mut state = self.inner.state.lock().await;
            state.pool.push_back(tx);
            println!(
                "{} {} made a transaction, pool size: {}",
                "[peer]".bright_blue(),
                self.inner.my_ip,
                state.pool.len()
            );
            state.peers.clone()
        };
        for peer in peers {
            self.send_to_peer(&peer, &Message::NewTransaction(payload.clone()))
                .await;
        }
    }

    /// Broadcast a freshly mined block to every known peer.
    pub(crate) async fn broadcast_block(&self, payload: String) {
        let peers = self.inner.state.lock().await.peers.clone();
        for peer in peers {
            self.send_to_peer(&peer, &Message::NewBlock(payload.clone()))
                .await;
        }
    }

    /// Best-effort one-shot send; failures are logged and swallowed.
    /// Convergence relies on future blocks and conflict resolution.
    async fn send_to_peer(&self, peer_ip: &str, msg: &Message) {
        let addr = format!("{peer_ip}:{}", self.inner.cfg.peer_port);
        if let Err(e) = protocol::send_message(&addr, msg).await {
            eprintln!(
                "{} {} failed to send to {peer_ip}: {e}",
                "[peer]".yellow().bold(),
                self.inner.my_ip
            );
        }
    }

    /// Block while the conflict barrier is down. Wakes on notification
    /// or a bounded timeout, whichever comes first.
    pub(crate) async fn wait_conflict_resolved(&self) {
        while self.is_connected() && !self.inner.conflict_solve.load(Ordering::Relaxed) {
            let notified = self.inner.conflict_notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = sleep(BARRIER_RECHECK) => {}
            }
        }
    }

    async fn heartbeat(&self) {
        sleep(Duration::from_secs(HEARTBEAT_SECS)).await;
        while self.is_connected() {
            if let Err(e) = protocol::send_plain(
                &self.inner.cfg.tracker_addr,
                TrackerMessage::KeepAlive.as_str(),
            )
            .await
            {
                eprintln!(
                    "{} error connecting to tracker in heartbeat: {e}",
                    "[peer]".yellow().bold()
                );
            }
            sleep(Duration::from_secs(HEARTBEAT_SECS)).await;
        }
    }

    /// Test-fleet worker: register the demo song on a jittered period.
    async fn synthetic_transactions(&self) {
        sleep(synth_delay()).await;
        while self.is_connected() {
            self.wait_conflict_resolved().await;
            if !self.is_connected() {
                break;
            }
            let path = self.inner.cfg.songs_dir.join(format!("{SYNTH_SONG}.mp3"));
            let tx = Transaction::register(
                self.inner.name.clone(),
                SYNTH_SONG.to_string(),
                hash_file(&path),
                now_string(),
                self.inner.signature.clone(),
            );
            self.queue_and_broadcast(tx).await;
            sleep(synth_delay()).await;
        }
    }

    fn init_peer_log(&self) {
        let dir = &self.inner.cfg.log_dir;
        let path = dir.join(format!("{} peer_list_log.txt", self.inner.my_ip));
        let result = std::fs::create_dir_all(dir)
            .and_then(|_| std::fs::write(&path, format!("Peer : {}\n", self.inner.my_ip)));
        if let Err(e) = result {
            eprintln!("{} cannot write peer log: {e}", "[peer]".yellow().bold());
        }
    }

    fn append_peer_log(&self, peers: &[String]) {
        let path = self
            .inner
            .cfg
            .log_dir
            .join(format!("{} peer_list_log.txt", self.inner.my_ip));
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| {
                writeln!(f, "=========== {} log ===========", self.inner.my_ip)?;
                writeln!(f, "Peers")?;
                writeln!(f, "{peers:?}")?;
                writeln!(f, "========================================")
            });
        if let Err(e) = result {
            eprintln!("{} cannot write peer log: {e}", "[peer]".yellow().bold());
        }
    }

    fn write_final_chain_log(&self, chain: &Chain) {
        let dir = &self.inner.cfg.log_dir;
        let path = dir.join(format!("{} blockchain_log.txt", self.inner.my_ip));
        let mut contents = format!(
            "=========== {} Final Blockchain ===========\n",
            self.inner.my_ip
        );
        for block in &chain.blocks {
            contents.push_str(&block.serialize());
            contents.push('\n');
        }
        let result =
            std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, contents));
        if let Err(e) = result {
            eprintln!("{} cannot write chain log: {e}", "[peer]".yellow().bold());
        }
    }
}

/// Newest matching ownership record wins: a Register names its owner, a
/// Transfer names its recipient. Non-transaction payloads (the genesis
/// block) are skipped.
fn resolve_song_owner(chain: &Chain, song_name: &str) -> Option<String> {
    for block in chain.blocks.iter().rev() {
        let Ok(tx) = Transaction::parse(&block.data) else {
            continue;
        };
        if tx.song_name != song_name {
            continue;
        }
        return match tx.kind {
            TxKind::Register => Some(tx.user_name),
            TxKind::Transfer => tx.other_user,
        };
    }
    None
}

fn synth_delay() -> Duration {
    Duration::from_secs_f64(rand::thread_rng().gen_range(5.0..10.0))
}
