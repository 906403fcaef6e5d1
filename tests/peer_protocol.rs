// Wire-level exercise of a live peer and tracker. The test stands in for
// a second mesh member: the peer under test runs on the 127.0.0.2
// loopback alias while the test listens on 127.0.0.1, both using the
// same listener port, so every reply lands in the test's inbox.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;

use songchain::config::{PeerConfig, TrackerConfig};
use songchain::consensus::chain::parse_chain_dump;
use songchain::consensus::difficulty::Difficulty;
use songchain::crypto::hash::sha256_hex;
use songchain::net::peer::Peer;
use songchain::net::protocol::{Message, read_frame, write_frame};
use songchain::net::tracker::Tracker;
use songchain::primitives::block::Block;
use songchain::primitives::transaction::Transaction;

const PEER_IP: &str = "127.0.0.2";
const TEST_IP: &str = "127.0.0.1";
const RECV_TIMEOUT: Duration = Duration::from_secs(120);

async fn next_message(inbox: &TcpListener) -> Message {
    let (mut stream, _) = timeout(RECV_TIMEOUT, inbox.accept())
        .await
        .expect("timed out waiting for a connection")
        .expect("accept failed");
    let payload = read_frame(&mut stream)
        .await
        .expect("read failed")
        .expect("connection closed without a frame");
    Message::parse(&payload).expect("unparseable message")
}

async fn send_framed(addr: &str, msg: &Message) {
    let mut stream = TcpStream::connect(addr).await.expect("connect failed");
    write_frame(&mut stream, &msg.encode()).await.expect("send failed");
}

fn register_tx(n: usize) -> Transaction {
    Transaction::register(
        format!("artist-{n}@4119.com"),
        format!("track-{n}"),
        "ab".repeat(32),
        format!("2024-04-19 15:00:0{n}.000000"),
        sha256_hex(TEST_IP.as_bytes()),
    )
}

#[tokio::test]
async fn test_peer_full_protocol_exchange() {
    let inbox = TcpListener::bind((TEST_IP, 0)).await.unwrap();
    let port = inbox.local_addr().unwrap().port();

    let songs = tempfile::tempdir().unwrap();
    let logs = tempfile::tempdir().unwrap();
    let peer = Peer::new(PeerConfig {
        host_ip: PEER_IP.to_string(),
        bind_ip: PEER_IP.to_string(),
        peer_port: port,
        // No tracker in this scenario; the join message fails fast and
        // is swallowed.
        tracker_addr: format!("{TEST_IP}:1"),
        songs_dir: songs.path().to_path_buf(),
        log_dir: logs.path().to_path_buf(),
        synthetic_tx: false,
        initial_difficulty: Difficulty::Easy,
    });
    peer.start().await.unwrap();
    let peer_addr = format!("{PEER_IP}:{port}");

    // Announce a two-member mesh. The peer adopts us and asks for our
    // chain copy.
    send_framed(
        &peer_addr,
        &Message::PeerList(vec![PEER_IP.to_string(), TEST_IP.to_string()]),
    )
    .await;
    assert_eq!(next_message(&inbox).await, Message::RequestChain);

    // Three pooled transactions trip the mining threshold; the oldest
    // one becomes the next block.
    for n in 0..3 {
        send_framed(
            &peer_addr,
            &Message::NewTransaction(register_tx(n).serialize()),
        )
        .await;
    }

    let mined = match next_message(&inbox).await {
        Message::NewBlock(body) => Block::parse(&body).expect("unparseable block"),
        other => panic!("expected a block broadcast, got {other:?}"),
    };
    assert_eq!(mined.index, 1);
    assert_eq!(mined.data, register_tx(0).serialize());
    assert_eq!(mined.signature, sha256_hex(PEER_IP.as_bytes()));
    assert!(mined.difficulty.is_met_by(&mined.hash));
    assert_eq!(mined.hash, mined.compute_hash());

    // A joining peer's chain request is answered with the non-genesis
    // blocks.
    send_framed(&peer_addr, &Message::RequestChain).await;
    let dump = match next_message(&inbox).await {
        Message::ChainDump(body) => parse_chain_dump(&body).expect("bad chain dump"),
        other => panic!("expected a chain dump, got {other:?}"),
    };
    assert_eq!(dump.len(), 1);
    assert_eq!(dump[0], mined);

    // A tampered block (declared hash does not match the contents) is
    // rejected and answered with a change request carrying the local
    // chain.
    let forged = Block::new(
        2,
        "2024-04-19 15:01:00.000000".to_string(),
        "forged payload".to_string(),
        mined.hash.clone(),
        sha256_hex(TEST_IP.as_bytes()),
        Difficulty::Easy,
    );
    let mut wire: serde_json::Value = serde_json::from_str(&forged.serialize()).unwrap();
    wire["hash"] = serde_json::Value::String("0".repeat(64));
    send_framed(&peer_addr, &Message::NewBlock(wire.to_string())).await;

    let offered = match next_message(&inbox).await {
        Message::RequestChange(body) => parse_chain_dump(&body).expect("bad chain dump"),
        other => panic!("expected a change request, got {other:?}"),
    };
    assert_eq!(offered.len(), 1);
    assert_eq!(offered[0], mined);

    // The forgery never made it onto the chain.
    let tail = peer.chain_tail(1).await;
    assert_eq!(Block::parse(&tail[0]).unwrap(), mined);
}

#[tokio::test]
async fn test_tracker_membership_fanout() {
    // Two scripted peers on separate loopback aliases, sharing one
    // listener port.
    let inbox_one = TcpListener::bind((TEST_IP, 0)).await.unwrap();
    let port = inbox_one.local_addr().unwrap().port();
    let inbox_two = TcpListener::bind((PEER_IP, port)).await.unwrap();

    let tracker = Tracker::bind(TrackerConfig {
        bind_ip: TEST_IP.to_string(),
        port: 0,
        peer_port: port,
        sweep_interval: Duration::from_secs(10),
        evict_after: Duration::from_secs(20),
    })
    .await
    .unwrap();
    let tracker_addr = tracker.local_addr().unwrap();
    tokio::spawn(tracker.run());

    // First member joins from 127.0.0.1.
    send_plain_from(TEST_IP, &tracker_addr.to_string(), "JOIN").await;
    assert_eq!(
        next_message(&inbox_one).await,
        Message::PeerList(vec![TEST_IP.to_string()])
    );

    // Second member joins from 127.0.0.2; both get the list, with the
    // new member last.
    send_plain_from(PEER_IP, &tracker_addr.to_string(), "JOIN").await;
    let expected = Message::PeerList(vec![TEST_IP.to_string(), PEER_IP.to_string()]);
    assert_eq!(next_message(&inbox_one).await, expected);
    assert_eq!(next_message(&inbox_two).await, expected);

    // First member leaves; only the survivor hears about it.
    send_plain_from(TEST_IP, &tracker_addr.to_string(), "LEAVE").await;
    assert_eq!(
        next_message(&inbox_two).await,
        Message::PeerList(vec![PEER_IP.to_string()])
    );
}

/// Plain (unframed) tracker message sent from a pinned source address.
async fn send_plain_from(source_ip: &str, addr: &str, msg: &str) {
    let socket = TcpSocket::new_v4().unwrap();
    socket
        .bind(format!("{source_ip}:0").parse().unwrap())
        .unwrap();
    let mut stream = socket
        .connect(addr.parse().unwrap())
        .await
        .expect("connect failed");
    stream.write_all(msg.as_bytes()).await.expect("send failed");
    stream.flush().await.unwrap();
}
