// Rendezvous tracker: a membership directory and nothing else. Peers
// announce themselves with plain-text control messages; the tracker fans
// the full ordered list back out on a fresh framed connection to every
// member's listener port. A sweeper evicts members whose keepalives stop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::*;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::config::TrackerConfig;
use crate::net::protocol::{self, Message};

/// Membership entry. Order matters: peers infer "who joined" from the
/// new member being last in the broadcast list.
struct PeerEntry {
    addr: String,
    last_seen: Instant,
}

pub struct Tracker {
    cfg: Arc<TrackerConfig>,
    listener: TcpListener,
    peers: Arc<Mutex<Vec<PeerEntry>>>,
}

impl Tracker {
    /// Bind the tracker endpoint. A bind failure is fatal at startup.
    pub async fn bind(cfg: TrackerConfig) -> io::Result<Tracker> {
        let listener = TcpListener::bind((cfg.bind_ip.as_str(), cfg.port)).await?;
        println!(
            "{} tracker starts on port {}",
            "[tracker]".bright_cyan().bold(),
            listener.local_addr()?.port()
        );
        Ok(Tracker {
            cfg: Arc::new(cfg),
            listener,
            peers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop plus the keepalive sweeper. Runs until the process
    /// is torn down.
    pub async fn run(self) {
        let sweeper_peers = self.peers.clone();
        let sweeper_cfg = self.cfg.clone();
        tokio::spawn(async move { sweep(sweeper_peers, sweeper_cfg).await });

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let peers = self.peers.clone();
                    let cfg = self.cfg.clone();
                    let ip = addr.ip().to_string();
                    tokio::spawn(async move { handle_peer(stream, ip, peers, cfg).await });
                }
                Err(e) => {
                    eprintln!("{} accept error: {e}", "[tracker]".bright_red().bold());
                }
            }
        }
    }
}

/// One control message per connection: read to EOF and dispatch.
async fn handle_peer(
    mut stream: TcpStream,
    addr: String,
    peers: Arc<Mutex<Vec<PeerEntry>>>,
    cfg: Arc<TrackerConfig>,
) {
    let mut data = String::new();
    if let Err(e) = stream.read_to_string(&mut data).await {
        eprintln!(
            "{} error handling peer {addr}: {e}",
            "[tracker]".bright_red().bold()
        );
        return;
    }

    if data.starts_with("JOIN") {
        register_peer(&addr, &peers).await;
        broadcast_peers(&peers, &cfg).await;
    } else if data.starts_with("KEEPALIVE") {
        refresh_peer(&addr, &peers).await;
    } else if data.starts_with("LEAVE") {
        remove_peer(&addr, &peers).await;
        broadcast_peers(&peers, &cfg).await;
    } else if !data.is_empty() {
        eprintln!(
            "{} unrecognized message from {addr}, dropped",
            "[tracker]".yellow().bold()
        );
    }
}

async fn register_peer(addr: &str, peers: &Mutex<Vec<PeerEntry>>) {
    let mut peers = peers.lock().await;
    match peers.iter_mut().find(|p| p.addr == addr) {
        Some(entry) => entry.last_seen = Instant::now(),
        None => peers.push(PeerEntry {
            addr: addr.to_string(),
            last_seen: Instant::now(),
        }),
    }
    println!(
        "{} registered a peer {addr}",
        "[tracker]".bright_green().bold()
    );
}

async fn refresh_peer(addr: &str, peers: &Mutex<Vec<PeerEntry>>) {
    let mut peers = peers.lock().await;
    match peers.iter_mut().find(|p| p.addr == addr) {
        Some(entry) => entry.last_seen = Instant::now(),
        None => {
            // A keepalive from an address we dropped: let it back in.
            println!("{} peer {addr} rejoins", "[tracker]".bright_blue());
            peers.push(PeerEntry {
                addr: addr.to_string(),
                last_seen: Instant::now(),
            });
        }
    }
}

async fn remove_peer(addr: &str, peers: &Mutex<Vec<PeerEntry>>) {
    let mut peers = peers.lock().await;
    peers.retain(|p| p.addr != addr);
    println!(
        "{} removed a peer {addr}",
        "[tracker]".bright_yellow().bold()
    );
}

/// Send the full ordered membership list to every member's listener.
async fn broadcast_peers(peers: &Mutex<Vec<PeerEntry>>, cfg: &TrackerConfig) {
    let list: Vec<String> = peers.lock().await.iter().map(|p| p.addr.clone()).collect();
    let msg = Message::PeerList(list.clone());
    for peer in &list {
        let addr = format!("{peer}:{}", cfg.peer_port);
        if let Err(e) = protocol::send_message(&addr, &msg).await {
            eprintln!(
                "{} failed to send peer list to {peer}: {e}",
                "[tracker]".yellow().bold()
            );
        }
    }
}

/// Every sweep interval, evict members idle past the cutoff. Each
/// eviction broadcasts the shrunken list, like an explicit leave.
async fn sweep(peers: Arc<Mutex<Vec<PeerEntry>>>, cfg: Arc<TrackerConfig>) {
    loop {
        sleep(cfg.sweep_interval).await;
        let expired = {
            let peers = peers.lock().await;
            collect_expired(&peers, Instant::now(), cfg.evict_after)
        };
        for addr in expired {
            println!(
                "{} evicting silent peer {addr}",
                "[tracker]".bright_yellow().bold()
            );
            remove_peer(&addr, &peers).await;
            broadcast_peers(&peers, &cfg).await;
        }
    }
}

fn collect_expired(peers: &[PeerEntry], now: Instant, evict_after: Duration) -> Vec<String> {
    peers
        .iter()
        .filter(|p| now.duration_since(p.last_seen) > evict_after)
        .map(|p| p.addr.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::read_frame;
    use tokio::time::timeout;

    fn test_cfg(peer_port: u16) -> TrackerConfig {
        TrackerConfig {
            bind_ip: "127.0.0.1".to_string(),
            port: 0,
            peer_port,
            sweep_interval: Duration::from_millis(100),
            evict_after: Duration::from_millis(300),
        }
    }

    #[test]
    fn test_collect_expired_respects_cutoff() {
        let now = Instant::now();
        let peers = vec![
            PeerEntry {
                addr: "10.0.0.1".to_string(),
                last_seen: now,
            },
            PeerEntry {
                addr: "10.0.0.2".to_string(),
                last_seen: now,
            },
        ];
        let later = now + Duration::from_secs(25);
        assert!(collect_expired(&peers, now, Duration::from_secs(20)).is_empty());
        let expired = collect_expired(&peers, later, Duration::from_secs(20));
        assert_eq!(expired, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[tokio::test]
    async fn test_join_broadcasts_membership() {
        // Stand in for a peer's listener to catch the fan-out.
        let inbox = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer_port = inbox.local_addr().unwrap().port();

        let tracker = Tracker::bind(test_cfg(peer_port)).await.unwrap();
        let tracker_addr = tracker.local_addr().unwrap();
        tokio::spawn(tracker.run());

        protocol::send_plain(&tracker_addr.to_string(), "JOIN")
            .await
            .unwrap();

        let (mut stream, _) = timeout(Duration::from_secs(5), inbox.accept())
            .await
            .expect("no broadcast arrived")
            .unwrap();
        let frame = read_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(
            Message::parse(&frame),
            Some(Message::PeerList(vec!["127.0.0.1".to_string()]))
        );
    }

    #[tokio::test]
    async fn test_keepalive_does_not_broadcast() {
        let inbox = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer_port = inbox.local_addr().unwrap().port();

        let tracker = Tracker::bind(test_cfg(peer_port)).await.unwrap();
        let tracker_addr = tracker.local_addr().unwrap();
        tokio::spawn(tracker.run());

        protocol::send_plain(&tracker_addr.to_string(), "JOIN")
            .await
            .unwrap();
        // Drain the join broadcast.
        let (mut stream, _) = timeout(Duration::from_secs(5), inbox.accept())
            .await
            .unwrap()
            .unwrap();
        read_frame(&mut stream).await.unwrap();

        protocol::send_plain(&tracker_addr.to_string(), "KEEPALIVE")
            .await
            .unwrap();
        // A keepalive refreshes silently; nothing further arrives.
        assert!(
            timeout(Duration::from_millis(400), inbox.accept())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_sweeper_evicts_silent_peer() {
        let inbox = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer_port = inbox.local_addr().unwrap().port();

        let tracker = Tracker::bind(test_cfg(peer_port)).await.unwrap();
        let tracker_addr = tracker.local_addr().unwrap();
        let peers = tracker.peers.clone();
        tokio::spawn(tracker.run());

        protocol::send_plain(&tracker_addr.to_string(), "JOIN")
            .await
            .unwrap();
        let (mut stream, _) = timeout(Duration::from_secs(5), inbox.accept())
            .await
            .unwrap()
            .unwrap();
        read_frame(&mut stream).await.unwrap();

        // No keepalives: the sweeper drops us after the cutoff.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            sleep(Duration::from_millis(100)).await;
            if peers.lock().await.is_empty() {
                break;
            }
            assert!(Instant::now() < deadline, "peer was never evicted");
        }
    }
}
