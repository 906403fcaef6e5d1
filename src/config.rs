use std::path::PathBuf;
use std::time::Duration;

use crate::consensus::difficulty::Difficulty;

/// Standard protocol ports
pub const TRACKER_PORT: u16 = 65431;
pub const PEER_PORT: u16 = 54321;

/// Maximum frame size (1 MB); a full chain dump stays far below this
pub const MAX_FRAME: usize = 1_048_576;

/// Tracker heartbeat interval for peers
pub const HEARTBEAT_SECS: u64 = 5;

/// Bind address for listeners, default 0.0.0.0 to accept mesh traffic
pub const BIND_ADDRESS_DEFAULT: &str = "0.0.0.0";

/// Directory names relative to the working directory
pub const LOG_DIR: &str = "log";
pub const SONGS_DIR: &str = "songs";

pub struct PeerConfig {
    /// Address this peer is known by in the mesh (its identity).
    pub host_ip: String,
    /// Address the listener binds. Usually 0.0.0.0; tests pin a loopback IP.
    pub bind_ip: String,
    pub peer_port: u16,
    /// Tracker endpoint as "ip:port".
    pub tracker_addr: String,
    pub songs_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Run the synthetic transaction generator worker.
    pub synthetic_tx: bool,
    pub initial_difficulty: Difficulty,
}

impl PeerConfig {
    pub fn from_env() -> Self {
        PeerConfig {
            host_ip: detect_local_ip(),
            bind_ip: env_or("SONGCHAIN_BIND", BIND_ADDRESS_DEFAULT),
            peer_port: env_port("SONGCHAIN_PEER_PORT", PEER_PORT),
            tracker_addr: env_or(
                "SONGCHAIN_TRACKER_ADDR",
                &format!("127.0.0.1:{TRACKER_PORT}"),
            ),
            songs_dir: PathBuf::from(env_or("SONGCHAIN_SONGS_DIR", SONGS_DIR)),
            log_dir: PathBuf::from(env_or("SONGCHAIN_LOG_DIR", LOG_DIR)),
            synthetic_tx: std::env::var("SONGCHAIN_SYNTH").is_ok_and(|v| v == "1"),
            initial_difficulty: Difficulty::Medium,
        }
    }
}

pub struct TrackerConfig {
    pub bind_ip: String,
    pub port: u16,
    /// Listener port peers receive `PEER_LIST:` fan-out on.
    pub peer_port: u16,
    pub sweep_interval: Duration,
    pub evict_after: Duration,
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        TrackerConfig {
            bind_ip: env_or("SONGCHAIN_BIND", BIND_ADDRESS_DEFAULT),
            port: env_port("SONGCHAIN_TRACKER_PORT", TRACKER_PORT),
            peer_port: env_port("SONGCHAIN_PEER_PORT", PEER_PORT),
            sweep_interval: Duration::from_secs(10),
            evict_after: Duration::from_secs(20),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}

fn env_port(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Address other mesh members can reach this host on. `SONGCHAIN_HOST` wins;
/// otherwise the kernel picks it for us via the default route.
pub fn detect_local_ip() -> String {
    if let Ok(v) = std::env::var("SONGCHAIN_HOST")
        && !v.trim().is_empty()
    {
        return v;
    }

    let probed = std::net::UdpSocket::bind("0.0.0.0:0").and_then(|sock| {
        // No packets are sent; connect() only resolves the outbound interface.
        sock.connect("8.8.8.8:80")?;
        sock.local_addr()
    });
    match probed {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => "127.0.0.1".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(TRACKER_PORT, 65431);
        assert_eq!(PEER_PORT, 54321);
    }

    #[test]
    fn test_detect_local_ip_is_parseable() {
        let ip = detect_local_ip();
        assert!(ip.parse::<std::net::IpAddr>().is_ok());
    }
}
