// Wire protocol. Every peer-to-peer message is a length-prefixed frame:
//   [4-byte big-endian payload length][UTF-8 payload]
// The payload begins with an ASCII prefix naming the message kind.
//
// Tracker-bound control messages are unframed plain UTF-8; they are short
// and sent one per connection. All sockets are one-shot: open, send (or
// read until EOF), close. There is no session state to manage.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::MAX_FRAME;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Membership broadcast from the tracker: the ordered peer IP list.
    PeerList(Vec<String>),
    /// A joining peer asking for a copy of the chain.
    RequestChain,
    /// Chain copy for a joining peer (END-delimited block dump).
    ChainDump(String),
    /// One freshly mined serialized block.
    NewBlock(String),
    /// One serialized transaction.
    NewTransaction(String),
    /// Conflict: the sender's chain dump, offered as a replacement.
    RequestChange(String),
}

impl Message {
    pub fn encode(&self) -> String {
        match self {
            Message::PeerList(peers) => format!(
                "PEER_LIST:{}",
                serde_json::to_string(peers).expect("peer list serializes to JSON")
            ),
            Message::RequestChain => "REQUEST_BC".to_string(),
            Message::ChainDump(dump) => format!("RECEIVE_BC:{dump}"),
            Message::NewBlock(block) => format!("NEW_BLOCK:{block}"),
            Message::NewTransaction(tx) => format!("TRANSACTION:{tx}"),
            Message::RequestChange(dump) => format!("REQ_CHANGE:{dump}"),
        }
    }

    /// Classify an inbound payload by prefix. Returns None for unknown
    /// prefixes and malformed peer lists; the caller logs and drops.
    pub fn parse(payload: &str) -> Option<Message> {
        if let Some(body) = payload.strip_prefix("PEER_LIST:") {
            let peers = serde_json::from_str(body).ok()?;
            Some(Message::PeerList(peers))
        } else if let Some(body) = payload.strip_prefix("RECEIVE_BC:") {
            Some(Message::ChainDump(body.to_string()))
        } else if let Some(body) = payload.strip_prefix("NEW_BLOCK:") {
            Some(Message::NewBlock(body.to_string()))
        } else if let Some(body) = payload.strip_prefix("TRANSACTION:") {
            Some(Message::NewTransaction(body.to_string()))
        } else if let Some(body) = payload.strip_prefix("REQ_CHANGE:") {
            Some(Message::RequestChange(body.to_string()))
        } else if payload.starts_with("REQUEST_BC") {
            Some(Message::RequestChain)
        } else {
            None
        }
    }
}

/// Peer → tracker control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerMessage {
    Join,
    KeepAlive,
    Leave,
}

impl TrackerMessage {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackerMessage::Join => "JOIN",
            TrackerMessage::KeepAlive => "KEEPALIVE",
            TrackerMessage::Leave => "LEAVE",
        }
    }
}

pub async fn write_frame(stream: &mut TcpStream, payload: &str) -> io::Result<()> {
    let bytes = payload.as_bytes();
    stream.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Read one frame, or None on a clean EOF between frames.
pub async fn read_frame(stream: &mut TcpStream) -> io::Result<Option<String>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame is not UTF-8"))
}

/// One-shot framed send to a peer's listener.
pub async fn send_message(addr: &str, msg: &Message) -> io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    write_frame(&mut stream, &msg.encode()).await
}

/// One-shot unframed send, used for tracker control messages.
pub async fn send_plain(addr: &str, msg: &str) -> io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(msg.as_bytes()).await?;
    stream.flush().await
}
