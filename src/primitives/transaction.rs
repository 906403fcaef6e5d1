// Data Structures: Transaction
//
// A single tagged record covers both operations the ledger supports:
// registering ownership of a song and transferring a license to another
// user. The wire discriminant is the `transaction_type` field; transfers
// additionally carry the recipient in `other_user`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    Register,
    Transfer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "transaction_type")]
    pub kind: TxKind,
    /// For Register the owner; for Transfer the current owner initiating
    /// the transfer.
    pub user_name: String,
    pub timestamp: String,
    pub song_name: String,
    /// SHA-256 over the song's byte content, or the file-missing sentinel.
    pub song_hash: String,
    /// Hash of the originating peer's address.
    pub signature: String,
    /// Recipient of a transfer; absent on registrations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_user: Option<String>,
}

#[derive(Debug, Error)]
pub enum TxParseError {
    #[error("malformed transaction JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transfer carries no recipient")]
    MissingRecipient,
}

impl Transaction {
    pub fn register(
        user_name: String,
        song_name: String,
        song_hash: String,
        timestamp: String,
        signature: String,
    ) -> Self {
        Transaction {
            kind: TxKind::Register,
            user_name,
            timestamp,
            song_name,
            song_hash,
            signature,
            other_user: None,
        }
    }

    pub fn transfer(
        owner: String,
        song_name: String,
        song_hash: String,
        recipient: String,
        timestamp: String,
        signature: String,
    ) -> Self {
        Transaction {
            kind: TxKind::Transfer,
            user_name: owner,
            timestamp,
            song_name,
            song_hash,
            signature,
            other_user: Some(recipient),
        }
    }

    pub fn serialize(&self) -> String {
        serde_json::to_string(self).expect("transaction serializes to JSON")
    }

    /// Parse a wire transaction, enforcing the single ingress schema:
    /// transfers must name a non-empty recipient.
    pub fn parse(data: &str) -> Result<Transaction, TxParseError> {
        let tx: Transaction = serde_json::from_str(data)?;
        if tx.kind == TxKind::Transfer
            && tx.other_user.as_deref().is_none_or(|u| u.is_empty())
        {
            return Err(TxParseError::MissingRecipient);
        }
        Ok(tx)
    }
}
