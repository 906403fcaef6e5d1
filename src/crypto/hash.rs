// Cryptographic Hashing Wrappers
//
// Every digest in the protocol is lowercase-hex SHA-256: block hashes,
// peer signatures, song content digests and the merkle fold all go
// through here.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Sentinel digest for a song file that is absent at composition time.
/// Transactions carrying it still serialize; the front end is expected
/// to block submission.
pub const FILE_NOT_FOUND: &str = "File not found";

/// SHA-256 of a byte slice, rendered as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Streaming SHA-256 over a file's contents, 4 KiB at a time.
pub fn hash_file(path: &Path) -> String {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return FILE_NOT_FOUND.to_string(),
    };

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 4096];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) => {
                return format!("Errors occur when dealing with {}: {}", path.display(), e);
            }
        }
    }
    hex::encode(hasher.finalize())
}

/// Fold a list of hex strings down to a single merkle root: pairwise
/// SHA-256 of adjacent items, duplicating the last on odd counts, until
/// one remains. Empty input yields "0"; a single item is its own root.
pub fn merkle_root(items: &[String]) -> String {
    if items.is_empty() {
        return "0".to_string();
    }

    let mut level: Vec<String> = items.to_vec();
    while level.len() > 1 {
        if level.len() % 2 != 0 {
            level.push(level[level.len() - 1].clone());
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(pair[0].as_bytes());
            hasher.update(pair[1].as_bytes());
            next.push(hex::encode(hasher.finalize()));
        }
        level = next;
    }
    level.swap_remove(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_file_matches_in_memory() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"la la la").unwrap();
        assert_eq!(hash_file(f.path()), sha256_hex(b"la la la"));
    }

    #[test]
    fn test_hash_file_missing_sentinel() {
        let path = Path::new("/nonexistent/never_released.mp3");
        assert_eq!(hash_file(path), FILE_NOT_FOUND);
    }

    #[test]
    fn test_merkle_empty_and_single() {
        assert_eq!(merkle_root(&[]), "0");
        let one = vec!["deadbeef".to_string()];
        assert_eq!(merkle_root(&one), "deadbeef");
    }

    #[test]
    fn test_merkle_pairwise() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(merkle_root(&items), sha256_hex(b"ab"));
    }

    #[test]
    fn test_merkle_odd_duplicates_last() {
        // [a, b, c] folds as [H(ab), H(cc)] then H(H(ab) || H(cc))
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let left = sha256_hex(b"ab");
        let right = sha256_hex(b"cc");
        let expected = sha256_hex(format!("{left}{right}").as_bytes());
        assert_eq!(merkle_root(&items), expected);
    }

    #[test]
    fn test_merkle_deterministic() {
        let items = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        assert_eq!(merkle_root(&items), merkle_root(&items));
    }
}
