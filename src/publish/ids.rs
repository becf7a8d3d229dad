//! Opaque job ids and the keccak-based track/content id derivation used by
//! `finalize()`. The derivation mirrors the kind-tagged payload scheme found
//! in the wider publish-and-register ecosystem this service plugs into: a
//! track is identified by `keccak256(kind_word || payload)`, and a user's
//! claim on it by `keccak256(track_id || owner_address)`.

use alloy_primitives::{keccak256, Address, B256};
use alloy_sol_types::SolValue;
use rand::Rng;

const JOB_ID_PREFIX: &str = "music_";
const JOB_ID_SUFFIX_LEN: usize = 17;
const TITLE_ARTIST_ALBUM_KIND: u8 = 3;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `music_` followed by 17 random lowercase-alphanumeric characters.
pub fn generate_job_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..JOB_ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{JOB_ID_PREFIX}{suffix}")
}

/// Lowercases, trims, and collapses internal whitespace runs — the same
/// normalization the chain side applies before hashing, so both sides agree
/// on the bytes that get hashed regardless of how the caller capitalized or
/// spaced their metadata.
pub fn normalize_text(value: &str) -> String {
    value
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `keccak256(abi.encode(["string","string","string"], [title, artist, album]))`
pub fn title_artist_album_payload(title: &str, artist: &str, album: &str) -> B256 {
    let tuple = (
        normalize_text(title),
        normalize_text(artist),
        normalize_text(album),
    );
    keccak256(tuple.abi_encode())
}

/// `keccak256(abi.encode(["uint8","bytes32"], [kind, payload]))`
pub fn compute_track_id(kind: u8, payload: B256) -> B256 {
    let mut kind_word = [0u8; 32];
    kind_word[31] = kind;
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&kind_word);
    buf.extend_from_slice(payload.as_slice());
    keccak256(buf)
}

/// `keccak256(abi.encode(["bytes32","address"], [track_id, owner]))`
pub fn compute_content_id(track_id: B256, owner: Address) -> B256 {
    let tuple = (track_id, owner);
    keccak256(tuple.abi_encode())
}

pub fn derive_track_and_content_id(
    title: &str,
    artist: &str,
    album: &str,
    owner: Address,
) -> (B256, B256) {
    let payload = title_artist_album_payload(title, artist, album);
    let track_id = compute_track_id(TITLE_ARTIST_ALBUM_KIND, payload);
    let content_id = compute_content_id(track_id, owner);
    (track_id, content_id)
}

pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_has_expected_shape() {
        let id = generate_job_id();
        assert!(id.starts_with(JOB_ID_PREFIX));
        assert_eq!(id.len(), JOB_ID_PREFIX.len() + JOB_ID_SUFFIX_LEN);
    }

    #[test]
    fn normalize_text_collapses_whitespace_and_case() {
        assert_eq!(normalize_text("  Abbey   Road  "), "abbey road");
        assert_eq!(normalize_text("Abbey Road"), normalize_text("abbey road"));
    }

    #[test]
    fn track_id_is_deterministic_and_owner_independent() {
        let owner_a: Address = "0x0000000000000000000000000000000000000a"
            .parse()
            .unwrap();
        let owner_b: Address = "0x0000000000000000000000000000000000000b"
            .parse()
            .unwrap();
        let (track_id_a, content_id_a) =
            derive_track_and_content_id("Come Together", "The Beatles", "Abbey Road", owner_a);
        let (track_id_b, content_id_b) =
            derive_track_and_content_id("come together", "THE BEATLES", "abbey road", owner_b);
        assert_eq!(track_id_a, track_id_b);
        assert_ne!(content_id_a, content_id_b);
    }

    #[test]
    fn different_metadata_yields_different_track_id() {
        let owner: Address = "0x0000000000000000000000000000000000000a"
            .parse()
            .unwrap();
        let (id1, _) = derive_track_and_content_id("Come Together", "The Beatles", "Abbey Road", owner);
        let (id2, _) = derive_track_and_content_id("Something", "The Beatles", "Abbey Road", owner);
        assert_ne!(id1, id2);
    }
}
