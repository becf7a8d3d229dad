//! Track metadata normalization: the resolver always returns a normalized
//! form and a deterministic `track_key`, independent of whether any upstream
//! lookup succeeded.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").unwrap()
    })
}

fn isrc_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z]{2}[A-Za-z0-9]{3}\d{2}\d{5}$").unwrap())
}

pub fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn is_valid_mbid(value: &str) -> bool {
    uuid_re().is_match(value.trim())
}

/// Returns the canonical uppercase form of an ISRC, or `None` if malformed.
pub fn normalize_isrc(value: &str) -> Option<String> {
    let cleaned: String = value.chars().filter(|c| c.is_alphanumeric()).collect();
    let upper = cleaned.to_uppercase();
    if isrc_re().is_match(&upper) {
        Some(upper)
    } else {
        None
    }
}

/// Buckets duration into 2-second windows so near-identical masters collapse
/// onto the same key.
pub fn duration_bucket(duration_s: f64) -> u32 {
    (duration_s / 2.0).round() as u32
}

/// Deterministic key over normalized title/artist/album and bucketed duration.
pub fn track_key(title: &str, artist: &str, album: Option<&str>, duration_s: Option<f64>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(title).as_bytes());
    hasher.update(b"|");
    hasher.update(normalize_text(artist).as_bytes());
    hasher.update(b"|");
    hasher.update(album.map(normalize_text).unwrap_or_default().as_bytes());
    hasher.update(b"|");
    if let Some(d) = duration_s {
        hasher.update(duration_bucket(d).to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Normalized Levenshtein similarity in `[0,1]`, 1.0 for an exact match.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let distance = levenshtein_distance(&a, &b);
    1.0 - (distance as f64 / max_len as f64)
}

/// Minimum number of single-character edits turning `a` into `b`.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = if a_char == b_char { 0 } else { 1 };
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Tiered duration-closeness score used by the ISRC/fingerprint/text-search steps.
pub fn duration_score(diff_seconds: f64) -> f64 {
    let diff = diff_seconds.abs();
    if diff <= 1.0 {
        1.0
    } else if diff <= 2.0 {
        0.9
    } else if diff <= 5.0 {
        0.7
    } else if diff <= 10.0 {
        0.4
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_and_lowercases() {
        assert_eq!(normalize_text("  The   Song  "), "the song");
    }

    #[test]
    fn mbid_validation() {
        assert!(is_valid_mbid("123e4567-e89b-12d3-a456-426614174000"));
        assert!(!is_valid_mbid("not-a-uuid"));
    }

    #[test]
    fn isrc_normalization() {
        assert_eq!(normalize_isrc("us-rc1-23-00001"), Some("USRC12300001".to_string()));
        assert_eq!(normalize_isrc("too-short"), None);
    }

    #[test]
    fn duration_score_tiers() {
        assert_eq!(duration_score(0.5), 1.0);
        assert_eq!(duration_score(1.5), 0.9);
        assert_eq!(duration_score(3.0), 0.7);
        assert_eq!(duration_score(8.0), 0.4);
        assert_eq!(duration_score(30.0), 0.0);
    }

    #[test]
    fn track_key_is_stable_across_duration_jitter() {
        let a = track_key("Title", "Artist", None, Some(180.2));
        let b = track_key("Title", "Artist", None, Some(180.9));
        assert_eq!(a, b);
    }

    #[test]
    fn similarity_of_typoed_titles_is_high_but_not_one() {
        let score = similarity("Bohemian Rhapsody", "Bohemian Rapsody");
        assert!(score > 0.9 && score < 1.0);
        assert_eq!(similarity("same", "same"), 1.0);
    }
}
