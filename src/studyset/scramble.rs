//! Seeded answer-choice scrambling. The seed is derived from the prompt hash
//! plus the question's identity so re-running the pipeline on the same
//! generated content reproduces the same scramble.

use sha2::{Digest, Sha256};

/// Derives a 64-bit seed from `sha256(prompt_hash:type:question_id:index)`.
pub fn derive_seed(prompt_hash: &str, question_type: &str, question_id: &str, question_index: usize) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(prompt_hash.as_bytes());
    hasher.update(b":");
    hasher.update(question_type.as_bytes());
    hasher.update(b":");
    hasher.update(question_id.as_bytes());
    hasher.update(b":");
    hasher.update(question_index.to_string().as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

/// xorshift64*, good enough for a deterministic non-cryptographic shuffle.
struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0x9E3779B97F4A7C15 } else { seed },
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

/// Returns a permutation of `[0, 1, 2, 3]` that is never the identity.
pub fn scramble_four(seed: u64) -> [usize; 4] {
    let mut perm = [0usize, 1, 2, 3];
    let mut rng = Xorshift64::new(seed);
    for i in (1..perm.len()).rev() {
        let j = rng.next_below((i + 1) as u64) as usize;
        perm.swap(i, j);
    }
    if perm == [0, 1, 2, 3] {
        perm = [1, 2, 3, 0];
    }
    perm
}

/// Applies a choice permutation to a 4-element slice: `output[i] = input[perm[i]]`.
pub fn apply_permutation<T: Clone>(items: &[T; 4], perm: &[usize; 4]) -> [T; 4] {
    [
        items[perm[0]].clone(),
        items[perm[1]].clone(),
        items[perm[2]].clone(),
        items[perm[3]].clone(),
    ]
}

/// Finds the new index of the element that was at `old_index` before permutation.
pub fn remap_index(perm: &[usize; 4], old_index: usize) -> usize {
    perm.iter().position(|&p| p == old_index).unwrap_or(old_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scramble_is_never_identity() {
        for seed in 0..500u64 {
            let perm = scramble_four(seed);
            assert_ne!(perm, [0, 1, 2, 3], "seed {seed} produced identity permutation");
            let mut sorted = perm;
            sorted.sort();
            assert_eq!(sorted, [0, 1, 2, 3]);
        }
    }

    #[test]
    fn derive_seed_is_deterministic() {
        let a = derive_seed("hash1", "mcq", "q1", 0);
        let b = derive_seed("hash1", "mcq", "q1", 0);
        let c = derive_seed("hash1", "mcq", "q1", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn remap_index_tracks_permutation() {
        let perm = [2, 0, 3, 1];
        let remapped = remap_index(&perm, 0);
        assert_eq!(perm[remapped], 0);
    }
}
