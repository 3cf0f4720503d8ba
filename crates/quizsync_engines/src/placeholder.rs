#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};

use quizsync_kernel_contracts::session::{PlayerId, SessionId};

pub const PLACEHOLDER_DOMAIN: &str = "quizsync.placeholder.v1";
pub const PLACEHOLDER_MIN_SCORE: u64 = 1_000;
pub const PLACEHOLDER_SPAN: u64 = 3_000;

/// Stand-in score for a peer that never reports one (offline demo only).
///
/// Seeded by `(session_id, player_id)` through SHA-256 so every client derives the same value
/// without communicating. Range is `[1000, 4000)`.
pub fn placeholder_score(session_id: &SessionId, player_id: &PlayerId) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(PLACEHOLDER_DOMAIN.as_bytes());
    hasher.update([0u8]);
    hasher.update(session_id.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(player_id.as_str().as_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    PLACEHOLDER_MIN_SCORE + u64::from_be_bytes(head) % PLACEHOLDER_SPAN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_placeholder_01_deterministic_and_in_range() {
        let sid = SessionId::new("game_1").unwrap();
        for i in 0..64 {
            let p = PlayerId::new(format!("0xplayer{i}")).unwrap();
            let a = placeholder_score(&sid, &p);
            let b = placeholder_score(&sid, &p);
            assert_eq!(a, b);
            assert!((1_000..4_000).contains(&a));
        }
    }

    #[test]
    fn at_placeholder_02_depends_on_both_seeds() {
        let p = PlayerId::new("0xabc").unwrap();
        let scores: std::collections::BTreeSet<u64> = (0..16)
            .map(|i| placeholder_score(&SessionId::new(format!("g{i}")).unwrap(), &p))
            .collect();
        assert!(scores.len() > 1);
    }

    #[test]
    fn at_placeholder_03_case_of_player_id_does_not_matter() {
        let sid = SessionId::new("game_1").unwrap();
        assert_eq!(
            placeholder_score(&sid, &PlayerId::new("0xABC").unwrap()),
            placeholder_score(&sid, &PlayerId::new("0xabc").unwrap())
        );
    }
}
