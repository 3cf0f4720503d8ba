#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use quizsync_kernel_contracts::session::PlayerId;
use quizsync_kernel_contracts::standing::{
    LeaderboardEntry, StandingSnapshot, STANDING_CONTRACT_VERSION,
};
use quizsync_kernel_contracts::WallClockMs;

/// Merges the session's join-ordered player list with the score entries found on the ledger.
///
/// Players without an entry score 0. Sorted by score descending; equal scores keep join order.
/// Entries for ids not in `players` are ignored.
pub fn merge_standing(
    players: &[PlayerId],
    scores: &BTreeMap<PlayerId, u64>,
    polled_at: WallClockMs,
    session_finalized: bool,
) -> StandingSnapshot {
    let mut rows: Vec<(PlayerId, u64, bool)> = players
        .iter()
        .map(|p| match scores.get(p) {
            Some(score) => (p.clone(), *score, true),
            None => (p.clone(), 0, false),
        })
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));

    let entries = rows
        .into_iter()
        .enumerate()
        .map(|(i, (player_id, score, submitted))| LeaderboardEntry {
            rank: u32::try_from(i + 1).unwrap_or(u32::MAX),
            player_id,
            score,
            submitted,
        })
        .collect();

    StandingSnapshot {
        schema_version: STANDING_CONTRACT_VERSION,
        entries,
        polled_at,
        session_finalized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizsync_kernel_contracts::Validate;

    fn pid(s: &str) -> PlayerId {
        PlayerId::new(s).unwrap()
    }

    #[test]
    fn at_standing_01_missing_entries_score_zero_and_keep_join_order() {
        let players = vec![pid("a"), pid("b"), pid("c")];
        let scores = BTreeMap::from([(pid("a"), 300)]);
        let s = merge_standing(&players, &scores, WallClockMs(1), false);
        let got: Vec<(&str, u64)> = s
            .entries
            .iter()
            .map(|e| (e.player_id.as_str(), e.score))
            .collect();
        assert_eq!(got, vec![("a", 300), ("b", 0), ("c", 0)]);
        assert!(s.entries[0].submitted);
        assert!(!s.entries[1].submitted);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn at_standing_02_sorted_descending_with_stable_ties() {
        let players = vec![pid("a"), pid("b"), pid("c"), pid("d")];
        let scores = BTreeMap::from([(pid("b"), 500), (pid("c"), 900), (pid("d"), 500)]);
        let s = merge_standing(&players, &scores, WallClockMs(1), false);
        let order: Vec<&str> = s.entries.iter().map(|e| e.player_id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "d", "a"]);
        let ranks: Vec<u32> = s.entries.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn at_standing_03_entries_for_unknown_players_are_ignored() {
        let players = vec![pid("a")];
        let scores = BTreeMap::from([(pid("ghost"), 10_000)]);
        let s = merge_standing(&players, &scores, WallClockMs(1), true);
        assert_eq!(s.entries.len(), 1);
        assert_eq!(s.entries[0].score, 0);
        assert!(s.session_finalized);
    }

    #[test]
    fn at_standing_04_empty_player_list_gives_empty_standing() {
        let s = merge_standing(&[], &BTreeMap::new(), WallClockMs(1), false);
        assert!(s.entries.is_empty());
        assert!(s.top(3).is_empty());
    }
}
