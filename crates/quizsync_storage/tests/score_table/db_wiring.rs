#![forbid(unsafe_code)]

use quizsync_kernel_contracts::session::{PlayerId, RoundTiming, ScoreTableId, SessionId};
use quizsync_kernel_contracts::WallClockMs;
use quizsync_storage::ledger_store::{LedgerStore, StorageError};
use quizsync_storage::repo::QuizLedgerRepo;

fn host() -> PlayerId {
    PlayerId::new("0xhost").unwrap()
}

fn player(n: u8) -> PlayerId {
    PlayerId::new(format!("0xplayer{n}")).unwrap()
}

fn active_store() -> (LedgerStore, SessionId) {
    let mut s = LedgerStore::new_in_memory();
    let sid = s
        .insert_session_row(host(), RoundTiming::mvp_v1(), 100, WallClockMs(1))
        .unwrap();
    s.append_player_row(&sid, player(1), WallClockMs(2)).unwrap();
    s.append_player_row(&sid, player(2), WallClockMs(2)).unwrap();
    s.start_session_row(&sid, &host(), WallClockMs(10)).unwrap();
    (s, sid)
}

#[test]
fn at_scores_db_01_score_written_once_per_player() {
    let (mut s, sid) = active_store();
    s.insert_score_row(&sid, player(1), 1_380, WallClockMs(70))
        .unwrap();
    assert!(matches!(
        s.insert_score_row(&sid, player(1), 9_999, WallClockMs(71)),
        Err(StorageError::DuplicateKey { .. })
    ));
    assert_eq!(s.score_row(&sid.score_table_id(), &player(1)), Some(1_380));
}

#[test]
fn at_scores_db_02_absent_entry_reads_none() {
    let (s, sid) = active_store();
    assert_eq!(s.score_row(&sid.score_table_id(), &player(2)), None);
    let unknown_table = ScoreTableId::new("qs_nope.scores").unwrap();
    assert_eq!(s.score_row(&unknown_table, &player(1)), None);
}

#[test]
fn at_scores_db_03_only_listed_players_may_submit() {
    let (mut s, sid) = active_store();
    assert!(matches!(
        s.insert_score_row(&sid, player(7), 100, WallClockMs(70)),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
    assert!(matches!(
        s.insert_score_row(&sid, host(), 100, WallClockMs(70)),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
}

#[test]
fn at_scores_db_04_scores_rejected_before_start_and_after_finalize() {
    let mut s = LedgerStore::new_in_memory();
    let sid = s
        .insert_session_row(host(), RoundTiming::mvp_v1(), 100, WallClockMs(1))
        .unwrap();
    s.append_player_row(&sid, player(1), WallClockMs(2)).unwrap();
    assert!(matches!(
        s.insert_score_row(&sid, player(1), 100, WallClockMs(3)),
        Err(StorageError::InvalidState { .. })
    ));

    s.start_session_row(&sid, &host(), WallClockMs(10)).unwrap();
    s.finalize_session_row(&sid, &host(), &[player(1)], WallClockMs(90))
        .unwrap();
    assert!(matches!(
        s.insert_score_row(&sid, player(1), 100, WallClockMs(91)),
        Err(StorageError::InvalidState { .. })
    ));
}

#[test]
fn at_scores_db_05_tables_are_isolated_per_session() {
    let (mut s, sid) = active_store();
    let other = s
        .insert_session_row(host(), RoundTiming::mvp_v1(), 0, WallClockMs(1))
        .unwrap();
    s.insert_score_row(&sid, player(1), 500, WallClockMs(70))
        .unwrap();
    assert_eq!(s.score_row(&other.score_table_id(), &player(1)), None);
}

#[test]
fn at_scores_db_06_guard_errors_render_and_chain_contract_source() {
    let (mut s, sid) = active_store();
    s.insert_score_row(&sid, player(1), 10, WallClockMs(70))
        .unwrap();
    let dup = s
        .insert_score_row(&sid, player(1), 20, WallClockMs(71))
        .unwrap_err();
    assert!(dup.to_string().contains("duplicate key '0xplayer1'"));

    let bad = StorageError::from(ScoreTableId::new("").unwrap_err());
    assert!(bad.to_string().starts_with("contract violation: "));
    let source = std::error::Error::source(&bad).map(|e| e.to_string());
    assert_eq!(source.as_deref(), Some("score_table_id: must not be empty"));
}
