#![forbid(unsafe_code)]

use quizsync_kernel_contracts::session::{PlayerId, RoundTiming, SessionId, SessionLifecycle};
use quizsync_kernel_contracts::WallClockMs;
use quizsync_storage::ledger_store::{LedgerEventKind, LedgerStore, StorageError};
use quizsync_storage::repo::QuizLedgerRepo;

fn host() -> PlayerId {
    PlayerId::new("0xhost").unwrap()
}

fn player(n: u8) -> PlayerId {
    PlayerId::new(format!("0xplayer{n}")).unwrap()
}

fn store_with_session() -> (LedgerStore, SessionId) {
    let mut s = LedgerStore::new_in_memory();
    let sid = s
        .insert_session_row(host(), RoundTiming::mvp_v1(), 100, WallClockMs(1))
        .unwrap();
    (s, sid)
}

#[test]
fn at_session_db_01_created_session_is_waiting_without_start() {
    let (s, sid) = store_with_session();
    let row = s.session_row(&sid).unwrap();
    assert_eq!(row.lifecycle, SessionLifecycle::Waiting);
    assert!(row.start_timestamp_ms.is_none());
    assert!(row.players.is_empty());

    let wire = s.session_wire_row(&sid).unwrap();
    assert_eq!(wire.state, Some(0));
    assert_eq!(wire.host_id.as_deref(), Some("0xhost"));
    assert_eq!(wire.score_table_id, Some(sid.score_table_id().as_str().to_string()));
}

#[test]
fn at_session_db_02_players_join_in_order_and_once() {
    let (mut s, sid) = store_with_session();
    s.append_player_row(&sid, player(2), WallClockMs(2)).unwrap();
    s.append_player_row(&sid, player(1), WallClockMs(3)).unwrap();
    assert!(matches!(
        s.append_player_row(&sid, player(2), WallClockMs(4)),
        Err(StorageError::DuplicateKey { .. })
    ));
    assert_eq!(s.session_row(&sid).unwrap().players, vec![player(2), player(1)]);
}

#[test]
fn at_session_db_03_host_cannot_join_as_player() {
    let (mut s, sid) = store_with_session();
    assert!(matches!(
        s.append_player_row(&sid, host(), WallClockMs(2)),
        Err(StorageError::InvalidState { .. })
    ));
}

#[test]
fn at_session_db_04_only_host_starts_and_only_once() {
    let (mut s, sid) = store_with_session();
    s.append_player_row(&sid, player(1), WallClockMs(2)).unwrap();
    assert!(matches!(
        s.start_session_row(&sid, &player(1), WallClockMs(5)),
        Err(StorageError::Unauthorized { .. })
    ));
    let started = s.start_session_row(&sid, &host(), WallClockMs(10)).unwrap();
    assert_eq!(started, WallClockMs(10));
    assert!(matches!(
        s.start_session_row(&sid, &host(), WallClockMs(20)),
        Err(StorageError::InvalidState { .. })
    ));
    let row = s.session_row(&sid).unwrap();
    assert_eq!(row.lifecycle, SessionLifecycle::Active);
    assert_eq!(row.start_timestamp_ms, Some(WallClockMs(10)));
}

#[test]
fn at_session_db_05_join_closed_after_start() {
    let (mut s, sid) = store_with_session();
    s.start_session_row(&sid, &host(), WallClockMs(10)).unwrap();
    assert!(matches!(
        s.append_player_row(&sid, player(9), WallClockMs(11)),
        Err(StorageError::InvalidState { .. })
    ));
}

#[test]
fn at_session_db_06_unknown_session_is_foreign_key_violation() {
    let mut s = LedgerStore::new_in_memory();
    let missing = SessionId::new("qs_missing").unwrap();
    assert!(matches!(
        s.append_player_row(&missing, player(1), WallClockMs(1)),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
    assert!(s.session_wire_row(&missing).is_none());
}

#[test]
fn at_session_db_07_every_accepted_write_is_audited() {
    let (mut s, sid) = store_with_session();
    s.append_player_row(&sid, player(1), WallClockMs(2)).unwrap();
    let _ = s.append_player_row(&sid, player(1), WallClockMs(3));
    s.start_session_row(&sid, &host(), WallClockMs(4)).unwrap();
    let kinds: Vec<LedgerEventKind> = s.ledger_event_rows().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            LedgerEventKind::SessionCreated,
            LedgerEventKind::PlayerJoined,
            LedgerEventKind::SessionStarted,
        ]
    );
    let ids: Vec<u64> = s.ledger_event_rows().iter().map(|e| e.event_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn at_session_db_08_session_ids_are_distinct() {
    let mut s = LedgerStore::new_in_memory();
    let a = s
        .insert_session_row(host(), RoundTiming::mvp_v1(), 0, WallClockMs(1))
        .unwrap();
    let b = s
        .insert_session_row(host(), RoundTiming::mvp_v1(), 0, WallClockMs(1))
        .unwrap();
    assert_ne!(a, b);
    assert_ne!(a.score_table_id(), b.score_table_id());
}
