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

fn active_store() -> (LedgerStore, SessionId) {
    let mut s = LedgerStore::new_in_memory();
    let sid = s
        .insert_session_row(host(), RoundTiming::mvp_v1(), 250, WallClockMs(1))
        .unwrap();
    for n in 1..=3 {
        s.append_player_row(&sid, player(n), WallClockMs(2)).unwrap();
    }
    s.start_session_row(&sid, &host(), WallClockMs(10)).unwrap();
    (s, sid)
}

#[test]
fn at_rewards_db_01_finalize_is_host_only() {
    let (mut s, sid) = active_store();
    assert!(matches!(
        s.finalize_session_row(&sid, &player(1), &[player(1)], WallClockMs(80)),
        Err(StorageError::Unauthorized { .. })
    ));
    assert_eq!(
        s.session_row(&sid).unwrap().lifecycle,
        SessionLifecycle::Active
    );
}

#[test]
fn at_rewards_db_02_finalize_ends_session_and_allocates_rewards() {
    let (mut s, sid) = active_store();
    s.finalize_session_row(&sid, &host(), &[player(2), player(3)], WallClockMs(80))
        .unwrap();
    let row = s.session_row(&sid).unwrap();
    assert_eq!(row.lifecycle, SessionLifecycle::Ended);
    assert_eq!(row.winners, vec![player(2), player(3)]);
    assert_eq!(s.pending_reward(&sid, &player(2)), Some(250));
    assert_eq!(s.pending_reward(&sid, &player(1)), None);
    assert_eq!(s.session_wire_row(&sid).unwrap().state, Some(2));
}

#[test]
fn at_rewards_db_03_second_finalize_rejected_by_ledger_guard() {
    let (mut s, sid) = active_store();
    s.finalize_session_row(&sid, &host(), &[player(1)], WallClockMs(80))
        .unwrap();
    assert!(matches!(
        s.finalize_session_row(&sid, &host(), &[player(2)], WallClockMs(81)),
        Err(StorageError::InvalidState { .. })
    ));
    assert_eq!(s.session_row(&sid).unwrap().winners, vec![player(1)]);
}

#[test]
fn at_rewards_db_04_winners_must_be_unique_listed_players() {
    let (mut s, sid) = active_store();
    assert!(matches!(
        s.finalize_session_row(&sid, &host(), &[player(9)], WallClockMs(80)),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
    assert!(matches!(
        s.finalize_session_row(&sid, &host(), &[player(1), player(1)], WallClockMs(80)),
        Err(StorageError::DuplicateKey { .. })
    ));
    assert!(matches!(
        s.finalize_session_row(&sid, &host(), &[], WallClockMs(80)),
        Err(StorageError::ContractViolation(_))
    ));
}

#[test]
fn at_rewards_db_05_reward_claimed_once() {
    let (mut s, sid) = active_store();
    s.finalize_session_row(&sid, &host(), &[player(1)], WallClockMs(80))
        .unwrap();
    assert_eq!(s.claim_reward_row(&sid, &player(1), WallClockMs(90)), Ok(250));
    assert!(matches!(
        s.claim_reward_row(&sid, &player(1), WallClockMs(91)),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
    assert!(matches!(
        s.claim_reward_row(&sid, &player(2), WallClockMs(91)),
        Err(StorageError::ForeignKeyViolation { .. })
    ));
    let last = s.ledger_event_rows().last().unwrap();
    assert_eq!(last.kind, LedgerEventKind::RewardClaimed);
    assert_eq!(last.amount, Some(250));
}
