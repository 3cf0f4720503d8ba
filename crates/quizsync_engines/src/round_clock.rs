#![forbid(unsafe_code)]

use quizsync_kernel_contracts::round::RoundClockReading;
use quizsync_kernel_contracts::session::RoundTiming;
use quizsync_kernel_contracts::WallClockMs;

/// Maps the shared start timestamp and the local clock to a position on the round timeline.
///
/// Pure and total: a `now` before `start` reads as elapsed 0 (round 0, full time remaining),
/// and any round index at or past `round_count` is reported as terminal.
pub fn read_round_clock(
    start: WallClockMs,
    now: WallClockMs,
    timing: RoundTiming,
) -> RoundClockReading {
    let duration_ms = timing.round_duration_ms.max(1);
    let elapsed_ms = now.saturating_since(start);
    let round_index = u32::try_from(elapsed_ms / duration_ms).unwrap_or(u32::MAX);
    let time_in_round_ms = elapsed_ms % duration_ms;
    RoundClockReading {
        elapsed_ms,
        round_index,
        time_in_round_ms,
        remaining_ms: duration_ms - time_in_round_ms,
        terminal: round_index >= timing.round_count,
    }
}

pub fn round_start_at(start: WallClockMs, timing: RoundTiming, round_index: u32) -> WallClockMs {
    start.plus_ms(
        timing
            .round_duration_ms
            .saturating_mul(u64::from(round_index)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: WallClockMs = WallClockMs(1_700_000_000_000);

    fn timing() -> RoundTiming {
        RoundTiming::v1(20_000, 3).unwrap()
    }

    #[test]
    fn at_clock_01_mid_round_reading() {
        let r = read_round_clock(T0, T0.plus_ms(45_000), timing());
        assert_eq!(r.round_index, 2);
        assert_eq!(r.remaining_ms, 15_000);
        assert_eq!(r.time_in_round_ms, 5_000);
        assert!(!r.terminal);
    }

    #[test]
    fn at_clock_02_terminal_at_round_count() {
        let r = read_round_clock(T0, T0.plus_ms(60_000), timing());
        assert_eq!(r.round_index, 3);
        assert!(r.terminal);
        assert_eq!(r.remaining_ms, 20_000);
    }

    #[test]
    fn at_clock_03_now_before_start_reads_as_round_zero() {
        let r = read_round_clock(T0, WallClockMs(T0.0 - 5_000), timing());
        assert_eq!(r.elapsed_ms, 0);
        assert_eq!(r.round_index, 0);
        assert_eq!(r.remaining_ms, 20_000);
    }

    #[test]
    fn at_clock_04_index_is_floor_and_remaining_is_complement() {
        let t = timing();
        let mut prev_index = 0;
        for elapsed in (0..100_000u64).step_by(997) {
            let r = read_round_clock(T0, T0.plus_ms(elapsed), t);
            assert_eq!(u64::from(r.round_index), elapsed / 20_000);
            assert_eq!(r.remaining_ms, 20_000 - (elapsed % 20_000));
            assert!(r.round_index >= prev_index);
            assert_eq!(r.terminal, r.round_index >= 3);
            prev_index = r.round_index;
        }
    }

    #[test]
    fn at_clock_05_round_boundaries() {
        let t = timing();
        let last_ms_of_round0 = read_round_clock(T0, T0.plus_ms(19_999), t);
        assert_eq!(last_ms_of_round0.round_index, 0);
        assert_eq!(last_ms_of_round0.remaining_ms, 1);
        let first_ms_of_round1 = read_round_clock(T0, T0.plus_ms(20_000), t);
        assert_eq!(first_ms_of_round1.round_index, 1);
        assert_eq!(first_ms_of_round1.remaining_ms, 20_000);
        assert_eq!(round_start_at(T0, t, 2), T0.plus_ms(40_000));
    }
}
