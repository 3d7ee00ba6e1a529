use crate::types::Event;

/// How late a missed repeat may still be caught up, in seconds.
pub const CATCH_UP_WINDOW_SECS: i64 = 300;

/// Compute when `event` should next be dispatched, as of `now` (epoch seconds).
///
/// One-shot events return their `dispatch_time` unchanged. Repeating events
/// return the first slot `dispatch_time + k * interval` (k ≥ 0) at or after
/// `now` that is later than `last_run_time`, except that a slot missed by
/// less than [`CATCH_UP_WINDOW_SECS`] (typically during downtime) is returned
/// instead so it fires late rather than being skipped. At most one slot is
/// ever caught up.
pub fn calculate_next_run(event: &Event, now: i64) -> i64 {
    let Some(interval) = event.interval_secs() else {
        return event.dispatch_time;
    };

    // Slots are never placed before the anchor.
    let elapsed = now - event.dispatch_time;
    let slots = if elapsed > 0 {
        (elapsed + interval - 1) / interval
    } else {
        0
    };
    let ideal = event.dispatch_time + slots * interval;

    let Some(last_run) = event.last_run_time else {
        return ideal;
    };

    let previous = ideal - interval;
    if slots > 0 && now < previous + CATCH_UP_WINDOW_SECS && now - last_run > CATCH_UP_WINDOW_SECS {
        return previous;
    }
    // A slot at or before the last run has already been consumed.
    if ideal <= last_run {
        return ideal + ((last_run - ideal) / interval + 1) * interval;
    }
    ideal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Repeat;

    const HOUR: i64 = 3_600;
    const DAY: i64 = 86_400;

    fn event(dispatch: i64, repeat: Repeat, multiplier: u32, last_run: Option<i64>) -> Event {
        let mut e = Event::create_new(1, dispatch, repeat, multiplier, "e", "");
        e.last_run_time = last_run;
        e
    }

    #[test]
    fn one_shot_returns_dispatch_time() {
        let e = event(1_000, Repeat::No, 5, None);
        assert_eq!(calculate_next_run(&e, 0), 1_000);
        assert_eq!(calculate_next_run(&e, 50_000), 1_000);
    }

    #[test]
    fn future_anchor_is_the_first_run() {
        let e = event(10 * DAY, Repeat::Daily, 1, None);
        assert_eq!(calculate_next_run(&e, 0), 10 * DAY);
        assert_eq!(calculate_next_run(&e, 10 * DAY), 10 * DAY);
    }

    #[test]
    fn next_slot_after_now() {
        let e = event(0, Repeat::Hourly, 2, None);
        assert_eq!(calculate_next_run(&e, 1), 2 * HOUR);
        assert_eq!(calculate_next_run(&e, 2 * HOUR + 1), 4 * HOUR);
    }

    #[test]
    fn daily_rounds_up_to_the_next_boundary() {
        let t = 1_700_000_000;
        let e = event(t, Repeat::Daily, 1, None);
        assert_eq!(calculate_next_run(&e, t + 2 * DAY + DAY / 2), t + 3 * DAY);
    }

    #[test]
    fn catch_up_after_a_recorded_run() {
        let t = 1_700_000_000;
        let e = event(t, Repeat::Daily, 1, Some(t + DAY));
        assert_eq!(calculate_next_run(&e, t + 2 * DAY + 240), t + 2 * DAY);
    }

    #[test]
    fn catches_up_a_slot_missed_by_under_five_minutes() {
        // Last ran one day ago; the slot at 1d was missed by 299s.
        let e = event(0, Repeat::Daily, 1, Some(0));
        assert_eq!(calculate_next_run(&e, DAY + 299), DAY);
    }

    #[test]
    fn skips_a_slot_missed_by_five_minutes_or_more() {
        let e = event(0, Repeat::Daily, 1, Some(0));
        assert_eq!(calculate_next_run(&e, DAY + 300), 2 * DAY);
        assert_eq!(calculate_next_run(&e, DAY + 3_000), 2 * DAY);
    }

    #[test]
    fn no_catch_up_without_a_previous_run() {
        let e = event(0, Repeat::Daily, 1, None);
        assert_eq!(calculate_next_run(&e, DAY + 10), 2 * DAY);
    }

    #[test]
    fn no_catch_up_right_after_running() {
        // Ran 10s ago at the 1d slot; the next run is the 2d slot.
        let e = event(0, Repeat::Daily, 1, Some(DAY));
        assert_eq!(calculate_next_run(&e, DAY + 10), 2 * DAY);
    }

    #[test]
    fn a_run_exactly_on_the_slot_is_not_repeated() {
        let e = event(0, Repeat::Weekly, 1, Some(7 * DAY));
        assert_eq!(calculate_next_run(&e, 7 * DAY), 14 * DAY);
    }

    #[test]
    fn a_run_on_the_anchor_moves_to_the_next_slot() {
        let e = event(500, Repeat::Hourly, 1, Some(500));
        assert_eq!(calculate_next_run(&e, 500), 500 + HOUR);
    }
}
