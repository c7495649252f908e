//! Damped volume-change signal.
//!
//! Turnover is only recomputed once at least [`TURNOVER_WINDOW_SECS`] have
//! passed since the last snapshot; in between, the snapshot and the last
//! turnover value are carried forward untouched.

use crate::models::platform::PlatformRecord;

/// Twelve hours
pub const TURNOVER_WINDOW_SECS: i64 = 43_200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnoverUpdate {
    pub before_time: i64,
    pub before_count: i32,
    pub turn_over: i32,
}

/// Returns the new snapshot and turnover when the window has elapsed
pub fn evaluate(
    update_time: i64,
    sell_count: i32,
    before_time: i64,
    before_count: i32,
) -> Option<TurnoverUpdate> {
    if before_time != 0 && update_time - before_time < TURNOVER_WINDOW_SECS {
        return None;
    }

    Some(TurnoverUpdate {
        before_time: update_time,
        before_count: sell_count,
        turn_over: sell_count.abs_diff(before_count).min(i32::MAX as u32) as i32,
    })
}

/// Apply [`evaluate`] to a record whose current fields were just refreshed
pub fn apply(record: &mut PlatformRecord) {
    if let Some(update) = evaluate(
        record.update_time,
        record.sell_count,
        record.before_time,
        record.before_count,
    ) {
        record.before_time = update.before_time;
        record.before_count = update.before_count;
        record.turn_over = update.turn_over;
    }
}
