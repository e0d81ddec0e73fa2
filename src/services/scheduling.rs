use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::WorkingHours;

/// Half-open interval overlap: [a1,a2) and [b1,b2) share at least one instant.
pub fn overlaps(
    a1: NaiveDateTime,
    a2: NaiveDateTime,
    b1: NaiveDateTime,
    b2: NaiveDateTime,
) -> bool {
    a1 < b2 && b1 < a2
}

/// Occupied intervals for one business on one date, sorted ascending, read
/// fresh from the ledger on every call. Only pending and confirmed bookings
/// occupy time; cancelled ones never do. A booking that started the previous
/// day but runs past midnight shows up here too.
pub fn occupied_intervals(
    conn: &Connection,
    business_id: &str,
    date: NaiveDate,
) -> anyhow::Result<Vec<(NaiveDateTime, NaiveDateTime)>> {
    let day_start = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
    let day_end = day_start + Duration::days(1);

    let bookings =
        queries::get_active_bookings_overlapping(conn, business_id, &day_start, &day_end)?;

    Ok(bookings
        .iter()
        .map(|b| (b.start_time, b.end_time()))
        .collect())
}

/// Candidate start times for a booking of `duration_minutes` on `date`: walk
/// each open window in `granularity_minutes` ticks and keep the ticks whose
/// interval fits inside the window and misses every occupied interval.
///
/// A date in the past yields no slots, as do ticks already elapsed today, a
/// closed day, and a duration no window can hold.
pub fn available_slots(
    hours: &WorkingHours,
    occupied: &[(NaiveDateTime, NaiveDateTime)],
    date: NaiveDate,
    duration_minutes: i64,
    granularity_minutes: i64,
    now: NaiveDateTime,
) -> Vec<NaiveTime> {
    if duration_minutes <= 0 || granularity_minutes <= 0 || date < now.date() {
        return vec![];
    }

    let duration = Duration::minutes(duration_minutes);
    let granularity = Duration::minutes(granularity_minutes);

    let mut slots = vec![];
    for (open, close) in hours.windows_for(date) {
        let mut tick = date.and_time(open);
        let window_close = date.and_time(close);

        while tick + duration <= window_close {
            let fits = tick >= now
                && !occupied
                    .iter()
                    .any(|(b1, b2)| overlaps(tick, tick + duration, *b1, *b2));
            if fits {
                slots.push(tick.time());
            }
            tick += granularity;
        }
    }
    slots
}
