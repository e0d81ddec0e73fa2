use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::models::{Booking, BookingStatus, Business, ServiceSnapshot, WorkingHours};

/// Why a booking request was turned down. Every reason except `NotFound` is
/// recoverable: the caller re-queries slots and retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidDuration,
    PastDate,
    SlotNoLongerAvailable,
    Overlap,
    NotFound,
    InvalidTransition,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidDuration => "invalid_duration",
            RejectReason::PastDate => "past_date",
            RejectReason::SlotNoLongerAvailable => "slot_no_longer_available",
            RejectReason::Overlap => "overlap",
            RejectReason::NotFound => "not_found",
            RejectReason::InvalidTransition => "invalid_transition",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::InvalidDuration => {
                write!(f, "Service duration must be a positive number of minutes.")
            }
            RejectReason::PastDate => {
                write!(f, "That time has already passed. Please pick an upcoming slot.")
            }
            RejectReason::SlotNoLongerAvailable => {
                write!(
                    f,
                    "That time is no longer offered. Please re-check availability and pick another slot."
                )
            }
            RejectReason::Overlap => {
                write!(
                    f,
                    "Sorry, that time slot is already booked. Could you pick a different time?"
                )
            }
            RejectReason::NotFound => write!(f, "Booking not found."),
            RejectReason::InvalidTransition => {
                write!(f, "That status change is not allowed for this booking.")
            }
        }
    }
}

pub type Outcome = Result<Booking, RejectReason>;

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub customer_id: String,
    pub service: ServiceSnapshot,
    pub start_time: NaiveDateTime,
    pub notes: Option<String>,
}

/// The admit/reject decision for a booking request. The overlap check and the
/// ledger insert run inside one IMMEDIATE transaction, so of any set of
/// concurrent mutually-overlapping requests exactly one is admitted; a
/// rejection writes nothing.
pub fn try_book(
    conn: &mut Connection,
    business: &Business,
    granularity_minutes: i64,
    req: &BookingRequest,
) -> anyhow::Result<Outcome> {
    if let Err(reason) = validate_request(business, &req.service, req.start_time, granularity_minutes)? {
        return Ok(Err(reason));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    match insert_if_free(&tx, business, req)? {
        Ok(booking) => {
            tx.commit()?;
            tracing::info!(
                booking_id = %booking.id,
                business_id = %business.id,
                start = %booking.start_time,
                "booking admitted"
            );
            Ok(Ok(booking))
        }
        // Dropping the transaction rolls back; nothing was written.
        Err(reason) => Ok(Err(reason)),
    }
}

/// Reschedule as cancel-old + create-new under one transaction. The new
/// interval re-enters the full conflict check with the old booking already
/// cancelled, so moving a booking within its own slot is allowed. Any
/// rejection rolls the cancellation back.
pub fn reschedule(
    conn: &mut Connection,
    business: &Business,
    granularity_minutes: i64,
    old: &Booking,
    new_start: NaiveDateTime,
) -> anyhow::Result<Outcome> {
    if old.status == BookingStatus::Cancelled {
        return Ok(Err(RejectReason::InvalidTransition));
    }
    if let Err(reason) = validate_request(business, &old.service, new_start, granularity_minutes)? {
        return Ok(Err(reason));
    }

    let req = BookingRequest {
        customer_id: old.customer_id.clone(),
        service: old.service.clone(),
        start_time: new_start,
        notes: old.notes.clone(),
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    queries::update_booking_status(&tx, &old.id, BookingStatus::Cancelled)?;

    match insert_if_free(&tx, business, &req)? {
        Ok(booking) => {
            tx.commit()?;
            tracing::info!(
                old_booking_id = %old.id,
                new_booking_id = %booking.id,
                start = %booking.start_time,
                "booking rescheduled"
            );
            Ok(Ok(booking))
        }
        Err(reason) => Ok(Err(reason)),
    }
}

/// Atomic status transition per the booking state machine: pending may be
/// confirmed or cancelled, confirmed may only be cancelled, cancelled is
/// terminal. An illegal transition leaves the row untouched.
pub fn change_status(
    conn: &mut Connection,
    booking_id: &str,
    next: BookingStatus,
) -> anyhow::Result<Outcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = match queries::get_booking_by_id(&tx, booking_id)? {
        Some(b) => b,
        None => return Ok(Err(RejectReason::NotFound)),
    };

    if !booking.status.can_transition_to(next) {
        return Ok(Err(RejectReason::InvalidTransition));
    }

    queries::update_booking_status(&tx, booking_id, next)?;
    let updated = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| anyhow::anyhow!("booking vanished mid-transaction"))?;
    tx.commit()?;

    tracing::info!(booking_id, status = next.as_str(), "booking status changed");
    Ok(Ok(updated))
}

/// Static checks: duration, business-local clock, and the slot grid. These do
/// not read the ledger, so they run before the transaction opens.
fn validate_request(
    business: &Business,
    service: &ServiceSnapshot,
    start: NaiveDateTime,
    granularity_minutes: i64,
) -> anyhow::Result<Result<(), RejectReason>> {
    if service.duration_minutes <= 0 {
        return Ok(Err(RejectReason::InvalidDuration));
    }
    if start < business.local_now() {
        return Ok(Err(RejectReason::PastDate));
    }

    // No configured schedule means no grid restriction, matching the slot
    // listing (which offers nothing for an hourless business to begin with).
    if let Some(hours_json) = business.hours.as_deref() {
        let hours = WorkingHours::from_json(hours_json)?;
        if !hours.slots.is_empty() && !on_slot_grid(&hours, start, service.duration_minutes, granularity_minutes)
        {
            return Ok(Err(RejectReason::SlotNoLongerAvailable));
        }
    }

    Ok(Ok(()))
}

/// True iff `start` is a tick the slot generator would emit for an empty
/// ledger: inside an open window, aligned to the granularity grid, with the
/// whole service fitting before the window closes.
fn on_slot_grid(
    hours: &WorkingHours,
    start: NaiveDateTime,
    duration_minutes: i32,
    granularity_minutes: i64,
) -> bool {
    let end = start + Duration::minutes(duration_minutes as i64);

    hours.windows_for(start.date()).iter().any(|(open, close)| {
        let window_open = start.date().and_time(*open);
        let window_close = start.date().and_time(*close);
        start >= window_open
            && end <= window_close
            && (start - window_open).num_minutes() % granularity_minutes == 0
    })
}

/// Ledger-side half of admission: re-check the requested interval against
/// active bookings as of this transaction and insert on success. The check is
/// keyed on the full `[start, end)` interval rather than the start date, so a
/// booking running past midnight conflicts with bookings on either side of it.
fn insert_if_free(
    conn: &Connection,
    business: &Business,
    req: &BookingRequest,
) -> anyhow::Result<Outcome> {
    let start = req.start_time;
    let end = start + Duration::minutes(req.service.duration_minutes as i64);

    if !queries::get_active_bookings_overlapping(conn, &business.id, &start, &end)?.is_empty() {
        return Ok(Err(RejectReason::Overlap));
    }

    let now = Utc::now().naive_utc();
    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        business_id: business.id.clone(),
        customer_id: req.customer_id.clone(),
        service: req.service.clone(),
        start_time: start,
        status: BookingStatus::Pending,
        notes: req.notes.clone(),
        created_at: now,
        updated_at: now,
    };
    queries::create_booking(conn, &booking)?;
    Ok(Ok(booking))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    use std::sync::{Arc, Mutex};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn test_business(hours: Option<&str>) -> Business {
        Business {
            id: "biz-1".to_string(),
            name: "Bob's Barbershop".to_string(),
            category: "beauty".to_string(),
            description: None,
            address: None,
            phone: None,
            timezone: "UTC".to_string(),
            utc_offset_minutes: 0,
            hours: hours.map(|h| h.to_string()),
        }
    }

    fn nine_to_five_business() -> Business {
        // 2030-01-07 is a Monday
        test_business(Some(
            r#"{"slots":[{"day":"mon","start":"09:00","end":"17:00"}]}"#,
        ))
    }

    fn request(start: &str, duration: i32) -> BookingRequest {
        BookingRequest {
            customer_id: "cust-1".to_string(),
            service: ServiceSnapshot {
                name: "Haircut".to_string(),
                duration_minutes: duration,
                price_cents: 3000,
            },
            start_time: dt(start),
            notes: None,
        }
    }

    fn booking_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM bookings", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_admit_open_slot() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-07 10:00", 60)).unwrap();
        let booking = outcome.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.service.name, "Haircut");
        assert_eq!(booking_count(&conn), 1);
    }

    #[test]
    fn test_past_date_rejected_without_writing() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        let outcome = try_book(&mut conn, &business, 30, &request("2020-01-06 10:00", 60)).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::PastDate);
        assert_eq!(booking_count(&conn), 0);
    }

    #[test]
    fn test_overlap_rejected_adjacent_admitted() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        try_book(&mut conn, &business, 30, &request("2030-01-07 10:00", 60))
            .unwrap()
            .unwrap();

        // [10:30, 11:30) intersects [10:00, 11:00)
        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-07 10:30", 60)).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::Overlap);
        assert_eq!(booking_count(&conn), 1);

        // 11:00 starts exactly when the first ends
        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-07 11:00", 60)).unwrap();
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_off_grid_start_rejected() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-07 10:15", 60)).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::SlotNoLongerAvailable);
    }

    #[test]
    fn test_outside_hours_rejected() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-07 08:00", 60)).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::SlotNoLongerAvailable);
    }

    #[test]
    fn test_end_past_closing_rejected() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        // 16:30 + 60min = 17:30, past the 17:00 close
        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-07 16:30", 60)).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::SlotNoLongerAvailable);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-07 10:00", 0)).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::InvalidDuration);
    }

    #[test]
    fn test_no_schedule_means_no_grid_restriction() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = test_business(None);

        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-06 03:13", 60)).unwrap();
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_booking_crossing_midnight_blocks_next_day() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = test_business(None);

        // 23:30 + 120min runs until 01:30 the next day
        try_book(&mut conn, &business, 30, &request("2030-01-07 23:30", 120))
            .unwrap()
            .unwrap();

        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-08 00:30", 120)).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::Overlap);
        assert_eq!(booking_count(&conn), 1);

        // 01:30 starts exactly when the first ends
        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-08 01:30", 120)).unwrap();
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_booking_crossing_midnight_sees_next_day_conflicts() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = test_business(None);

        try_book(&mut conn, &business, 30, &request("2030-01-08 00:30", 120))
            .unwrap()
            .unwrap();

        // [23:30, 01:30) intersects [00:30, 02:30) even though they start on
        // different days
        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-07 23:30", 120)).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::Overlap);
        assert_eq!(booking_count(&conn), 1);
    }

    #[test]
    fn test_cancel_frees_the_slot() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        let booking = try_book(&mut conn, &business, 30, &request("2030-01-07 10:00", 60))
            .unwrap()
            .unwrap();

        change_status(&mut conn, &booking.id, BookingStatus::Cancelled)
            .unwrap()
            .unwrap();

        let outcome = try_book(&mut conn, &business, 30, &request("2030-01-07 10:00", 60)).unwrap();
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_status_state_machine() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        let booking = try_book(&mut conn, &business, 30, &request("2030-01-07 10:00", 60))
            .unwrap()
            .unwrap();

        let confirmed = change_status(&mut conn, &booking.id, BookingStatus::Confirmed)
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);

        // No way back to pending
        let outcome = change_status(&mut conn, &booking.id, BookingStatus::Pending).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::InvalidTransition);

        let cancelled = change_status(&mut conn, &booking.id, BookingStatus::Cancelled)
            .unwrap()
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        // Cancelled is terminal
        let outcome = change_status(&mut conn, &booking.id, BookingStatus::Confirmed).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::InvalidTransition);
    }

    #[test]
    fn test_change_status_unknown_id() {
        let mut conn = db::init_db(":memory:").unwrap();
        let outcome = change_status(&mut conn, "nope", BookingStatus::Confirmed).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::NotFound);
    }

    #[test]
    fn test_reschedule_moves_booking() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        let old = try_book(&mut conn, &business, 30, &request("2030-01-07 10:00", 60))
            .unwrap()
            .unwrap();

        let new = reschedule(&mut conn, &business, 30, &old, dt("2030-01-07 14:00"))
            .unwrap()
            .unwrap();
        assert_ne!(new.id, old.id);
        assert_eq!(new.status, BookingStatus::Pending);
        assert_eq!(new.start_time, dt("2030-01-07 14:00"));

        let old_row = queries::get_booking_by_id(&conn, &old.id).unwrap().unwrap();
        assert_eq!(old_row.status, BookingStatus::Cancelled);
    }

    #[test]
    fn test_reschedule_into_own_slot_allowed() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        let old = try_book(&mut conn, &business, 30, &request("2030-01-07 10:00", 60))
            .unwrap()
            .unwrap();

        // Same interval: the cancelled original no longer occupies it
        let new = reschedule(&mut conn, &business, 30, &old, dt("2030-01-07 10:00"))
            .unwrap()
            .unwrap();
        assert_eq!(new.start_time, dt("2030-01-07 10:00"));
    }

    #[test]
    fn test_reschedule_rejection_rolls_back_cancel() {
        let mut conn = db::init_db(":memory:").unwrap();
        let business = nine_to_five_business();

        try_book(&mut conn, &business, 30, &request("2030-01-07 10:00", 60))
            .unwrap()
            .unwrap();
        let second = try_book(&mut conn, &business, 30, &request("2030-01-07 14:00", 60))
            .unwrap()
            .unwrap();

        // Moving the second onto the first must fail and leave the second alive
        let outcome = reschedule(&mut conn, &business, 30, &second, dt("2030-01-07 10:00")).unwrap();
        assert_eq!(outcome.unwrap_err(), RejectReason::Overlap);

        let second_row = queries::get_booking_by_id(&conn, &second.id).unwrap().unwrap();
        assert_eq!(second_row.status, BookingStatus::Pending);
        assert_eq!(second_row.start_time, dt("2030-01-07 14:00"));
    }

    #[test]
    fn test_concurrent_requests_admit_exactly_one() {
        // Both threads go through one mutex-guarded connection, the same
        // setup the server runs with: the lock serializes the two attempts,
        // and the second one sees the first one's committed row.
        let conn = db::init_db(":memory:").unwrap();
        let db = Arc::new(Mutex::new(conn));
        let business = nine_to_five_business();

        let mut handles = vec![];
        for i in 0..2 {
            let db = Arc::clone(&db);
            let business = business.clone();
            handles.push(std::thread::spawn(move || {
                let mut req = request("2030-01-07 10:00", 60);
                req.customer_id = format!("cust-{i}");
                let mut conn = db.lock().unwrap();
                try_book(&mut conn, &business, 30, &req).unwrap()
            }));
        }

        let outcomes: Vec<Outcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let admitted = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(admitted, 1);
        assert_eq!(
            outcomes.iter().find(|o| o.is_err()).unwrap().clone().unwrap_err(),
            RejectReason::Overlap
        );

        let conn = db.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM bookings WHERE status IN ('pending', 'confirmed')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
