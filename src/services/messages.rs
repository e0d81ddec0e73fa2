use std::sync::Arc;

use crate::db::queries;
use crate::models::{Booking, BookingStatus, Message, Sender};
use crate::state::AppState;

/// Persist a thread message and fan it out to SSE subscribers. Broadcast
/// failures (no receivers) are not errors.
pub fn record_message(state: &Arc<AppState>, booking_id: &str, sender: Sender, body: &str) {
    let message_id = {
        let db = state.db.lock().unwrap();
        queries::insert_message(&db, booking_id, sender, body)
    };

    match message_id {
        Ok(id) => {
            let message = Message {
                id,
                booking_id: booking_id.to_string(),
                sender,
                body: body.to_string(),
                is_read: false,
                created_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            };
            let _ = state.events_tx.send(message);
        }
        Err(e) => {
            tracing::error!(error = %e, booking_id, "failed to record message");
        }
    }
}

/// System message opening a booking's thread, in the shape the original
/// booking-request notification takes.
pub fn announce_booking(state: &Arc<AppState>, booking: &Booking) {
    let body = format!(
        "New booking request!\n\nService: {}\nDate: {}\nTime: {}\n\nPlease confirm or reschedule.",
        booking.service.name,
        booking.start_time.format("%Y-%m-%d"),
        booking.start_time.format("%H:%M"),
    );
    record_message(state, &booking.id, Sender::System, &body);
}

pub fn announce_status_change(state: &Arc<AppState>, booking: &Booking) {
    let body = match booking.status {
        BookingStatus::Confirmed => format!(
            "Your booking for {} on {} at {} is confirmed.",
            booking.service.name,
            booking.start_time.format("%Y-%m-%d"),
            booking.start_time.format("%H:%M"),
        ),
        BookingStatus::Cancelled => format!(
            "Your booking for {} on {} at {} was cancelled.",
            booking.service.name,
            booking.start_time.format("%Y-%m-%d"),
            booking.start_time.format("%H:%M"),
        ),
        BookingStatus::Pending => return,
    };
    record_message(state, &booking.id, Sender::System, &body);
}
