use crate::models::Booking;

pub fn generate_ics(booking: &Booking, business_name: &str) -> String {
    let dtstart = booking.start_time.format("%Y%m%dT%H%M%S").to_string();
    let dtend = booking.end_time().format("%Y%m%dT%H%M%S").to_string();
    let dtstamp = booking.created_at.format("%Y%m%dT%H%M%S").to_string();
    let uid = format!("{}@slotbook", booking.id);

    let summary = format!("{} at {}", booking.service.name, business_name);
    let description = booking.notes.as_deref().unwrap_or("No additional notes");

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Slotbook//Booking//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Booking, BookingStatus, ServiceSnapshot};
    use chrono::NaiveDateTime;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_generate_ics() {
        let booking = Booking {
            id: "test-123".to_string(),
            business_id: "biz-1".to_string(),
            customer_id: "cust-1".to_string(),
            service: ServiceSnapshot {
                name: "Haircut".to_string(),
                duration_minutes: 60,
                price_cents: 3000,
            },
            start_time: dt("2030-03-15 14:00:00"),
            status: BookingStatus::Confirmed,
            notes: Some("Short on the sides".to_string()),
            created_at: dt("2030-03-10 10:00:00"),
            updated_at: dt("2030-03-10 10:00:00"),
        };

        let ics = generate_ics(&booking, "Bob's Barbershop");
        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(ics.contains("DTSTART:20300315T140000"));
        assert!(ics.contains("DTEND:20300315T150000"));
        assert!(ics.contains("SUMMARY:Haircut at Bob's Barbershop"));
        assert!(ics.contains("DESCRIPTION:Short on the sides"));
        assert!(ics.contains("UID:test-123@slotbook"));
        assert!(ics.contains("END:VCALENDAR"));
    }

    #[test]
    fn test_generate_ics_no_notes() {
        let booking = Booking {
            id: "test-456".to_string(),
            business_id: "biz-1".to_string(),
            customer_id: "cust-1".to_string(),
            service: ServiceSnapshot {
                name: "Trim".to_string(),
                duration_minutes: 30,
                price_cents: 1500,
            },
            start_time: dt("2030-04-01 09:30:00"),
            status: BookingStatus::Pending,
            notes: None,
            created_at: dt("2030-03-25 12:00:00"),
            updated_at: dt("2030-03-25 12:00:00"),
        };

        let ics = generate_ics(&booking, "Bob's Barbershop");
        assert!(ics.contains("DTEND:20300401T100000"));
        assert!(ics.contains("DESCRIPTION:No additional notes"));
    }
}
