use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{Booking, BookingStatus, Business, Message, Sender, Service, ServiceSnapshot};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ── Businesses ──

pub fn create_business(conn: &Connection, business: &Business) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO businesses (id, name, category, description, address, phone, timezone, utc_offset_minutes, hours)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            business.id,
            business.name,
            business.category,
            business.description,
            business.address,
            business.phone,
            business.timezone,
            business.utc_offset_minutes,
            business.hours,
        ],
    )?;
    Ok(())
}

pub fn get_business(conn: &Connection, id: &str) -> anyhow::Result<Option<Business>> {
    let result = conn.query_row(
        "SELECT id, name, category, description, address, phone, timezone, utc_offset_minutes, hours
         FROM businesses WHERE id = ?1",
        params![id],
        |row| Ok(parse_business_row(row)),
    );

    match result {
        Ok(business) => Ok(Some(business?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_businesses(
    conn: &Connection,
    category: Option<&str>,
    search: Option<&str>,
) -> anyhow::Result<Vec<Business>> {
    let mut sql = String::from(
        "SELECT id, name, category, description, address, phone, timezone, utc_offset_minutes, hours
         FROM businesses WHERE 1=1",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(category) = category {
        params_vec.push(Box::new(category.to_string()));
        sql.push_str(&format!(" AND category = ?{}", params_vec.len()));
    }
    if let Some(search) = search {
        params_vec.push(Box::new(format!("%{search}%")));
        sql.push_str(&format!(" AND name LIKE ?{}", params_vec.len()));
    }
    sql.push_str(" ORDER BY name ASC");

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_business_row(row)))?;

    let mut businesses = vec![];
    for row in rows {
        businesses.push(row??);
    }
    Ok(businesses)
}

pub fn update_business_hours(conn: &Connection, id: &str, hours: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE businesses SET hours = ?1 WHERE id = ?2",
        params![hours, id],
    )?;
    Ok(count > 0)
}

fn parse_business_row(row: &rusqlite::Row) -> anyhow::Result<Business> {
    Ok(Business {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        address: row.get(4)?,
        phone: row.get(5)?,
        timezone: row.get(6)?,
        utc_offset_minutes: row.get(7)?,
        hours: row.get(8)?,
    })
}

// ── Services ──

pub fn create_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, business_id, name, duration_minutes, price_cents, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            service.id,
            service.business_id,
            service.name,
            service.duration_minutes,
            service.price_cents,
            service.active as i32,
        ],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        "SELECT id, business_id, name, duration_minutes, price_cents, active
         FROM services WHERE id = ?1",
        params![id],
        |row| Ok(parse_service_row(row)),
    );

    match result {
        Ok(service) => Ok(Some(service?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_services(conn: &Connection, business_id: &str) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, business_id, name, duration_minutes, price_cents, active
         FROM services WHERE business_id = ?1 AND active = 1 ORDER BY name ASC",
    )?;

    let rows = stmt.query_map(params![business_id], |row| Ok(parse_service_row(row)))?;

    let mut services = vec![];
    for row in rows {
        services.push(row??);
    }
    Ok(services)
}

fn parse_service_row(row: &rusqlite::Row) -> anyhow::Result<Service> {
    Ok(Service {
        id: row.get(0)?,
        business_id: row.get(1)?,
        name: row.get(2)?,
        duration_minutes: row.get(3)?,
        price_cents: row.get(4)?,
        active: row.get::<_, i32>(5)? != 0,
    })
}

// ── Bookings ──

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, business_id, customer_id, service_name, service_duration_minutes, service_price_cents, start_time, status, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            booking.id,
            booking.business_id,
            booking.customer_id,
            booking.service.name,
            booking.service.duration_minutes,
            booking.service.price_cents,
            booking.start_time.format(TS_FMT).to_string(),
            booking.status.as_str(),
            booking.notes,
            booking.created_at.format(TS_FMT).to_string(),
            booking.updated_at.format(TS_FMT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("{BOOKING_SELECT} WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pending and confirmed bookings whose `[start, start+duration)` interval
/// intersects `[from, to)`, ordered by start time. This is the conflict-check
/// read: cancelled rows never count. The end time is computed in SQL so a
/// booking spilling across midnight still counts against the day it runs
/// into, not just the day it starts.
pub fn get_active_bookings_overlapping(
    conn: &Connection,
    business_id: &str,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "{BOOKING_SELECT}
         WHERE business_id = ?1
           AND status IN ('pending', 'confirmed')
           AND start_time < ?3
           AND datetime(start_time, '+' || service_duration_minutes || ' minutes') > ?2
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(
        params![
            business_id,
            from.format(TS_FMT).to_string(),
            to.format(TS_FMT).to_string(),
        ],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_bookings_for_customer(
    conn: &Connection,
    customer_id: &str,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "{BOOKING_SELECT} WHERE customer_id = ?1 ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(params![customer_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn get_bookings_for_business(
    conn: &Connection,
    business_id: &str,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "{BOOKING_SELECT}
         WHERE business_id = ?1 AND start_time >= ?2 AND start_time <= ?3
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(
        params![
            business_id,
            from.format(TS_FMT).to_string(),
            to.format(TS_FMT).to_string(),
        ],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
) -> anyhow::Result<bool> {
    let now = Utc::now().naive_utc().format(TS_FMT).to_string();
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

const BOOKING_SELECT: &str =
    "SELECT id, business_id, customer_id, service_name, service_duration_minutes, service_price_cents, start_time, status, notes, created_at, updated_at
     FROM bookings";

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_time_str: String = row.get(6)?;
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    let start_time = NaiveDateTime::parse_from_str(&start_time_str, TS_FMT)
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let created_at = NaiveDateTime::parse_from_str(&created_at_str, TS_FMT)
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, TS_FMT)
        .unwrap_or_else(|_| Utc::now().naive_utc());

    let status_str: String = row.get(7)?;

    Ok(Booking {
        id: row.get(0)?,
        business_id: row.get(1)?,
        customer_id: row.get(2)?,
        service: ServiceSnapshot {
            name: row.get(3)?,
            duration_minutes: row.get(4)?,
            price_cents: row.get(5)?,
        },
        start_time,
        status: BookingStatus::parse(&status_str),
        notes: row.get(8)?,
        created_at,
        updated_at,
    })
}

// ── Dashboard ──

pub struct BusinessStats {
    pub pending_count: i64,
    pub upcoming_confirmed_count: i64,
    pub unread_messages: i64,
}

pub fn get_business_stats(
    conn: &Connection,
    business_id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<BusinessStats> {
    let now_str = now.format(TS_FMT).to_string();

    let pending_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM bookings WHERE business_id = ?1 AND status = 'pending'",
            params![business_id],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let upcoming_confirmed_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM bookings
             WHERE business_id = ?1 AND status = 'confirmed' AND start_time > ?2",
            params![business_id, now_str],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let unread_messages: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM messages m
             INNER JOIN bookings b ON m.booking_id = b.id
             WHERE b.business_id = ?1 AND m.is_read = 0 AND m.sender = 'customer'",
            params![business_id],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(BusinessStats {
        pending_count,
        upcoming_confirmed_count,
        unread_messages,
    })
}

// ── Messages ──

pub fn insert_message(
    conn: &Connection,
    booking_id: &str,
    sender: Sender,
    body: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO messages (booking_id, sender, body) VALUES (?1, ?2, ?3)",
        params![booking_id, sender.as_str(), body],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_thread_messages(
    conn: &Connection,
    booking_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, sender, body, is_read, created_at
         FROM messages WHERE booking_id = ?1
         ORDER BY id ASC LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![booking_id, limit], |row| {
        Ok(parse_message_row(row))
    })?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row??);
    }
    Ok(messages)
}

pub fn get_messages_since(conn: &Connection, since_id: i64) -> anyhow::Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, sender, body, is_read, created_at
         FROM messages WHERE id > ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![since_id], |row| Ok(parse_message_row(row)))?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row??);
    }
    Ok(messages)
}

pub fn mark_thread_read(conn: &Connection, booking_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE messages SET is_read = 1 WHERE booking_id = ?1 AND is_read = 0",
        params![booking_id],
    )?;
    Ok(())
}

fn parse_message_row(row: &rusqlite::Row) -> anyhow::Result<Message> {
    let sender_str: String = row.get(2)?;
    Ok(Message {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        sender: Sender::parse(&sender_str),
        body: row.get(3)?,
        is_read: row.get::<_, i32>(4)? != 0,
        created_at: row.get(5)?,
    })
}
