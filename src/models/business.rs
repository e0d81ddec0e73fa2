use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub timezone: String,
    pub utc_offset_minutes: i64,
    /// Working-hours schedule as a JSON document, see [`crate::models::WorkingHours`].
    pub hours: Option<String>,
}

impl Business {
    /// Wall-clock "now" in this business's local time. Past-date checks are
    /// made against this, not against UTC.
    pub fn local_now(&self) -> chrono::NaiveDateTime {
        chrono::Utc::now().naive_utc() + chrono::Duration::minutes(self.utc_offset_minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub duration_minutes: i32,
    pub price_cents: i64,
    pub active: bool,
}
