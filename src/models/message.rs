use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Customer,
    Business,
    System,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Customer => "customer",
            Sender::Business => "business",
            Sender::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "customer" => Sender::Customer,
            "business" => Sender::Business,
            _ => Sender::System,
        }
    }
}

/// One entry in a booking's chat thread. Also the payload broadcast on the
/// SSE event feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub booking_id: String,
    pub sender: Sender,
    pub body: String,
    pub is_read: bool,
    pub created_at: String,
}
