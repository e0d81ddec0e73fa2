pub mod booking;
pub mod business;
pub mod hours;
pub mod message;

pub use booking::{Booking, BookingStatus, ServiceSnapshot};
pub use business::{Business, Service};
pub use hours::WorkingHours;
pub use message::{Message, Sender};
