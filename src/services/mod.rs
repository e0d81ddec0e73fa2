pub mod booking;
pub mod calendar;
pub mod messages;
pub mod scheduling;
