pub mod attendees;
pub mod episodes;
pub mod uploads;
