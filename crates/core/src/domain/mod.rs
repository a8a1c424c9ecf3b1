pub mod platform;
pub mod ticket;
