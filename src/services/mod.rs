pub mod booking;
pub mod fleet;
pub mod seed;
pub mod trips;
