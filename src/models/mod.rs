pub mod events;
pub mod identity;
pub mod job;
pub mod responses;
