pub mod attendance;
pub mod core;
pub mod grades;
pub mod roster;
pub mod schedule;
