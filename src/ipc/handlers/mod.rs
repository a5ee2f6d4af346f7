pub mod athletes;
pub mod attendance;
pub mod capture;
pub mod core;
pub mod evaluations;
