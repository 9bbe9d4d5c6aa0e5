//! Domain model for course offerings.

pub mod types;
