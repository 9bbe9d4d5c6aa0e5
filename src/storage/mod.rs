//! Persistent course catalog storage.

pub mod sqlite;
