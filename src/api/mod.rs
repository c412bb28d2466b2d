//! Interfaces the log exposes to its writers.

pub mod log_writer;
