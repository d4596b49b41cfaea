//! Core primitives: cycle timing and deterministic record addressing

pub mod address;
pub mod time;
