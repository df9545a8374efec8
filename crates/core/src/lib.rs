//! Core business logic for upcycle-rs.

pub mod services;

pub use services::*;
