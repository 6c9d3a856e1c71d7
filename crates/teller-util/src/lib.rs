//! Shared utilities for the teller kiosk engine
//!
//! This crate provides:
//! - ID types (TransactionId)
//! - Time utilities (wall clock with mock time, deadline helpers)
//! - Default paths for the configuration file

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
