//! Simulated kiosk for the teller engine
//!
//! Provides an [`ActionExecutor`](teller_host_api::ActionExecutor) that
//! stands in for the real devices:
//! - UI and TTS actions are logged
//! - Card stock, printer and OTP delivery follow environment settings
//! - OTP verification against the code stored in the transaction

mod kiosk;
mod settings;

pub use kiosk::*;
pub use settings::*;
