//! Transition engine for the teller kiosk
//!
//! This crate drives one multi-turn transaction through rule-declared
//! states, one atomic tick at a time:
//! - Timer subsystem (named deadlines, polled once per tick)
//! - Guard and after-effect evaluation over typed counters and flags
//! - Transition resolution with bounded retry and fallback
//! - Action rendering and dispatch to the Action Executor
//! - The tick driver that composes them

mod context;
mod engine;
mod eval;
mod render;
mod resolver;
mod timers;

pub use context::*;
pub use engine::*;
pub use eval::*;
pub use render::*;
pub use resolver::*;
pub use timers::*;
