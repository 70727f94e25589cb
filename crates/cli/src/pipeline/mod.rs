//! Session orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{Session, SessionConfig, SessionMode};
pub use stats::SessionStats;
