//! Polling agent
//!
//! Scans the monitored directory, summarizes unseen files and folds the
//! result into the persisted state, until asked to stop.

mod agent_loop;
mod state;

pub use agent_loop::Agent;
pub use state::CycleOutcome;
