#![allow(clippy::missing_docs_in_private_items)]

mod engine;
mod locks;
mod prompt;

pub use engine::{SessionEngine, TurnOutcome};
pub use locks::{SessionLockGuard, SessionLocks};
