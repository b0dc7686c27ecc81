//! Per-session wiring: owns the serial `Pipeline` and the concurrent I/O
//! workers around it (STT pool, translation router, listener broadcaster),
//! and drives them from a single `tokio::select!` loop (spec §5,
//! "single logical thread of control").

mod command;
mod recovery;
mod stats;
mod supervisor;

pub use command::{ListenerId, SessionCommand};
pub use recovery::{NoRecovery, RecoverySource};
pub use stats::{SessionStats, SessionStatsSnapshot};
pub use supervisor::{SessionSupervisor, SupervisorConfig};

use captionrelay_core::InvariantViolation;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The pipeline detected a state it guarantees never to produce on its
    /// own (spec §7). The session loop treats this as fatal and shuts down.
    #[error("pipeline invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

pub type Result<T> = std::result::Result<T, SessionError>;
