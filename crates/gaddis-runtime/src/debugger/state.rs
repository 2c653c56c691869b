//! Session run state

use std::fmt;

/// Where a debug session is in its lifecycle.
///
/// `Halted` and `Terminated` are final: a session in either state rejects
/// further `play` requests until it is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    Running,
    #[default]
    Paused,
    Halted,
    Terminated,
}

impl RunState {
    pub fn is_stopped(self) -> bool {
        matches!(self, RunState::Halted | RunState::Terminated)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Halted => "halted",
            RunState::Terminated => "terminated",
        })
    }
}
