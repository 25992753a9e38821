use std::fmt;

/// Lifecycle state of a bot host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotState {
    /// Built without credentials
    Unconfigured,
    /// Credentials present, not started
    Configured,
    /// Startup session launched
    Starting,
    /// Gateway reported ready
    Running,
    /// A startup phase failed or was cancelled
    Faulted,
    /// Torn down
    Disposed,
}

impl BotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotState::Unconfigured => "unconfigured",
            BotState::Configured => "configured",
            BotState::Starting => "starting",
            BotState::Running => "running",
            BotState::Faulted => "faulted",
            BotState::Disposed => "disposed",
        }
    }

    /// Whether `start` may be called from this state
    pub fn can_start(&self) -> bool {
        matches!(self, BotState::Unconfigured | BotState::Configured)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BotState::Faulted | BotState::Disposed)
    }
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
