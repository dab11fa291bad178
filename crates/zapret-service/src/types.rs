use std::fmt;

/// Current state of the controlled service as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    StartPending,
    StopPending,
    Running,
    /// Any other SCM state (pause/continue transitions), by raw code.
    Other(u32),
}

impl ServiceState {
    #[must_use]
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Stopped,
            2 => Self::StartPending,
            3 => Self::StopPending,
            4 => Self::Running,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::StartPending => "Starting...",
            Self::StopPending => "Stopping...",
            Self::Running => "Running",
            Self::Other(_) => "Unknown",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCommand {
    Start,
    Stop,
}

impl fmt::Display for ServiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceState;

    #[test]
    fn from_code_maps_scm_states() {
        assert_eq!(ServiceState::from_code(1), ServiceState::Stopped);
        assert_eq!(ServiceState::from_code(2), ServiceState::StartPending);
        assert_eq!(ServiceState::from_code(3), ServiceState::StopPending);
        assert_eq!(ServiceState::from_code(4), ServiceState::Running);
        assert_eq!(ServiceState::from_code(7), ServiceState::Other(7));
    }

    #[test]
    fn labels_cover_unknown_states() {
        assert_eq!(ServiceState::Running.to_string(), "Running");
        assert_eq!(ServiceState::Other(6).to_string(), "Unknown");
    }
}
