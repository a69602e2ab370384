use std::fmt;

/// Lifecycle of one participant in one workspace location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Inactive,
    Joining,
    Active,
    Leaving,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Inactive => "inactive",
            SessionState::Joining => "joining",
            SessionState::Active => "active",
            SessionState::Leaving => "leaving",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
