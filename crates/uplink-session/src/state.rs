//! Session state machine types.

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing bound, nothing running.
    #[default]
    Idle,

    /// A capture target is bound and previewing, no publish active.
    PreviewOnly,

    /// Publishing with the host in the foreground.
    Publishing,

    /// Publishing with no interactive surface attached.
    BackgroundPublishing,

    /// The session has torn down and takes no more work.
    Terminating,
}

impl SessionState {
    /// Check if the session is idle.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if the session is previewing without publishing.
    pub fn is_preview_only(&self) -> bool {
        matches!(self, Self::PreviewOnly)
    }

    /// Check if a publish is active in either execution mode.
    pub fn is_publishing_any(&self) -> bool {
        matches!(self, Self::Publishing | Self::BackgroundPublishing)
    }

    /// Check if the session is terminating.
    pub fn is_terminating(&self) -> bool {
        matches!(self, Self::Terminating)
    }

    /// Get a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::PreviewOnly => "PreviewOnly",
            Self::Publishing => "Publishing",
            Self::BackgroundPublishing => "BackgroundPublishing",
            Self::Terminating => "Terminating",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publishing_covers_both_execution_modes() {
        assert!(SessionState::Publishing.is_publishing_any());
        assert!(SessionState::BackgroundPublishing.is_publishing_any());
        assert!(!SessionState::PreviewOnly.is_publishing_any());
        assert!(!SessionState::Idle.is_publishing_any());
        assert!(!SessionState::Terminating.is_publishing_any());
    }

    #[test]
    fn test_default_state_is_idle() {
        assert!(SessionState::default().is_idle());
    }
}
