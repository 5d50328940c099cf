//! Worker lifecycle phases.

/// Lifecycle phases of a worker generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Constructed, nothing cached yet.
    Parsed,
    /// Precaching the offline page.
    Installing,
    /// Offline page cached, waiting for activation.
    Installed,
    /// Reclaiming old generations.
    Activating,
    /// Intercepting requests.
    Activated,
    /// Kill switch engaged; every request passes through.
    Unregistered,
    /// Installation or activation failed.
    Error(String),
}

impl WorkerPhase {
    /// Whether requests are intercepted in this phase.
    pub fn is_intercepting(&self) -> bool {
        matches!(self, Self::Activated)
    }
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parsed => write!(f, "parsed"),
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
            Self::Unregistered => write!(f, "unregistered"),
            Self::Error(e) => write!(f, "error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_activated_intercepts() {
        assert!(WorkerPhase::Activated.is_intercepting());
        assert!(!WorkerPhase::Installed.is_intercepting());
        assert!(!WorkerPhase::Unregistered.is_intercepting());
        assert!(!WorkerPhase::Error("x".into()).is_intercepting());
    }
}
