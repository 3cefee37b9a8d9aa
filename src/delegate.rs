//! Callbacks through which the pipeline reports outcomes.
//!
//! Tracking calls are fire-and-forget; applications observe what happened to
//! their hits by installing a [`TrackerDelegate`].

/// Outcome of a build or send step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitStatus {
    Success,
    Failed,
}

impl std::fmt::Display for HitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HitStatus::Success => write!(f, "success"),
            HitStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Receiver of pipeline events. Every method has a no-op default.
pub trait TrackerDelegate: Send + Sync {
    /// A hit finished building; `message` holds the built hit text.
    fn build_did_end(&self, _status: HitStatus, _message: &str) {}

    /// A delivery attempt finished.
    fn send_did_end(&self, _status: HitStatus, _message: &str) {}

    /// A hit was written to offline storage.
    fn save_did_end(&self, _message: &str) {}

    fn warning_did_occur(&self, _message: &str) {}

    fn error_did_occur(&self, _message: &str) {}
}
