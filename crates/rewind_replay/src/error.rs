//! Replay error types.

use rewind_core::CoreError;
use rewind_tool::RegistryError;

/// Error that stops a whole replay request.
///
/// Failures of individual live calls are never reported here; they are
/// recorded on the affected `ReplayedSpan`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// Execution was requested for a capability that cannot run
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Trace could not be loaded
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ReplayError {
    /// Whether this error came from capability resolution
    #[must_use]
    pub fn is_registry(&self) -> bool {
        matches!(self, Self::Registry(_))
    }
}
