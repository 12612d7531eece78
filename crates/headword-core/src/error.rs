//! Per-key error type and the policy deciding which ones end the run

use crate::extract::ExtractError;
use crate::fetch::FetchError;

/// What to do when a fetched page lacks the expected element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Log and move on to the next key
    #[default]
    Skip,
    /// Stop issuing keys and fail the run without flushing
    Abort,
}

/// Error from processing a single key (fetch + extract + collect).
#[derive(Debug)]
pub enum KeyError {
    Fetch(FetchError),
    Extract(ExtractError),
    Io(std::io::Error),
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "{e}"),
            Self::Extract(e) => write!(f, "extract: {e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for KeyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Extract(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<FetchError> for KeyError {
    fn from(e: FetchError) -> Self {
        Self::Fetch(e)
    }
}

impl From<ExtractError> for KeyError {
    fn from(e: ExtractError) -> Self {
        Self::Extract(e)
    }
}

impl From<std::io::Error> for KeyError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl KeyError {
    /// Whether this error ends the whole run under `policy`.
    ///
    /// Fetch and write failures only ever drop the key.
    pub fn is_fatal(&self, policy: MissingPolicy) -> bool {
        matches!(self, Self::Extract(_)) && policy == MissingPolicy::Abort
    }
}
