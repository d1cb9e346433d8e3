use thiserror::Error;

/// Programmer misuse of a [super::Needs], raised at the offending call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("\"{0}\" can only be kept once")]
    AlreadyKept(String),
    #[error("\"{0}\" is not needed")]
    NotNeeded(String),
}

/// Why a [super::Needs] failed.
///
/// Failures are never raised; they are handed to `on_fail` listeners and
/// returned from [super::Settled].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure<E> {
    /// Failed without a reason.
    #[error("Unspecified error.")]
    Unspecified,
    /// Failed with the reason given to [super::Needs::fail].
    #[error("{0}")]
    Reason(E),
    /// The deadline set by [super::Needs::timeout] passed first. `waiting`
    /// holds the slots that were still empty, in declaration order.
    #[error("Timed out waiting on {}", .waiting.join(" and "))]
    TimedOut { waiting: Vec<String> },
}

impl<E> Failure<E> {
    /// The user supplied reason, if there is one.
    pub fn reason(&self) -> Option<&E> {
        match self {
            Failure::Reason(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Failure::TimedOut { .. })
    }
}
