use thiserror::Error;

/// Timeout value that blocks a wait indefinitely.
pub const INFINITE: u32 = u32::MAX;

/// Upper bound on the number of handles accepted by a single
/// multi-object wait.
pub const MAX_WAIT_OBJECTS: usize = 64;

/// The portable catalog of platform status codes.
///
/// Callers branch on these names rather than numeric error codes.
/// The transient members (`Pending`, `Incomplete`, `MoreData`,
/// `AlreadyConnected`) are part of normal control flow and never
/// surface as failures; the rest map onto [`PipeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation completed successfully.
    Success,
    /// Operation was queued and will complete later.
    Pending,
    /// Operation has not completed yet.
    Incomplete,
    /// The peer closed its end cleanly and all queued bytes are drained.
    EndOfFile,
    /// The read filled the caller's buffer and bytes remain queued.
    MoreData,
    /// All pipe instances are busy, or the handle already has an
    /// operation in flight.
    PipeBusy,
    /// The pipe was already connected when connect was issued.
    AlreadyConnected,
    /// The pipe was disconnected with data undelivered.
    BrokenPipe,
    /// The handle is not valid or has been closed.
    InvalidHandle,
    /// The operation was canceled before completion.
    Canceled,
    /// Any other failure.
    Generic,
}

impl Status {
    /// Whether this status is a genuine failure rather than a normal
    /// control-flow outcome.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Status::PipeBusy
                | Status::BrokenPipe
                | Status::InvalidHandle
                | Status::Canceled
                | Status::Generic
        )
    }
}

/// Failures surfaced by pipe, event and buffer operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipeError {
    /// The pipe was disconnected while data was in flight.
    #[error("pipe has been broken")]
    BrokenPipe,

    /// The handle is not valid, or was closed.
    #[error("invalid or closed handle")]
    InvalidHandle,

    /// All pipe instances are taken, or the handle already has an
    /// overlapped operation outstanding.
    #[error("pipe is busy")]
    PipeBusy,

    /// The operation was canceled.
    #[error("operation was canceled")]
    Canceled,

    /// Anything else: contract violations, unknown pipe names,
    /// parameter collisions.
    #[error("{0}")]
    Generic(String),
}

impl PipeError {
    /// The catalog entry this failure corresponds to.
    pub fn status(&self) -> Status {
        match self {
            PipeError::BrokenPipe => Status::BrokenPipe,
            PipeError::InvalidHandle => Status::InvalidHandle,
            PipeError::PipeBusy => Status::PipeBusy,
            PipeError::Canceled => Status::Canceled,
            PipeError::Generic(_) => Status::Generic,
        }
    }

    pub(crate) fn generic(msg: impl Into<String>) -> Self {
        PipeError::Generic(msg.into())
    }

    pub(crate) fn from_status(status: Status) -> Self {
        match status {
            Status::BrokenPipe => PipeError::BrokenPipe,
            Status::InvalidHandle => PipeError::InvalidHandle,
            Status::PipeBusy => PipeError::PipeBusy,
            Status::Canceled => PipeError::Canceled,
            other => PipeError::Generic(format!("operation failed with status {:?}", other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipeError>;
