use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::{PipeError, Result, Status};
use crate::event::EventCore;
use crate::handle::EventHandle;

/// Outcome of an asynchronous connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// A client was already waiting; the pipe is connected now.
    Connected,
    /// The connect was queued; completion will set the descriptor's
    /// event.
    Pending,
    /// The pipe was already connected. An edge case, not an error.
    AlreadyConnected,
}

/// Final disposition of an overlapped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlappedResult {
    /// Still in flight. Returned only for non-blocking retrieval.
    Incomplete,
    /// Completed; this many bytes were transferred.
    Complete(usize),
    /// Completed filling the caller's requested length, with bytes
    /// still queued on the pipe.
    MoreData(usize),
    /// The peer closed cleanly; nothing more will arrive.
    EndOfFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    Connect,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum OpPhase {
    /// No operation issued, or the previous result was retrieved.
    Idle,
    Pending(OpKind),
    Done { status: Status, transferred: usize },
}

/// Shared completion slot for one in-flight operation.
///
/// Single-producer/single-consumer: the issuing call site owns the
/// descriptor while pending, the transfer task resolves it exactly
/// once. Cancellation wins races with completion; a finish after a
/// cancel is discarded.
pub(crate) struct OpCore {
    event: Option<Arc<EventCore>>,
    phase: Mutex<OpPhase>,
}

impl OpCore {
    pub fn new(event: Option<Arc<EventCore>>) -> Arc<Self> {
        Arc::new(OpCore {
            event,
            phase: Mutex::new(OpPhase::Idle),
        })
    }

    /// Transitions to pending. Fails when an operation is already in
    /// flight on this descriptor.
    pub fn begin(&self, kind: OpKind) -> Result<()> {
        let mut phase = self.phase.lock().unwrap();
        if matches!(*phase, OpPhase::Pending(_)) {
            return Err(PipeError::PipeBusy);
        }
        *phase = OpPhase::Pending(kind);
        Ok(())
    }

    /// Rolls a `begin` back when issuance fails before the transfer is
    /// queued.
    pub fn abort(&self) {
        let mut phase = self.phase.lock().unwrap();
        if matches!(*phase, OpPhase::Pending(_)) {
            *phase = OpPhase::Idle;
        }
    }

    /// Resolves the operation and signals its event. Returns false when
    /// a cancel (or another finish) got there first.
    pub fn finish(&self, status: Status, transferred: usize) -> bool {
        {
            let mut phase = self.phase.lock().unwrap();
            match *phase {
                OpPhase::Pending(_) => {
                    *phase = OpPhase::Done {
                        status,
                        transferred,
                    };
                }
                _ => return false,
            }
        }
        if let Some(event) = &self.event {
            event.set();
        }
        true
    }

    /// Resolves a pending operation to `Canceled`. Returns false when
    /// nothing was pending.
    pub fn cancel(&self) -> bool {
        self.finish(Status::Canceled, 0)
    }

    pub fn snapshot(&self) -> OpPhase {
        *self.phase.lock().unwrap()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.snapshot(), OpPhase::Pending(_))
    }

    pub fn subscribe_event(&self) -> Option<watch::Receiver<()>> {
        self.event.as_ref().map(|event| event.subscribe())
    }
}

/// Descriptor tracking one in-flight overlapped operation.
///
/// Pairs a completion event with a mutable status slot. Reusable for
/// the next operation once the previous result has been retrieved;
/// issuing while one is pending fails with `PipeBusy`. Clones share the
/// same slot.
#[derive(Clone)]
pub struct Overlapped {
    event: EventHandle,
    pub(crate) core: Arc<OpCore>,
}

impl Overlapped {
    pub(crate) fn new(event: EventHandle, core: Arc<EventCore>) -> Overlapped {
        Overlapped {
            event,
            core: OpCore::new(Some(core)),
        }
    }

    /// The event that signals when the tracked operation completes.
    pub fn event(&self) -> EventHandle {
        self.event
    }
}
