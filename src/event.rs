use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::INFINITE;

/// Outcome of a multi-object wait. A timeout is an outcome, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The handle at this index in the wait list became signaled.
    Object(usize),
    /// Every handle in the wait list was signaled at once.
    AllSignaled,
    /// No handle signaled within the requested window.
    TimedOut,
}

/// A waitable completion signal.
///
/// Manual-reset events stay signaled until reset; auto-reset events are
/// consumed by the first successful wait. State changes are published
/// through a watch channel so a signal arriving between a state check
/// and the wait registration is never lost.
pub(crate) struct EventCore {
    manual_reset: bool,
    signaled: Mutex<bool>,
    version: watch::Sender<()>,
}

impl EventCore {
    pub fn new(manual_reset: bool, initial_state: bool) -> Arc<Self> {
        let (version, _) = watch::channel(());
        Arc::new(EventCore {
            manual_reset,
            signaled: Mutex::new(initial_state),
            version,
        })
    }

    pub fn set(&self) {
        *self.signaled.lock().unwrap() = true;
        self.version.send_modify(|_| {});
    }

    pub fn reset(&self) {
        *self.signaled.lock().unwrap() = false;
    }

    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.version.subscribe()
    }
}

/// Scans the wait list under lock and claims whatever is claimable.
///
/// Locks are taken in address order (the list is duplicate-free), so
/// concurrent waiters over overlapping sets cannot deadlock. Wait-any
/// resolves to the lowest signaled index; wait-all only succeeds when
/// every event is signaled simultaneously. Auto-reset events are
/// cleared as part of a successful claim.
fn try_claim(events: &[Arc<EventCore>], wait_for_all: bool) -> Option<WaitResult> {
    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by_key(|&i| Arc::as_ptr(&events[i]) as usize);

    let mut guards: Vec<Option<MutexGuard<'_, bool>>> = Vec::new();
    guards.resize_with(events.len(), || None);
    for &i in &order {
        guards[i] = Some(events[i].signaled.lock().unwrap());
    }

    if wait_for_all {
        if guards.iter().all(|g| **g.as_ref().unwrap()) {
            for (event, guard) in events.iter().zip(guards.iter_mut()) {
                if !event.manual_reset {
                    **guard.as_mut().unwrap() = false;
                }
            }
            Some(WaitResult::AllSignaled)
        } else {
            None
        }
    } else {
        for (i, (event, guard)) in events.iter().zip(guards.iter_mut()).enumerate() {
            let guard = guard.as_mut().unwrap();
            if **guard {
                if !event.manual_reset {
                    **guard = false;
                }
                return Some(WaitResult::Object(i));
            }
        }
        None
    }
}

/// Suspends until one (or all) of the events signals, or the window
/// elapses. `INFINITE` blocks indefinitely; `0` polls once.
pub(crate) async fn wait_for_events(
    events: &[Arc<EventCore>],
    wait_for_all: bool,
    timeout_ms: u32,
) -> WaitResult {
    let mut receivers: Vec<watch::Receiver<()>> =
        events.iter().map(|event| event.subscribe()).collect();

    let deadline = if timeout_ms == INFINITE {
        None
    } else {
        Some(tokio::time::Instant::now() + Duration::from_millis(timeout_ms as u64))
    };

    loop {
        if let Some(result) = try_claim(events, wait_for_all) {
            return result;
        }

        let changed = async {
            let waits: Vec<_> = receivers
                .iter_mut()
                .map(|rx| Box::pin(rx.changed()))
                .collect();
            let (_, _, rest) = futures::future::select_all(waits).await;
            drop(rest);
        };

        match deadline {
            Some(deadline) => {
                if tokio::time::timeout_at(deadline, changed).await.is_err() {
                    // Last chance: something may have signaled exactly at
                    // the deadline.
                    return try_claim(events, wait_for_all).unwrap_or(WaitResult::TimedOut);
                }
            }
            None => changed.await,
        }
    }
}
