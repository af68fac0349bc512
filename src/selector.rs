use crate::error::Result;
use crate::event::WaitResult;
use crate::handle::EventHandle;
use crate::host::PipeHost;

/// Multiplexes many completion events into one waiting point.
///
/// A server loop registers one entry per pending operation (a token of
/// the caller's choosing, usually the owning connection state) and
/// parks in [`EventSelector::select`]; the entry whose event signals is
/// handed back for processing. With several events ready at once the
/// earliest-registered wins, matching the deterministic low-index
/// resolution of the underlying wait.
pub struct EventSelector<T> {
    host: PipeHost,
    entries: Vec<(EventHandle, T)>,
}

impl<T> EventSelector<T> {
    pub fn new(host: &PipeHost) -> EventSelector<T> {
        EventSelector {
            host: host.clone(),
            entries: Vec::new(),
        }
    }

    /// Registers an event with its token. Re-adding an event replaces
    /// its token in place.
    pub fn add(&mut self, event: EventHandle, token: T) {
        if let Some(entry) = self.entries.iter_mut().find(|(e, _)| *e == event) {
            entry.1 = token;
        } else {
            self.entries.push((event, token));
        }
    }

    /// Drops the registration for `event`, returning its token.
    pub fn remove(&mut self, event: EventHandle) -> Option<T> {
        let index = self.entries.iter().position(|(e, _)| *e == event)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waits for a registered event to signal and returns its token,
    /// or `None` on timeout. Waiting with no registrations is an error.
    pub async fn select(&mut self, timeout_ms: u32) -> Result<Option<&mut T>> {
        let handles: Vec<EventHandle> = self.entries.iter().map(|(e, _)| *e).collect();
        match self
            .host
            .wait_for_multiple_objects(&handles, false, timeout_ms)
            .await?
        {
            WaitResult::Object(index) => Ok(Some(&mut self.entries[index].1)),
            WaitResult::TimedOut => Ok(None),
            WaitResult::AllSignaled => Ok(None),
        }
    }
}
