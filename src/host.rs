use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::buffer::{BufferPin, DirectBuffer};
use crate::config::PipeLimits;
use crate::error::{PipeError, Result, Status, MAX_WAIT_OBJECTS};
use crate::event::{self, EventCore, WaitResult};
use crate::handle::{EventHandle, HandleObject, HandleTable, PipeHandle, RawHandle, RemoveOutcome};
use crate::overlapped::{ConnectStatus, OpCore, OpKind, OpPhase, Overlapped, OverlappedResult};
use crate::pipe::{
    ByteQueue, EndpointSide, Instance, InstanceState, PipeEndpoint, PipeShared, ReadStep,
    WriteStep,
};
use crate::utils::{format_pipe_name, validate_pipe_name};

struct HostInner {
    table: Mutex<HandleTable>,
    pipes: Mutex<HashMap<String, Arc<PipeShared>>>,
}

/// The named-pipe transport engine.
///
/// One host is one pipe namespace: server instances created through it
/// are visible to clients opening through it (or through a clone).
/// Issuing calls (`connect`, `read_overlapped`, `write_overlapped`)
/// never block; they queue work on the Tokio runtime and completion is
/// observed through events. Blocking points are explicit:
/// [`PipeHost::get_overlapped_result`],
/// [`PipeHost::wait_for_multiple_objects`] and the synchronous adapter
/// are async fns.
#[derive(Clone)]
pub struct PipeHost {
    inner: Arc<HostInner>,
}

impl Default for PipeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeHost {
    pub fn new() -> PipeHost {
        PipeHost {
            inner: Arc::new(HostInner {
                table: Mutex::new(HandleTable::new()),
                pipes: Mutex::new(HashMap::new()),
            }),
        }
    }

    // ---- pipe lifecycle -------------------------------------------------

    /// Creates one server instance of the named pipe.
    ///
    /// Call once per instance, up to `max_instances` per name. A second
    /// creator must pass the same parameters; a collision fails with
    /// `Generic`, a full instance table with `PipeBusy`.
    pub fn create_pipe(
        &self,
        name: &str,
        max_instances: u32,
        buffer_size: usize,
    ) -> Result<PipeHandle> {
        validate_pipe_name(name)?;
        if max_instances == 0 {
            return Err(PipeError::generic("max_instances must be positive"));
        }
        if buffer_size == 0 {
            return Err(PipeError::generic("buffer_size must be positive"));
        }
        let name = format_pipe_name(name);

        let mut pipes = self.inner.pipes.lock().unwrap();
        let shared = match pipes.get(&name) {
            Some(shared) => {
                if shared.max_instances != max_instances || shared.buffer_size != buffer_size {
                    return Err(PipeError::generic(
                        "pipe already exists with different parameters",
                    ));
                }
                shared.clone()
            }
            None => {
                let shared = PipeShared::new(name.clone(), max_instances, buffer_size);
                pipes.insert(name.clone(), shared.clone());
                shared
            }
        };
        let instance = shared.add_instance()?;
        drop(pipes);

        let endpoint = PipeEndpoint::new(EndpointSide::Server { shared, instance });
        let raw = self.inner.table.lock().unwrap().insert(HandleObject::Pipe(endpoint));
        debug!("created server instance of {}", name);
        Ok(PipeHandle(raw))
    }

    /// Creates a server instance sized by [`PipeLimits`].
    pub fn create_pipe_with(&self, name: &str, limits: &PipeLimits) -> Result<PipeHandle> {
        self.create_pipe(name, limits.max_instances, limits.buffer_size)
    }

    /// Opens a client end of an existing named pipe.
    ///
    /// A listening instance completes its pending connect; an idle one
    /// parks this client until the server connects. With every instance
    /// taken the open fails with `PipeBusy`.
    pub fn open_pipe(&self, name: &str) -> Result<PipeHandle> {
        validate_pipe_name(name)?;
        let name = format_pipe_name(name);
        let shared = self
            .inner
            .pipes
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or_else(|| PipeError::generic("no pipe registered under that name"))?;
        let conn = shared.claim_for_client()?;
        let endpoint = PipeEndpoint::new(EndpointSide::Client { conn });
        let raw = self.inner.table.lock().unwrap().insert(HandleObject::Pipe(endpoint));
        debug!("opened client end of {}", name);
        Ok(PipeHandle(raw))
    }

    /// Closes a pipe or event handle.
    ///
    /// Cancels the handle's in-flight operation and propagates
    /// end-of-file to the peer's read side. Closing the same handle
    /// twice is a caller error reported as `Generic`; a stale value
    /// fails with `InvalidHandle`.
    pub fn close_handle(&self, handle: impl Into<RawHandle>) -> Result<()> {
        let raw = handle.into();
        let outcome = self.inner.table.lock().unwrap().remove(raw);
        let object = match outcome {
            RemoveOutcome::Removed(object) => object,
            RemoveOutcome::AlreadyClosed => {
                return Err(PipeError::generic("handle was already closed"))
            }
            RemoveOutcome::Invalid => return Err(PipeError::InvalidHandle),
        };

        match object {
            HandleObject::Event(_) => {}
            HandleObject::Pipe(endpoint) => {
                if let Some(op) = endpoint.inflight() {
                    op.cancel();
                }
                match &endpoint.side {
                    EndpointSide::Client { conn } => {
                        conn.c2s.close_write();
                        conn.s2c.close_read();
                    }
                    EndpointSide::Server { shared, instance } => {
                        let old = {
                            let mut state = instance.state.lock().unwrap();
                            std::mem::replace(&mut *state, InstanceState::Closed)
                        };
                        match old {
                            InstanceState::Listening { op } => {
                                op.cancel();
                            }
                            InstanceState::Connected { conn }
                            | InstanceState::ClientWaiting { conn } => {
                                conn.s2c.close_write();
                                conn.c2s.close_read();
                            }
                            _ => {}
                        }
                        self.drop_server_instance(shared, instance);
                        debug!("closed server instance of {}", shared.name);
                    }
                }
                endpoint.wake_queues();
            }
        }
        Ok(())
    }

    /// Force-drops the current client and returns the instance to the
    /// idle state for the next connect. Undelivered data is discarded;
    /// the client sees `BrokenPipe`.
    pub fn disconnect_pipe(&self, handle: PipeHandle) -> Result<()> {
        let endpoint = self.pipe_endpoint(handle)?;
        let EndpointSide::Server { shared, instance } = &endpoint.side else {
            return Err(PipeError::generic("disconnect requires a server handle"));
        };
        let conn = {
            let mut state = instance.state.lock().unwrap();
            match &*state {
                InstanceState::Connected { conn } | InstanceState::ClientWaiting { conn } => {
                    let conn = conn.clone();
                    *state = InstanceState::Idle;
                    conn
                }
                _ => return Err(PipeError::generic("pipe is not connected")),
            }
        };
        conn.s2c.break_pipe();
        conn.c2s.break_pipe();
        debug!("disconnected client from {}", shared.name);
        Ok(())
    }

    /// Process id of the client attached to this pipe.
    pub fn client_process_id(&self, handle: PipeHandle) -> Result<u32> {
        let endpoint = self.pipe_endpoint(handle)?;
        match &endpoint.side {
            EndpointSide::Server { instance, .. } => instance
                .conn()
                .map(|conn| conn.client_pid)
                .ok_or_else(|| PipeError::generic("pipe is not connected")),
            EndpointSide::Client { conn } => Ok(conn.client_pid),
        }
    }

    // ---- event lifecycle ------------------------------------------------

    /// Creates a waitable event. Manual-reset events stay signaled
    /// until [`PipeHost::reset_event`]; auto-reset events clear when a
    /// wait consumes the signal.
    pub fn create_event(&self, manual_reset: bool, initial_state: bool) -> Result<EventHandle> {
        let core = EventCore::new(manual_reset, initial_state);
        let raw = self.inner.table.lock().unwrap().insert(HandleObject::Event(core));
        Ok(EventHandle(raw))
    }

    pub fn set_event(&self, handle: EventHandle) -> Result<()> {
        self.event_core(handle)?.set();
        Ok(())
    }

    pub fn reset_event(&self, handle: EventHandle) -> Result<()> {
        self.event_core(handle)?.reset();
        Ok(())
    }

    /// Creates an overlapped descriptor whose completions signal
    /// `event`.
    pub fn create_overlapped(&self, event: EventHandle) -> Result<Overlapped> {
        let core = self.event_core(event)?;
        Ok(Overlapped::new(event, core))
    }

    // ---- overlapped engine ----------------------------------------------

    /// Issues an asynchronous connect on a server instance.
    ///
    /// Resolves synchronously to `Connected` when a client is already
    /// waiting and to `AlreadyConnected` when the instance is connected;
    /// otherwise the connect is queued and `Pending` is returned, with
    /// completion signaled through the descriptor's event.
    pub fn connect(&self, handle: PipeHandle, overlapped: &Overlapped) -> Result<ConnectStatus> {
        let endpoint = self.pipe_endpoint(handle)?;
        let EndpointSide::Server { shared, instance } = &endpoint.side else {
            return Err(PipeError::generic("connect requires a server handle"));
        };

        overlapped.core.begin(OpKind::Connect)?;
        if let Err(e) = endpoint.claim(&overlapped.core) {
            overlapped.core.abort();
            return Err(e);
        }

        let mut state = instance.state.lock().unwrap();
        match &*state {
            InstanceState::Idle => {
                *state = InstanceState::Listening {
                    op: overlapped.core.clone(),
                };
                drop(state);
                trace!("connect pending on {}", shared.name);
                Ok(ConnectStatus::Pending)
            }
            InstanceState::ClientWaiting { conn } => {
                let conn = conn.clone();
                *state = InstanceState::Connected { conn };
                drop(state);
                overlapped.core.abort();
                trace!("connect completed synchronously on {}", shared.name);
                Ok(ConnectStatus::Connected)
            }
            InstanceState::Connected { .. } => {
                overlapped.core.abort();
                Ok(ConnectStatus::AlreadyConnected)
            }
            InstanceState::Listening { .. } => {
                overlapped.core.abort();
                Err(PipeError::PipeBusy)
            }
            InstanceState::Closed => {
                overlapped.core.abort();
                Err(PipeError::InvalidHandle)
            }
        }
    }

    /// Issues an asynchronous read into `buffer[offset..offset + len]`.
    ///
    /// Returns immediately; the read completes (signaling the
    /// descriptor's event) once at least one byte is available. The
    /// buffer stays pinned until completion.
    pub fn read_overlapped(
        &self,
        handle: PipeHandle,
        overlapped: &Overlapped,
        buffer: &DirectBuffer,
        offset: usize,
        len: usize,
    ) -> Result<()> {
        let endpoint = self.pipe_endpoint(handle)?;
        check_span(buffer, offset, len)?;
        let queue = endpoint.read_queue()?;
        let pin = buffer.pin()?;

        overlapped.core.begin(OpKind::Read)?;
        if let Err(e) = endpoint.claim(&overlapped.core) {
            overlapped.core.abort();
            return Err(e);
        }

        trace!("queued overlapped read of {} bytes", len);
        tokio::spawn(run_read(
            queue,
            overlapped.core.clone(),
            buffer.alias(),
            offset,
            len,
            pin,
        ));
        Ok(())
    }

    /// Issues an asynchronous write of `buffer[offset..offset + len]`.
    ///
    /// Completes once every byte has been accepted into the peer queue,
    /// which may require the reader to drain it first.
    pub fn write_overlapped(
        &self,
        handle: PipeHandle,
        overlapped: &Overlapped,
        buffer: &DirectBuffer,
        offset: usize,
        len: usize,
    ) -> Result<()> {
        let endpoint = self.pipe_endpoint(handle)?;
        check_span(buffer, offset, len)?;
        let queue = endpoint.write_queue()?;
        let pin = buffer.pin()?;
        let data = buffer.read_bytes(offset, len)?;

        overlapped.core.begin(OpKind::Write)?;
        if let Err(e) = endpoint.claim(&overlapped.core) {
            overlapped.core.abort();
            return Err(e);
        }

        trace!("queued overlapped write of {} bytes", len);
        tokio::spawn(run_write(queue, overlapped.core.clone(), data, pin));
        Ok(())
    }

    /// Retrieves the outcome of the descriptor's operation.
    ///
    /// With `wait` false this never blocks and reports `Incomplete`
    /// while the operation is in flight; with `wait` true it suspends
    /// until the operation resolves (completion, cancellation, or a
    /// broken pipe).
    pub async fn get_overlapped_result(
        &self,
        handle: PipeHandle,
        overlapped: &Overlapped,
        wait: bool,
    ) -> Result<OverlappedResult> {
        let _endpoint = self.pipe_endpoint(handle)?;
        let Some(mut rx) = overlapped.core.subscribe_event() else {
            return Err(PipeError::generic("descriptor has no completion event"));
        };
        loop {
            match overlapped.core.snapshot() {
                OpPhase::Idle => {
                    return Err(PipeError::generic("no operation in progress"));
                }
                OpPhase::Done {
                    status,
                    transferred,
                } => {
                    return match status {
                        Status::Success => Ok(OverlappedResult::Complete(transferred)),
                        Status::MoreData => Ok(OverlappedResult::MoreData(transferred)),
                        Status::EndOfFile => Ok(OverlappedResult::EndOfFile),
                        failure => Err(PipeError::from_status(failure)),
                    };
                }
                OpPhase::Pending(_) => {
                    if !wait {
                        return Ok(OverlappedResult::Incomplete);
                    }
                    let _ = rx.changed().await;
                }
            }
        }
    }

    /// Suspends until one (or, with `wait_for_all`, every one) of the
    /// events signals, or until `timeout_ms` elapses.
    ///
    /// When several events are signaled at once the lowest index wins,
    /// deterministically. `timeout_ms` of [`crate::INFINITE`] blocks
    /// indefinitely; `0` polls. At most [`MAX_WAIT_OBJECTS`] handles,
    /// no duplicates.
    pub async fn wait_for_multiple_objects(
        &self,
        handles: &[EventHandle],
        wait_for_all: bool,
        timeout_ms: u32,
    ) -> Result<WaitResult> {
        if handles.is_empty() {
            return Err(PipeError::generic("wait list is empty"));
        }
        if handles.len() > MAX_WAIT_OBJECTS {
            return Err(PipeError::generic("wait list exceeds MAX_WAIT_OBJECTS"));
        }
        let mut seen = HashSet::new();
        if !handles.iter().all(|h| seen.insert(h.0)) {
            return Err(PipeError::generic("wait list contains duplicate handles"));
        }
        let events = {
            let table = self.inner.table.lock().unwrap();
            handles
                .iter()
                .map(|&h| table.get_event(h))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(event::wait_for_events(&events, wait_for_all, timeout_ms).await)
    }

    /// Cancels whatever operation is in flight on the handle.
    /// Returns false when nothing was pending; that is not an error.
    pub fn cancel_io(&self, handle: PipeHandle) -> Result<bool> {
        let endpoint = self.pipe_endpoint(handle)?;
        match endpoint.inflight() {
            Some(op) => Ok(self.cancel_op(&endpoint, &op)),
            None => Ok(false),
        }
    }

    /// Cancels the specific operation tracked by `overlapped`, if it is
    /// the one in flight on the handle.
    pub fn cancel_io_ex(&self, handle: PipeHandle, overlapped: &Overlapped) -> Result<bool> {
        let endpoint = self.pipe_endpoint(handle)?;
        match endpoint.inflight() {
            Some(op) if Arc::ptr_eq(&op, &overlapped.core) => Ok(self.cancel_op(&endpoint, &op)),
            _ => Ok(false),
        }
    }

    fn cancel_op(&self, endpoint: &PipeEndpoint, op: &Arc<OpCore>) -> bool {
        if !op.cancel() {
            return false;
        }
        // A canceled connect re-arms the instance for the next attempt.
        if let EndpointSide::Server { instance, .. } = &endpoint.side {
            let mut state = instance.state.lock().unwrap();
            if let InstanceState::Listening { op: pending } = &*state {
                if Arc::ptr_eq(pending, op) {
                    *state = InstanceState::Idle;
                }
            }
        }
        endpoint.wake_queues();
        trace!("canceled in-flight operation");
        true
    }

    // ---- synchronous adapter --------------------------------------------

    /// Reads into `dst`, suspending until data is available. Returns
    /// `Ok(0)` only at clean end-of-stream; a forced disconnect fails
    /// with `BrokenPipe`.
    pub async fn read_file(&self, handle: PipeHandle, dst: &mut [u8]) -> Result<usize> {
        let endpoint = self.pipe_endpoint(handle)?;
        if dst.is_empty() {
            return Ok(0);
        }
        let queue = endpoint.read_queue()?;
        let op = OpCore::new(None);
        op.begin(OpKind::Read)?;
        if let Err(e) = endpoint.claim(&op) {
            op.abort();
            return Err(e);
        }
        let mut rx = queue.subscribe();
        loop {
            if !op.is_pending() {
                return Err(PipeError::Canceled);
            }
            match queue.try_read(dst) {
                ReadStep::Data { n, .. } => {
                    op.finish(Status::Success, n);
                    return Ok(n);
                }
                ReadStep::Eof => {
                    op.finish(Status::EndOfFile, 0);
                    return Ok(0);
                }
                ReadStep::Broken => {
                    op.finish(Status::BrokenPipe, 0);
                    return Err(PipeError::BrokenPipe);
                }
                ReadStep::WouldBlock => {
                    let _ = rx.changed().await;
                }
            }
        }
    }

    /// Writes all of `src`, suspending while the peer queue is full.
    pub async fn write_file(&self, handle: PipeHandle, src: &[u8]) -> Result<usize> {
        let endpoint = self.pipe_endpoint(handle)?;
        if src.is_empty() {
            return Ok(0);
        }
        let queue = endpoint.write_queue()?;
        let op = OpCore::new(None);
        op.begin(OpKind::Write)?;
        if let Err(e) = endpoint.claim(&op) {
            op.abort();
            return Err(e);
        }
        let mut rx = queue.subscribe();
        let mut written = 0;
        loop {
            if !op.is_pending() {
                return Err(PipeError::Canceled);
            }
            match queue.try_write(&src[written..]) {
                WriteStep::Wrote(n) => {
                    written += n;
                    if written == src.len() {
                        op.finish(Status::Success, written);
                        return Ok(written);
                    }
                }
                WriteStep::Broken => {
                    op.finish(Status::BrokenPipe, written);
                    return Err(PipeError::BrokenPipe);
                }
                WriteStep::WouldBlock => {
                    let _ = rx.changed().await;
                }
            }
        }
    }

    // ---- direct buffers --------------------------------------------------

    /// Allocates a fixed-capacity buffer for overlapped transfers.
    pub fn allocate_buffer(&self, size: usize) -> Result<DirectBuffer> {
        DirectBuffer::allocate(size)
    }

    /// Frees a buffer. Rejected with `Generic` while any operation
    /// still references it, and on a double free.
    pub fn free_buffer(&self, buffer: &DirectBuffer) -> Result<()> {
        buffer.free()
    }

    // ---- internals -------------------------------------------------------

    fn pipe_endpoint(&self, handle: PipeHandle) -> Result<Arc<PipeEndpoint>> {
        self.inner.table.lock().unwrap().get_pipe(handle)
    }

    fn event_core(&self, handle: EventHandle) -> Result<Arc<EventCore>> {
        self.inner.table.lock().unwrap().get_event(handle)
    }

    fn drop_server_instance(&self, shared: &Arc<PipeShared>, instance: &Arc<Instance>) {
        let mut pipes = self.inner.pipes.lock().unwrap();
        if shared.remove_instance(instance) {
            if let Some(current) = pipes.get(&shared.name) {
                if Arc::ptr_eq(current, shared) {
                    pipes.remove(&shared.name);
                }
            }
        }
    }
}

fn check_span(buffer: &DirectBuffer, offset: usize, len: usize) -> Result<()> {
    if len == 0 {
        return Err(PipeError::generic("transfer length must be positive"));
    }
    if offset
        .checked_add(len)
        .map_or(true, |end| end > buffer.capacity())
    {
        return Err(PipeError::generic("offset and length exceed buffer capacity"));
    }
    Ok(())
}

async fn run_read(
    queue: Arc<ByteQueue>,
    op: Arc<OpCore>,
    target: DirectBuffer,
    offset: usize,
    len: usize,
    pin: BufferPin,
) {
    let mut rx = queue.subscribe();
    let mut tmp = vec![0u8; len];
    let outcome = loop {
        if !op.is_pending() {
            break None;
        }
        match queue.try_read(&mut tmp) {
            ReadStep::Data { n, more } => {
                let status = if n == len && more {
                    Status::MoreData
                } else {
                    Status::Success
                };
                break match target.write_bytes(offset, &tmp[..n]) {
                    Ok(()) => Some((status, n)),
                    Err(_) => Some((Status::Generic, 0)),
                };
            }
            ReadStep::Eof => break Some((Status::EndOfFile, 0)),
            ReadStep::Broken => break Some((Status::BrokenPipe, 0)),
            ReadStep::WouldBlock => {
                let _ = rx.changed().await;
            }
        }
    };
    // Unpin before publishing completion, so a caller that observes the
    // result may free the buffer immediately.
    drop(pin);
    if let Some((status, transferred)) = outcome {
        op.finish(status, transferred);
    }
}

async fn run_write(queue: Arc<ByteQueue>, op: Arc<OpCore>, data: Vec<u8>, pin: BufferPin) {
    let mut rx = queue.subscribe();
    let mut written = 0;
    let outcome = loop {
        if !op.is_pending() {
            break None;
        }
        match queue.try_write(&data[written..]) {
            WriteStep::Wrote(n) => {
                written += n;
                if written == data.len() {
                    break Some((Status::Success, written));
                }
            }
            WriteStep::Broken => break Some((Status::BrokenPipe, written)),
            WriteStep::WouldBlock => {
                let _ = rx.changed().await;
            }
        }
    };
    drop(pin);
    if let Some((status, transferred)) = outcome {
        op.finish(status, transferred);
    }
}
