use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::{PipeError, Result};
use crate::overlapped::OpCore;

/// One direction of a connection: a capacity-bounded byte queue with
/// watch-based wakeups for readers and writers.
pub(crate) struct ByteQueue {
    state: Mutex<QueueState>,
    version: watch::Sender<()>,
}

struct QueueState {
    data: VecDeque<u8>,
    capacity: usize,
    /// Producer is gone; readers drain what is left, then see EOF.
    write_closed: bool,
    /// Consumer is gone; writes fail immediately.
    read_closed: bool,
    /// Forced disconnect; queued data is discarded and both sides fail.
    broken: bool,
}

pub(crate) enum ReadStep {
    Data { n: usize, more: bool },
    WouldBlock,
    Eof,
    Broken,
}

pub(crate) enum WriteStep {
    Wrote(usize),
    WouldBlock,
    Broken,
}

impl ByteQueue {
    fn new(capacity: usize) -> Arc<ByteQueue> {
        let (version, _) = watch::channel(());
        Arc::new(ByteQueue {
            state: Mutex::new(QueueState {
                data: VecDeque::new(),
                capacity,
                write_closed: false,
                read_closed: false,
                broken: false,
            }),
            version,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.version.subscribe()
    }

    pub fn bump(&self) {
        self.version.send_modify(|_| {});
    }

    pub fn try_read(&self, dst: &mut [u8]) -> ReadStep {
        let mut state = self.state.lock().unwrap();
        if state.broken {
            return ReadStep::Broken;
        }
        if !state.data.is_empty() {
            let n = dst.len().min(state.data.len());
            for slot in dst.iter_mut().take(n) {
                *slot = state.data.pop_front().unwrap();
            }
            let more = !state.data.is_empty();
            drop(state);
            if n > 0 {
                // Space was freed; wake any writer parked on capacity.
                self.bump();
            }
            return ReadStep::Data { n, more };
        }
        if state.write_closed {
            ReadStep::Eof
        } else {
            ReadStep::WouldBlock
        }
    }

    pub fn try_write(&self, src: &[u8]) -> WriteStep {
        let mut state = self.state.lock().unwrap();
        if state.broken || state.read_closed {
            return WriteStep::Broken;
        }
        let space = state.capacity.saturating_sub(state.data.len());
        if space == 0 {
            return WriteStep::WouldBlock;
        }
        let n = src.len().min(space);
        state.data.extend(&src[..n]);
        drop(state);
        self.bump();
        WriteStep::Wrote(n)
    }

    pub fn close_write(&self) {
        self.state.lock().unwrap().write_closed = true;
        self.bump();
    }

    pub fn close_read(&self) {
        self.state.lock().unwrap().read_closed = true;
        self.bump();
    }

    pub fn break_pipe(&self) {
        let mut state = self.state.lock().unwrap();
        state.broken = true;
        state.data.clear();
        drop(state);
        self.bump();
    }
}

/// A live server/client connection: one queue per direction, plus the
/// peer process id recorded when the client opened the pipe.
pub(crate) struct Conn {
    /// Server writes, client reads.
    pub s2c: Arc<ByteQueue>,
    /// Client writes, server reads.
    pub c2s: Arc<ByteQueue>,
    pub client_pid: u32,
}

impl Conn {
    fn new(buffer_size: usize) -> Arc<Conn> {
        Arc::new(Conn {
            s2c: ByteQueue::new(buffer_size),
            c2s: ByteQueue::new(buffer_size),
            client_pid: std::process::id(),
        })
    }
}

/// Connect-side state of one server instance.
pub(crate) enum InstanceState {
    /// Created (or disconnected), no connect issued.
    Idle,
    /// An overlapped connect is pending; completion resolves `op`.
    Listening { op: Arc<OpCore> },
    /// A client opened the instance before the server issued its
    /// connect. Data may already flow; the server's connect resolves
    /// synchronously.
    ClientWaiting { conn: Arc<Conn> },
    Connected { conn: Arc<Conn> },
    Closed,
}

/// One server instance of a named pipe.
pub(crate) struct Instance {
    pub state: Mutex<InstanceState>,
}

impl Instance {
    fn new() -> Arc<Instance> {
        Arc::new(Instance {
            state: Mutex::new(InstanceState::Idle),
        })
    }

    /// The connection currently attached, if any.
    pub fn conn(&self) -> Option<Arc<Conn>> {
        match &*self.state.lock().unwrap() {
            InstanceState::ClientWaiting { conn } | InstanceState::Connected { conn } => {
                Some(conn.clone())
            }
            _ => None,
        }
    }
}

/// Everything shared by the instances of one pipe name.
pub(crate) struct PipeShared {
    pub name: String,
    pub max_instances: u32,
    pub buffer_size: usize,
    pub instances: Mutex<Vec<Arc<Instance>>>,
}

impl PipeShared {
    pub fn new(name: String, max_instances: u32, buffer_size: usize) -> Arc<PipeShared> {
        Arc::new(PipeShared {
            name,
            max_instances,
            buffer_size,
            instances: Mutex::new(Vec::new()),
        })
    }

    /// Registers one more instance, bounded by `max_instances`.
    pub fn add_instance(&self) -> Result<Arc<Instance>> {
        let mut instances = self.instances.lock().unwrap();
        if instances.len() >= self.max_instances as usize {
            return Err(PipeError::PipeBusy);
        }
        let instance = Instance::new();
        instances.push(instance.clone());
        Ok(instance)
    }

    pub fn remove_instance(&self, instance: &Arc<Instance>) -> bool {
        let mut instances = self.instances.lock().unwrap();
        instances.retain(|other| !Arc::ptr_eq(other, instance));
        instances.is_empty()
    }

    /// Claims an instance for a connecting client: a listening instance
    /// completes its pending connect, an idle one parks the client
    /// until the server connects. Scanned in creation order.
    pub fn claim_for_client(&self) -> Result<Arc<Conn>> {
        let instances = self.instances.lock().unwrap();
        for instance in instances.iter() {
            let mut state = instance.state.lock().unwrap();
            match &*state {
                InstanceState::Listening { op } => {
                    let op = op.clone();
                    let conn = Conn::new(self.buffer_size);
                    *state = InstanceState::Connected { conn: conn.clone() };
                    drop(state);
                    op.finish(crate::error::Status::Success, 0);
                    return Ok(conn);
                }
                InstanceState::Idle => {
                    let conn = Conn::new(self.buffer_size);
                    *state = InstanceState::ClientWaiting { conn: conn.clone() };
                    return Ok(conn);
                }
                _ => {}
            }
        }
        Err(PipeError::PipeBusy)
    }
}

/// Which side of a connection a pipe handle refers to.
pub(crate) enum EndpointSide {
    Server {
        shared: Arc<PipeShared>,
        instance: Arc<Instance>,
    },
    Client {
        conn: Arc<Conn>,
    },
}

/// The object a pipe handle resolves to: one side of one pipe, plus the
/// single in-flight operation slot the platform contract allows.
pub(crate) struct PipeEndpoint {
    pub side: EndpointSide,
    inflight: Mutex<Option<Arc<OpCore>>>,
}

impl PipeEndpoint {
    pub fn new(side: EndpointSide) -> Arc<PipeEndpoint> {
        Arc::new(PipeEndpoint {
            side,
            inflight: Mutex::new(None),
        })
    }

    /// Claims the in-flight slot. Fails with `PipeBusy` while a prior
    /// operation on this handle is still pending; a resolved occupant
    /// is displaced lazily.
    pub fn claim(&self, op: &Arc<OpCore>) -> Result<()> {
        let mut slot = self.inflight.lock().unwrap();
        if let Some(current) = slot.as_ref() {
            if current.is_pending() {
                return Err(PipeError::PipeBusy);
            }
        }
        *slot = Some(op.clone());
        Ok(())
    }

    pub fn inflight(&self) -> Option<Arc<OpCore>> {
        self.inflight.lock().unwrap().clone()
    }

    /// The queue this side reads from / writes to. Server endpoints
    /// require a fully connected instance.
    pub fn read_queue(&self) -> Result<Arc<ByteQueue>> {
        match &self.side {
            EndpointSide::Server { instance, .. } => match &*instance.state.lock().unwrap() {
                InstanceState::Connected { conn } => Ok(conn.c2s.clone()),
                _ => Err(PipeError::generic("pipe is not connected")),
            },
            EndpointSide::Client { conn } => Ok(conn.s2c.clone()),
        }
    }

    pub fn write_queue(&self) -> Result<Arc<ByteQueue>> {
        match &self.side {
            EndpointSide::Server { instance, .. } => match &*instance.state.lock().unwrap() {
                InstanceState::Connected { conn } => Ok(conn.s2c.clone()),
                _ => Err(PipeError::generic("pipe is not connected")),
            },
            EndpointSide::Client { conn } => Ok(conn.c2s.clone()),
        }
    }

    /// Wakes any transfer parked on this endpoint's queues, so it can
    /// observe a cancellation or state change.
    pub fn wake_queues(&self) {
        match &self.side {
            EndpointSide::Server { instance, .. } => {
                if let Some(conn) = instance.conn() {
                    conn.s2c.bump();
                    conn.c2s.bump();
                }
            }
            EndpointSide::Client { conn } => {
                conn.s2c.bump();
                conn.c2s.bump();
            }
        }
    }
}
