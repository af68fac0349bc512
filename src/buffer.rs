use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{PipeError, Result};

#[derive(Debug)]
struct BufferCore {
    data: Mutex<Box<[u8]>>,
    pins: AtomicUsize,
    freed: AtomicBool,
}

/// A fixed-capacity byte region suitable for overlapped I/O.
///
/// The buffer is owned by the caller from allocation until an explicit
/// free. While an overlapped operation referencing it is in flight the
/// buffer is pinned: freeing it (or accessing it after a free) is
/// rejected with a `Generic` failure instead of becoming a dangling
/// reference.
#[derive(Debug)]
pub struct DirectBuffer {
    core: Arc<BufferCore>,
    capacity: usize,
}

impl DirectBuffer {
    pub(crate) fn allocate(size: usize) -> Result<DirectBuffer> {
        if size == 0 {
            return Err(PipeError::generic("buffer size must be positive"));
        }
        Ok(DirectBuffer {
            core: Arc::new(BufferCore {
                data: Mutex::new(vec![0u8; size].into_boxed_slice()),
                pins: AtomicUsize::new(0),
                freed: AtomicBool::new(false),
            }),
            capacity: size,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copies `src` into the buffer starting at `offset`.
    pub fn write_bytes(&self, offset: usize, src: &[u8]) -> Result<()> {
        self.check_live()?;
        self.check_range(offset, src.len())?;
        let mut data = self.core.data.lock().unwrap();
        data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Copies `len` bytes out of the buffer starting at `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.check_live()?;
        self.check_range(offset, len)?;
        let data = self.core.data.lock().unwrap();
        Ok(data[offset..offset + len].to_vec())
    }

    pub(crate) fn free(&self) -> Result<()> {
        if self.core.pins.load(Ordering::SeqCst) > 0 {
            return Err(PipeError::generic(
                "buffer is referenced by a pending operation",
            ));
        }
        if self.core.freed.swap(true, Ordering::SeqCst) {
            return Err(PipeError::generic("buffer was already freed"));
        }
        // Release the backing storage eagerly; the Arc shell may outlive
        // the region.
        *self.core.data.lock().unwrap() = Box::new([]);
        Ok(())
    }

    /// Pins the buffer for the duration of an in-flight operation.
    pub(crate) fn pin(&self) -> Result<BufferPin> {
        self.check_live()?;
        self.core.pins.fetch_add(1, Ordering::SeqCst);
        Ok(BufferPin {
            core: self.core.clone(),
        })
    }

    /// Engine-side alias of the region, bypassing the public range
    /// checks only in name; all access stays checked.
    pub(crate) fn alias(&self) -> DirectBuffer {
        DirectBuffer {
            core: self.core.clone(),
            capacity: self.capacity,
        }
    }

    fn check_live(&self) -> Result<()> {
        if self.core.freed.load(Ordering::SeqCst) {
            return Err(PipeError::generic("buffer has been freed"));
        }
        Ok(())
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        if offset.checked_add(len).map_or(true, |end| end > self.capacity) {
            return Err(PipeError::generic("offset and length exceed buffer capacity"));
        }
        Ok(())
    }
}

/// Keeps a buffer pinned until the owning operation completes.
pub(crate) struct BufferPin {
    core: Arc<BufferCore>,
}

impl Drop for BufferPin {
    fn drop(&mut self) {
        self.core.pins.fetch_sub(1, Ordering::SeqCst);
    }
}
