//! Overlapped Named Pipe Layer
//!
//! This library reconstructs the Windows overlapped named-pipe model as an
//! in-process transport: named pipe instances, waitable events, overlapped
//! connect/read/write with completion retrieval, multi-object waits and
//! direct I/O buffers, all running on the Tokio runtime on any platform.
//! Higher transport layers written against the Windows pipe contract can be
//! exercised end to end without a Windows environment.
//!
//! # Features
//!
//! - Async overlapped connect/read/write with event-based completion
//! - Deterministic multi-object waiting (lowest signaled index wins)
//! - Synchronous read/write adapter for simple byte transfer
//! - Cancellation of in-flight operations
//! - Generation-tagged handle table: closed handles never alias new ones
//! - Pinned direct buffers: freeing a buffer under a pending operation
//!   is rejected instead of undefined
//!
//! # Examples
//!
//! ## Server
//!
//! ```rust,no_run
//! use overpipe::{PipeHost, INFINITE};
//!
//! #[tokio::main]
//! async fn main() -> overpipe::Result<()> {
//!     let host = PipeHost::new();
//!     let server = host.create_pipe("my_pipe", 1, 4096)?;
//!
//!     let event = host.create_event(true, false)?;
//!     let overlapped = host.create_overlapped(event)?;
//!     host.connect(server, &overlapped)?;
//!     host.wait_for_multiple_objects(&[event], false, INFINITE).await?;
//!
//!     let mut request = [0u8; 64];
//!     let n = host.read_file(server, &mut request).await?;
//!     host.write_file(server, &request[..n]).await?;
//!     host.close_handle(server)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Client
//!
//! ```rust,no_run
//! use overpipe::PipeHost;
//!
//! #[tokio::main]
//! async fn main() -> overpipe::Result<()> {
//!     let host = PipeHost::new();
//!     let client = host.open_pipe("my_pipe")?;
//!
//!     host.write_file(client, b"hello").await?;
//!     let mut reply = [0u8; 64];
//!     let n = host.read_file(client, &mut reply).await?;
//!     println!("server echoed {} bytes", n);
//!
//!     host.close_handle(client)?;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod event;
pub mod handle;
pub mod host;
pub mod overlapped;
pub mod selector;
pub mod utils;

mod pipe;

#[cfg(test)]
mod tests;

pub use buffer::DirectBuffer;
pub use config::PipeLimits;
pub use error::{PipeError, Result, Status, INFINITE, MAX_WAIT_OBJECTS};
pub use event::WaitResult;
pub use handle::{EventHandle, PipeHandle, RawHandle, INVALID_HANDLE_VALUE};
pub use host::PipeHost;
pub use overlapped::{ConnectStatus, Overlapped, OverlappedResult};
pub use selector::EventSelector;
