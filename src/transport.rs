//! Transport seam between the cache engine and the physical session.
//!
//! The engine never owns GPIB/TCP plumbing; it talks to anything satisfying
//! [`Transport`]. Production code injects a real VISA/Prologix session,
//! tests inject fakes. Every operation is a synchronous blocking call: a
//! cache miss does one round trip through this trait before returning.

use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Synchronous command transport for one instrument session.
///
/// `open`/`close` are idempotent: opening an open session and closing a
/// closed one are no-ops, and `close` releases the session without
/// destroying its identity. `write` is fire-and-forget; `query` blocks for
/// the round trip. All failures, timeouts included, surface as
/// [`CacheError::Transport`](crate::CacheError::Transport) or
/// [`CacheError::Timeout`](crate::CacheError::Timeout).
pub trait Transport {
    /// Acquire the session. Idempotent.
    fn open(&mut self) -> Result<()>;

    /// Release the session. Idempotent.
    fn close(&mut self) -> Result<()>;

    /// Send a command without expecting a response.
    fn write(&mut self, command: &str) -> Result<()>;

    /// Send a query and block for the response.
    fn query(&mut self, command: &str) -> Result<String> {
        self.query_with_timeout(command, None)
    }

    /// Send a query with an optional one-shot timeout override.
    fn query_with_timeout(
        &mut self,
        command: &str,
        timeout_override: Option<Duration>,
    ) -> Result<String>;

    /// Current round-trip timeout.
    fn timeout(&self) -> Duration;

    /// Change the round-trip timeout.
    fn set_timeout(&mut self, timeout: Duration);
}

/// A session shared between several logical owners (e.g. a channel bank).
pub type SharedSession<T> = Arc<Mutex<T>>;

/// Wrap a transport for shared ownership.
pub fn shared<T: Transport>(transport: T) -> SharedSession<T> {
    Arc::new(Mutex::new(transport))
}

impl<T: Transport> Transport for SharedSession<T> {
    fn open(&mut self) -> Result<()> {
        self.lock().open()
    }

    fn close(&mut self) -> Result<()> {
        self.lock().close()
    }

    fn write(&mut self, command: &str) -> Result<()> {
        self.lock().write(command)
    }

    fn query_with_timeout(
        &mut self,
        command: &str,
        timeout_override: Option<Duration>,
    ) -> Result<String> {
        self.lock().query_with_timeout(command, timeout_override)
    }

    fn timeout(&self) -> Duration {
        self.lock().timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.lock().set_timeout(timeout);
    }
}
