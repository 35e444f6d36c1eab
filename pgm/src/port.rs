use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime};

/// A monotonic clock source. `now()` drives timer scheduling; `system_now()` is stamped into
/// SPM options that carry a wall-clock-meaningful time.
pub trait Clock {
	fn now(&self) -> Instant;
	fn system_now(&self) -> SystemTime;
}

/// Non-blocking datagram I/O. Implementations must never block; the absence of data, or
/// backpressure on send, is reported as `Ok(None)`, not an error.
pub trait DatagramIo {
	fn try_send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<Option<usize>>;
	fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;
}

/// An I/O-readiness handle a host event loop can multiplex on, mirroring the
/// `AsRawFd`-registration shape used elsewhere in this workspace.
pub trait Readiness {
	/// Block until the underlying handle is readable or `timeout` elapses. `None` blocks
	/// indefinitely.
	fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool>;
}
