use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use pgm::port::{DatagramIo, Readiness};

#[cfg(target_family = "unix")]
mod sys {
	pub use std::os::fd::{AsRawFd, RawFd};

	pub use libc::{poll, pollfd as Poll, POLLERR, POLLHUP, POLLIN, POLLNVAL};

	pub fn as_raw<T: AsRawFd>(t: &T) -> RawFd {
		t.as_raw_fd()
	}
}

#[cfg(target_family = "windows")]
mod sys {
	pub use std::os::windows::io::AsRawSocket as AsRawFd;

	pub use windows_sys::Win32::Networking::WinSock::{
		WSAPoll as poll, POLLERR, POLLHUP, POLLNVAL, POLLRDNORM as POLLIN, SOCKET as RawFd, WSAPOLLFD as Poll,
	};

	pub fn as_raw<T: AsRawFd>(t: &T) -> RawFd {
		t.as_raw_socket() as _
	}
}

use sys::*;

fn as_timeout(t: Option<Duration>) -> i32 {
	t.and_then(|d| d.as_millis().try_into().ok()).unwrap_or(-1)
}

/// A single non-blocking UDP socket: the host port a transport is driven through. Unlike the
/// multi-socket, callback-based registry this replaces, there is exactly one socket per port
/// and all I/O is pulled by the caller rather than pushed via a callback.
pub struct UdpPort {
	socket: UdpSocket,
}

impl UdpPort {
	pub fn bind(addr: SocketAddr) -> io::Result<Self> {
		let socket = UdpSocket::bind(addr)?;
		socket.set_nonblocking(true)?;
		Ok(Self { socket })
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.socket.local_addr()
	}
}

impl DatagramIo for UdpPort {
	fn try_send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<Option<usize>> {
		match self.socket.send_to(buf, addr) {
			Ok(n) => Ok(Some(n)),
			Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
			Err(err) => Err(err),
		}
	}

	fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
		match self.socket.recv_from(buf) {
			Ok((n, addr)) => Ok(Some((n, addr))),
			Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
			Err(err) => Err(err),
		}
	}
}

impl Readiness for UdpPort {
	fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
		let mut fds = [Poll { fd: as_raw(&self.socket), events: POLLIN, revents: 0 }];

		let ret = unsafe { poll(fds.as_mut_ptr(), 1, as_timeout(timeout)) };

		if ret < 0 {
			return Err(io::Error::last_os_error());
		}

		let revents = fds[0].revents;

		if revents & (POLLERR | POLLHUP | POLLNVAL) != 0 {
			return Err(io::Error::new(ErrorKind::Other, "socket error while polling"));
		}

		Ok(revents & POLLIN != 0)
	}
}
