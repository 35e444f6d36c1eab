use core::net::IpAddr;

use bilge::prelude::*;
use utils::bytes::Cast;

mod checksum;

pub mod v4;
pub mod v6;

pub use checksum::Checksum;

/// A parsed IPv4 or IPv6 datagram, with the header consumed from the buffer.
pub struct Parsed {
	pub src: IpAddr,
	pub dst: IpAddr,
	pub protocol: Protocol,
}

#[bitsize(4)]
#[derive(FromBits, PartialEq, Eq, Clone, Copy, Debug)]
pub enum Version {
	V4 = 4,
	V6 = 6,
	#[fallback]
	Unknown,
}

#[bitsize(8)]
#[derive(FromBits, Cast)]
#[repr(C)]
pub struct Prefix {
	__0: u4,
	ver: Version,
}

impl Prefix {
	/// Peek the IP version from the first byte of a datagram, without consuming it.
	pub fn version_of(buf: &[u8]) -> Option<Version> {
		buf.first().map(|&b| Prefix::from(b).ver())
	}
}

#[bitsize(8)]
#[derive(Clone, Copy, FromBits, Cast)]
#[repr(C)]
pub struct ToS {
	ecn: ECN,
	ds: DiffServ,
}

#[bitsize(6)]
#[derive(FromBits, PartialEq, Eq, Clone, Copy, Debug)]
pub enum DiffServ {
	Default = 0,
	#[fallback]
	Unknown,
}

#[bitsize(2)]
#[derive(FromBits, PartialEq, Eq, Clone, Copy, Debug)]
pub enum ECN {
	NotECT = 0b00,
	ECT1 = 0b01,
	ECT0 = 0b10,
	CE = 0b11,
}

impl Default for ToS {
	fn default() -> Self {
		ToS::new(ECN::NotECT, DiffServ::Default)
	}
}

/// The IP protocol number carried in the IPv4 `proto` / IPv6 `nxt` field. PGM is assigned 113 by
/// IANA; this implementation also accepts UDP encapsulation (protocol 17).
#[repr(u8)]
#[bitsize(8)]
#[derive(Clone, Copy, FromBits, PartialEq, Eq, Debug)]
pub enum Protocol {
	Udp = 17,
	Pgm = 113,
	#[fallback]
	Unknown(u8),
}
