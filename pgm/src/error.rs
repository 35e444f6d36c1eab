use core::fmt;

use crate::tsi::Tsi;

/// The typed outer error surface for facade-level boundaries (`create`, `bind`, `recv_vector`).
/// Internal narrow helpers keep using `utils::error::Result<T, ()>`, logging the cause at the
/// call site instead of threading it through a typed variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
	PacketLength,
	PacketChecksum,
	PacketVersion,
	PacketOption,
	PacketType,
	/// Informational: the packet duplicated already-processed data. Counted, not treated as a
	/// session failure.
	PacketDup,
	WindowOverflow,
	WindowUnderflow,
	ConfigInvalid,
	IoAgain,
	IoReset { tsi: Tsi, lost_count: u32 },
	IoClosed,
	ResourceExhausted,
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::PacketLength => write!(f, "packet truncated"),
			Error::PacketChecksum => write!(f, "invalid checksum"),
			Error::PacketVersion => write!(f, "unsupported IP version"),
			Error::PacketOption => write!(f, "malformed option chain"),
			Error::PacketType => write!(f, "unknown PGM packet type"),
			Error::PacketDup => write!(f, "duplicate packet"),
			Error::WindowOverflow => write!(f, "window invariant violated: overflow"),
			Error::WindowUnderflow => write!(f, "window invariant violated: underflow"),
			Error::ConfigInvalid => write!(f, "invalid configuration"),
			Error::IoAgain => write!(f, "no data available"),
			Error::IoReset { tsi, lost_count } => write!(f, "{lost_count} packets lost from {tsi}"),
			Error::IoClosed => write!(f, "transport closed"),
			Error::ResourceExhausted => write!(f, "resource exhausted"),
		}
	}
}

impl std::error::Error for Error {}

/// Observability counters, incremented at the boundary rather than by propagating every
/// parse-level failure up the call stack: parse errors are dropped silently and counted here.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
	pub parse_errors: u64,
	pub duplicates: u64,
	pub lost: u64,
	pub resets: u64,
}
