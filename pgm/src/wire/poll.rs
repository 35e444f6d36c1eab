use core::net::IpAddr;

use log::warn;

use crate::error::Error;
use crate::sqn::Sqn;

use super::{afi_of, decode_nla, encode_nla};

const POLL_FIXED_LEN: usize = 8;
const POLR_FIXED_LEN: usize = 8;

/// A POLL: the source probing for NAKs from otherwise-silent receivers. `round` identifies this
/// poll cycle so POLRs can be matched back to it.
#[derive(Debug, Clone, Copy)]
pub struct Poll {
	pub sqn: Sqn,
	pub round: u32,
	pub path_nla: IpAddr,
}

/// A receiver's reply to a POLL.
#[derive(Debug, Clone, Copy)]
pub struct Polr {
	pub sqn: Sqn,
	pub round: u32,
}

pub fn parse(buf: &[u8]) -> Result<(Poll, usize), Error> {
	if buf.len() < POLL_FIXED_LEN + 4 {
		warn!("POLL truncated: got {} bytes", buf.len());
		return Err(Error::PacketLength);
	}

	let sqn = Sqn::new(u32::from_be_bytes(buf[0..4].try_into().expect("checked length")));
	let round = u32::from_be_bytes(buf[4..8].try_into().expect("checked length"));

	let afi = u16::from_be_bytes(buf[8..10].try_into().expect("checked length"));
	let (path_nla, nla_len) = decode_nla(afi, &buf[12..])?;

	Ok((Poll { sqn, round, path_nla }, POLL_FIXED_LEN + 4 + nla_len))
}

pub fn write(out: &mut Vec<u8>, poll: &Poll) {
	out.extend_from_slice(&poll.sqn.get().to_be_bytes());
	out.extend_from_slice(&poll.round.to_be_bytes());
	out.extend_from_slice(&afi_of(poll.path_nla).to_be_bytes());
	out.extend_from_slice(&[0, 0]);
	encode_nla(out, poll.path_nla);
}

pub fn parse_polr(buf: &[u8]) -> Result<(Polr, usize), Error> {
	if buf.len() < POLR_FIXED_LEN {
		warn!("POLR truncated: got {} bytes", buf.len());
		return Err(Error::PacketLength);
	}

	let sqn = Sqn::new(u32::from_be_bytes(buf[0..4].try_into().expect("checked length")));
	let round = u32::from_be_bytes(buf[4..8].try_into().expect("checked length"));

	Ok((Polr { sqn, round }, POLR_FIXED_LEN))
}

pub fn write_polr(out: &mut Vec<u8>, polr: &Polr) {
	out.extend_from_slice(&polr.sqn.get().to_be_bytes());
	out.extend_from_slice(&polr.round.to_be_bytes());
}

#[cfg(test)]
mod tests {
	use core::net::Ipv4Addr;

	use super::*;

	#[test]
	fn poll_round_trips() {
		let poll = Poll { sqn: Sqn::new(1), round: 9, path_nla: IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)) };

		let mut buf = Vec::new();
		write(&mut buf, &poll);

		let (parsed, consumed) = parse(&buf).unwrap();
		assert_eq!(consumed, buf.len());
		assert_eq!(parsed.round, 9);
	}

	#[test]
	fn polr_round_trips() {
		let polr = Polr { sqn: Sqn::new(1), round: 9 };

		let mut buf = Vec::new();
		write_polr(&mut buf, &polr);

		let (parsed, consumed) = parse_polr(&buf).unwrap();
		assert_eq!(consumed, buf.len());
		assert_eq!(parsed.round, 9);
	}
}
