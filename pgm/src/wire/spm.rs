use core::net::IpAddr;

use log::warn;

use crate::error::Error;
use crate::sqn::Sqn;

use super::{afi_of, decode_nla, encode_nla};

const FIXED_LEN: usize = 12;

/// The decoded body of an SPM (Source Path Message): the source's current lead and trail
/// sequence numbers, advertising the extent of its transmit window, and the NLA of the path the
/// SPM travelled, used by receivers to address unicast NAKs.
#[derive(Debug, Clone, Copy)]
pub struct Spm {
	pub sqn: Sqn,
	pub trail: Sqn,
	pub lead: Sqn,
	pub path_nla: IpAddr,
}

pub fn parse(buf: &[u8]) -> Result<(Spm, usize), Error> {
	if buf.len() < FIXED_LEN + 4 {
		warn!("SPM truncated: got {} bytes", buf.len());
		return Err(Error::PacketLength);
	}

	let sqn = Sqn::new(u32::from_be_bytes(buf[0..4].try_into().expect("checked length")));
	let trail = Sqn::new(u32::from_be_bytes(buf[4..8].try_into().expect("checked length")));
	let lead = Sqn::new(u32::from_be_bytes(buf[8..12].try_into().expect("checked length")));

	let afi = u16::from_be_bytes(buf[12..14].try_into().expect("checked length"));
	let (path_nla, nla_len) = decode_nla(afi, &buf[16..])?;

	Ok((Spm { sqn, trail, lead, path_nla }, FIXED_LEN + 4 + nla_len))
}

pub fn write(out: &mut Vec<u8>, spm: &Spm) {
	out.extend_from_slice(&spm.sqn.get().to_be_bytes());
	out.extend_from_slice(&spm.trail.get().to_be_bytes());
	out.extend_from_slice(&spm.lead.get().to_be_bytes());
	out.extend_from_slice(&afi_of(spm.path_nla).to_be_bytes());
	out.extend_from_slice(&[0, 0]);
	encode_nla(out, spm.path_nla);
}

#[cfg(test)]
mod tests {
	use core::net::{Ipv4Addr, Ipv6Addr};

	use super::*;

	#[test]
	fn round_trips_with_ipv6_nla() {
		let spm = Spm {
			sqn: Sqn::new(1),
			trail: Sqn::new(0),
			lead: Sqn::new(1),
			path_nla: IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
		};

		let mut buf = Vec::new();
		write(&mut buf, &spm);

		let (parsed, consumed) = parse(&buf).unwrap();
		assert_eq!(consumed, buf.len());
		assert_eq!(parsed.path_nla, IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)));
	}

	#[test]
	fn truncated_nla_is_rejected() {
		let spm = Spm { sqn: Sqn::new(0), trail: Sqn::new(0), lead: Sqn::new(0), path_nla: IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)) };

		let mut buf = Vec::new();
		write(&mut buf, &spm);
		buf.truncate(buf.len() - 1);

		assert_eq!(parse(&buf), Err(Error::PacketLength));
	}
}
