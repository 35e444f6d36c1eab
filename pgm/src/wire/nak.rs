use core::net::IpAddr;

use log::warn;

use crate::error::Error;
use crate::sqn::Sqn;

use super::options::{self, Option};
use super::{afi_of, decode_nla, encode_nla};

const FIXED_LEN: usize = 4;
const AFI_HEADER_LEN: usize = 4;

/// The decoded body shared by NAK, N-NAK and NCF: the requested sequence number, the source and
/// group NLAs the request concerns, and any additional sequence numbers grouped onto this one
/// request via `OPT_NAK_LIST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nak {
	pub sqn: Sqn,
	pub source_nla: IpAddr,
	pub group_nla: IpAddr,
	pub list: Vec<u32>,
}

pub fn parse(buf: &[u8]) -> Result<(Nak, usize), Error> {
	if buf.len() < FIXED_LEN + AFI_HEADER_LEN {
		warn!("NAK truncated before source NLA: got {} bytes", buf.len());
		return Err(Error::PacketLength);
	}

	let sqn = Sqn::new(u32::from_be_bytes(buf[0..4].try_into().expect("checked length")));

	let mut pos = FIXED_LEN;
	let source_afi = u16::from_be_bytes(buf[pos..pos + 2].try_into().expect("checked length"));
	pos += AFI_HEADER_LEN;
	let (source_nla, source_len) = decode_nla(source_afi, &buf[pos..])?;
	pos += source_len;

	if buf.len() < pos + AFI_HEADER_LEN {
		warn!("NAK truncated before group NLA");
		return Err(Error::PacketLength);
	}

	let group_afi = u16::from_be_bytes(buf[pos..pos + 2].try_into().expect("checked length"));
	pos += AFI_HEADER_LEN;
	let (group_nla, group_len) = decode_nla(group_afi, &buf[pos..])?;
	pos += group_len;

	if source_afi != group_afi {
		warn!("NAK source NLA (AFI {source_afi}) and group NLA (AFI {group_afi}) disagree on address family");
		return Err(Error::PacketOption);
	}

	let mut list = Vec::new();

	if pos < buf.len() {
		let (opts, chain_len) = options::parse(&buf[pos..])?;

		for opt in opts {
			if let Option::NakList(sqns) = opt {
				list = sqns;
			}
		}

		pos += chain_len;
	}

	Ok((Nak { sqn, source_nla, group_nla, list }, pos))
}

pub fn write(out: &mut Vec<u8>, nak: &Nak) {
	out.extend_from_slice(&nak.sqn.get().to_be_bytes());

	out.extend_from_slice(&afi_of(nak.source_nla).to_be_bytes());
	out.extend_from_slice(&[0, 0]);
	encode_nla(out, nak.source_nla);

	out.extend_from_slice(&afi_of(nak.group_nla).to_be_bytes());
	out.extend_from_slice(&[0, 0]);
	encode_nla(out, nak.group_nla);

	if !nak.list.is_empty() {
		options::write_nak_list(out, &nak.list);
	}
}

#[cfg(test)]
mod tests {
	use core::net::Ipv4Addr;

	use super::*;

	#[test]
	fn round_trips_without_nak_list() {
		let nak = Nak {
			sqn: Sqn::new(3),
			source_nla: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
			group_nla: IpAddr::V4(Ipv4Addr::new(239, 1, 1, 1)),
			list: Vec::new(),
		};

		let mut buf = Vec::new();
		write(&mut buf, &nak);

		let (parsed, consumed) = parse(&buf).unwrap();
		assert_eq!(consumed, buf.len());
		assert_eq!(parsed, nak);
	}

	#[test]
	fn round_trips_with_nak_list() {
		let nak = Nak {
			sqn: Sqn::new(3),
			source_nla: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
			group_nla: IpAddr::V4(Ipv4Addr::new(239, 1, 1, 1)),
			list: vec![4, 5, 6],
		};

		let mut buf = Vec::new();
		write(&mut buf, &nak);

		let (parsed, consumed) = parse(&buf).unwrap();
		assert_eq!(consumed, buf.len());
		assert_eq!(parsed, nak);
	}

	#[test]
	fn mismatched_nla_address_families_are_rejected() {
		use core::net::Ipv6Addr;

		let nak = Nak {
			sqn: Sqn::new(3),
			source_nla: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
			group_nla: IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1)),
			list: Vec::new(),
		};

		let mut buf = Vec::new();
		write(&mut buf, &nak);

		assert_eq!(parse(&buf), Err(Error::PacketOption));
	}
}
