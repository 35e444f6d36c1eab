use core::mem::size_of;
use core::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use collections::bytes::Bytes;
use log::warn;
use net::ip::{Checksum, Prefix, Protocol, Version};
use utils::bytes::{self, Cast};
use utils::endian::u16be;

use crate::error::Error;
use crate::tsi::Tsi;

pub mod data;
pub mod nak;
pub mod options;
pub mod poll;
pub mod spm;
pub mod spmr;

pub const HEADER_LEN: usize = size_of::<Raw>();

const OPT_PRESENT: u8 = 0x01;

pub(crate) const AFI_IP: u16 = 1;
pub(crate) const AFI_IP6: u16 = 2;

/// The 16-byte PGM common header, present at the front of every PGM datagram.
#[derive(Cast)]
#[repr(C)]
struct Raw {
	sport: u16be,
	dport: u16be,
	kind: u8,
	options: u8,
	csum: [u8; 2],
	gsi: [u8; 6],
	tsdu_length: u16be,
}

const _: () = assert!(size_of::<Raw>() == 16);

/// The closed set of PGM packet types this implementation understands. Dispatch on the wire's
/// type byte is a `match` on this enum, not a trait object.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Type {
	Spm = 0x00,
	Poll = 0x01,
	Polr = 0x02,
	Odata = 0x04,
	Rdata = 0x05,
	Nak = 0x08,
	Nnak = 0x09,
	Ncf = 0x0A,
	Spmr = 0x0C,
}

impl Type {
	fn from_u8(b: u8) -> Option<Self> {
		Some(match b {
			0x00 => Type::Spm,
			0x01 => Type::Poll,
			0x02 => Type::Polr,
			0x04 => Type::Odata,
			0x05 => Type::Rdata,
			0x08 => Type::Nak,
			0x09 => Type::Nnak,
			0x0A => Type::Ncf,
			0x0C => Type::Spmr,
			_ => return None,
		})
	}
}

/// The decoded common header, shared by every PGM packet type.
#[derive(Clone, Copy, Debug)]
pub struct Header {
	pub tsi: Tsi,
	pub dport: u16,
	pub kind: Type,
	pub tsdu_length: u16,
	pub options_present: bool,
}

/// Parse and validate the 16-byte common header at the front of `buf`, verifying the PGM
/// checksum over the entire datagram (header, type-specific body, options, and TSDU).
pub fn parse_header(buf: &[u8]) -> Result<Header, Error> {
	if buf.len() < HEADER_LEN {
		warn!("PGM header truncated: got {} bytes", buf.len());
		return Err(Error::PacketLength);
	}

	if Checksum::of(buf).end() != [0, 0] {
		warn!("PGM datagram has invalid checksum");
		return Err(Error::PacketChecksum);
	}

	let raw: &Raw = bytes::cast(&buf[..HEADER_LEN]);

	let kind = Type::from_u8(raw.kind).ok_or_else(|| {
		warn!("Unknown PGM type byte 0x{:02x}", raw.kind);
		Error::PacketType
	})?;

	Ok(Header {
		tsi: Tsi::new(raw.gsi, raw.sport.get()),
		dport: raw.dport.get(),
		kind,
		tsdu_length: raw.tsdu_length.get(),
		options_present: raw.options & OPT_PRESENT != 0,
	})
}

/// Serialise the common header into `out`, with the checksum field zeroed; call [`finalize`]
/// once the whole datagram (body, options, and TSDU) has been appended.
pub fn write_header(out: &mut Vec<u8>, tsi: Tsi, dport: u16, kind: Type, tsdu_length: u16, options_present: bool) {
	let raw = Raw {
		sport: tsi.port().into(),
		dport: dport.into(),
		kind: kind as u8,
		options: if options_present { OPT_PRESENT } else { 0 },
		csum: [0, 0],
		gsi: tsi.gsi(),
		tsdu_length: tsdu_length.into(),
	};

	out.extend_from_slice(bytes::as_slice(&raw));
}

/// Compute and backfill the checksum field of a fully-serialised datagram.
pub fn finalize(buf: &mut [u8]) {
	let csum = Checksum::of(buf).end_nonzero();
	bytes::cast_mut::<Raw, _>(&mut buf[..HEADER_LEN]).csum = csum;
}

fn decode_nla(afi: u16, buf: &[u8]) -> Result<(IpAddr, usize), Error> {
	match afi {
		AFI_IP => {
			if buf.len() < 4 {
				warn!("NLA truncated");
				return Err(Error::PacketLength);
			}

			Ok((IpAddr::V4(Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3])), 4))
		}
		AFI_IP6 => {
			if buf.len() < 16 {
				warn!("NLA truncated");
				return Err(Error::PacketLength);
			}

			let octets: [u8; 16] = buf[..16].try_into().expect("checked above");
			Ok((IpAddr::V6(Ipv6Addr::from(octets)), 16))
		}
		afi => {
			warn!("Unsupported NLA address family {afi}");
			Err(Error::PacketOption)
		}
	}
}

fn afi_of(addr: IpAddr) -> u16 {
	match addr {
		IpAddr::V4(_) => AFI_IP,
		IpAddr::V6(_) => AFI_IP6,
	}
}

fn encode_nla(out: &mut Vec<u8>, addr: IpAddr) {
	match addr {
		IpAddr::V4(a) => out.extend_from_slice(&a.octets()),
		IpAddr::V6(a) => out.extend_from_slice(&a.octets()),
	}
}

/// The decoded type-specific body of a PGM packet.
pub enum Body {
	Spm(spm::Spm),
	Poll(poll::Poll),
	Polr(poll::Polr),
	Data(data::Data),
	Nak(nak::Nak),
	Nnak(nak::Nak),
	Ncf(nak::Nak),
	Spmr(spmr::Spmr),
}

/// A fully-decoded PGM packet: the common header, the type-specific body, and the byte offset
/// (from the start of the datagram) at which the TSDU payload begins.
pub struct Packet {
	pub header: Header,
	pub body: Body,
	pub payload_offset: usize,
}

/// Parse a complete PGM datagram received over raw IP (protocol 113): validates and strips the
/// IPv4 or IPv6 header (including the IPv4 header checksum) before handing the remainder to
/// [`parse_udp_encap`]. Rejects any IP payload whose next-header/protocol field isn't PGM.
pub fn parse_raw(buf: &[u8]) -> Result<Packet, Error> {
	let version = Prefix::version_of(buf).ok_or(Error::PacketVersion)?;

	let mut owned = Bytes::new(buf.len());
	owned.copy_from_slice(buf);
	let slice = owned.slice(..);

	let parsed = match version {
		Version::V4 => net::ip::v4::parse(&slice),
		Version::V6 => net::ip::v6::parse(&slice),
		Version::Unknown => {
			warn!("Unrecognised IP version nibble");
			return Err(Error::PacketVersion);
		}
	}
	.map_err(|()| Error::PacketVersion)?;

	if parsed.protocol != Protocol::Pgm {
		warn!("Raw IP datagram carries protocol {:?}, not PGM", parsed.protocol);
		return Err(Error::PacketVersion);
	}

	parse_udp_encap(&slice)
}

/// Parse a complete PGM datagram, already stripped of any IP header: the common header followed
/// by its type-specific body. This is the entry point for PGM-over-UDP, where the OS socket layer
/// has already consumed the IP header.
pub fn parse_udp_encap(buf: &[u8]) -> Result<Packet, Error> {
	let header = parse_header(buf)?;
	let rest = &buf[HEADER_LEN..];

	let (body, body_len) = match header.kind {
		Type::Spm => {
			let (body, n) = spm::parse(rest)?;
			(Body::Spm(body), n)
		}
		Type::Poll => {
			let (body, n) = poll::parse(rest)?;
			(Body::Poll(body), n)
		}
		Type::Polr => {
			let (body, n) = poll::parse_polr(rest)?;
			(Body::Polr(body), n)
		}
		Type::Odata | Type::Rdata => {
			let body = data::parse(rest, header.options_present)?;
			let n = body.payload_offset;
			(Body::Data(body), n)
		}
		Type::Nak => {
			let (body, n) = nak::parse(rest)?;
			(Body::Nak(body), n)
		}
		Type::Nnak => {
			let (body, n) = nak::parse(rest)?;
			(Body::Nnak(body), n)
		}
		Type::Ncf => {
			let (body, n) = nak::parse(rest)?;
			(Body::Ncf(body), n)
		}
		Type::Spmr => {
			let (body, n) = spmr::parse(rest)?;
			(Body::Spmr(body), n)
		}
	};

	Ok(Packet { header, body, payload_offset: HEADER_LEN + body_len })
}

#[cfg(test)]
mod tests {
	use core::net::Ipv4Addr;

	use super::*;

	#[test]
	fn odata_round_trip() {
		let tsi = Tsi::new([1, 2, 3, 4, 5, 6], 1000);

		let mut buf = Vec::new();
		write_header(&mut buf, tsi, 2000, Type::Odata, 5, false);
		data::write(&mut buf, crate::sqn::Sqn::new(42), crate::sqn::Sqn::new(0), None);
		buf.extend_from_slice(b"hello");
		finalize(&mut buf);

		let packet = parse_udp_encap(&buf).unwrap();

		assert_eq!(packet.header.tsi, tsi);
		assert_eq!(packet.header.dport, 2000);
		assert_eq!(packet.header.kind, Type::Odata);

		let Body::Data(data) = packet.body else { panic!("expected Data body") };
		assert_eq!(data.sqn.get(), 42);
		assert_eq!(&buf[packet.payload_offset..], b"hello");
	}

	#[test]
	fn spm_round_trip_with_ipv4_nla() {
		let tsi = Tsi::new([9, 9, 9, 9, 9, 9], 500);

		let mut buf = Vec::new();
		write_header(&mut buf, tsi, 500, Type::Spm, 0, false);

		let spm = spm::Spm {
			sqn: crate::sqn::Sqn::new(7),
			trail: crate::sqn::Sqn::new(1),
			lead: crate::sqn::Sqn::new(7),
			path_nla: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
		};

		spm::write(&mut buf, &spm);
		finalize(&mut buf);

		let packet = parse_udp_encap(&buf).unwrap();
		let Body::Spm(parsed) = packet.body else { panic!("expected Spm body") };

		assert_eq!(parsed.sqn.get(), 7);
		assert_eq!(parsed.trail.get(), 1);
		assert_eq!(parsed.lead.get(), 7);
		assert_eq!(parsed.path_nla, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
	}

	#[test]
	fn corrupted_checksum_is_rejected() {
		let tsi = Tsi::new([1, 1, 1, 1, 1, 1], 1);

		let mut buf = Vec::new();
		write_header(&mut buf, tsi, 1, Type::Odata, 5, false);
		data::write(&mut buf, crate::sqn::Sqn::new(1), crate::sqn::Sqn::new(0), None);
		buf.extend_from_slice(b"hello");
		finalize(&mut buf);

		// Flip a byte in the TSDU payload.
		*buf.last_mut().unwrap() ^= 0xFF;

		assert_eq!(parse_udp_encap(&buf), Err(Error::PacketChecksum));
	}

	#[test]
	fn nak_with_list_round_trips() {
		let tsi = Tsi::new([2, 2, 2, 2, 2, 2], 300);

		let mut buf = Vec::new();
		write_header(&mut buf, tsi, 300, Type::Nak, 0, true);

		let nak = nak::Nak {
			sqn: crate::sqn::Sqn::new(10),
			source_nla: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
			group_nla: IpAddr::V4(Ipv4Addr::new(239, 0, 0, 1)),
			list: vec![11, 12, 13],
		};

		nak::write(&mut buf, &nak);
		finalize(&mut buf);

		let packet = parse_udp_encap(&buf).unwrap();
		let Body::Nak(parsed) = packet.body else { panic!("expected Nak body") };

		assert_eq!(parsed.sqn.get(), 10);
		assert_eq!(parsed.list, vec![11, 12, 13]);
	}

	fn s1_s2_pgm_datagram() -> (Tsi, Vec<u8>) {
		let tsi = Tsi::new([1, 2, 3, 4, 5, 6], 1000);

		let mut pgm = Vec::new();
		write_header(&mut pgm, tsi, 7500, Type::Odata, 18, false);
		data::write(&mut pgm, crate::sqn::Sqn::new(0), crate::sqn::Sqn::new(0xFFFFFFFF), None);
		pgm.extend_from_slice(b"i am not a string\0");
		finalize(&mut pgm);

		(tsi, pgm)
	}

	#[test]
	fn s1_raw_ipv4_odata_parse() {
		use collections::bytes::Cursor;

		let (tsi, pgm) = s1_s2_pgm_datagram();

		let mut datagram = vec![0u8; 20 + pgm.len()];
		Cursor::vec(&mut datagram, |buf| {
			net::ip::v4::write(buf, Ipv4Addr::new(127, 0, 0, 1), Ipv4Addr::new(127, 0, 0, 2), net::ip::Protocol::Pgm, net::ip::ToS::default(), 16, |mut buf| {
				buf.push(pgm.as_slice());
			});
		});

		let packet = parse_raw(&datagram).unwrap();

		assert_eq!(packet.header.tsi, tsi);
		assert_eq!(packet.header.kind, Type::Odata);
		assert_eq!(packet.header.tsdu_length, 18);

		let payload_offset = packet.payload_offset;
		let Body::Data(data) = packet.body else { panic!("expected Data body") };
		assert_eq!(data.sqn.get(), 0);
		assert_eq!(&pgm[payload_offset..], b"i am not a string\0");
	}

	#[test]
	fn s2_udp_encap_odata_parse() {
		let (_, pgm) = s1_s2_pgm_datagram();

		let packet = parse_udp_encap(&pgm).unwrap();
		assert_eq!(packet.header.kind, Type::Odata);
		assert_eq!(&pgm[packet.payload_offset..], b"i am not a string\0");
	}
}
