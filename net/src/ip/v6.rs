use core::mem::size_of;
use core::net::{IpAddr, Ipv6Addr};

use bilge::prelude::*;
use collections::bytes::{Cursor, Slice};
use log::warn;
use utils::bytes::Cast;
use utils::endian::{u16be, BigEndian};

use super::{Parsed, Protocol, ToS, Version};

#[bitsize(32)]
#[derive(FromBits)]
struct Meta {
	flow: u20,
	tos: ToS,
	ver: Version,
}

#[derive(Cast)]
#[repr(C)]
struct Header {
	ver: BigEndian<Meta>,
	len: u16be,
	nxt: BigEndian<Protocol>,
	ttl: u8,
	src: Ipv6Addr,
	dst: Ipv6Addr,
}

const _: () = assert!(size_of::<Header>() == 40);

/// Parse and validate an IPv6 header at the front of `buf`. Unlike IPv4, there is no header
/// checksum to verify; correctness relies entirely on the upper-layer (PGM) checksum.
pub fn parse(buf: &Slice) -> Result<Parsed, ()> {
	if buf.len() < size_of::<Header>() {
		warn!("IPv6 header truncated: got {} bytes", buf.len());
		return Err(());
	}

	let header: &Header = buf.split();

	let payload_len = header.len.get() as usize;

	if buf.len() < payload_len {
		warn!("IPv6 packet smaller than its length field");
		return Err(());
	}

	buf.truncate(payload_len);

	Ok(Parsed {
		src: IpAddr::V6(header.src),
		dst: IpAddr::V6(header.dst),
		protocol: header.nxt.get(),
	})
}

/// Serialise an IPv6 header into `buf`, then call `f` to write the payload, then backfill the
/// header's length field. IPv6 carries no header checksum.
pub fn write(buf: Cursor, src: Ipv6Addr, dst: Ipv6Addr, protocol: Protocol, tos: ToS, hops: u8, f: impl FnOnce(Cursor)) {
	let (header, mut buf): (&mut Header, _) = buf.split();

	header.ver = Meta::new(u20::new(0), tos, Version::V6).into();

	header.nxt = protocol.into();
	header.ttl = hops;

	header.src = src;
	header.dst = dst;

	f(buf.fork());

	header.len = ((size_of::<Header>() + buf.pivot()) as u16).into();
}

#[cfg(test)]
mod tests {
	use collections::bytes::Bytes;

	use super::*;

	#[test]
	fn round_trip() {
		let mut vec = vec![0u8; 64];

		Cursor::vec(&mut vec, |buf| {
			write(
				buf,
				Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1),
				Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 2),
				Protocol::Pgm,
				ToS::default(),
				64,
				|mut buf| {
					buf.push(b"hello".as_slice());
				},
			);
		});

		assert_eq!(vec.len(), size_of::<Header>() + 5);

		let mut bytes = Bytes::new(vec.len());
		bytes.copy_from_slice(&vec);

		let slice = bytes.slice(..);
		let parsed = parse(&slice).unwrap();

		assert_eq!(parsed.src, IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1)));
		assert_eq!(parsed.dst, IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 2)));
		assert_eq!(parsed.protocol, Protocol::Pgm);
		assert_eq!(&*slice, b"hello");
	}
}
