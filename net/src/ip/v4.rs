use core::mem::size_of;
use core::net::{IpAddr, Ipv4Addr};

use bilge::prelude::*;
use collections::bytes::{Cursor, Slice};
use log::warn;
use utils::bytes::{self, Cast};
use utils::endian::{b, u16be};

use super::{Checksum, Parsed, Protocol, ToS, Version};

/// Parse and validate an IPv4 header at the front of `buf`. On success, `buf` is left pointing at
/// exactly the payload (any trailing padding beyond the header's `len` field is trimmed, and any
/// IP options are skipped). Rejects fragmented datagrams, truncated datagrams, and datagrams with
/// an invalid header checksum.
pub fn parse(buf: &Slice) -> Result<Parsed, ()> {
	if buf.len() < size_of::<Header>() {
		warn!("IPv4 header truncated: got {} bytes", buf.len());
		return Err(());
	}

	let header: &Header = buf.split();

	if header.ver.ver() != Version::V4 {
		warn!("Expected IPv4 version nibble, found {:?}", header.ver.ver());
		return Err(());
	}

	let header_len = 4 * header.ver.ihl().value() as usize;

	if header_len < size_of::<Header>() {
		warn!("IPv4 IHL smaller than the fixed header");
		return Err(());
	}

	if buf.len() + size_of::<Header>() < header_len {
		warn!("IPv4 header truncated: options exceed buffer");
		return Err(());
	}

	let options: &[u8] = buf.split_n(header_len - size_of::<Header>());

	let frag = header.frg.get();

	if frag.more() || frag.ofst().value() != 0 {
		warn!("Received fragmented IPv4 datagram, discarding");
		return Err(());
	}

	if header.csm != [0, 0] {
		let mut csum = Checksum::of(bytes::as_slice(header));
		csum.push(options);

		if csum.end() != [0, 0] {
			warn!("IPv4 header has invalid checksum");
			return Err(());
		}
	}

	let total_len = header.len.get() as usize;

	if total_len < header_len {
		warn!("IPv4 total length smaller than header length");
		return Err(());
	}

	let payload_len = total_len - header_len;

	if buf.len() < payload_len {
		warn!("IPv4 datagram smaller than its length field");
		return Err(());
	}

	buf.truncate(payload_len);

	Ok(Parsed {
		src: IpAddr::V4(header.src),
		dst: IpAddr::V4(header.dst),
		protocol: header.proto.get(),
	})
}

/// Serialise an IPv4 header into `buf`, then call `f` to write the payload, then backfill the
/// header's length and checksum fields.
pub fn write(buf: Cursor, src: Ipv4Addr, dst: Ipv4Addr, protocol: Protocol, tos: ToS, ttl: u8, f: impl FnOnce(Cursor)) {
	let (header, mut buf): (&mut Header, _) = buf.split();

	header.ver = Meta::new(u4::new(5), Version::V4);
	header.tos = tos;

	header.ttl = ttl;
	header.proto = protocol.into();

	header.src = src;
	header.dst = dst;

	header.frg = Fragment::new(u13::new(0), false, true, 0).into();
	header.csm = [0, 0];

	f(buf.fork());

	header.len = ((size_of::<Header>() + buf.pivot()) as u16).into();
	header.csm = Checksum::of(bytes::as_slice(header)).end();
}

#[bitsize(8)]
#[derive(FromBits, Cast)]
#[repr(C)]
struct Meta {
	ihl: u4,
	ver: Version,
}

#[bitsize(32)]
#[derive(FromBits)]
struct Fragment {
	ofst: u13,
	more: bool,
	dont: bool,
	reserved: bool,
	idnt: u16,
}

#[derive(Cast)]
#[repr(C)]
struct Header {
	ver: Meta,
	tos: ToS,
	len: u16be,
	frg: b<Fragment>,
	ttl: u8,
	proto: b<Protocol>,
	csm: [u8; 2],
	src: Ipv4Addr,
	dst: Ipv4Addr,
}

const _: () = assert!(size_of::<Header>() == 20);

#[cfg(test)]
mod tests {
	use core::mem::size_of;

	use collections::bytes::Bytes;

	use super::*;

	#[test]
	fn round_trip() {
		let mut vec = vec![0u8; 64];

		Cursor::vec(&mut vec, |buf| {
			write(buf, Ipv4Addr::new(127, 0, 0, 1), Ipv4Addr::new(127, 0, 0, 2), Protocol::Pgm, ToS::default(), 16, |mut buf| {
				buf.push(b"hello".as_slice());
			});
		});

		assert_eq!(vec.len(), size_of::<Header>() + 5);

		let mut bytes = Bytes::new(vec.len());
		bytes.copy_from_slice(&vec);

		let slice = bytes.slice(..);
		let parsed = parse(&slice).unwrap();

		assert_eq!(parsed.src, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
		assert_eq!(parsed.dst, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)));
		assert_eq!(parsed.protocol, Protocol::Pgm);
		assert_eq!(&*slice, b"hello");
	}
}
