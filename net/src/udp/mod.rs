use core::mem::size_of;
use core::net::IpAddr;

use collections::bytes::{Cursor, Slice};
use log::warn;
use utils::bytes::{self, Cast};
use utils::endian::u16be;

use crate::ip::Checksum;

/// The source and destination ports recovered from a UDP datagram, with the header consumed
/// from the buffer.
pub struct Parsed {
	pub src_port: u16,
	pub dst_port: u16,
}

#[derive(Cast)]
#[repr(C)]
struct Header {
	src: u16be,
	dst: u16be,
	len: u16be,
	csum: [u8; 2],
}

const _: () = assert!(size_of::<Header>() == 8);

/// Parse and validate a UDP header at the front of `buf`, given the IP-layer source and
/// destination addresses the datagram arrived with (needed for the pseudo-header checksum).
///
/// Per RFC 768 a zero transmitted checksum means "no checksum computed" and is accepted for
/// IPv4; RFC 2460 §8.1 makes the checksum mandatory for IPv6, so a zero checksum over IPv6 is
/// rejected.
pub fn parse(buf: &Slice, src: IpAddr, dst: IpAddr) -> Result<Parsed, ()> {
	if buf.len() < size_of::<Header>() {
		warn!("UDP header too short (got {} bytes)", buf.len());
		return Err(());
	}

	let len: u16 = buf.len().try_into().map_err(|_| warn!("UDP packet too big ({} bytes)", buf.len()))?;

	if dst.is_ipv6() || bytes::cast::<Header, _>(&**buf).csum != [0, 0] {
		let mut csum = pseudo_checksum(src, dst, len);
		csum.push(&*buf);

		if csum.end() != [0, 0] {
			warn!("UDP datagram has invalid checksum");
			return Err(());
		}
	}

	let header: &Header = buf.split();

	if header.len.get() != len {
		warn!("UDP header length ({}) does not match actual datagram length ({len})", header.len.get());
		return Err(());
	}

	Ok(Parsed { src_port: header.src.get(), dst_port: header.dst.get() })
}

/// Serialise a UDP header into `buf`, then call `f` to write the payload, then backfill the
/// header's length and pseudo-header checksum.
pub fn write(buf: Cursor, src: IpAddr, dst: IpAddr, src_port: u16, dst_port: u16, f: impl FnOnce(Cursor)) {
	let (header, mut buf): (&mut Header, _) = buf.split();

	header.src = src_port.into();
	header.dst = dst_port.into();
	header.csum = [0, 0];

	f(buf.fork());

	let pivot = buf.pivot();
	let len: u16 = (size_of::<Header>() + pivot).try_into().unwrap_or(u16::MAX);

	bytes::cast_mut::<Header, _>(&mut *buf).len = len.into();

	let mut csum = pseudo_checksum(src, dst, len);
	csum.push(bytes::as_slice(bytes::cast::<Header, _>(&*buf)));
	csum.push(&buf[..pivot]);

	bytes::cast_mut::<Header, _>(&mut *buf).csum = csum.end_nonzero();
}

/// Build the IP pseudo-header checksum seed for UDP, covering the source/destination
/// addresses, the UDP length, and the protocol number, per RFC 768 (IPv4) / RFC 2460 §8.1
/// (IPv6).
fn pseudo_checksum(src: IpAddr, dst: IpAddr, udp_len: u16) -> Checksum {
	let mut csum = Checksum::default();

	match (src, dst) {
		(IpAddr::V4(src), IpAddr::V4(dst)) => {
			csum.push(&src.octets());
			csum.push(&dst.octets());
			csum.push(&[0, 17]);
		}
		(IpAddr::V6(src), IpAddr::V6(dst)) => {
			csum.push(&src.octets());
			csum.push(&dst.octets());
			csum.push(&(udp_len as u32).to_be_bytes());
			csum.push(&[0, 0, 0, 17]);
		}
		_ => unreachable!("mismatched IP address families for a single datagram"),
	}

	csum.push(&udp_len.to_be_bytes());
	csum
}

#[cfg(test)]
mod tests {
	use core::net::Ipv4Addr;

	use collections::bytes::Bytes;

	use super::*;

	#[test]
	fn round_trip() {
		let src = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
		let dst = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2));

		let mut vec = vec![0u8; 64];

		Cursor::vec(&mut vec, |buf| {
			write(buf, src, dst, 1234, 4321, |mut buf| {
				buf.push(b"hello".as_slice());
			});
		});

		assert_eq!(vec.len(), size_of::<Header>() + 5);

		let mut bytes = Bytes::new(vec.len());
		bytes.copy_from_slice(&vec);

		let slice = bytes.slice(..);
		let parsed = parse(&slice, src, dst).unwrap();

		assert_eq!(parsed.src_port, 1234);
		assert_eq!(parsed.dst_port, 4321);
		assert_eq!(&*slice, b"hello");
	}
}
