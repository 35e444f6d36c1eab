use log::warn;

use crate::error::Error;
use crate::sqn::Sqn;

use super::options::{self, Fragment, Option};

/// The decoded body of an ODATA/RDATA packet: the data's own sequence number, the source's
/// current trailing-edge sequence number (piggy-backed so receivers can advance their window
/// without waiting on a separate SPM), and fragment-reassembly metadata if the TSDU is part of a
/// larger APDU.
#[derive(Debug, Clone, Copy)]
pub struct Data {
	pub sqn: Sqn,
	pub trail: Sqn,
	pub fragment: core::option::Option<Fragment>,
	/// Byte offset, from the start of the body (i.e. from just past the common header), at which
	/// the TSDU payload begins.
	pub payload_offset: usize,
}

const FIXED_LEN: usize = 8;

pub fn parse(buf: &[u8], options_present: bool) -> Result<Data, Error> {
	if buf.len() < FIXED_LEN {
		warn!("data packet truncated: got {} bytes", buf.len());
		return Err(Error::PacketLength);
	}

	let sqn = Sqn::new(u32::from_be_bytes(buf[0..4].try_into().expect("checked length")));
	let trail = Sqn::new(u32::from_be_bytes(buf[4..8].try_into().expect("checked length")));

	let mut fragment = None;
	let mut payload_offset = FIXED_LEN;

	if options_present {
		let (opts, chain_len) = options::parse(&buf[FIXED_LEN..])?;

		for opt in opts {
			if let Option::Fragment(f) = opt {
				fragment = Some(f);
			}
		}

		payload_offset += chain_len;
	}

	Ok(Data { sqn, trail, fragment, payload_offset })
}

/// Serialise an ODATA/RDATA body. The caller appends the TSDU payload immediately after.
pub fn write(out: &mut Vec<u8>, sqn: Sqn, trail: Sqn, fragment: core::option::Option<Fragment>) {
	out.extend_from_slice(&sqn.get().to_be_bytes());
	out.extend_from_slice(&trail.get().to_be_bytes());

	if let Some(fragment) = fragment {
		options::write_fragment(out, &fragment);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_without_fragment() {
		let mut buf = Vec::new();
		write(&mut buf, Sqn::new(5), Sqn::new(1), None);
		buf.extend_from_slice(b"payload");

		let data = parse(&buf, false).unwrap();
		assert_eq!(data.sqn.get(), 5);
		assert_eq!(data.trail.get(), 1);
		assert!(data.fragment.is_none());
		assert_eq!(&buf[data.payload_offset..], b"payload");
	}

	#[test]
	fn round_trips_with_fragment_option() {
		let fragment = Fragment { first_sqn: 5, offset: 1400, total_length: 4200 };

		let mut buf = Vec::new();
		write(&mut buf, Sqn::new(6), Sqn::new(1), Some(fragment));
		buf.extend_from_slice(b"mid");

		let data = parse(&buf, true).unwrap();
		assert_eq!(data.fragment, Some(fragment));
		assert_eq!(&buf[data.payload_offset..], b"mid");
	}

	#[test]
	fn truncated_body_is_rejected() {
		assert_eq!(parse(&[0, 0, 0, 1], false), Err(Error::PacketLength));
	}
}
