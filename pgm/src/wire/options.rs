use log::warn;

use crate::error::Error;

const OPT_END: u8 = 0x80;
const OPT_TYPE_MASK: u8 = 0x7F;

const OPT_LENGTH: u8 = 0x00;
const OPT_FRAGMENT: u8 = 0x01;
const OPT_NAK_LIST: u8 = 0x02;

const OPT_LENGTH_SIZE: usize = 4;
const OPT_FRAGMENT_SIZE: usize = 16;

/// APDU reassembly metadata, carried by data packets that are part of a fragmented APDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
	pub first_sqn: u32,
	pub offset: u32,
	pub total_length: u32,
}

/// A single decoded option from a packet's option chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Option {
	Fragment(Fragment),
	NakList(Vec<u32>),
	/// An option type this implementation doesn't interpret; carried through unexamined.
	Unknown(u8),
}

/// Parse and validate an option chain. `buf` begins at the first option (OPT_LENGTH), which
/// states the chain's total byte length; the chain must terminate with an option whose type byte
/// has [`OPT_END`] set. Returns the decoded options and the number of bytes the chain occupies.
pub fn parse(buf: &[u8]) -> Result<(Vec<Option>, usize), Error> {
	if buf.len() < OPT_LENGTH_SIZE {
		warn!("option chain truncated before OPT_LENGTH");
		return Err(Error::PacketOption);
	}

	if buf[0] & OPT_TYPE_MASK != OPT_LENGTH {
		warn!("option chain does not begin with OPT_LENGTH");
		return Err(Error::PacketOption);
	}

	if buf[1] as usize != OPT_LENGTH_SIZE {
		warn!("OPT_LENGTH option has unexpected length {}", buf[1]);
		return Err(Error::PacketOption);
	}

	let total_length = u16::from_be_bytes([buf[2], buf[3]]) as usize;

	if total_length < OPT_LENGTH_SIZE || total_length > buf.len() {
		warn!("option chain total_length {total_length} out of range");
		return Err(Error::PacketOption);
	}

	let mut options = Vec::new();
	let mut pos = OPT_LENGTH_SIZE;
	let mut ended = false;

	while pos < total_length {
		if pos + 2 > total_length {
			warn!("option header truncated at offset {pos}");
			return Err(Error::PacketOption);
		}

		let opt_type = buf[pos];
		let opt_length = buf[pos + 1] as usize;

		if opt_length < 2 {
			warn!("zero-length option at offset {pos}");
			return Err(Error::PacketOption);
		}

		if pos + opt_length > total_length {
			warn!("option at offset {pos} overruns chain");
			return Err(Error::PacketOption);
		}

		let body = &buf[pos + 2..pos + opt_length];

		let option = match opt_type & OPT_TYPE_MASK {
			OPT_FRAGMENT => {
				if opt_length != OPT_FRAGMENT_SIZE {
					warn!("OPT_FRAGMENT has unexpected length {opt_length}");
					return Err(Error::PacketOption);
				}

				Option::Fragment(Fragment {
					first_sqn: u32::from_be_bytes(body[2..6].try_into().expect("checked length")),
					offset: u32::from_be_bytes(body[6..10].try_into().expect("checked length")),
					total_length: u32::from_be_bytes(body[10..14].try_into().expect("checked length")),
				})
			}
			OPT_NAK_LIST => {
				if body.len() % 4 != 0 {
					warn!("OPT_NAK_LIST body not a multiple of 4 bytes");
					return Err(Error::PacketOption);
				}

				Option::NakList(body.chunks_exact(4).map(|c| u32::from_be_bytes(c.try_into().expect("chunks_exact(4)"))).collect())
			}
			other => Option::Unknown(other),
		};

		options.push(option);

		if opt_type & OPT_END != 0 {
			ended = true;
			pos += opt_length;
			break;
		}

		pos += opt_length;
	}

	if !ended {
		warn!("option chain missing OPT_END terminator");
		return Err(Error::PacketOption);
	}

	Ok((options, total_length))
}

/// Append an option chain containing only an [`OPT_FRAGMENT`] option.
pub fn write_fragment(out: &mut Vec<u8>, fragment: &Fragment) {
	let total_length = OPT_LENGTH_SIZE + OPT_FRAGMENT_SIZE;
	write_length(out, total_length as u16);

	out.push(OPT_FRAGMENT | OPT_END);
	out.push(OPT_FRAGMENT_SIZE as u8);
	out.extend_from_slice(&[0, 0]);
	out.extend_from_slice(&fragment.first_sqn.to_be_bytes());
	out.extend_from_slice(&fragment.offset.to_be_bytes());
	out.extend_from_slice(&fragment.total_length.to_be_bytes());
}

/// Append an option chain containing only an [`OPT_NAK_LIST`] option.
pub fn write_nak_list(out: &mut Vec<u8>, sqns: &[u32]) {
	let body_len = sqns.len() * 4;
	let opt_len = 2 + body_len;
	let total_length = OPT_LENGTH_SIZE + opt_len;
	write_length(out, total_length as u16);

	out.push(OPT_NAK_LIST | OPT_END);
	out.push(opt_len as u8);

	for sqn in sqns {
		out.extend_from_slice(&sqn.to_be_bytes());
	}
}

fn write_length(out: &mut Vec<u8>, total_length: u16) {
	out.push(OPT_LENGTH);
	out.push(OPT_LENGTH_SIZE as u8);
	out.extend_from_slice(&total_length.to_be_bytes());
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fragment_round_trips() {
		let fragment = Fragment { first_sqn: 10, offset: 1400, total_length: 5000 };

		let mut buf = Vec::new();
		write_fragment(&mut buf, &fragment);

		let (options, len) = parse(&buf).unwrap();
		assert_eq!(len, buf.len());
		assert_eq!(options, vec![Option::Fragment(fragment)]);
	}

	#[test]
	fn nak_list_round_trips() {
		let sqns = vec![5, 6, 9];

		let mut buf = Vec::new();
		write_nak_list(&mut buf, &sqns);

		let (options, _) = parse(&buf).unwrap();
		assert_eq!(options, vec![Option::NakList(sqns)]);
	}

	#[test]
	fn missing_opt_end_is_rejected() {
		let mut buf = Vec::new();
		write_fragment(&mut buf, &Fragment { first_sqn: 0, offset: 0, total_length: 0 });

		// Clear the OPT_END bit on the single option present.
		buf[4] &= OPT_TYPE_MASK;

		assert_eq!(parse(&buf), Err(Error::PacketOption));
	}

	#[test]
	fn chain_not_starting_with_opt_length_is_rejected() {
		let buf = vec![OPT_FRAGMENT | OPT_END, 4, 0, 0];
		assert_eq!(parse(&buf), Err(Error::PacketOption));
	}
}
