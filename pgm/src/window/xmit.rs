use crate::skb::Skb;
use crate::sqn::Sqn;

/// A ring of previously-transmitted frames, kept around so a peer's RDATA request can be served
/// without re-framing the payload.
pub struct XmitWindow {
	capacity: u32,
	trail: Sqn,
	lead: Sqn,
	next: Sqn,
	slots: Vec<Option<(Sqn, Skb)>>,
}

impl XmitWindow {
	pub fn new(capacity: u32) -> Self {
		Self { capacity, trail: Sqn::ZERO, lead: Sqn::ZERO, next: Sqn::ZERO, slots: (0..capacity).map(|_| None).collect() }
	}

	pub fn trail(&self) -> Sqn {
		self.trail
	}

	pub fn lead(&self) -> Sqn {
		self.lead
	}

	/// The sqn that the next [`push`](Self::push) will assign, without assigning it. Lets a caller
	/// frame the wire header (which embeds the sqn) before the frame is actually stored.
	pub fn peek_next_sqn(&self) -> Sqn {
		self.next
	}

	fn index(&self, sqn: Sqn) -> usize {
		(sqn.get() as usize) % (self.capacity as usize)
	}

	/// Assign the next sqn to `skb`, store it, and advance `lead`. On overflow the oldest stored
	/// frame is dropped and `trail` advances past it, so the source's next SPM advertises that the
	/// data is no longer recoverable.
	pub fn push(&mut self, skb: Skb) -> Sqn {
		let sqn = self.next;
		self.next = self.next + 1;

		let idx = self.index(sqn);

		if self.slots[idx].is_some() {
			self.trail = self.trail + 1;
		}

		self.slots[idx] = Some((sqn, skb));
		self.lead = sqn;
		sqn
	}

	/// Serve an RDATA request: the stored frame for `sqn`, or `None` if it has already aged out of
	/// the window.
	pub fn retrieve(&self, sqn: Sqn) -> Option<&Skb> {
		if sqn < self.trail || sqn > self.lead {
			return None;
		}

		let idx = self.index(sqn);

		match &self.slots[idx] {
			Some((stored_sqn, skb)) if *stored_sqn == sqn => Some(skb),
			_ => None,
		}
	}

	/// Release frames older than `new_trail`, as advertised by an outgoing SPM's trailing edge.
	pub fn advance_trail(&mut self, new_trail: Sqn) {
		while self.trail < new_trail && self.trail <= self.lead {
			let idx = self.index(self.trail);
			self.slots[idx] = None;
			self.trail = self.trail + 1;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn push_then_retrieve_round_trips() {
		let mut window = XmitWindow::new(4);
		let sqn = window.push(Skb::from_bytes(b"hello"));

		let stored = window.retrieve(sqn).unwrap();
		assert_eq!(stored.to_vec(), b"hello");
	}

	#[test]
	fn overflow_drops_oldest_and_advances_trail() {
		let mut window = XmitWindow::new(2);

		let first = window.push(Skb::from_bytes(b"a"));
		window.push(Skb::from_bytes(b"b"));
		window.push(Skb::from_bytes(b"c"));

		assert!(window.retrieve(first).is_none());
		assert_eq!(window.trail(), Sqn::new(1));
	}

	#[test]
	fn advance_trail_releases_old_frames() {
		let mut window = XmitWindow::new(8);
		let sqn = window.push(Skb::from_bytes(b"a"));
		window.push(Skb::from_bytes(b"b"));

		window.advance_trail(sqn + 1);
		assert!(window.retrieve(sqn).is_none());
	}
}
