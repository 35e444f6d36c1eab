use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use crate::sqn::Sqn;
use crate::tsi::Tsi;

/// Side-band fields set by the wire codec and consumed by the receive/transmit windows; opaque
/// to I/O.
#[derive(Clone, Default)]
pub struct Meta {
	pub tsi: Option<Tsi>,
	pub sqn: Option<Sqn>,
	pub arrived: Option<Instant>,
}

/// An owning, reference-counted packet buffer with head/data/tail/end cursors, in the spirit of
/// `collections::bytes::Slice`'s shared-allocation/independent-cursor design, but built on a
/// plain `Rc<RefCell<Vec<u8>>>` rather than a hand-written reference-counted allocator: the
/// transport is explicitly single-threaded (see the concurrency model), so the extra unsafety of
/// a custom allocator buys nothing here. `clone` shares the backing storage and gives the clone
/// its own cursors (`retain`); dropping the last reference frees the allocation (`release`).
#[derive(Clone)]
pub struct Skb {
	storage: Rc<RefCell<Vec<u8>>>,
	head: usize,
	data: usize,
	tail: usize,
	end: usize,

	pub meta: Meta,
}

impl Skb {
	/// Allocate a new buffer of `capacity` bytes, with `head == data == tail` at the start of the
	/// allocation.
	pub fn allocate(capacity: usize) -> Self {
		Self {
			storage: Rc::new(RefCell::new(vec![0; capacity])),
			head: 0,
			data: 0,
			tail: 0,
			end: capacity,
			meta: Meta::default(),
		}
	}

	/// Allocate a buffer already holding a copy of `data`, with `data == head` and `tail` at the
	/// end of the copied bytes.
	pub fn from_bytes(data: &[u8]) -> Self {
		let mut skb = Self::allocate(data.len());
		skb.storage.borrow_mut()[..data.len()].copy_from_slice(data);
		skb.tail = data.len();
		skb
	}

	pub fn len(&self) -> usize {
		self.tail - self.data
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn with_slice<X>(&self, f: impl FnOnce(&[u8]) -> X) -> X {
		let storage = self.storage.borrow();
		f(&storage[self.data..self.tail])
	}

	pub fn with_slice_mut<X>(&mut self, f: impl FnOnce(&mut [u8]) -> X) -> X {
		let mut storage = self.storage.borrow_mut();
		f(&mut storage[self.data..self.tail])
	}

	pub fn to_vec(&self) -> Vec<u8> {
		self.with_slice(|s| s.to_vec())
	}

	/// Advance `data`, exposing previously-pulled headroom to hold a header written on top of an
	/// already-framed payload. Fails if `n` would run past `head`.
	pub fn push(&mut self, n: usize) -> Result<(), ()> {
		if n > self.data - self.head {
			return Err(());
		}

		self.data -= n;
		Ok(())
	}

	/// Advance `data` by `n` bytes, consuming a parsed header.
	pub fn pull(&mut self, n: usize) -> Result<(), ()> {
		if self.data + n > self.tail {
			return Err(());
		}

		self.data += n;
		Ok(())
	}

	/// Extend `tail` by `n` bytes, exposing previously-reserved trailing capacity.
	pub fn put(&mut self, n: usize) -> Result<(), ()> {
		if self.tail + n > self.end {
			return Err(());
		}

		self.tail += n;
		Ok(())
	}

	/// Shrink `tail` by `n` bytes, discarding trailing data.
	pub fn trim(&mut self, n: usize) -> Result<(), ()> {
		if n > self.tail - self.data {
			return Err(());
		}

		self.tail -= n;
		Ok(())
	}

	/// Reserve `n` bytes of headroom ahead of `data`, so a header can later be `push`ed into it
	/// without reallocating.
	pub fn reserve(&mut self, n: usize) -> Result<(), ()> {
		if self.data + n > self.end {
			return Err(());
		}

		self.data += n;
		self.tail += n;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pull_and_push_are_inverse_cursor_moves() {
		let mut skb = Skb::from_bytes(b"header+payload");

		skb.pull(7).unwrap();
		assert_eq!(skb.with_slice(|s| s.to_vec()), b"payload");

		skb.push(7).unwrap();
		assert_eq!(skb.with_slice(|s| s.to_vec()), b"header+payload");
	}

	#[test]
	fn pull_past_tail_fails_without_corrupting_state() {
		let mut skb = Skb::from_bytes(b"short");
		assert!(skb.pull(100).is_err());
		assert_eq!(skb.len(), 5);
	}

	#[test]
	fn clone_shares_storage_but_not_cursors() {
		let mut skb = Skb::from_bytes(b"hello world");
		let clone = skb.clone();

		skb.pull(6).unwrap();

		assert_eq!(skb.with_slice(|s| s.to_vec()), b"world");
		assert_eq!(clone.with_slice(|s| s.to_vec()), b"hello world");
	}
}
