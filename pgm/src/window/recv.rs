use crate::skb::Skb;
use crate::sqn::Sqn;

/// A single receive-window slot's place in the per-sqn NAK state machine (§3/§4.4).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SlotState {
	Empty,
	Missing,
	WaitNcf,
	WaitData,
	HaveData,
	/// Exhausted its retry budget; permanently unrecoverable. Distinct from `Empty` so `read` can
	/// skip the hole instead of blocking on it forever.
	Lost,
}

/// APDU-reassembly metadata carried alongside a fragment's payload.
#[derive(Clone, Copy)]
struct FragmentMeta {
	first_sqn: Sqn,
	total_length: u32,
}

struct Slot {
	state: SlotState,
	skb: Option<Skb>,
	fragment: Option<FragmentMeta>,
	ncf_retries: u32,
	data_retries: u32,
}

impl Slot {
	fn empty() -> Self {
		Self { state: SlotState::Empty, skb: None, fragment: None, ncf_retries: 0, data_retries: 0 }
	}

	fn missing() -> Self {
		Self { state: SlotState::Missing, ..Self::empty() }
	}

	fn have_data(skb: Skb, fragment: Option<FragmentMeta>) -> Self {
		Self { state: SlotState::HaveData, skb: Some(skb), fragment, ncf_retries: 0, data_retries: 0 }
	}
}

/// The outcome of inserting a packet into the window, matching the four cases of §4.4's `add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
	Duplicate,
	Filled,
	Appended,
}

/// The outcome of a NAK-state timer event firing for a single sqn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NakOutcome {
	/// The timer no longer applies; the slot has since moved to a different state.
	Stale,
	Retry,
	Exhausted,
}

/// Fragment metadata to associate with a newly-arrived payload, mirroring `wire::options::Fragment`
/// without depending on the wire module directly.
#[derive(Clone, Copy)]
pub struct Fragment {
	pub first_sqn: Sqn,
	pub total_length: u32,
}

/// Per-peer reliable receive state: a sliding window of slots in the NAK state machine, plus
/// in-progress APDU reassembly.
pub struct RecvWindow {
	capacity: u32,
	trail: Sqn,
	commit_lead: Sqn,
	lead: Sqn,
	slots: Vec<Slot>,
	reassembly: Option<Reassembly>,
}

struct Reassembly {
	first_sqn: Sqn,
	total_length: u32,
	buf: Vec<u8>,
}

impl RecvWindow {
	/// Create a window for a freshly-seen peer, with `trail == commit_lead == lead` at the sqn of
	/// the peer's first observed packet.
	pub fn new(capacity: u32, initial_sqn: Sqn) -> Self {
		Self {
			capacity,
			trail: initial_sqn,
			commit_lead: initial_sqn,
			lead: initial_sqn,
			slots: (0..capacity).map(|_| Slot::empty()).collect(),
			reassembly: None,
		}
	}

	pub fn trail(&self) -> Sqn {
		self.trail
	}

	pub fn lead(&self) -> Sqn {
		self.lead
	}

	pub fn commit_lead(&self) -> Sqn {
		self.commit_lead
	}

	fn index(&self, sqn: Sqn) -> usize {
		(sqn.get() as usize) % (self.capacity as usize)
	}

	fn slot(&self, sqn: Sqn) -> &Slot {
		&self.slots[self.index(sqn)]
	}

	fn slot_mut(&mut self, sqn: Sqn) -> &mut Slot {
		let idx = self.index(sqn);
		&mut self.slots[idx]
	}

	/// Reactively advance `trail` to the source's advertised `txw_trail`, reporting any slots that
	/// were crossed while still unresolved.
	pub fn advance_trail(&mut self, new_trail: Sqn) -> Vec<Sqn> {
		let mut lost = Vec::new();

		while self.trail < new_trail {
			let trail = self.trail;
			let idx = self.index(trail);

			if matches!(self.slots[idx].state, SlotState::Missing | SlotState::WaitNcf | SlotState::WaitData) {
				lost.push(trail);
			}

			self.slots[idx] = Slot::empty();
			self.trail = trail + 1;
		}

		if self.commit_lead < self.trail {
			self.commit_lead = self.trail;
		}

		lost
	}

	fn window_size(&self) -> u32 {
		self.trail.distance(self.lead)
	}

	/// Insert a received ODATA/RDATA payload. `txw_trail` is the source's currently-advertised
	/// trailing edge, piggy-backed on every data packet and SPM. Returns the outcome, the sqns that
	/// newly became `MISSING` as a result (for the caller to schedule NAK back-off on), and the
	/// sqns that were permanently lost by a trail advance crossing an unresolved slot.
	pub fn add(&mut self, skb: Skb, sqn: Sqn, txw_trail: Sqn, fragment: Option<Fragment>) -> (AddOutcome, Vec<Sqn>, Vec<Sqn>) {
		let mut lost = self.advance_trail(txw_trail);

		if sqn < self.commit_lead {
			return (AddOutcome::Duplicate, Vec::new(), lost);
		}

		let fragment = fragment.map(|f| FragmentMeta { first_sqn: f.first_sqn, total_length: f.total_length });

		if sqn <= self.lead {
			if self.slot(sqn).state == SlotState::HaveData {
				return (AddOutcome::Duplicate, Vec::new(), lost);
			}

			*self.slot_mut(sqn) = Slot::have_data(skb, fragment);
			return (AddOutcome::Filled, Vec::new(), lost);
		}

		let mut cursor = self.lead + 1;
		let mut newly_missing = Vec::new();

		while cursor < sqn {
			*self.slot_mut(cursor) = Slot::missing();
			newly_missing.push(cursor);
			cursor = cursor + 1;
		}

		*self.slot_mut(sqn) = Slot::have_data(skb, fragment);
		self.lead = sqn;

		while self.window_size() >= self.capacity {
			let trail = self.trail;
			let idx = self.index(trail);

			if matches!(self.slots[idx].state, SlotState::Missing | SlotState::WaitNcf | SlotState::WaitData) {
				lost.push(trail);
				newly_missing.retain(|&s| s != trail);
			}

			self.slots[idx] = Slot::empty();
			self.trail = trail + 1;
		}

		if self.commit_lead < self.trail {
			self.commit_lead = self.trail;
		}

		(AddOutcome::Appended, newly_missing, lost)
	}

	/// A slot's back-off timer expired with no NAK sent yet; transmit one and move to `WAIT_NCF`.
	/// Returns `true` if a NAK should actually be sent (the slot was still `MISSING`).
	pub fn nak_backoff_expired(&mut self, sqn: Sqn) -> bool {
		let slot = self.slot_mut(sqn);

		if slot.state == SlotState::Missing {
			slot.state = SlotState::WaitNcf;
			slot.ncf_retries = 0;
			true
		} else {
			false
		}
	}

	/// An NCF arrived confirming the request was heard; start waiting for the repair data.
	pub fn ncf_received(&mut self, sqn: Sqn) -> bool {
		let slot = self.slot_mut(sqn);

		if slot.state == SlotState::WaitNcf {
			slot.state = SlotState::WaitData;
			slot.data_retries = 0;
			true
		} else {
			false
		}
	}

	/// `WAIT_NCF` deadline fired with no NCF seen. Retransmits the NAK up to `max_retries` times,
	/// then marks the slot permanently lost.
	pub fn ncf_timeout(&mut self, sqn: Sqn, max_retries: u32) -> NakOutcome {
		let slot = self.slot_mut(sqn);

		if slot.state != SlotState::WaitNcf {
			return NakOutcome::Stale;
		}

		if slot.ncf_retries < max_retries {
			slot.ncf_retries += 1;
			NakOutcome::Retry
		} else {
			slot.state = SlotState::Lost;
			NakOutcome::Exhausted
		}
	}

	/// `WAIT_DATA` deadline fired with no RDATA seen. Restarts back-off up to `max_retries` times,
	/// then marks the slot permanently lost.
	pub fn data_timeout(&mut self, sqn: Sqn, max_retries: u32) -> NakOutcome {
		let slot = self.slot_mut(sqn);

		if slot.state != SlotState::WaitData {
			return NakOutcome::Stale;
		}

		if slot.data_retries < max_retries {
			slot.data_retries += 1;
			slot.state = SlotState::Missing;
			NakOutcome::Retry
		} else {
			slot.state = SlotState::Lost;
			NakOutcome::Exhausted
		}
	}

	/// Drain contiguous deliverable payloads starting at `commit_lead` into `output`, advancing
	/// `commit_lead` past whatever was delivered (or permanently skipped due to loss). Stops at the
	/// first slot that is neither resolved (`HAVE_DATA`) nor permanently lost, to preserve in-order
	/// delivery. Returns the number of bytes appended to `output`.
	pub fn read(&mut self, output: &mut Vec<u8>) -> usize {
		let mut written = 0;

		while self.commit_lead <= self.lead {
			let sqn = self.commit_lead;
			let idx = self.index(sqn);

			match self.slots[idx].state {
				SlotState::HaveData => {
					let fragment = self.slots[idx].fragment;
					let skb = self.slots[idx].skb.take().expect("HAVE_DATA slot always holds an skb");

					match fragment {
						None => {
							written += skb.with_slice(|s| {
								output.extend_from_slice(s);
								s.len()
							});
						}
						Some(meta) => {
							written += self.accumulate_fragment(meta, &skb, output);
						}
					}

					self.slots[idx] = Slot::empty();
					self.commit_lead = sqn + 1;
				}
				SlotState::Lost => {
					// An unresolvable gap: abandon any in-flight APDU that spanned it and skip
					// past the hole so later, fully-received data can still be delivered in order.
					self.reassembly = None;
					self.slots[idx] = Slot::empty();
					self.commit_lead = sqn + 1;
				}
				_ => break,
			}
		}

		written
	}

	fn accumulate_fragment(&mut self, meta: FragmentMeta, skb: &Skb, output: &mut Vec<u8>) -> usize {
		let reassembly = self.reassembly.get_or_insert_with(|| Reassembly { first_sqn: meta.first_sqn, total_length: meta.total_length, buf: Vec::new() });

		if reassembly.first_sqn != meta.first_sqn {
			// A new APDU started; the previous one never completed (its tail must have been lost).
			*reassembly = Reassembly { first_sqn: meta.first_sqn, total_length: meta.total_length, buf: Vec::new() };
		}

		skb.with_slice(|s| reassembly.buf.extend_from_slice(s));

		if reassembly.buf.len() as u32 >= reassembly.total_length {
			let reassembly = self.reassembly.take().expect("just inserted above");
			output.extend_from_slice(&reassembly.buf);
			reassembly.buf.len()
		} else {
			0
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn skb(payload: &[u8]) -> Skb {
		Skb::from_bytes(payload)
	}

	#[test]
	fn in_order_delivery_advances_commit_lead() {
		let mut window = RecvWindow::new(8, Sqn::new(0));

		let (outcome, newly_missing, lost) = window.add(skb(b"a"), Sqn::new(0), Sqn::new(0), None);
		assert_eq!(outcome, AddOutcome::Filled);
		assert!(newly_missing.is_empty());
		assert!(lost.is_empty());

		let (outcome, _, _) = window.add(skb(b"b"), Sqn::new(1), Sqn::new(0), None);
		assert_eq!(outcome, AddOutcome::Appended);

		let mut out = Vec::new();
		window.read(&mut out);
		assert_eq!(out, b"ab");
		assert_eq!(window.commit_lead(), Sqn::new(2));
	}

	#[test]
	fn gap_then_repair_fills_out_of_order() {
		let mut window = RecvWindow::new(8, Sqn::new(0));

		let (outcome, newly_missing, _) = window.add(skb(b"c"), Sqn::new(2), Sqn::new(0), None);
		assert_eq!(outcome, AddOutcome::Appended);
		assert_eq!(newly_missing, vec![Sqn::new(0), Sqn::new(1)]);

		let mut out = Vec::new();
		assert_eq!(window.read(&mut out), 0);

		window.add(skb(b"a"), Sqn::new(0), Sqn::new(0), None);
		window.add(skb(b"b"), Sqn::new(1), Sqn::new(0), None);

		window.read(&mut out);
		assert_eq!(out, b"abc");
	}

	#[test]
	fn nak_state_machine_walks_missing_to_wait_data() {
		let mut window = RecvWindow::new(8, Sqn::new(0));
		window.add(skb(b"z"), Sqn::new(3), Sqn::new(0), None);

		let sqn = Sqn::new(0);
		assert!(window.nak_backoff_expired(sqn));
		assert!(!window.nak_backoff_expired(sqn));

		assert!(window.ncf_received(sqn));
		assert_eq!(window.ncf_timeout(sqn, 2), NakOutcome::Stale);
	}

	#[test]
	fn exhausting_ncf_retries_marks_slot_permanently_lost() {
		let mut window = RecvWindow::new(8, Sqn::new(0));
		window.add(skb(b"z"), Sqn::new(1), Sqn::new(0), None);

		let sqn = Sqn::new(0);
		window.nak_backoff_expired(sqn);

		assert_eq!(window.ncf_timeout(sqn, 1), NakOutcome::Retry);
		assert_eq!(window.ncf_timeout(sqn, 1), NakOutcome::Exhausted);

		let mut out = Vec::new();
		window.read(&mut out);
		assert!(out.is_empty());
		assert_eq!(window.commit_lead(), Sqn::new(2));
	}

	#[test]
	fn exhausting_data_retries_marks_slot_permanently_lost() {
		let mut window = RecvWindow::new(8, Sqn::new(0));
		window.add(skb(b"z"), Sqn::new(1), Sqn::new(0), None);

		let sqn = Sqn::new(0);
		window.nak_backoff_expired(sqn);
		window.ncf_received(sqn);

		assert_eq!(window.data_timeout(sqn, 1), NakOutcome::Retry);
		window.nak_backoff_expired(sqn);
		window.ncf_received(sqn);
		assert_eq!(window.data_timeout(sqn, 1), NakOutcome::Exhausted);

		let mut out = Vec::new();
		window.read(&mut out);
		assert!(out.is_empty());
		assert_eq!(window.commit_lead(), Sqn::new(2));
	}

	#[test]
	fn overflow_evicts_oldest_and_advances_trail() {
		let mut window = RecvWindow::new(4, Sqn::new(0));

		for i in 0..6u32 {
			window.add(skb(&[i as u8]), Sqn::new(i), Sqn::new(0), None);
		}

		assert!(window.trail() > Sqn::new(0));
		assert_eq!(window.lead(), Sqn::new(5));
	}

	#[test]
	fn fragmented_apdu_is_reassembled_once_complete() {
		let mut window = RecvWindow::new(8, Sqn::new(0));
		let fragment = Fragment { first_sqn: Sqn::new(0), total_length: 6 };

		window.add(skb(b"foo"), Sqn::new(0), Sqn::new(0), Some(fragment));
		window.add(skb(b"bar"), Sqn::new(1), Sqn::new(0), Some(fragment));

		let mut out = Vec::new();
		window.read(&mut out);
		assert_eq!(out, b"foobar");
	}
}
