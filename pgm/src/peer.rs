use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::net::IpAddr;
use std::time::Instant;

use ahash::AHasher;

use crate::sqn::Sqn;
use crate::tsi::Tsi;
use crate::window::RecvWindow;

/// Per-source state, created the first time a packet from a given TSI is observed.
pub struct Peer {
	pub recv_window: RecvWindow,
	pub nla: IpAddr,
	pub last_heard: Instant,
}

impl Peer {
	fn new(nla: IpAddr, rxw_sqns: u32, first_sqn: Sqn, now: Instant) -> Self {
		Self { recv_window: RecvWindow::new(rxw_sqns, first_sqn), nla, last_heard: now }
	}
}

/// The set of known peers, keyed by TSI. Grounded in the teacher's use of `ahash` for its
/// peer/port tables (`collections::map`), simplified here to a plain growable
/// `std::collections::HashMap`: PGM's peer cardinality isn't known at compile time the way the
/// teacher's fixed single-tunnel-peer slot is.
#[derive(Default)]
pub struct PeerTable {
	peers: HashMap<Tsi, Peer, BuildHasherDefault<AHasher>>,
}

impl PeerTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, tsi: &Tsi) -> Option<&Peer> {
		self.peers.get(tsi)
	}

	pub fn get_mut(&mut self, tsi: &Tsi) -> Option<&mut Peer> {
		self.peers.get_mut(tsi)
	}

	/// Look up a peer by TSI, creating a fresh one (with no loss history) if this is the first
	/// packet seen from it.
	pub fn lookup_or_create(&mut self, tsi: Tsi, nla: IpAddr, rxw_sqns: u32, first_sqn: Sqn, now: Instant) -> &mut Peer {
		match self.peers.entry(tsi) {
			Entry::Occupied(entry) => entry.into_mut(),
			Entry::Vacant(entry) => entry.insert(Peer::new(nla, rxw_sqns, first_sqn, now)),
		}
	}

	/// Remove peers that haven't been heard from in longer than `expiry`. A later packet from a
	/// removed TSI simply creates a new peer from scratch.
	pub fn expire(&mut self, now: Instant, expiry: std::time::Duration) -> Vec<Tsi> {
		let mut expired = Vec::new();

		self.peers.retain(|tsi, peer| {
			let alive = now.saturating_duration_since(peer.last_heard) < expiry;

			if !alive {
				expired.push(*tsi);
			}

			alive
		});

		expired
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Tsi, &mut Peer)> {
		self.peers.iter_mut()
	}

	pub fn len(&self) -> usize {
		self.peers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.peers.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use core::net::Ipv4Addr;
	use std::time::Duration;

	use super::*;

	fn addr() -> IpAddr {
		IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
	}

	#[test]
	fn lookup_or_create_reuses_existing_peer() {
		let mut table = PeerTable::new();
		let tsi = Tsi::new([1, 2, 3, 4, 5, 6], 1000);
		let now = Instant::now();

		table.lookup_or_create(tsi, addr(), 16, Sqn::new(0), now);
		table.get_mut(&tsi).unwrap().recv_window.add(crate::skb::Skb::from_bytes(b"x"), Sqn::new(5), Sqn::new(0), None);

		assert_eq!(table.lookup_or_create(tsi, addr(), 16, Sqn::new(0), now).recv_window.lead(), Sqn::new(5));
		assert_eq!(table.len(), 1);
	}

	#[test]
	fn expire_drops_idle_peers_and_resets_their_history() {
		let mut table = PeerTable::new();
		let tsi = Tsi::new([1, 2, 3, 4, 5, 6], 1000);
		let now = Instant::now();

		table.lookup_or_create(tsi, addr(), 16, Sqn::new(9), now);

		let later = now + Duration::from_secs(600);
		let expired = table.expire(later, Duration::from_secs(300));

		assert_eq!(expired, vec![tsi]);
		assert!(table.get(&tsi).is_none());

		let fresh = table.lookup_or_create(tsi, addr(), 16, Sqn::new(0), later);
		assert_eq!(fresh.recv_window.trail(), Sqn::new(0));
	}
}
