use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Stats};
use crate::peer::PeerTable;
use crate::port::{Clock, DatagramIo, Readiness};
use crate::skb::Skb;
use crate::sqn::Sqn;
use crate::timer::{next_spm_interval, Event, Timers};
use crate::tsi::Tsi;
use crate::window::recv::Fragment as RecvFragment;
use crate::window::XmitWindow;
use crate::wire::options::Fragment as WireFragment;
use crate::wire::{self, Body, Type};

/// `recv_vector`'s report of a peer's TSI and how many sequences were permanently lost since the
/// last report, delivered in place of payload bytes (the `RESET` case in §4.8).
pub struct Reset {
	pub tsi: Tsi,
	pub lost_count: u32,
}

/// One slot of `recv_vector`'s output: either a reassembled application payload, or a loss report
/// for a peer.
pub enum Delivery {
	Payload { tsi: Tsi, bytes: Vec<u8> },
	Reset(Reset),
}

/// The public facade (C8): a single PGM session, sending and/or receiving over one group address.
pub struct Transport<C, D, R> {
	config: Config,
	tsi: Tsi,
	dport: u16,
	group_addr: SocketAddr,
	clock: C,
	io: D,
	readiness: R,
	peers: PeerTable,
	xmit: Option<XmitWindow>,
	timers: Timers,
	stats: Stats,
	closed: bool,
	spm_interval: Duration,
	last_spmr_reply: Option<std::time::Instant>,
}

const COMMON_AND_DATA_LEN: usize = wire::HEADER_LEN + 8;

impl<C: Clock, D: DatagramIo, R: Readiness> Transport<C, D, R> {
	/// Validate `config` and construct a transport. No I/O occurs until [`bind`](Self::bind).
	pub fn create(config: Config, tsi: Tsi, dport: u16, group_addr: SocketAddr, clock: C, io: D, readiness: R) -> Result<Self, Error> {
		config.validate()?;

		Ok(Self {
			xmit: if config.recv_only { None } else { Some(XmitWindow::new(config.txw_sqns)) },
			spm_interval: config.spm_heartbeat_initial,
			config,
			tsi,
			dport,
			group_addr,
			clock,
			io,
			readiness,
			peers: PeerTable::new(),
			timers: Timers::new(),
			stats: Stats::default(),
			closed: false,
			last_spmr_reply: None,
		})
	}

	/// Arm the control-plane timers. Must be called once before the first [`tick`](Self::tick).
	pub fn bind(&mut self) -> Result<(), Error> {
		let now = self.clock.now();

		if self.xmit.is_some() {
			self.timers.schedule_in(now, self.spm_interval, Event::SpmHeartbeat);
		}

		self.timers.schedule_in(now, self.config.peer_expiry, Event::PeerExpiry);
		Ok(())
	}

	pub fn stats(&self) -> Stats {
		self.stats
	}

	/// The deadline the host event loop should sleep until, bounded by both pending timers and
	/// I/O readiness.
	pub fn next_wakeup(&self) -> Option<std::time::Instant> {
		self.timers.next_wakeup()
	}

	pub fn readiness(&self) -> &R {
		&self.readiness
	}

	/// Frame `payload` into one or more ODATA packets (fragmenting if it doesn't fit in a single
	/// `max_tpdu`), register them with the transmit window, and send each immediately. Local
	/// enqueue success only; end-to-end reliability is handled by NAK-driven repair.
	pub fn send(&mut self, payload: &[u8]) -> Result<(), Error> {
		if self.closed {
			return Err(Error::IoClosed);
		}

		let max_payload = (self.config.max_tpdu as usize).saturating_sub(COMMON_AND_DATA_LEN);

		if max_payload == 0 {
			return Err(Error::ConfigInvalid);
		}

		if payload.is_empty() {
			return self.send_frame(payload, None);
		}

		if payload.len() <= max_payload {
			return self.send_frame(payload, None);
		}

		let xmit = self.xmit.as_ref().ok_or(Error::IoClosed)?;
		let first_sqn = xmit.peek_next_sqn();
		let total_length = payload.len() as u32;

		for (i, chunk) in payload.chunks(max_payload).enumerate() {
			let fragment = WireFragment { first_sqn: first_sqn.get(), offset: (i * max_payload) as u32, total_length };
			self.send_frame(chunk, Some(fragment))?;
		}

		Ok(())
	}

	pub fn send_vector(&mut self, payloads: &[&[u8]]) -> Result<(), Error> {
		for payload in payloads {
			self.send(payload)?;
		}

		Ok(())
	}

	fn send_frame(&mut self, payload: &[u8], fragment: Option<WireFragment>) -> Result<(), Error> {
		let xmit = self.xmit.as_mut().ok_or(Error::IoClosed)?;
		let sqn = xmit.peek_next_sqn();
		let trail = xmit.trail();

		let mut buf = Vec::with_capacity(COMMON_AND_DATA_LEN + payload.len());
		wire::write_header(&mut buf, self.tsi, self.dport, Type::Odata, payload.len() as u16, fragment.is_some());
		crate::wire::data::write(&mut buf, sqn, trail, fragment);
		buf.extend_from_slice(payload);
		wire::finalize(&mut buf);

		let assigned = xmit.push(Skb::from_bytes(&buf));
		debug_assert_eq!(assigned, sqn);

		match self.io.try_send_to(&buf, self.group_addr) {
			Ok(Some(_)) | Ok(None) => Ok(()),
			Err(err) => {
				warn!("send failed: {err}");
				Err(Error::IoAgain)
			}
		}
	}

	/// Pull up to `max_iov` available datagrams, process them, and append deliverable payloads (or
	/// loss reports) to `output`. Returns the number of entries appended. An empty result with no
	/// error means `IO_AGAIN`: nothing is available right now.
	pub fn recv_vector(&mut self, output: &mut Vec<Delivery>, max_iov: usize) -> Result<usize, Error> {
		if self.closed {
			return Err(Error::IoClosed);
		}

		let mut buf = vec![0u8; self.config.max_tpdu as usize];
		let mut produced = 0;

		while produced < max_iov {
			match self.io.try_recv_from(&mut buf) {
				Ok(Some((n, src))) => {
					self.process_datagram(&buf[..n], src, output);
					produced = output.len();
				}
				Ok(None) => break,
				Err(err) => {
					warn!("recv failed: {err}");
					return Err(Error::IoAgain);
				}
			}
		}

		Ok(output.len())
	}

	fn process_datagram(&mut self, buf: &[u8], src: SocketAddr, output: &mut Vec<Delivery>) {
		let parse = if self.config.udp_encap_ports.is_some() { wire::parse_udp_encap } else { wire::parse_raw };
		let packet = match parse(buf) {
			Ok(packet) => packet,
			Err(err) => {
				debug!("dropping malformed packet from {src}: {err}");
				self.stats.parse_errors += 1;
				return;
			}
		};

		let tsi = packet.header.tsi;
		let now = self.clock.now();

		match packet.body {
			Body::Spm(spm) => {
				let peer = self.peers.lookup_or_create(tsi, src.ip(), self.config.rxw_sqns, spm.trail, now);
				peer.last_heard = now;
				peer.recv_window.advance_trail(spm.trail);
			}
			Body::Data(data) => {
				let peer = self.peers.lookup_or_create(tsi, src.ip(), self.config.rxw_sqns, data.sqn, now);
				peer.last_heard = now;

				let payload = &buf[packet.payload_offset..];
				let fragment = data.fragment.map(|f| RecvFragment { first_sqn: Sqn::new(f.first_sqn), total_length: f.total_length });

				let (outcome, newly_missing, lost) = peer.recv_window.add(Skb::from_bytes(payload), data.sqn, data.trail, fragment);

				if !lost.is_empty() {
					self.stats.lost += lost.len() as u64;
					self.stats.resets += 1;
					output.push(Delivery::Reset(Reset { tsi, lost_count: lost.len() as u32 }));
				}

				match outcome {
					crate::window::recv::AddOutcome::Duplicate => self.stats.duplicates += 1,
					_ => {
						for sqn in newly_missing {
							self.timers.schedule_in(now, self.config.nak_bo_ivl, Event::NakBackoff { tsi, sqn: sqn.get() });
						}
					}
				}

				let mut bytes = Vec::new();
				peer.recv_window.read(&mut bytes);

				if !bytes.is_empty() {
					output.push(Delivery::Payload { tsi, bytes });
				}
			}
			Body::Ncf(nak) => {
				if let Some(peer) = self.peers.get_mut(&tsi) {
					peer.last_heard = now;

					if peer.recv_window.ncf_received(nak.sqn) {
						self.timers.schedule_in(now, self.config.nak_rdata_ivl, Event::DataTimeout { tsi, sqn: nak.sqn.get() });
					}
				}
			}
			Body::Nak(nak) | Body::Nnak(nak) => {
				// A peer is requesting repair data we may hold in our own transmit window.
				if let Some(xmit) = &self.xmit {
					if let Some(skb) = xmit.retrieve(nak.sqn) {
						let frame = skb.to_vec();

						if let Err(err) = self.io.try_send_to(&frame, src) {
							warn!("RDATA retransmit failed: {err}");
						}
					}
				}
			}
			Body::Spmr(_) => {
				self.maybe_reply_to_spmr(tsi, src, now);
			}
			Body::Poll(_) | Body::Polr(_) => {
				// POLL/POLR participate in the PGMCC/router-assist congestion-control extension,
				// which this implementation doesn't drive; acknowledge receipt only.
				if let Some(peer) = self.peers.get_mut(&tsi) {
					peer.last_heard = now;
				}
			}
		}
	}

	fn maybe_reply_to_spmr(&mut self, _tsi: Tsi, src: SocketAddr, now: std::time::Instant) {
		let Some(xmit) = &self.xmit else { return };

		let rate_limited = self.last_spmr_reply.is_some_and(|t| now.saturating_duration_since(t) < self.config.spmr_expiry);

		if rate_limited {
			return;
		}

		let mut buf = Vec::new();
		wire::write_header(&mut buf, self.tsi, self.dport, Type::Spm, 0, false);

		let spm = crate::wire::spm::Spm { sqn: xmit.lead(), trail: xmit.trail(), lead: xmit.lead(), path_nla: src.ip() };

		crate::wire::spm::write(&mut buf, &spm);
		wire::finalize(&mut buf);

		if let Err(err) = self.io.try_send_to(&buf, src) {
			warn!("SPMR reply failed: {err}");
		} else {
			self.last_spmr_reply = Some(now);
		}
	}

	/// Fire all due control-plane events: SPM heartbeats, NAK back-off/repeat, peer expiry.
	pub fn tick(&mut self, now: std::time::Instant) {
		let due = self.timers.tick(now);

		for event in due {
			self.handle_event(event, now);
		}
	}

	fn handle_event(&mut self, event: Event, now: std::time::Instant) {
		match event {
			Event::SpmHeartbeat => {
				if let Some(xmit) = &self.xmit {
					let mut buf = Vec::new();
					wire::write_header(&mut buf, self.tsi, self.dport, Type::Spm, 0, false);

					let spm = crate::wire::spm::Spm { sqn: xmit.lead(), trail: xmit.trail(), lead: xmit.lead(), path_nla: self.group_addr.ip() };

					crate::wire::spm::write(&mut buf, &spm);
					wire::finalize(&mut buf);

					if let Err(err) = self.io.try_send_to(&buf, self.group_addr) {
						warn!("SPM heartbeat failed: {err}");
					}
				}

				self.spm_interval = next_spm_interval(self.spm_interval, self.config.spm_ambient_interval);
				self.timers.schedule_in(now, self.spm_interval, Event::SpmHeartbeat);
			}
			Event::NakBackoff { tsi, sqn } => {
				if let Some(peer) = self.peers.get_mut(&tsi) {
					let sqn = Sqn::new(sqn);

					if peer.recv_window.nak_backoff_expired(sqn) {
						self.send_nak(tsi, peer.nla, sqn);
						self.timers.schedule_in(now, self.config.nak_rpt_ivl, Event::NcfTimeout { tsi, sqn: sqn.get() });
					}
				}
			}
			Event::NcfTimeout { tsi, sqn } => {
				if let Some(peer) = self.peers.get_mut(&tsi) {
					let sqn = Sqn::new(sqn);

					match peer.recv_window.ncf_timeout(sqn, self.config.nak_ncf_retries) {
						crate::window::recv::NakOutcome::Retry => {
							self.send_nak(tsi, peer.nla, sqn);
							self.timers.schedule_in(now, self.config.nak_rpt_ivl, Event::NcfTimeout { tsi, sqn: sqn.get() });
						}
						crate::window::recv::NakOutcome::Exhausted => self.stats.lost += 1,
						crate::window::recv::NakOutcome::Stale => {}
					}
				}
			}
			Event::DataTimeout { tsi, sqn } => {
				if let Some(peer) = self.peers.get_mut(&tsi) {
					let sqn = Sqn::new(sqn);

					match peer.recv_window.data_timeout(sqn, self.config.nak_data_retries) {
						crate::window::recv::NakOutcome::Retry => {
							self.timers.schedule_in(now, self.config.nak_bo_ivl, Event::NakBackoff { tsi, sqn: sqn.get() });
						}
						crate::window::recv::NakOutcome::Exhausted => self.stats.lost += 1,
						crate::window::recv::NakOutcome::Stale => {}
					}
				}
			}
			Event::PeerExpiry => {
				let expired = self.peers.expire(now, self.config.peer_expiry);

				for tsi in &expired {
					debug!("peer {tsi} expired");
				}

				self.timers.schedule_in(now, self.config.peer_expiry, Event::PeerExpiry);
			}
		}
	}

	fn send_nak(&mut self, tsi: Tsi, peer_nla: std::net::IpAddr, sqn: Sqn) {
		let mut buf = Vec::new();
		wire::write_header(&mut buf, self.tsi, self.dport, Type::Nak, 0, true);

		let nak = crate::wire::nak::Nak { sqn, source_nla: peer_nla, group_nla: self.group_addr.ip(), list: Vec::new() };

		crate::wire::nak::write(&mut buf, &nak);
		wire::finalize(&mut buf);

		if let Err(err) = self.io.try_send_to(&buf, self.group_addr) {
			warn!("NAK for {tsi}/{sqn:?} failed: {err}");
		}
	}

	/// Tear down the transport. Subsequent calls to `send`/`recv_vector` return `IO_CLOSED`.
	pub fn destroy(mut self) {
		self.closed = true;
	}
}
