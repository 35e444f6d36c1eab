use std::time::Duration;

use crate::error::Error;

/// The two UDP ports used when PGM is encapsulated inside UDP rather than sent over raw IP
/// protocol 113.
#[derive(Debug, Clone, Copy)]
pub struct UdpEncapPorts {
	pub unicast: u16,
	pub multicast: u16,
}

/// Every tunable the transport exposes, with RFC 3208's suggested defaults.
#[derive(Debug, Clone)]
pub struct Config {
	pub max_tpdu: u16,
	pub txw_sqns: u32,
	pub rxw_sqns: u32,
	pub hops: u8,
	pub peer_expiry: Duration,
	pub spmr_expiry: Duration,
	pub nak_bo_ivl: Duration,
	pub nak_rpt_ivl: Duration,
	pub nak_rdata_ivl: Duration,
	pub nak_data_retries: u32,
	pub nak_ncf_retries: u32,
	pub recv_only: bool,
	pub spm_ambient_interval: Duration,
	pub spm_heartbeat_initial: Duration,
	pub udp_encap_ports: Option<UdpEncapPorts>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			max_tpdu: 1500,
			txw_sqns: 100,
			rxw_sqns: 100,
			hops: 16,
			peer_expiry: Duration::from_secs(300),
			spmr_expiry: Duration::from_millis(250),
			nak_bo_ivl: Duration::from_millis(50),
			nak_rpt_ivl: Duration::from_secs(2),
			nak_rdata_ivl: Duration::from_secs(2),
			nak_data_retries: 50,
			nak_ncf_retries: 50,
			recv_only: false,
			spm_ambient_interval: Duration::from_secs(30),
			spm_heartbeat_initial: Duration::from_millis(100),
			udp_encap_ports: None,
		}
	}
}

impl Config {
	/// Validate before any I/O occurs, so misconfiguration fails `create`/`bind` up front rather
	/// than surfacing later as a confusing protocol-level failure.
	pub fn validate(&self) -> Result<(), Error> {
		if self.max_tpdu < 128 {
			log::warn!("max_tpdu {} is too small to carry a PGM header", self.max_tpdu);
			return Err(Error::ConfigInvalid);
		}

		if self.txw_sqns == 0 || self.rxw_sqns == 0 {
			log::warn!("window sizes must be non-zero");
			return Err(Error::ConfigInvalid);
		}

		if self.nak_data_retries == 0 || self.nak_ncf_retries == 0 {
			log::warn!("retry counts must be non-zero");
			return Err(Error::ConfigInvalid);
		}

		if self.spm_heartbeat_initial > self.spm_ambient_interval {
			log::warn!("spm_heartbeat_initial must not exceed spm_ambient_interval");
			return Err(Error::ConfigInvalid);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_is_valid() {
		Config::default().validate().unwrap();
	}

	#[test]
	fn rejects_zero_window_size() {
		let mut config = Config::default();
		config.rxw_sqns = 0;
		assert_eq!(config.validate(), Err(Error::ConfigInvalid));
	}

	#[test]
	fn rejects_heartbeat_initial_above_ambient() {
		let mut config = Config::default();
		config.spm_heartbeat_initial = config.spm_ambient_interval + Duration::from_secs(1);
		assert_eq!(config.validate(), Err(Error::ConfigInvalid));
	}
}
