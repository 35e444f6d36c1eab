//! Host-side building blocks: a UDP socket port, a clock, a colored logger, and a small
//! convenience loop — the concrete types a caller plugs into `pgm::port`'s traits to drive a
//! [`pgm::transport::Transport`] against the real network.

pub mod logger;
pub mod run;
pub mod socket;
pub mod time;

pub use run::run_until_signal;
pub use socket::UdpPort;
pub use time::Clock;
