//! Wire-level codecs for the IP and UDP headers PGM datagrams travel inside or alongside.

pub mod ip;
#[cfg(feature = "pcap")]
pub mod pcap;
pub mod udp;
