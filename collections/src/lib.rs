//! Reference-counted byte buffers shared by the wire codec, the skbuff, and the receive/transmit windows.

pub mod bytes;
