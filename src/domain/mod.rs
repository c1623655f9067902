//! Domain models for BOOTP/DHCP PXE handling.
//!
//! Types here are independent of sockets and of the wire parser.

mod dhcp;

pub use dhcp::{option_codes, DhcpMessageType, OptionEntry};
