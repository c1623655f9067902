//! ProxyDHCP server module.
//!
//! Answers PXE discovers with boot information while leaving address
//! assignment to the network's real DHCP server.

mod offer;
mod server;

pub use offer::{OfferReply, OFFER_BUFFER_LEN};
pub use server::{Disposition, ProxyDhcpServer, MAX_DATAGRAM_LEN};
