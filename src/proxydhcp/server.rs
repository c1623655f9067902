//! ProxyDHCP server implementation.
//!
//! Listens for BOOTP/DHCP broadcasts and answers PXE discovers with an
//! offer pointing at the boot server. It never assigns addresses.

use std::borrow::Cow;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace, warn};

use super::offer::OfferReply;
use crate::config::Config;
use crate::detector::{PxeClassifier, RequestClassification};
use crate::domain::OptionEntry;
use crate::error::{DecodeError, EncodeError};
use crate::parser::BootRequest;
use crate::utils::{format_hw_addr, format_mac, hexdump};

/// Receive buffer size; longer datagrams are truncated by the read.
pub const MAX_DATAGRAM_LEN: usize = 2000;

/// What the responder decided to do with one datagram.
#[derive(Debug)]
pub enum Disposition {
    /// Not a usable BOOTREQUEST. Dropped without a reply.
    Malformed(DecodeError),
    /// A valid request that is not a PXE discover or request.
    NotApplicable(RequestClassification),
    /// The configured boot parameters could not be encoded.
    Unencodable(EncodeError),
    /// Send this offer.
    Offer {
        reply: OfferReply,
        classification: RequestClassification,
    },
}

/// ProxyDHCP responder for PXE boot.
///
/// Cloning is cheap; each clone shares the same read-only configuration.
#[derive(Debug, Clone)]
pub struct ProxyDhcpServer {
    config: Arc<Config>,
    classifier: Arc<PxeClassifier>,
}

impl ProxyDhcpServer {
    /// Create a new proxyDHCP server from validated configuration.
    pub fn new(config: Arc<Config>) -> Self {
        let classifier = PxeClassifier::new(config.boot.vendor_class.clone());
        Self {
            config,
            classifier: Arc::new(classifier),
        }
    }

    /// Where offers are sent.
    pub fn reply_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(
            self.config.dhcp.reply_address,
            self.config.dhcp.client_port,
        ))
    }

    /// Bind the configured DHCP server port and serve until an
    /// unrecoverable error.
    pub async fn run(&self) -> Result<()> {
        let socket = self.bind()?;

        info!(
            "ProxyDHCP server listening on {}:{}",
            self.config.dhcp.bind_address, self.config.dhcp.port
        );
        info!("Boot server: {}", self.config.boot.server_ip);
        info!("Boot file: {}", self.config.boot.boot_file);

        self.serve(socket).await
    }

    /// Create the broadcast-capable listening socket.
    pub fn bind(&self) -> Result<UdpSocket> {
        use socket2::{Domain, Protocol, Socket, Type};

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .context("Failed to create socket")?;

        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;

        if let Some(interface) = &self.config.dhcp.interface {
            bind_to_device(&socket, interface)?;
        }

        let addr = SocketAddrV4::new(self.config.dhcp.bind_address, self.config.dhcp.port);
        socket
            .bind(&addr.into())
            .with_context(|| format!("Failed to bind to port {}", self.config.dhcp.port))?;

        socket.set_nonblocking(true)?;

        let socket: std::net::UdpSocket = socket.into();
        UdpSocket::from_std(socket).context("Failed to register socket with the runtime")
    }

    /// Read datagrams forever, handling each in its own task.
    ///
    /// Read errors are logged and never end the loop.
    pub async fn serve(&self, socket: UdpSocket) -> Result<()> {
        let socket = Arc::new(socket);

        loop {
            let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("DHCP receive error: {}", e);
                    continue;
                }
            };
            buf.truncate(len);

            let server = self.clone();
            let socket = Arc::clone(&socket);
            tokio::spawn(async move {
                server.handle_datagram(&socket, &buf, peer).await;
            });
        }
    }

    /// Handle one datagram end to end: decide, then transmit if needed.
    async fn handle_datagram(&self, socket: &UdpSocket, data: &[u8], peer: SocketAddr) {
        if self.config.log {
            debug!("Got {} bytes from {}", data.len(), peer);
        }
        if self.config.debug {
            trace!("Request from {}:\n{}", peer, hexdump(data));
        }

        match self.respond(data) {
            Disposition::Offer {
                reply,
                classification,
            } => {
                self.transmit(socket, &reply, &classification).await;
            }
            Disposition::Malformed(e) => {
                debug!("Dropping datagram from {}: {}", peer, e);
            }
            Disposition::NotApplicable(classification) => {
                if classification.is_discover_or_request() {
                    debug!(
                        "Not a PXE request from {} (vendor class: {:?})",
                        peer, classification.vendor_class
                    );
                } else {
                    debug!("Not a DHCP discover or request from {}", peer);
                }
            }
            Disposition::Unencodable(e) => {
                error!("Cannot build offer: {}", e);
            }
        }
    }

    /// Decide how to answer a datagram. Performs no I/O.
    pub fn respond(&self, data: &[u8]) -> Disposition {
        let request = match BootRequest::decode(data) {
            Ok(request) => request,
            Err(e) => return Disposition::Malformed(e),
        };

        if self.config.log {
            log_request(&request);
        }

        let entries = match request.options().collect::<Result<Vec<OptionEntry<'_>>, _>>() {
            Ok(entries) => entries,
            Err(e) => return Disposition::Malformed(e),
        };

        if self.config.log {
            for entry in &entries {
                debug!(
                    " - ext:{:03} = {:<30} ({}) [{} bytes]",
                    entry.offset,
                    entry.name(),
                    entry.tag,
                    entry.len()
                );
            }
        }

        let classification = self.classifier.classify(entries);
        if !classification.is_actionable() {
            return Disposition::NotApplicable(classification);
        }

        let client = request
            .client_mac()
            .map(format_mac)
            .unwrap_or_else(|| format_hw_addr(request.hardware_address()));
        if let Some(msg_type) = classification.message_type() {
            info!(
                "PXE {} from {} (XID: 0x{:08X})",
                msg_type,
                client,
                request.xid()
            );
        }

        match OfferReply::encode(&request, &self.config.boot) {
            Ok(reply) => Disposition::Offer {
                reply,
                classification,
            },
            Err(e) => Disposition::Unencodable(e),
        }
    }

    /// Broadcast an offer to the client port. Failures are logged only;
    /// the client retries its discover on its own.
    async fn transmit(
        &self,
        socket: &UdpSocket,
        reply: &OfferReply,
        classification: &RequestClassification,
    ) {
        let dest = self.reply_addr();

        if self.config.debug {
            trace!("Sending {} bytes:\n{}", reply.len(), hexdump(reply.as_bytes()));
        }

        match socket.send_to(reply.as_bytes(), dest).await {
            Ok(sent) => {
                info!(
                    "PXE OFFER sent to {} ({} bytes) -> boot file: {} on {} (client class: {})",
                    dest,
                    sent,
                    self.config.boot.boot_file,
                    self.config.boot.server_ip,
                    classification.vendor_class.as_deref().unwrap_or("-")
                );
            }
            Err(e) => {
                warn!("Failed to send OFFER to {}: {}", dest, e);
            }
        }
    }
}

fn text(field: Result<Option<Cow<'_, str>>, DecodeError>) -> String {
    match field {
        Ok(Some(s)) => s.into_owned(),
        Ok(None) => String::new(),
        Err(_) => "invalid string".to_string(),
    }
}

/// Dump the fixed BOOTREQUEST fields.
fn log_request(request: &BootRequest<'_>) {
    debug!("BOOTREQUEST");
    debug!(" - htype   = {}", request.htype());
    debug!(" - hlen    = {}", request.hlen());
    debug!(" - hops    = {}", request.hops());
    debug!(" - xid     = {:08x}", request.xid());
    debug!(" - secs    = {}", request.secs());
    debug!(" - flags   = {:04x}", request.flags());
    debug!(" - ciaddr  = {}", request.ciaddr());
    debug!(" - yiaddr  = {}", request.yiaddr());
    debug!(" - siaddr  = {}", request.siaddr());
    debug!(" - giaddr  = {}", request.giaddr());
    debug!(" - chaddr  = {}", format_hw_addr(&request.chaddr()));
    debug!(" - sname   = {}", text(request.server_name()));
    debug!(" - file    = {}", text(request.boot_file()));
}

/// Restrict a socket to one network interface.
#[cfg(target_os = "linux")]
fn bind_to_device(socket: &socket2::Socket, interface: &str) -> Result<()> {
    socket
        .bind_device(Some(interface.as_bytes()))
        .with_context(|| format!("Failed to bind socket to interface {}", interface))
}

#[cfg(not(target_os = "linux"))]
fn bind_to_device(_socket: &socket2::Socket, interface: &str) -> Result<()> {
    anyhow::bail!(
        "Binding to interface {} is only supported on Linux",
        interface
    )
}
