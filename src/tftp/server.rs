//! TFTP server implementation.
//!
//! Serves boot files over TFTP (RFC 1350) with option negotiation
//! (RFC 2347-2349). Every request gets its own ephemeral socket and task.

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use super::protocol::{
    ack_packet, data_packet, error_packet, ErrorCode, Packet, Request, RequestOptions,
    DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE,
};
use super::store::{DirectoryStore, FileStore};
use crate::config::Config;
use crate::error::StoreError;

/// Retransmissions before a transfer is abandoned.
pub const MAX_RETRIES: usize = 5;

/// Fits a DATA packet at the largest block size.
const MAX_PACKET_LEN: usize = MAX_BLOCK_SIZE + 4;

/// Per-transfer behavior.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// How long to wait for each reply before retransmitting
    pub timeout: Duration,
    pub max_retries: usize,
    /// Accept write requests
    pub allow_write: bool,
}

/// TFTP server for serving boot files.
#[derive(Clone)]
pub struct TftpServer {
    bind_addr: SocketAddr,
    store: Arc<dyn FileStore>,
    settings: TransferSettings,
}

impl TftpServer {
    /// Create a server for `tftp_root` on the configured port.
    pub fn new(config: &Config) -> Self {
        let bind_addr =
            SocketAddr::V4(SocketAddrV4::new(config.dhcp.bind_address, config.tftp.port));
        let settings = TransferSettings {
            timeout: config.tftp.timeout,
            max_retries: MAX_RETRIES,
            allow_write: config.tftp.allow_write,
        };
        let store = DirectoryStore::new(config.tftp.root.clone());
        Self::with_store(bind_addr, Arc::new(store), settings)
    }

    pub fn with_store(
        bind_addr: SocketAddr,
        store: Arc<dyn FileStore>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            bind_addr,
            store,
            settings,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Bind the TFTP port and serve until an unrecoverable error.
    pub async fn run(&self) -> Result<()> {
        let socket = UdpSocket::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind TFTP socket to {}", self.bind_addr))?;

        info!("TFTP server listening on {}", self.bind_addr);
        self.serve(socket).await
    }

    /// Accept requests on `socket`, spawning a task per transfer.
    pub async fn serve(&self, socket: UdpSocket) -> Result<()> {
        let mut buf = vec![0u8; MAX_PACKET_LEN];

        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("TFTP receive error: {}", e);
                    continue;
                }
            };

            match Packet::parse(&buf[..len]) {
                Ok(Packet::ReadRequest(request)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.serve_read(peer, request).await {
                            error!("TFTP read transfer for {} failed: {:#}", peer, e);
                        }
                    });
                }
                Ok(Packet::WriteRequest(request)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.serve_write(peer, request).await {
                            error!("TFTP write transfer for {} failed: {:#}", peer, e);
                        }
                    });
                }
                Ok(_) => {
                    debug!("Ignoring {} bytes from {} outside a transfer", len, peer);
                }
                Err(e) => {
                    debug!("Malformed TFTP request from {}: {}", peer, e);
                    let packet = error_packet(ErrorCode::IllegalOperation, &e.to_string());
                    if let Err(e) = socket.send_to(&packet, peer).await {
                        debug!("Failed to send TFTP error to {}: {}", peer, e);
                    }
                }
            }
        }
    }

    async fn transfer(&self, peer: SocketAddr) -> Result<Transfer> {
        let socket = UdpSocket::bind(SocketAddr::new(self.bind_addr.ip(), 0))
            .await
            .context("Failed to bind transfer socket")?;
        debug!("Transfer socket for {} bound to {}", peer, socket.local_addr()?);

        Ok(Transfer {
            socket,
            peer,
            timeout: self.settings.timeout,
            max_retries: self.settings.max_retries,
            buf: vec![0u8; MAX_PACKET_LEN],
        })
    }

    async fn serve_read(&self, peer: SocketAddr, request: Request) -> Result<()> {
        let mut transfer = self.transfer(peer).await?;
        info!("TFTP: {} requesting {}", peer, request.filename);

        if !request.mode.is_supported() {
            let message = format!("Unsupported transfer mode {}", request.mode);
            transfer.send_error(ErrorCode::IllegalOperation, &message).await;
            return Ok(());
        }

        let (mut reader, size) = match self.store.open(&request.filename) {
            Ok(opened) => opened,
            Err(e) => {
                warn!("TFTP: {}: {}", request.filename, e);
                transfer.send_error(error_code(&e), &e.to_string()).await;
                return Ok(());
            }
        };

        let negotiated = negotiate(&request.options, Some(size));
        if let Some(timeout) = negotiated.timeout {
            transfer.timeout = timeout;
        }
        if !negotiated.acknowledged.is_empty() {
            transfer.send_until_ack(&negotiated.oack(), 0).await?;
        }

        let block_size = negotiated.block_size;
        let mut buf = vec![0u8; block_size];
        let mut block: u16 = 1;
        let mut sent = 0u64;

        loop {
            let len = match read_block(&mut reader, &mut buf).await {
                Ok(len) => len,
                Err(e) => {
                    transfer.send_error(ErrorCode::NotDefined, "Read error").await;
                    return Err(e).with_context(|| format!("Failed to read {}", request.filename));
                }
            };

            transfer
                .send_until_ack(&data_packet(block, &buf[..len]), block)
                .await?;
            sent += len as u64;

            // A short block, possibly empty, ends the transfer.
            if len < block_size {
                break;
            }
            block = block.wrapping_add(1);
        }

        info!("{}: {} bytes sent", request.filename, sent);
        Ok(())
    }

    async fn serve_write(&self, peer: SocketAddr, request: Request) -> Result<()> {
        let mut transfer = self.transfer(peer).await?;

        if !self.settings.allow_write {
            warn!(
                "Write request from {} for {} denied (read-only server)",
                peer, request.filename
            );
            transfer
                .send_error(ErrorCode::AccessViolation, "Write not supported")
                .await;
            return Ok(());
        }

        if !request.mode.is_supported() {
            let message = format!("Unsupported transfer mode {}", request.mode);
            transfer.send_error(ErrorCode::IllegalOperation, &message).await;
            return Ok(());
        }

        let mut writer = match self.store.create(&request.filename) {
            Ok(writer) => writer,
            Err(e) => {
                warn!("TFTP: {}: {}", request.filename, e);
                transfer.send_error(error_code(&e), &e.to_string()).await;
                return Ok(());
            }
        };
        info!("TFTP: {} uploading {}", peer, request.filename);

        let negotiated = negotiate(&request.options, None);
        if let Some(timeout) = negotiated.timeout {
            transfer.timeout = timeout;
        }

        let mut reply = if negotiated.acknowledged.is_empty() {
            ack_packet(0)
        } else {
            negotiated.oack()
        };
        let mut block: u16 = 1;
        let mut received = 0u64;

        loop {
            let data = transfer.send_until_data(&reply, block).await?;

            if let Err(e) = writer.write_all(&data).await {
                transfer.send_error(ErrorCode::DiskFull, "Write error").await;
                return Err(e).with_context(|| format!("Failed to write {}", request.filename));
            }
            received += data.len() as u64;
            reply = ack_packet(block);

            if data.len() < negotiated.block_size {
                break;
            }
            block = block.wrapping_add(1);
        }

        writer
            .shutdown()
            .await
            .with_context(|| format!("Failed to flush {}", request.filename))?;
        transfer.send(&reply).await?;
        info!("{}: {} bytes received", request.filename, received);

        transfer.linger(&reply, block).await
    }
}

/// One client's transfer, bound to its own socket.
struct Transfer {
    socket: UdpSocket,
    peer: SocketAddr,
    timeout: Duration,
    max_retries: usize,
    buf: Vec<u8>,
}

impl Transfer {
    async fn send(&self, packet: &[u8]) -> Result<()> {
        self.socket
            .send_to(packet, self.peer)
            .await
            .with_context(|| format!("Failed to send to {}", self.peer))?;
        Ok(())
    }

    async fn send_error(&self, code: ErrorCode, message: &str) {
        if let Err(e) = self
            .socket
            .send_to(&error_packet(code, message), self.peer)
            .await
        {
            debug!("Failed to send TFTP error to {}: {}", self.peer, e);
        }
    }

    /// The next well-formed packet from the peer, or `None` at the deadline.
    async fn recv_until(&mut self, deadline: Instant) -> Result<Option<Packet>> {
        loop {
            let (len, src) = match timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await
            {
                Ok(received) => received.context("Transfer receive failed")?,
                Err(_) => return Ok(None),
            };

            if src != self.peer {
                debug!("Packet from unknown transfer ID {}", src);
                let packet = error_packet(ErrorCode::UnknownTransferId, "Unknown transfer ID");
                if let Err(e) = self.socket.send_to(&packet, src).await {
                    debug!("Failed to send TFTP error to {}: {}", src, e);
                }
                continue;
            }

            match Packet::parse(&self.buf[..len]) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => debug!("Malformed packet from {}: {}", src, e),
            }
        }
    }

    /// Send `packet` until the peer acknowledges `block`.
    async fn send_until_ack(&mut self, packet: &[u8], block: u16) -> Result<()> {
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("TFTP: Retry {} for block {}", attempt, block);
            }
            self.send(packet).await?;

            let deadline = Instant::now() + self.timeout;
            while let Some(reply) = self.recv_until(deadline).await? {
                match reply {
                    Packet::Ack(acked) if acked == block => return Ok(()),
                    Packet::Error { code, message } => {
                        bail!("Client sent error {}: {}", code, message)
                    }
                    // Stale ACKs are not answered; resending on them duplicates every block.
                    _ => {}
                }
            }
        }

        bail!(
            "Transfer timeout after {} retries at block {}",
            self.max_retries,
            block
        )
    }

    /// Re-acknowledge a repeated final `block` until the peer goes quiet for
    /// one timeout period.
    async fn linger(&mut self, ack: &[u8], block: u16) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        while let Some(packet) = self.recv_until(deadline).await? {
            if matches!(packet, Packet::Data { block: got, .. } if got == block) {
                debug!("TFTP: Final block {} repeated, acknowledging again", block);
                self.send(ack).await?;
            }
        }
        Ok(())
    }

    /// Send `packet` until the peer answers with DATA `block`.
    async fn send_until_data(&mut self, packet: &[u8], block: u16) -> Result<Vec<u8>> {
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("TFTP: Retry {} waiting for block {}", attempt, block);
            }
            self.send(packet).await?;

            let deadline = Instant::now() + self.timeout;
            while let Some(reply) = self.recv_until(deadline).await? {
                match reply {
                    Packet::Data { block: got, data } if got == block => return Ok(data),
                    Packet::Data { block: got, .. } if got == block.wrapping_sub(1) => {
                        self.send(packet).await?;
                    }
                    Packet::Error { code, message } => {
                        bail!("Client sent error {}: {}", code, message)
                    }
                    _ => {}
                }
            }
        }

        bail!(
            "Transfer timeout after {} retries waiting for block {}",
            self.max_retries,
            block
        )
    }
}

/// Options the server agreed to, in the order they are acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Negotiated {
    block_size: usize,
    timeout: Option<Duration>,
    acknowledged: Vec<(String, String)>,
}

impl Negotiated {
    fn oack(&self) -> Vec<u8> {
        Packet::OptionAck(self.acknowledged.clone()).to_bytes()
    }
}

/// Accept every requested option that survived parsing. A read reports the
/// real file size for `tsize`; a write echoes the client's value.
fn negotiate(options: &RequestOptions, file_size: Option<u64>) -> Negotiated {
    let mut acknowledged = Vec::new();

    if let Some(size) = options.block_size {
        acknowledged.push(("blksize".to_string(), size.to_string()));
    }
    if let Some(requested) = options.transfer_size {
        let size = file_size.unwrap_or(requested);
        acknowledged.push(("tsize".to_string(), size.to_string()));
    }
    if let Some(secs) = options.timeout_secs {
        acknowledged.push(("timeout".to_string(), secs.to_string()));
    }

    Negotiated {
        block_size: options.block_size.unwrap_or(DEFAULT_BLOCK_SIZE),
        timeout: options
            .timeout_secs
            .map(|secs| Duration::from_secs(u64::from(secs))),
        acknowledged,
    }
}

fn error_code(err: &StoreError) -> ErrorCode {
    match err {
        StoreError::NotFound => ErrorCode::FileNotFound,
        StoreError::AccessDenied => ErrorCode::AccessViolation,
        StoreError::AlreadyExists => ErrorCode::FileAlreadyExists,
        StoreError::Io(_) => ErrorCode::NotDefined,
    }
}

/// Fill `buf` unless the reader ends first.
async fn read_block<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
