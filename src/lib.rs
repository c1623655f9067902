//! PXE boot assistant.
//!
//! Answers PXE DHCP discovers with a proxyDHCP offer naming the boot server
//! and boot file, and serves that file over TFTP.

pub mod config;
pub mod detector;
pub mod domain;
pub mod error;
pub mod parser;
pub mod proxydhcp;
pub mod tftp;
pub mod utils;

pub use config::{BootConfig, Config, DhcpConfig, TftpConfig, DEFAULT_CONFIG_PATH};
pub use detector::{PxeClassifier, RequestClassification};
pub use error::{ConfigError, DecodeError, EncodeError, PacketError, StoreError};
pub use parser::BootRequest;
pub use proxydhcp::{Disposition, OfferReply, ProxyDhcpServer};
pub use tftp::{DirectoryStore, FileStore, TftpServer};
