//! TFTP server module.
//!
//! Delivers boot images to PXE clients once they have their offer.

pub mod protocol;
mod server;
mod store;

pub use server::{TftpServer, TransferSettings, MAX_RETRIES};
pub use store::{DirectoryStore, FileReader, FileStore, FileWriter};
