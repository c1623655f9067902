//! BOOTP/DHCP request decoding.
//!
//! This module is responsible for turning raw datagrams into typed views
//! over the BOOTP wire format.

mod boot_request;

pub use boot_request::{
    field, BootRequest, Options, BOOTP_HEADER_LEN, BOOTREPLY, BOOTREQUEST, MAGIC_COOKIE,
    OPTIONS_OFFSET,
};
