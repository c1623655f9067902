//! BOOTREQUEST decoder.
//!
//! Validates the fixed BOOTP header (RFC 951) and the RFC 1048 option area,
//! then exposes every field through a borrowed, typed view.

use std::borrow::Cow;
use std::net::Ipv4Addr;

use macaddr::MacAddr6;

use crate::domain::{option_codes, OptionEntry};
use crate::error::DecodeError;

/// BOOTP op code for a client request.
pub const BOOTREQUEST: u8 = 1;
/// BOOTP op code for a server reply.
pub const BOOTREPLY: u8 = 2;

/// RFC 1048 magic cookie: 0x63825363
pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

/// Size of the fixed BOOTP header, without the cookie.
pub const BOOTP_HEADER_LEN: usize = 236;

/// Offset of the first option byte.
pub const OPTIONS_OFFSET: usize = 240;

/// Byte offsets and widths of the BOOTP header fields.
pub mod field {
    use std::ops::Range;

    pub const OP: usize = 0;
    pub const HTYPE: usize = 1;
    pub const HLEN: usize = 2;
    pub const HOPS: usize = 3;
    pub const XID: Range<usize> = 4..8;
    pub const SECS: Range<usize> = 8..10;
    pub const FLAGS: Range<usize> = 10..12;
    pub const CIADDR: Range<usize> = 12..16;
    pub const YIADDR: Range<usize> = 16..20;
    pub const SIADDR: Range<usize> = 20..24;
    pub const GIADDR: Range<usize> = 24..28;
    pub const CHADDR: Range<usize> = 28..44;
    pub const SNAME: Range<usize> = 44..108;
    pub const FILE: Range<usize> = 108..236;
    pub const COOKIE: Range<usize> = 236..240;
}

/// A validated BOOTREQUEST borrowed from a received datagram.
#[derive(Debug, Clone, Copy)]
pub struct BootRequest<'a> {
    data: &'a [u8],
}

impl<'a> BootRequest<'a> {
    /// Validate `data` as a BOOTREQUEST carrying an RFC 1048 option area.
    ///
    /// Checks run in wire order: header length, op code, option area
    /// length, magic cookie.
    pub fn decode(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < BOOTP_HEADER_LEN {
            return Err(DecodeError::TooShort { actual: data.len() });
        }

        if data[field::OP] != BOOTREQUEST {
            return Err(DecodeError::NotBootRequest { op: data[field::OP] });
        }

        if data.len() < OPTIONS_OFFSET {
            return Err(DecodeError::NoOptionsArea { actual: data.len() });
        }

        let cookie = read_array(&data[field::COOKIE]);
        if cookie != MAGIC_COOKIE {
            return Err(DecodeError::UnknownExtension(cookie));
        }

        Ok(Self { data })
    }

    /// The whole datagram, including any bytes after the end option.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn op(&self) -> u8 {
        self.data[field::OP]
    }

    pub fn htype(&self) -> u8 {
        self.data[field::HTYPE]
    }

    pub fn hlen(&self) -> u8 {
        self.data[field::HLEN]
    }

    pub fn hops(&self) -> u8 {
        self.data[field::HOPS]
    }

    /// Transaction ID as it appears on the wire.
    pub fn xid_bytes(&self) -> [u8; 4] {
        read_array(&self.data[field::XID])
    }

    pub fn xid(&self) -> u32 {
        u32::from_be_bytes(self.xid_bytes())
    }

    pub fn secs(&self) -> u16 {
        u16::from_be_bytes(read_array(&self.data[field::SECS]))
    }

    pub fn flags(&self) -> u16 {
        u16::from_be_bytes(read_array(&self.data[field::FLAGS]))
    }

    pub fn ciaddr(&self) -> Ipv4Addr {
        Ipv4Addr::from(read_array::<4>(&self.data[field::CIADDR]))
    }

    pub fn yiaddr(&self) -> Ipv4Addr {
        Ipv4Addr::from(read_array::<4>(&self.data[field::YIADDR]))
    }

    pub fn siaddr(&self) -> Ipv4Addr {
        Ipv4Addr::from(read_array::<4>(&self.data[field::SIADDR]))
    }

    pub fn giaddr(&self) -> Ipv4Addr {
        Ipv4Addr::from(read_array::<4>(&self.data[field::GIADDR]))
    }

    /// The full 16-byte client hardware address field.
    pub fn chaddr(&self) -> [u8; 16] {
        read_array(&self.data[field::CHADDR])
    }

    /// The meaningful prefix of `chaddr`, as announced by `hlen`.
    pub fn hardware_address(&self) -> &'a [u8] {
        let len = usize::from(self.hlen()).min(field::CHADDR.len());
        &self.data[field::CHADDR.start..field::CHADDR.start + len]
    }

    /// The client MAC, when the hardware address is a 6-byte Ethernet one.
    pub fn client_mac(&self) -> Option<MacAddr6> {
        let hw = self.hardware_address();
        if hw.len() != 6 {
            return None;
        }
        Some(MacAddr6::new(hw[0], hw[1], hw[2], hw[3], hw[4], hw[5]))
    }

    /// Server host name (`sname`); `Ok(None)` when the field is empty.
    pub fn server_name(&self) -> Result<Option<Cow<'a, str>>, DecodeError> {
        parse_cstring(&self.data[field::SNAME], "sname")
    }

    /// Boot file name (`file`); `Ok(None)` when the field is empty.
    pub fn boot_file(&self) -> Result<Option<Cow<'a, str>>, DecodeError> {
        parse_cstring(&self.data[field::FILE], "file")
    }

    pub fn cookie(&self) -> [u8; 4] {
        read_array(&self.data[field::COOKIE])
    }

    /// Lazily scan the option area.
    pub fn options(&self) -> Options<'a> {
        Options::new(self.data, OPTIONS_OFFSET)
    }
}

/// Iterator over the option entries of a BOOTP packet.
///
/// Pad bytes are skipped one at a time. Scanning ends at the end option or
/// at the end of the buffer. A length byte that points past the buffer
/// yields a single [`DecodeError::TruncatedOptions`] and ends the scan.
#[derive(Debug, Clone)]
pub struct Options<'a> {
    data: &'a [u8],
    cursor: usize,
    done: bool,
}

impl<'a> Options<'a> {
    /// Scan `data` starting at `offset`. Entry offsets are relative to `data`.
    pub fn new(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            cursor: offset,
            done: false,
        }
    }
}

impl<'a> Iterator for Options<'a> {
    type Item = Result<OptionEntry<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while self.cursor < self.data.len() {
            let offset = self.cursor;
            let tag = self.data[offset];

            if tag == option_codes::END {
                break;
            }

            if tag == option_codes::PAD {
                self.cursor += 1;
                continue;
            }

            let Some(&len) = self.data.get(offset + 1) else {
                self.done = true;
                return Some(Err(DecodeError::TruncatedOptions { offset }));
            };

            let start = offset + 2;
            let end = start + usize::from(len);
            let Some(value) = self.data.get(start..end) else {
                self.done = true;
                return Some(Err(DecodeError::TruncatedOptions { offset }));
            };

            self.cursor = end;
            return Some(Ok(OptionEntry { tag, value, offset }));
        }

        self.done = true;
        None
    }
}

impl std::iter::FusedIterator for Options<'_> {}

/// Decode a NUL-terminated string field.
fn parse_cstring<'a>(
    data: &'a [u8],
    name: &'static str,
) -> Result<Option<Cow<'a, str>>, DecodeError> {
    let end = data
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::UnterminatedField(name))?;

    if end == 0 {
        return Ok(None);
    }

    Ok(Some(String::from_utf8_lossy(&data[..end])))
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
