//! DHCPOFFER encoding for PXE clients.

use crate::config::{BootConfig, MAX_BOOT_FILE_LEN, MAX_VENDOR_CLASS_LEN};
use crate::domain::{option_codes, DhcpMessageType};
use crate::error::EncodeError;
use crate::parser::{field, BootRequest, BOOTREPLY, OPTIONS_OFFSET};

/// Size of the buffer an offer is built in.
pub const OFFER_BUFFER_LEN: usize = 1500;

/// PXE vendor sub-option 6: PXE_DISCOVERY_CONTROL.
const PXE_DISCOVERY_CONTROL: u8 = 6;
/// Disable broadcast and multicast discovery; boot the file name as given.
const DISCOVERY_USE_BOOT_FILE: u8 = 8;

/// An encoded BOOTREPLY/DHCPOFFER.
#[derive(Debug, Clone)]
pub struct OfferReply {
    buf: Vec<u8>,
    len: usize,
}

impl OfferReply {
    /// Build the offer answering `request`.
    ///
    /// Only op, htype, hlen, hops, xid, chaddr, siaddr, file and the cookie
    /// are filled in; every other header byte is zero. Options are written
    /// as 53, 54, 60, 43 and terminated by 255.
    pub fn encode(request: &BootRequest<'_>, boot: &BootConfig) -> Result<Self, EncodeError> {
        let boot_file = boot.boot_file.as_bytes();
        if boot_file.len() > MAX_BOOT_FILE_LEN {
            return Err(EncodeError::BootFileTooLong {
                len: boot_file.len(),
                max: MAX_BOOT_FILE_LEN,
            });
        }

        let vendor_class = boot.vendor_class.as_bytes();
        if vendor_class.len() > MAX_VENDOR_CLASS_LEN {
            return Err(EncodeError::VendorClassTooLong {
                len: vendor_class.len(),
                max: MAX_VENDOR_CLASS_LEN,
            });
        }

        let request_bytes = request.as_bytes();
        let mut buf = vec![0u8; OFFER_BUFFER_LEN];

        buf[field::OP] = BOOTREPLY;
        buf[field::HTYPE] = request.htype();
        buf[field::HLEN] = request.hlen();
        buf[field::HOPS] = request.hops();
        buf[field::XID].copy_from_slice(&request_bytes[field::XID]);
        buf[field::CHADDR].copy_from_slice(&request_bytes[field::CHADDR]);

        // The rest of the field is already zero, which terminates the name.
        buf[field::FILE.start..field::FILE.start + boot_file.len()].copy_from_slice(boot_file);

        buf[field::SIADDR].copy_from_slice(&boot.server_ip.octets());
        buf[field::COOKIE].copy_from_slice(&request_bytes[field::COOKIE]);

        let mut writer = OptionWriter {
            buf: &mut buf,
            offset: OPTIONS_OFFSET,
        };
        writer.put(
            option_codes::MESSAGE_TYPE,
            &[DhcpMessageType::Offer.as_u8()],
        );
        writer.put(option_codes::SERVER_ID, &boot.server_ip.octets());
        writer.put(option_codes::VENDOR_CLASS_ID, vendor_class);
        writer.put(
            option_codes::VENDOR_SPECIFIC,
            &[PXE_DISCOVERY_CONTROL, 1, DISCOVERY_USE_BOOT_FILE],
        );
        let len = writer.finish();

        Ok(Self { buf, len })
    }

    /// The bytes to transmit: everything up to and including the end option.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Appends tag/length/value options to a reply buffer.
struct OptionWriter<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl OptionWriter<'_> {
    fn put(&mut self, tag: u8, value: &[u8]) {
        let start = self.offset + 2;
        self.buf[self.offset] = tag;
        self.buf[self.offset + 1] = value.len() as u8;
        self.buf[start..start + value.len()].copy_from_slice(value);
        self.offset = start + value.len();
    }

    /// Write the end option and return the encoded length.
    fn finish(self) -> usize {
        self.buf[self.offset] = option_codes::END;
        self.offset + 1
    }
}
