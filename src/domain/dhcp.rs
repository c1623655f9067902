//! DHCP domain models.
//!
//! These types describe the logical content of BOOTP/DHCP messages,
//! independent of wire format parsing.

use std::fmt;

/// DHCP option codes used by the PXE responder (RFC 2132, RFC 4578).
pub mod option_codes {
    pub const PAD: u8 = 0;
    pub const VENDOR_SPECIFIC: u8 = 43;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const VENDOR_CLASS_ID: u8 = 60;
    pub const END: u8 = 255;
}

/// DHCP message types as defined in RFC 2131.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpMessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
}

impl DhcpMessageType {
    /// Parse from the DHCP option 53 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Discover),
            2 => Some(Self::Offer),
            3 => Some(Self::Request),
            4 => Some(Self::Decline),
            5 => Some(Self::Ack),
            6 => Some(Self::Nak),
            7 => Some(Self::Release),
            8 => Some(Self::Inform),
            _ => None,
        }
    }

    /// The option 53 wire value.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Discover => 1,
            Self::Offer => 2,
            Self::Request => 3,
            Self::Decline => 4,
            Self::Ack => 5,
            Self::Nak => 6,
            Self::Release => 7,
            Self::Inform => 8,
        }
    }
}

impl fmt::Display for DhcpMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// One tag/length/value entry of the RFC 1048 option area.
///
/// Pad and end markers are consumed by the scanner and never surface as
/// entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionEntry<'a> {
    /// Option tag
    pub tag: u8,
    /// Raw option bytes (exactly the length byte's worth)
    pub value: &'a [u8],
    /// Offset of the tag byte within the packet
    pub offset: usize,
}

impl<'a> OptionEntry<'a> {
    /// The encoded length byte.
    pub fn len(&self) -> u8 {
        self.value.len() as u8
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Human-readable name for logging.
    pub fn name(&self) -> &'static str {
        match self.tag {
            option_codes::VENDOR_SPECIFIC => "Vendor Specific",
            option_codes::MESSAGE_TYPE => "DHCP message type",
            option_codes::SERVER_ID => "Server Identifier",
            option_codes::VENDOR_CLASS_ID => "Vendor Class ID",
            _ => "Unknown",
        }
    }
}
