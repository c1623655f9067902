//! PXE request classification.

use crate::domain::{option_codes, DhcpMessageType, OptionEntry};

/// Vendor class prefix announced by PXE firmware.
pub const PXE_CLASS_ID: &str = "PXEClient";

/// What a single pass over a request's options revealed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestClassification {
    /// Option 53 carried DHCPDISCOVER
    pub is_discover: bool,
    /// Option 53 carried DHCPREQUEST
    pub is_request: bool,
    /// Option 60 starts with the PXE class prefix
    pub is_pxe_client: bool,
    /// Option 60, if present
    pub vendor_class: Option<String>,
}

impl RequestClassification {
    pub fn is_discover_or_request(&self) -> bool {
        self.is_discover || self.is_request
    }

    /// Whether the request deserves an offer.
    pub fn is_actionable(&self) -> bool {
        self.is_discover_or_request() && self.is_pxe_client
    }

    /// The message type that drove the decision, for logging.
    pub fn message_type(&self) -> Option<DhcpMessageType> {
        if self.is_discover {
            Some(DhcpMessageType::Discover)
        } else if self.is_request {
            Some(DhcpMessageType::Request)
        } else {
            None
        }
    }
}

/// Detects PXE discovers among DHCP requests.
///
/// A request is a PXE client when its vendor class identifier starts with
/// the configured class string. A value shorter than the prefix is not a
/// PXE client.
#[derive(Debug, Clone)]
pub struct PxeClassifier {
    class_prefix: String,
}

impl PxeClassifier {
    /// Create a classifier matching the given vendor class prefix.
    pub fn new(class_prefix: impl Into<String>) -> Self {
        Self {
            class_prefix: class_prefix.into(),
        }
    }

    /// Classify a request from its option entries.
    ///
    /// Message type flags accumulate over every option 53 seen; a later
    /// option 60 replaces an earlier one.
    pub fn classify<'a, I>(&self, options: I) -> RequestClassification
    where
        I: IntoIterator<Item = OptionEntry<'a>>,
    {
        let mut classification = RequestClassification::default();

        for entry in options {
            match entry.tag {
                option_codes::MESSAGE_TYPE => {
                    match entry.value.first().copied().and_then(DhcpMessageType::from_u8) {
                        Some(DhcpMessageType::Discover) => classification.is_discover = true,
                        Some(DhcpMessageType::Request) => classification.is_request = true,
                        _ => {}
                    }
                }
                option_codes::VENDOR_CLASS_ID => {
                    classification.is_pxe_client =
                        entry.value.starts_with(self.class_prefix.as_bytes());
                    classification.vendor_class =
                        Some(String::from_utf8_lossy(entry.value).into_owned());
                }
                _ => {}
            }
        }

        classification
    }
}

impl Default for PxeClassifier {
    fn default() -> Self {
        Self::new(PXE_CLASS_ID)
    }
}
