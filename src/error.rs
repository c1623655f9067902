use thiserror::Error;

/// Reasons a datagram is not a usable BOOTREQUEST.
///
/// Every variant is a malformed-packet outcome: the datagram is dropped and
/// no reply is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet too short for BOOTP header: {actual} bytes, need 236")]
    TooShort { actual: usize },

    #[error("not a BOOTREQUEST (op = {op})")]
    NotBootRequest { op: u8 },

    #[error("no RFC 1048 option area: {actual} bytes, need 240")]
    NoOptionsArea { actual: usize },

    #[error("unknown extension {0:02x?}")]
    UnknownExtension([u8; 4]),

    #[error("option area truncated at offset {offset}")]
    TruncatedOptions { offset: usize },

    #[error("{0} field is not NUL-terminated")]
    UnterminatedField(&'static str),
}

/// Errors building an offer from the configured boot parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("boot file name is {len} bytes, the field holds at most {max}")]
    BootFileTooLong { len: usize, max: usize },

    #[error("vendor class is {len} bytes, an option holds at most {max}")]
    VendorClassTooLong { len: usize, max: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Reasons a TFTP datagram could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),

    #[error("unknown opcode {0}")]
    UnknownOpcode(u16),

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("request is not NUL-terminated")]
    Unterminated,

    #[error("{0} is not valid UTF-8")]
    InvalidString(&'static str),
}

/// Failures opening or creating a file in a TFTP store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File not found")]
    NotFound,

    #[error("Access violation")]
    AccessDenied,

    #[error("File already exists")]
    AlreadyExists,

    #[error("IO error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound,
            std::io::ErrorKind::PermissionDenied => StoreError::AccessDenied,
            std::io::ErrorKind::AlreadyExists => StoreError::AlreadyExists,
            _ => StoreError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        assert_eq!(
            DecodeError::TooShort { actual: 100 }.to_string(),
            "packet too short for BOOTP header: 100 bytes, need 236"
        );
        assert_eq!(
            DecodeError::UnknownExtension([0xde, 0xad, 0xbe, 0xef]).to_string(),
            "unknown extension [de, ad, be, ef]"
        );
        assert_eq!(
            DecodeError::UnterminatedField("file").to_string(),
            "file field is not NUL-terminated"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "dhcp_port".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value for dhcp_port: abc");
    }

    #[test]
    fn test_store_error_from_io() {
        use std::io::{Error, ErrorKind};

        assert!(matches!(
            StoreError::from(Error::from(ErrorKind::NotFound)),
            StoreError::NotFound
        ));
        assert!(matches!(
            StoreError::from(Error::from(ErrorKind::AlreadyExists)),
            StoreError::AlreadyExists
        ));
        assert!(matches!(
            StoreError::from(Error::from(ErrorKind::PermissionDenied)),
            StoreError::AccessDenied
        ));
        assert!(matches!(
            StoreError::from(Error::from(ErrorKind::Interrupted)),
            StoreError::Io(_)
        ));
    }
}
