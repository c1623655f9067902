//! TFTP wire format (RFC 1350) with option negotiation (RFC 2347-2349).

use std::fmt;

use crate::error::PacketError;

/// Default block size.
pub const DEFAULT_BLOCK_SIZE: usize = 512;
/// Smallest block size a client may negotiate.
pub const MIN_BLOCK_SIZE: usize = 8;
/// Largest block size a client may negotiate.
pub const MAX_BLOCK_SIZE: usize = 65464;

/// TFTP opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    ReadRequest = 1,
    WriteRequest = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
    OptionAck = 6,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::ReadRequest),
            2 => Some(Self::WriteRequest),
            3 => Some(Self::Data),
            4 => Some(Self::Ack),
            5 => Some(Self::Error),
            6 => Some(Self::OptionAck),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// TFTP error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTransferId = 5,
    FileAlreadyExists = 6,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Transfer mode named in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    Octet,
    NetAscii,
    Other(String),
}

impl TransferMode {
    fn parse(mode: &str) -> Self {
        match mode.to_ascii_lowercase().as_str() {
            "octet" => Self::Octet,
            "netascii" => Self::NetAscii,
            _ => Self::Other(mode.to_string()),
        }
    }

    /// Octet and netascii are both served byte for byte.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Octet => write!(f, "octet"),
            Self::NetAscii => write!(f, "netascii"),
            Self::Other(mode) => write!(f, "{}", mode),
        }
    }
}

/// Options a client asked for, already range-checked.
///
/// Unknown options and values that do not parse are dropped, which the
/// client sees as the option being declined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// `blksize`, clamped to at most 65464; values below 8 are declined
    pub block_size: Option<usize>,
    /// `tsize`
    pub transfer_size: Option<u64>,
    /// `timeout` in seconds, 1 to 255
    pub timeout_secs: Option<u8>,
}

impl RequestOptions {
    fn insert(&mut self, name: &str, value: &str) {
        match name.to_ascii_lowercase().as_str() {
            "blksize" => {
                self.block_size = value
                    .parse::<usize>()
                    .ok()
                    .filter(|&size| size >= MIN_BLOCK_SIZE)
                    .map(|size| size.min(MAX_BLOCK_SIZE));
            }
            "tsize" => self.transfer_size = value.parse().ok(),
            "timeout" => self.timeout_secs = value.parse().ok().filter(|&secs| secs > 0),
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.block_size.is_none() && self.transfer_size.is_none() && self.timeout_secs.is_none()
    }
}

/// A read or write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub filename: String,
    pub mode: TransferMode,
    pub options: RequestOptions,
}

/// A parsed TFTP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ReadRequest(Request),
    WriteRequest(Request),
    Data { block: u16, data: Vec<u8> },
    Ack(u16),
    Error { code: u16, message: String },
    OptionAck(Vec<(String, String)>),
}

impl Packet {
    pub fn parse(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < 2 {
            return Err(PacketError::TooShort(bytes.len()));
        }

        let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
        let opcode = Opcode::from_u16(raw).ok_or(PacketError::UnknownOpcode(raw))?;
        let body = &bytes[2..];

        match opcode {
            Opcode::ReadRequest => Ok(Self::ReadRequest(parse_request(body)?)),
            Opcode::WriteRequest => Ok(Self::WriteRequest(parse_request(body)?)),
            Opcode::Data => {
                let block = parse_block(bytes)?;
                Ok(Self::Data {
                    block,
                    data: bytes[4..].to_vec(),
                })
            }
            Opcode::Ack => Ok(Self::Ack(parse_block(bytes)?)),
            Opcode::Error => {
                let code = parse_block(bytes)?;
                let text = &bytes[4..];
                let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
                Ok(Self::Error {
                    code,
                    message: String::from_utf8_lossy(&text[..end]).into_owned(),
                })
            }
            Opcode::OptionAck => {
                let fields = split_fields(body)?;
                let pairs = fields
                    .chunks_exact(2)
                    .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                    .collect();
                Ok(Self::OptionAck(pairs))
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::ReadRequest(request) => encode_request(Opcode::ReadRequest, request),
            Self::WriteRequest(request) => encode_request(Opcode::WriteRequest, request),
            Self::Data { block, data } => data_packet(*block, data),
            Self::Ack(block) => ack_packet(*block),
            Self::Error { code, message } => {
                let mut packet = Vec::with_capacity(5 + message.len());
                packet.extend_from_slice(&Opcode::Error.as_u16().to_be_bytes());
                packet.extend_from_slice(&code.to_be_bytes());
                packet.extend_from_slice(message.as_bytes());
                packet.push(0);
                packet
            }
            Self::OptionAck(pairs) => {
                let mut packet = Opcode::OptionAck.as_u16().to_be_bytes().to_vec();
                for (name, value) in pairs {
                    put_field(&mut packet, name);
                    put_field(&mut packet, value);
                }
                packet
            }
        }
    }
}

pub fn data_packet(block: u16, data: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(4 + data.len());
    packet.extend_from_slice(&Opcode::Data.as_u16().to_be_bytes());
    packet.extend_from_slice(&block.to_be_bytes());
    packet.extend_from_slice(data);
    packet
}

pub fn ack_packet(block: u16) -> Vec<u8> {
    let mut packet = Opcode::Ack.as_u16().to_be_bytes().to_vec();
    packet.extend_from_slice(&block.to_be_bytes());
    packet
}

pub fn error_packet(code: ErrorCode, message: &str) -> Vec<u8> {
    Packet::Error {
        code: code.as_u16(),
        message: message.to_string(),
    }
    .to_bytes()
}

fn parse_block(bytes: &[u8]) -> Result<u16, PacketError> {
    if bytes.len() < 4 {
        return Err(PacketError::TooShort(bytes.len()));
    }
    Ok(u16::from_be_bytes([bytes[2], bytes[3]]))
}

/// Split a run of NUL-terminated strings.
fn split_fields(body: &[u8]) -> Result<Vec<&str>, PacketError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    if body.last() != Some(&0) {
        return Err(PacketError::Unterminated);
    }

    body[..body.len() - 1]
        .split(|&b| b == 0)
        .map(|field| std::str::from_utf8(field).map_err(|_| PacketError::InvalidString("field")))
        .collect()
}

fn parse_request(body: &[u8]) -> Result<Request, PacketError> {
    let fields = split_fields(body)?;
    let mut fields = fields.into_iter();

    let filename = fields
        .next()
        .filter(|name| !name.is_empty())
        .ok_or(PacketError::MissingField("filename"))?;
    let mode = fields.next().ok_or(PacketError::MissingField("mode"))?;

    let mut options = RequestOptions::default();
    while let (Some(name), Some(value)) = (fields.next(), fields.next()) {
        options.insert(name, value);
    }

    Ok(Request {
        filename: filename.to_string(),
        mode: TransferMode::parse(mode),
        options,
    })
}

fn encode_request(opcode: Opcode, request: &Request) -> Vec<u8> {
    let mut packet = opcode.as_u16().to_be_bytes().to_vec();
    put_field(&mut packet, &request.filename);
    put_field(&mut packet, &request.mode.to_string());

    let options = &request.options;
    if let Some(size) = options.block_size {
        put_field(&mut packet, "blksize");
        put_field(&mut packet, &size.to_string());
    }
    if let Some(size) = options.transfer_size {
        put_field(&mut packet, "tsize");
        put_field(&mut packet, &size.to_string());
    }
    if let Some(secs) = options.timeout_secs {
        put_field(&mut packet, "timeout");
        put_field(&mut packet, &secs.to_string());
    }
    packet
}

fn put_field(packet: &mut Vec<u8>, value: &str) {
    packet.extend_from_slice(value.as_bytes());
    packet.push(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rrq(body: &[u8]) -> Vec<u8> {
        let mut packet = vec![0, 1];
        packet.extend_from_slice(body);
        packet
    }

    mod request_tests {
        use super::*;

        #[test]
        fn test_parse_plain_read_request() {
            let packet = Packet::parse(&rrq(b"boot.bin\0octet\0")).unwrap();
            assert_eq!(
                packet,
                Packet::ReadRequest(Request {
                    filename: "boot.bin".to_string(),
                    mode: TransferMode::Octet,
                    options: RequestOptions::default(),
                })
            );
        }

        #[test]
        fn test_parse_options_case_insensitive() {
            let packet =
                Packet::parse(&rrq(b"pxelinux.0\0OCTET\0BLKSIZE\01468\0tsize\00\0timeout\03\0"))
                    .unwrap();
            let Packet::ReadRequest(request) = packet else {
                panic!("expected RRQ");
            };
            assert_eq!(request.mode, TransferMode::Octet);
            assert_eq!(request.options.block_size, Some(1468));
            assert_eq!(request.options.transfer_size, Some(0));
            assert_eq!(request.options.timeout_secs, Some(3));
        }

        #[test]
        fn test_block_size_is_clamped() {
            let Packet::ReadRequest(request) =
                Packet::parse(&rrq(b"f\0octet\0blksize\099999\0")).unwrap()
            else {
                panic!("expected RRQ");
            };
            assert_eq!(request.options.block_size, Some(MAX_BLOCK_SIZE));

            let Packet::ReadRequest(request) =
                Packet::parse(&rrq(b"f\0octet\0blksize\04\0")).unwrap()
            else {
                panic!("expected RRQ");
            };
            assert_eq!(request.options.block_size, None);
        }

        #[test]
        fn test_invalid_option_values_are_declined() {
            let Packet::ReadRequest(request) =
                Packet::parse(&rrq(b"f\0octet\0timeout\00\0tsize\0big\0windowsize\04\0")).unwrap()
            else {
                panic!("expected RRQ");
            };
            assert!(request.options.is_empty());
        }

        #[test]
        fn test_write_request() {
            let mut packet = vec![0, 2];
            packet.extend_from_slice(b"upload.img\0netascii\0");
            let Packet::WriteRequest(request) = Packet::parse(&packet).unwrap() else {
                panic!("expected WRQ");
            };
            assert_eq!(request.filename, "upload.img");
            assert_eq!(request.mode, TransferMode::NetAscii);
            assert!(request.mode.is_supported());
        }

        #[test]
        fn test_unsupported_mode() {
            let Packet::ReadRequest(request) = Packet::parse(&rrq(b"f\0mail\0")).unwrap() else {
                panic!("expected RRQ");
            };
            assert!(!request.mode.is_supported());
            assert_eq!(request.mode.to_string(), "mail");
        }

        #[test]
        fn test_malformed_requests() {
            assert_eq!(
                Packet::parse(&rrq(b"boot.bin")),
                Err(PacketError::Unterminated)
            );
            assert_eq!(
                Packet::parse(&rrq(b"boot.bin\0")),
                Err(PacketError::MissingField("mode"))
            );
            assert_eq!(
                Packet::parse(&rrq(b"\0octet\0")),
                Err(PacketError::MissingField("filename"))
            );
            assert_eq!(
                Packet::parse(&rrq(b"")),
                Err(PacketError::MissingField("filename"))
            );
            assert_eq!(
                Packet::parse(&rrq(b"\xff\0octet\0")),
                Err(PacketError::InvalidString("field"))
            );
        }

        #[test]
        fn test_request_encoding_parses_back() {
            let request = Request {
                filename: "boot.bin".to_string(),
                mode: TransferMode::Octet,
                options: RequestOptions {
                    block_size: Some(1024),
                    transfer_size: Some(0),
                    timeout_secs: None,
                },
            };
            let bytes = Packet::ReadRequest(request.clone()).to_bytes();
            assert_eq!(&bytes[..2], &[0, 1]);
            assert_eq!(Packet::parse(&bytes).unwrap(), Packet::ReadRequest(request));
        }
    }

    mod packet_tests {
        use super::*;

        #[test]
        fn test_short_packets() {
            assert_eq!(Packet::parse(&[]), Err(PacketError::TooShort(0)));
            assert_eq!(Packet::parse(&[0]), Err(PacketError::TooShort(1)));
            assert_eq!(Packet::parse(&[0, 4, 0]), Err(PacketError::TooShort(3)));
        }

        #[test]
        fn test_unknown_opcode() {
            assert_eq!(
                Packet::parse(&[0, 9, 0, 0]),
                Err(PacketError::UnknownOpcode(9))
            );
        }

        #[test]
        fn test_data_packet() {
            let bytes = data_packet(7, b"abc");
            assert_eq!(bytes, vec![0, 3, 0, 7, b'a', b'b', b'c']);
            assert_eq!(
                Packet::parse(&bytes).unwrap(),
                Packet::Data {
                    block: 7,
                    data: b"abc".to_vec()
                }
            );
        }

        #[test]
        fn test_empty_data_packet() {
            assert_eq!(
                Packet::parse(&data_packet(3, &[])).unwrap(),
                Packet::Data {
                    block: 3,
                    data: Vec::new()
                }
            );
        }

        #[test]
        fn test_ack_packet() {
            assert_eq!(ack_packet(0x0102), vec![0, 4, 1, 2]);
            assert_eq!(Packet::parse(&[0, 4, 1, 2]).unwrap(), Packet::Ack(0x0102));
        }

        #[test]
        fn test_error_packet() {
            let bytes = error_packet(ErrorCode::FileNotFound, "File not found");
            assert_eq!(&bytes[..4], &[0, 5, 0, 1]);
            assert_eq!(bytes.last(), Some(&0));
            assert_eq!(
                Packet::parse(&bytes).unwrap(),
                Packet::Error {
                    code: 1,
                    message: "File not found".to_string()
                }
            );
        }

        #[test]
        fn test_error_without_terminator() {
            assert_eq!(
                Packet::parse(b"\0\x05\0\x02denied").unwrap(),
                Packet::Error {
                    code: 2,
                    message: "denied".to_string()
                }
            );
        }

        #[test]
        fn test_option_ack() {
            let oack = Packet::OptionAck(vec![
                ("blksize".to_string(), "1468".to_string()),
                ("tsize".to_string(), "42".to_string()),
            ]);
            let bytes = oack.to_bytes();
            assert_eq!(&bytes[..2], &[0, 6]);
            assert_eq!(&bytes[2..], b"blksize\01468\0tsize\042\0");
            assert_eq!(Packet::parse(&bytes).unwrap(), oack);
        }
    }

    #[test]
    fn test_opcode_values() {
        for value in 1..=6u16 {
            assert_eq!(Opcode::from_u16(value).map(Opcode::as_u16), Some(value));
        }
        assert_eq!(Opcode::from_u16(0), None);
        assert_eq!(Opcode::from_u16(7), None);
    }

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::FileNotFound.as_u16(), 1);
        assert_eq!(ErrorCode::AccessViolation.as_u16(), 2);
        assert_eq!(ErrorCode::IllegalOperation.as_u16(), 4);
        assert_eq!(ErrorCode::UnknownTransferId.as_u16(), 5);
        assert_eq!(ErrorCode::FileAlreadyExists.as_u16(), 6);
    }
}
