//! Small formatting helpers shared by the servers.

use std::fmt::Write;

use macaddr::MacAddr6;

/// Format a MAC address for display (`AA:BB:CC:DD:EE:FF`).
pub fn format_mac(mac: MacAddr6) -> String {
    format!("{}", mac).to_uppercase()
}

/// Format an arbitrary hardware address as colon-separated hex.
pub fn format_hw_addr(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Render bytes as a classic offset / hex / printable-ASCII dump,
/// 16 bytes per line.
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::new();

    for (line, chunk) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:6}: ", line * 16);
        for byte in chunk {
            let _ = write!(out, "{:02x} ", byte);
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push_str("  ");
        for &byte in chunk {
            let c = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            };
            out.push(c);
        }
        out.push('\n');
    }

    out
}
