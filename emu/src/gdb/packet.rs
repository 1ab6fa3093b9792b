//! Remote serial protocol framing.
//!
//! ```text
//! $<payload>#<two hex digit checksum>
//! ```
//!
//! The checksum is the modulo-256 sum of the payload bytes. Outside a
//! packet the host may send `+`/`-` acknowledgements or a raw 0x03 to
//! interrupt the target.

use std::fmt::Write;

const INTERRUPT: u8 = 0x03;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Packet(String),
    /// A packet whose checksum did not match.
    Corrupt,
    Interrupt,
    Ack,
    Nack,
}

/// Accumulates bytes from the stream and splits them into frames.
#[derive(Debug, Default)]
pub struct PacketReader {
    buffer: Vec<u8>,
}

impl PacketReader {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let &first = self.buffer.first()?;
            match first {
                b'+' => {
                    self.buffer.remove(0);
                    return Some(Frame::Ack);
                }
                b'-' => {
                    self.buffer.remove(0);
                    return Some(Frame::Nack);
                }
                INTERRUPT => {
                    self.buffer.remove(0);
                    return Some(Frame::Interrupt);
                }
                b'$' => return self.take_packet(),
                _ => {
                    self.buffer.remove(0);
                }
            }
        }
    }

    fn take_packet(&mut self) -> Option<Frame> {
        let hash = self.buffer.iter().position(|&b| b == b'#')?;
        if self.buffer.len() < hash + 3 {
            return None;
        }

        let frame: Vec<u8> = self.buffer.drain(..hash + 3).collect();
        let payload = &frame[1..hash];
        let expected = std::str::from_utf8(&frame[hash + 1..])
            .ok()
            .and_then(|digits| u8::from_str_radix(digits, 16).ok());

        match expected {
            Some(sum) if sum == checksum(payload) => {
                Some(Frame::Packet(String::from_utf8_lossy(payload).into_owned()))
            }
            _ => Some(Frame::Corrupt),
        }
    }
}

#[must_use]
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

#[must_use]
pub fn encode(payload: &str) -> String {
    format!("${payload}#{:02x}", checksum(payload.as_bytes()))
}

/// Hex of `value` in target (little-endian) byte order.
#[must_use]
pub fn hex_u32_le(value: u32) -> String {
    hex_bytes(&value.to_le_bytes())
}

#[must_use]
pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[must_use]
pub fn parse_hex_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Parses a little-endian register image of exactly four bytes.
#[must_use]
pub fn parse_u32_le(hex: &str) -> Option<u32> {
    let bytes: [u8; 4] = parse_hex_bytes(hex)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Parses a big-endian hex number as used for addresses and lengths.
#[must_use]
pub fn parse_hex_u32(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encode_appends_checksum() {
        assert_eq!(encode("OK"), "$OK#9a");
        assert_eq!(encode(""), "$#00");
    }

    #[test]
    fn frames_split_across_pushes() {
        let mut reader = PacketReader::default();

        reader.push(b"+$g#");
        assert_eq!(reader.next_frame(), Some(Frame::Ack));
        assert_eq!(reader.next_frame(), None);

        reader.push(b"67\x03");
        assert_eq!(reader.next_frame(), Some(Frame::Packet("g".to_string())));
        assert_eq!(reader.next_frame(), Some(Frame::Interrupt));
        assert_eq!(reader.next_frame(), None);
    }

    #[test]
    fn bad_checksum_is_corrupt() {
        let mut reader = PacketReader::default();

        reader.push(b"junk$g#00-");

        assert_eq!(reader.next_frame(), Some(Frame::Corrupt));
        assert_eq!(reader.next_frame(), Some(Frame::Nack));
    }

    #[test]
    fn hex_helpers() {
        assert_eq!(hex_u32_le(0x1234_5678), "78563412");
        assert_eq!(parse_u32_le("78563412"), Some(0x1234_5678));
        assert_eq!(parse_u32_le("7856"), None);
        assert_eq!(parse_hex_bytes("0aFF"), Some(vec![0x0A, 0xFF]));
        assert_eq!(parse_hex_bytes("0"), None);
        assert_eq!(parse_hex_u32("10000000"), Some(0x1000_0000));
    }
}
