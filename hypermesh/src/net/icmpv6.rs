//! ICMPv6 echo messages, the carrier of coordinate requests.

use super::{upper_layer_checksum, Error, Ipv6Addr, Result};

/// ICMPv6 echo request type.
pub const ECHO_REQUEST: u8 = 128;
/// ICMPv6 echo reply type.
pub const ECHO_REPLY: u8 = 129;

/// A reader/writer for an ICMPv6 echo message.
///
/// ```notrust
/// +------+------+----------+------------+----------+
/// | Type | Code | Checksum | Identifier | Sequence |
/// +------+------+----------+------------+----------+
/// 0      1      2          4            6          8
/// ```
pub struct Icmpv6Echo<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Icmpv6Echo<T> {
    /// The echo header length in octets.
    pub const HEADER_LEN: usize = 8;

    /// Create a new [`Icmpv6Echo`] reader/writer from a given buffer.
    pub fn new(buffer: T) -> Result<Self> {
        if buffer.as_ref().len() < Self::HEADER_LEN {
            return Err(Error::Truncated);
        }
        Ok(Self { buffer })
    }

    /// Return the message type field.
    pub fn msg_type(&self) -> u8 {
        self.buffer.as_ref()[0]
    }

    /// Return the code field.
    pub fn code(&self) -> u8 {
        self.buffer.as_ref()[1]
    }

    /// Return the checksum field.
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        u16::from_be_bytes([data[2], data[3]])
    }

    /// Return the identifier field.
    pub fn identifier(&self) -> u16 {
        let data = self.buffer.as_ref();
        u16::from_be_bytes([data[4], data[5]])
    }

    /// Return the sequence number field.
    pub fn sequence(&self) -> u16 {
        let data = self.buffer.as_ref();
        u16::from_be_bytes([data[6], data[7]])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Icmpv6Echo<T> {
    /// Set the message type field.
    pub fn set_msg_type(&mut self, msg_type: u8) {
        self.buffer.as_mut()[0] = msg_type;
    }

    /// Set the code field.
    pub fn set_code(&mut self, code: u8) {
        self.buffer.as_mut()[1] = code;
    }

    /// Set the identifier field.
    pub fn set_identifier(&mut self, identifier: u16) {
        self.buffer.as_mut()[4..6].copy_from_slice(&identifier.to_be_bytes());
    }

    /// Set the sequence number field.
    pub fn set_sequence(&mut self, sequence: u16) {
        self.buffer.as_mut()[6..8].copy_from_slice(&sequence.to_be_bytes());
    }

    /// Compute and fill the checksum over the whole message.
    pub fn fill_checksum(&mut self, src: &Ipv6Addr, dst: &Ipv6Addr) {
        self.buffer.as_mut()[2..4].fill(0);
        let checksum = upper_layer_checksum(
            src,
            dst,
            super::next_header::ICMPV6,
            self.buffer.as_ref(),
        );
        self.buffer.as_mut()[2..4].copy_from_slice(&checksum.to_be_bytes());
    }
}
