//! UDP header reader/writer.

use super::{upper_layer_checksum, Error, Ipv6Addr, Result};

/// A reader/writer for the UDP header.
///
/// ```notrust
/// +----------+----------+--------+----------+
/// | Src port | Dst port | Length | Checksum |
/// +----------+----------+--------+----------+
/// 0          2          4        6          8
/// ```
pub struct UdpPacket<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> UdpPacket<T> {
    /// The UDP header length in octets.
    pub const HEADER_LEN: usize = 8;

    /// Create a new [`UdpPacket`] reader/writer from a given buffer.
    pub fn new(buffer: T) -> Result<Self> {
        if buffer.as_ref().len() < Self::HEADER_LEN {
            return Err(Error::Truncated);
        }
        Ok(Self { buffer })
    }

    /// Return the source port field.
    pub fn src_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        u16::from_be_bytes([data[0], data[1]])
    }

    /// Return the destination port field.
    pub fn dst_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        u16::from_be_bytes([data[2], data[3]])
    }

    /// Return the length field (header included).
    pub fn length(&self) -> u16 {
        let data = self.buffer.as_ref();
        u16::from_be_bytes([data[4], data[5]])
    }

    /// Return the checksum field.
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        u16::from_be_bytes([data[6], data[7]])
    }

    /// Return the datagram payload.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[Self::HEADER_LEN..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> UdpPacket<T> {
    /// Set the source port field.
    pub fn set_src_port(&mut self, port: u16) {
        self.buffer.as_mut()[0..2].copy_from_slice(&port.to_be_bytes());
    }

    /// Set the destination port field.
    pub fn set_dst_port(&mut self, port: u16) {
        self.buffer.as_mut()[2..4].copy_from_slice(&port.to_be_bytes());
    }

    /// Set the length field.
    pub fn set_length(&mut self, length: u16) {
        self.buffer.as_mut()[4..6].copy_from_slice(&length.to_be_bytes());
    }

    /// Set the checksum field.
    pub fn set_checksum(&mut self, checksum: u16) {
        self.buffer.as_mut()[6..8].copy_from_slice(&checksum.to_be_bytes());
    }

    /// Compute and fill the checksum over the whole datagram.
    pub fn fill_checksum(&mut self, src: &Ipv6Addr, dst: &Ipv6Addr) {
        self.set_checksum(0);
        let length = self.length() as usize;
        let checksum = upper_layer_checksum(
            src,
            dst,
            super::next_header::UDP,
            &self.buffer.as_ref()[..length],
        );
        // An all-zero UDP checksum means "not computed"; RFC 768 maps it to
        // the all-ones form.
        self.set_checksum(if checksum == 0 { 0xffff } else { checksum });
    }
}
