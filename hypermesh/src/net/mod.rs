//! Minimal IPv6, UDP and ICMPv6 wire types.
//!
//! Zero-copy readers/writers in the same shape as the MAC codec: a thin
//! struct over a borrowed buffer, with accessors per field. All fields are
//! big-endian per RFC 8200, unlike the little-endian MAC layer.

mod checksum;
pub use checksum::*;

mod ipv6;
pub use ipv6::*;

mod udp;
pub use udp::*;

mod icmpv6;
pub use icmpv6::*;

/// An error raised while reading or writing a network packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The buffer is too short for the structure it claims to contain.
    Truncated,
    /// A capacity was exceeded.
    NoResources,
    /// The packet is not what the caller expected it to be.
    Malformed,
}

/// A type alias for `Result<T, net::Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Largest IPv6 packet the stack handles: the IPv6 minimum MTU.
pub const MAX_PACKET_LEN: usize = 1280;

/// A fixed-capacity IPv6 packet buffer with byte insertion and removal, so
/// extension headers can be spliced in without reallocating.
pub struct PacketBuf {
    bytes: [u8; MAX_PACKET_LEN],
    len: usize,
}

impl Default for PacketBuf {
    fn default() -> Self {
        Self {
            bytes: [0; MAX_PACKET_LEN],
            len: 0,
        }
    }
}

impl PacketBuf {
    /// Create an empty packet buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packet buffer holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_PACKET_LEN {
            return Err(Error::NoResources);
        }
        let mut buf = Self::new();
        buf.bytes[..bytes.len()].copy_from_slice(bytes);
        buf.len = bytes.len();
        Ok(buf)
    }

    /// The used length.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Set the used length, e.g. after in-place building.
    pub fn set_len(&mut self, len: usize) -> Result<()> {
        if len > MAX_PACKET_LEN {
            return Err(Error::NoResources);
        }
        self.len = len;
        Ok(())
    }

    /// The packet bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The packet bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.len]
    }

    /// The full backing storage, for building into.
    pub fn storage_mut(&mut self) -> &mut [u8; MAX_PACKET_LEN] {
        &mut self.bytes
    }

    /// Open a gap of `count` zeroed bytes at `offset`, shifting the tail
    /// right, and return the gap.
    pub fn insert(&mut self, offset: usize, count: usize) -> Result<&mut [u8]> {
        if offset > self.len || self.len + count > MAX_PACKET_LEN {
            return Err(Error::NoResources);
        }

        self.bytes.copy_within(offset..self.len, offset + count);
        self.len += count;
        let gap = &mut self.bytes[offset..offset + count];
        gap.fill(0);
        Ok(gap)
    }

    /// Remove `count` bytes at `offset`, shifting the tail left.
    pub fn remove(&mut self, offset: usize, count: usize) -> Result<()> {
        if offset + count > self.len {
            return Err(Error::Truncated);
        }

        self.bytes.copy_within(offset + count..self.len, offset);
        self.len -= count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove() {
        let mut buf = PacketBuf::from_bytes(&[1, 2, 3, 4]).unwrap();

        let gap = buf.insert(2, 3).unwrap();
        gap.copy_from_slice(&[9, 9, 9]);
        assert_eq!(buf.as_slice(), &[1, 2, 9, 9, 9, 3, 4]);

        buf.remove(2, 3).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);

        assert!(buf.remove(3, 2).is_err());
    }
}
