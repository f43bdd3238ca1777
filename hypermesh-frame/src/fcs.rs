//! Frame Check Sequence handling.

use crate::{Error, Frame, Result};

// The FCS is a 16-bit ITU-T CRC with the x^16 + x^12 + x^5 + 1 polynomial,
// but with initial and final values of 0x0000 instead of 0xffff, computed
// over the whole frame excluding the FCS itself.
const CRC_16_IEEE802154: crc::Algorithm<u16> = crc::Algorithm {
    width: 16,
    poly: 0x1021,
    init: 0x0000,
    refin: true,
    refout: true,
    xorout: 0x0000,
    check: 0x2189,
    residue: 0x0000,
};

/// A frame followed by its 2-octet Frame Check Sequence.
pub struct FrameWithFcs<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> FrameWithFcs<T> {
    /// Create a new [`FrameWithFcs`] from a given buffer, verifying the FCS.
    pub fn new(buffer: T) -> Result<Self> {
        if buffer.as_ref().len() < 2 {
            return Err(Error::Truncated);
        }

        let frame = Self { buffer };
        if frame.calculate_fcs() != frame.fcs() {
            return Err(Error::Truncated);
        }

        Ok(frame)
    }

    /// Return the content of the frame, excluding the FCS.
    pub fn content(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        &data[..data.len() - 2]
    }

    /// Return the Frame Check Sequence.
    pub fn fcs(&self) -> u16 {
        let data = self.buffer.as_ref();
        u16::from_le_bytes([data[data.len() - 2], data[data.len() - 1]])
    }

    /// Calculate the Frame Check Sequence over the content.
    pub fn calculate_fcs(&self) -> u16 {
        crc::Crc::<u16>::new(&CRC_16_IEEE802154).checksum(self.content())
    }

    /// Parse the frame content.
    pub fn frame(&self) -> Result<Frame<&'_ [u8]>> {
        Frame::parse(self.content())
    }
}

/// Append the FCS for `frame[..len]` behind it, returning the total length.
///
/// # Errors
///
/// Returns [`Error::NoResources`] when the buffer has no room for the two
/// FCS octets.
pub fn append_fcs(buffer: &mut [u8], len: usize) -> Result<usize> {
    if buffer.len() < len + 2 {
        return Err(Error::NoResources);
    }

    let fcs = crc::Crc::<u16>::new(&CRC_16_IEEE802154).checksum(&buffer[..len]);
    buffer[len..len + 2].copy_from_slice(&fcs.to_le_bytes());
    Ok(len + 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_fixture() {
        let frame_with_fcs = [
            0x02, 0x2e, 0x8d, 0xcd, 0xab, 0x02, 0x00, 0x02, 0x00, 0x02, 0x00, 0x02, 0x00, 0x02,
            0x0f, 0x00, 0x00, 0x7d, 0xd4,
        ];
        let frame = FrameWithFcs::new(&frame_with_fcs[..]).unwrap();
        assert_eq!(frame.fcs(), 0xd47d);

        let mut corrupted = frame_with_fcs;
        corrupted[3] ^= 0xff;
        assert!(FrameWithFcs::new(&corrupted[..]).is_err());
    }

    #[test]
    fn append_and_verify() {
        let mut buffer = [0u8; 8];
        buffer[..3].copy_from_slice(&[0x02, 0x20, 0x01]);
        let total = append_fcs(&mut buffer, 3).unwrap();
        assert_eq!(total, 5);
        assert!(FrameWithFcs::new(&buffer[..total]).is_ok());
    }
}
