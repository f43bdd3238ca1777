//! Auxiliary Security Header length accounting.
//!
//! Security processing itself is out of scope for this stack; the parser
//! only needs to know how many octets the header occupies so the field
//! index table can step over it.

use super::{Error, Result};

/// A reader for the IEEE 802.15.4 Auxiliary Security Header.
#[derive(Debug)]
pub struct AuxSecurityHeader<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> AuxSecurityHeader<T> {
    /// Create a new [`AuxSecurityHeader`] reader from a given buffer.
    pub fn new(buffer: T) -> Result<Self> {
        if buffer.as_ref().is_empty() {
            return Err(Error::Truncated);
        }

        let header = Self { buffer };
        if header.buffer.as_ref().len() < header.len() {
            return Err(Error::Truncated);
        }

        Ok(header)
    }

    /// Return the length of the header in octets.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        let control = self.buffer.as_ref()[0];
        let frame_counter_suppressed = (control >> 5) & 0b1 == 1;
        let key_id_mode = (control >> 3) & 0b11;

        1 + if frame_counter_suppressed { 0 } else { 4 }
            + match key_id_mode {
                0b00 => 0,
                0b01 => 1,
                0b10 => 5,
                _ => 9,
            }
    }

    /// Return the security level bits of the security control field.
    pub fn security_level(&self) -> u8 {
        self.buffer.as_ref()[0] & 0b111
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lengths() {
        // Level 5, key id mode 1, frame counter present.
        let header = AuxSecurityHeader::new(&[0x0d, 0, 0, 0, 0, 0x01][..]).unwrap();
        assert_eq!(header.len(), 6);
        assert_eq!(header.security_level(), 5);

        // Frame counter suppressed, no key id.
        let header = AuxSecurityHeader::new(&[0x20][..]).unwrap();
        assert_eq!(header.len(), 1);

        assert!(AuxSecurityHeader::new(&[0x0d, 0][..]).is_err());
    }
}
