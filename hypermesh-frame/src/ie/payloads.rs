//! Payload Information Elements.
//!
//! ```notrust
//! +--------------+--------------+--------+--------------------------+
//! | Length (11b) | Group ID (4b)| Type=1 | Content (0-2047 octets)..|
//! +--------------+--------------+--------+--------------------------+
//! ```

use super::{content_length, read_control, IeKind, NestedIeIterator};
use crate::{Error, Result};

/// Payload Information Element group ID.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadGroupId {
    /// Encapsulated Service Data Unit.
    Esdu = 0x0,
    /// MLME group: contains nested IEs.
    Mlme = 0x1,
    /// Vendor specific.
    VendorSpecific = 0x2,
    /// Payload termination: the payload follows.
    Termination = 0xf,
    /// Unknown.
    Unknown,
}

impl From<u8> for PayloadGroupId {
    fn from(value: u8) -> Self {
        match value {
            0x0 => Self::Esdu,
            0x1 => Self::Mlme,
            0x2 => Self::VendorSpecific,
            0xf => Self::Termination,
            _ => Self::Unknown,
        }
    }
}

/// A reader for a Payload Information Element.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct PayloadIe<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> PayloadIe<T> {
    /// Create a new [`PayloadIe`] reader from a given buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is too short to contain the element.
    pub fn new(data: T) -> Result<Self> {
        let ie = Self::new_unchecked(data);

        if !ie.check_len() {
            return Err(Error::Truncated);
        }

        Ok(ie)
    }

    /// Returns `false` if the buffer is too short to contain the element.
    fn check_len(&self) -> bool {
        let data = self.data.as_ref();
        if data.len() < 2 {
            return false;
        }
        data.len() >= 2 + self.length()
    }

    /// Create a new [`PayloadIe`] reader without length checking.
    pub fn new_unchecked(data: T) -> Self {
        Self { data }
    }

    fn control(&self) -> u16 {
        read_control(self.data.as_ref()).unwrap_or(0)
    }

    /// Return the content length of the element in octets.
    #[allow(clippy::len_without_is_empty)]
    pub fn length(&self) -> usize {
        content_length(self.control(), IeKind::Payload)
    }

    /// Return the group ID.
    pub fn group_id(&self) -> PayloadGroupId {
        PayloadGroupId::from(((self.control() >> 11) & 0xf) as u8)
    }

    /// Return the content of the element.
    pub fn content(&self) -> &[u8] {
        &self.data.as_ref()[2..][..self.length()]
    }

    /// Returns an [`Iterator`] over the nested IEs inside this element.
    ///
    /// Meaningful for the MLME group; other groups carry opaque content.
    pub fn nested_ies(&self) -> NestedIeIterator<'_> {
        NestedIeIterator::new(self.content())
    }
}

/// Encode a payload IE control word.
pub fn payload_ie_control(group_id: u8, length: usize) -> u16 {
    (length as u16 & 0x7ff) | (((group_id as u16) & 0xf) << 11) | 0x8000
}

/// An [`Iterator`] over the Payload Information Elements of a frame.
///
/// Stops at, and consumes, a payload termination element.
#[derive(Debug, Clone)]
pub struct PayloadIeIterator<'f> {
    data: &'f [u8],
    offset: usize,
    terminated: bool,
}

impl<'f> PayloadIeIterator<'f> {
    /// Create a new [`PayloadIeIterator`] over a buffer starting at the
    /// first payload IE.
    pub fn new(data: &'f [u8]) -> Self {
        Self {
            data,
            offset: 0,
            terminated: data.is_empty(),
        }
    }

    /// The number of bytes consumed so far, terminator included.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'f> Iterator for PayloadIeIterator<'f> {
    type Item = PayloadIe<&'f [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.terminated {
            return None;
        }

        let Ok(ie) = PayloadIe::new(&self.data[self.offset..]) else {
            self.terminated = true;
            return None;
        };

        let len = 2 + ie.length();
        let ie = PayloadIe::new_unchecked(&self.data[self.offset..][..len]);
        self.offset += len;

        if matches!(ie.group_id(), PayloadGroupId::Termination) {
            self.terminated = true;
            return None;
        }

        if self.offset >= self.data.len() {
            self.terminated = true;
        }

        Some(ie)
    }
}
