//! TSCH nested Information Elements: synchronization, slotframe and link,
//! and timeslot timings.

use bitflags::bitflags;
use heapless::Vec;

use crate::{Error, Result};

/// A reader/writer for the TSCH Synchronization IE content (sub-ID `0x1a`).
///
/// ```notrust
/// +----------------+-------------+
/// | ASN (5 octets) | Join metric |
/// +----------------+-------------+
/// 0                5             6
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TschSynchronization<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> TschSynchronization<T> {
    /// The content length of the IE in octets.
    pub const LEN: usize = 6;

    /// Create a new [`TschSynchronization`] reader/writer from a given buffer.
    pub fn new(data: T) -> Result<Self> {
        if data.as_ref().len() < Self::LEN {
            return Err(Error::Truncated);
        }
        Ok(Self { data })
    }

    /// Return the absolute slot number field.
    pub fn absolute_slot_number(&self) -> u64 {
        let data = self.data.as_ref();
        let mut asn = 0u64;
        for i in (0..5).rev() {
            asn = (asn << 8) | data[i] as u64;
        }
        asn
    }

    /// Return the join metric field.
    pub fn join_metric(&self) -> u8 {
        self.data.as_ref()[5]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> TschSynchronization<T> {
    /// Set the absolute slot number field.
    pub fn set_absolute_slot_number(&mut self, asn: u64) {
        let data = self.data.as_mut();
        for (i, b) in data[..5].iter_mut().enumerate() {
            *b = (asn >> (8 * i)) as u8;
        }
    }

    /// Set the join metric field.
    pub fn set_join_metric(&mut self, join_metric: u8) {
        self.data.as_mut()[5] = join_metric;
    }
}

impl<T: AsRef<[u8]>> core::fmt::Display for TschSynchronization<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "ASN: {}, join metric: {}",
            self.absolute_slot_number(),
            self.join_metric()
        )
    }
}

bitflags! {
    /// TSCH link options bitfield.
    /// ```notrust
    /// +----+----+--------+--------------+----------+----------+
    /// | Tx | Rx | Shared | Time keeping | Priority | Reserved |
    /// +----+----+--------+--------------+----------+----------+
    /// ```
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct TschLinkOption: u8 {
        /// Transmit.
        const Tx = 0b0000_0001;
        /// Receive.
        const Rx = 0b0000_0010;
        /// Shared.
        const Shared = 0b0000_0100;
        /// Time keeping.
        const TimeKeeping = 0b0000_1000;
        /// Priority.
        const Priority = 0b0001_0000;
    }
}

impl core::fmt::Debug for TschLinkOption {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

/// A reader for the Link Information field of a slotframe descriptor.
///
/// ```notrust
/// +----------+----------------+--------------+
/// | Timeslot | Channel offset | Link options |
/// +----------+----------------+--------------+
/// 0          2                4              5
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LinkInformation<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> LinkInformation<T> {
    /// The length of the Link Information field in octets.
    pub const LEN: usize = 5;

    /// Create a new [`LinkInformation`] reader from a given buffer.
    pub fn new(data: T) -> Result<Self> {
        if data.as_ref().len() < Self::LEN {
            return Err(Error::Truncated);
        }
        Ok(Self { data })
    }

    /// Return the timeslot field.
    pub fn timeslot(&self) -> u16 {
        let b = &self.data.as_ref()[0..2];
        u16::from_le_bytes([b[0], b[1]])
    }

    /// Return the channel offset field.
    pub fn channel_offset(&self) -> u16 {
        let b = &self.data.as_ref()[2..4];
        u16::from_le_bytes([b[0], b[1]])
    }

    /// Return the link options field.
    pub fn link_options(&self) -> TschLinkOption {
        TschLinkOption::from_bits_truncate(self.data.as_ref()[4])
    }
}

/// An [`Iterator`] over [`LinkInformation`].
#[derive(Debug, Clone)]
pub struct LinkInformationIterator<'f> {
    data: &'f [u8],
    remaining: usize,
}

impl<'f> LinkInformationIterator<'f> {
    fn new(data: &'f [u8], links: usize) -> Self {
        Self {
            data,
            remaining: links,
        }
    }
}

impl<'f> Iterator for LinkInformationIterator<'f> {
    type Item = LinkInformation<&'f [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let Ok(info) = LinkInformation::new(self.data) else {
            self.remaining = 0;
            return None;
        };

        self.data = &self.data[LinkInformation::<&[u8]>::LEN..];
        self.remaining -= 1;

        Some(info)
    }
}

/// A reader for a Slotframe Descriptor.
///
/// ```notrust
/// +--------+------+-------+----------------------+
/// | Handle | Size | Links | Link informations... |
/// +--------+------+-------+----------------------+
/// 0        1      3       4
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SlotframeDescriptor<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> SlotframeDescriptor<T> {
    /// Create a new [`SlotframeDescriptor`] reader from a given buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot hold the number of links the
    /// descriptor claims.
    pub fn new(data: T) -> Result<Self> {
        let descriptor = Self { data };

        if descriptor.data.as_ref().len() < 4 {
            return Err(Error::Truncated);
        }

        if descriptor.data.as_ref().len() < descriptor.len() {
            return Err(Error::Truncated);
        }

        Ok(descriptor)
    }

    /// Return the length of the descriptor in octets, links included.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        4 + self.links() as usize * LinkInformation::<&[u8]>::LEN
    }

    /// Return the slotframe handle field.
    pub fn handle(&self) -> u8 {
        self.data.as_ref()[0]
    }

    /// Return the slotframe size field, in timeslots.
    pub fn size(&self) -> u16 {
        let b = &self.data.as_ref()[1..3];
        u16::from_le_bytes([b[0], b[1]])
    }

    /// Return the number of links field.
    pub fn links(&self) -> u8 {
        self.data.as_ref()[3]
    }

    /// Returns an [`Iterator`] over the link informations.
    pub fn link_informations(&self) -> LinkInformationIterator<'_> {
        LinkInformationIterator::new(&self.data.as_ref()[4..], self.links() as usize)
    }
}

/// An [`Iterator`] over [`SlotframeDescriptor`].
#[derive(Debug, Clone)]
pub struct SlotframeDescriptorIterator<'f> {
    data: &'f [u8],
    remaining: usize,
}

impl<'f> Iterator for SlotframeDescriptorIterator<'f> {
    type Item = SlotframeDescriptor<&'f [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let Ok(descriptor) = SlotframeDescriptor::new(self.data) else {
            self.remaining = 0;
            return None;
        };

        self.data = &self.data[descriptor.len()..];
        self.remaining -= 1;

        Some(descriptor)
    }
}

/// A reader for the TSCH Slotframe and Link IE content (sub-ID `0x1b`).
///
/// ```notrust
/// +----------------------+--------------------------+
/// | Number of slotframes | Slotframe descriptors... |
/// +----------------------+--------------------------+
/// 0                      1
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TschSlotframeAndLink<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> TschSlotframeAndLink<T> {
    /// Create a new [`TschSlotframeAndLink`] reader from a given buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot hold the descriptors it claims
    /// to contain.
    pub fn new(data: T) -> Result<Self> {
        let ie = Self { data };

        if ie.data.as_ref().is_empty() {
            return Err(Error::Truncated);
        }

        // Walking the descriptors validates every claimed count.
        let claimed = ie.number_of_slotframes() as usize;
        if ie.slotframe_descriptors().count() != claimed {
            return Err(Error::Truncated);
        }

        Ok(ie)
    }

    /// Return the number of slotframes field.
    pub fn number_of_slotframes(&self) -> u8 {
        self.data.as_ref()[0]
    }

    /// Returns an [`Iterator`] over the slotframe descriptors.
    pub fn slotframe_descriptors(&self) -> SlotframeDescriptorIterator<'_> {
        SlotframeDescriptorIterator {
            data: &self.data.as_ref()[1..],
            remaining: self.number_of_slotframes() as usize,
        }
    }
}

/// High-level representation of a link information entry, used for building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInformationRepr {
    /// The timeslot index inside the slotframe.
    pub timeslot: u16,
    /// The channel offset of the link.
    pub channel_offset: u16,
    /// The link option bits.
    pub link_options: TschLinkOption,
}

impl LinkInformationRepr {
    fn emit(&self, buffer: &mut [u8]) {
        buffer[0..2].copy_from_slice(&self.timeslot.to_le_bytes());
        buffer[2..4].copy_from_slice(&self.channel_offset.to_le_bytes());
        buffer[4] = self.link_options.bits();
    }
}

/// High-level representation of a slotframe descriptor, used for building.
#[derive(Debug, Clone, Default)]
pub struct SlotframeDescriptorRepr {
    /// The slotframe handle.
    pub handle: u8,
    /// The slotframe size in timeslots.
    pub size: u16,
    /// The links of the slotframe.
    pub links: Vec<LinkInformationRepr, 8>,
}

impl SlotframeDescriptorRepr {
    fn buffer_len(&self) -> usize {
        4 + self.links.len() * LinkInformation::<&[u8]>::LEN
    }

    fn emit(&self, buffer: &mut [u8]) {
        buffer[0] = self.handle;
        buffer[1..3].copy_from_slice(&self.size.to_le_bytes());
        buffer[3] = self.links.len() as u8;
        for (i, link) in self.links.iter().enumerate() {
            link.emit(&mut buffer[4 + i * LinkInformation::<&[u8]>::LEN..]);
        }
    }
}

/// High-level representation of the TSCH Slotframe and Link IE content.
///
/// The emitted counts always reflect the actual number of descriptors and
/// links, so the builder cannot produce a count mismatch.
#[derive(Debug, Clone, Default)]
pub struct TschSlotframeAndLinkRepr {
    /// The slotframe descriptors.
    pub slotframes: Vec<SlotframeDescriptorRepr, 4>,
}

impl TschSlotframeAndLinkRepr {
    /// Return the buffer length required to emit the content.
    pub fn buffer_len(&self) -> usize {
        1 + self
            .slotframes
            .iter()
            .map(|sf| sf.buffer_len())
            .sum::<usize>()
    }

    /// Emit the content into a buffer.
    ///
    /// # Panics
    /// Panics if the buffer is shorter than [`Self::buffer_len`].
    pub fn emit(&self, buffer: &mut [u8]) {
        buffer[0] = self.slotframes.len() as u8;
        let mut offset = 1;
        for slotframe in self.slotframes.iter() {
            slotframe.emit(&mut buffer[offset..]);
            offset += slotframe.buffer_len();
        }
    }
}

/// A reader/writer for the TSCH Timeslot IE content (sub-ID `0x1c`).
///
/// A single-octet content carries only the timeslot template ID; the default
/// template (ID 0) implies the standard 10 ms timings. A full content spells
/// the timings out as little-endian microsecond fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TschTimeslot<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> TschTimeslot<T> {
    /// The default timeslot template ID.
    pub const DEFAULT_ID: u8 = 0;

    /// Create a new [`TschTimeslot`] reader/writer from a given buffer.
    pub fn new(data: T) -> Result<Self> {
        let ts = Self { data };

        let len = ts.data.as_ref().len();
        if len < 1 || (ts.id() != Self::DEFAULT_ID && len < 25) {
            return Err(Error::Truncated);
        }

        Ok(ts)
    }

    /// Return the timeslot template ID field.
    pub fn id(&self) -> u8 {
        self.data.as_ref()[0]
    }

    fn field(&self, offset: usize) -> u16 {
        let b = &self.data.as_ref()[offset..][..2];
        u16::from_le_bytes([b[0], b[1]])
    }

    /// Return the offset from slot start to TX start, in microseconds.
    pub fn tx_offset_us(&self) -> u16 {
        if self.id() == Self::DEFAULT_ID {
            2120
        } else {
            self.field(5)
        }
    }

    /// Return the offset from slot start to RX start, in microseconds.
    pub fn rx_offset_us(&self) -> u16 {
        if self.id() == Self::DEFAULT_ID {
            1020
        } else {
            self.field(7)
        }
    }

    /// Return the receive window, in microseconds.
    pub fn rx_wait_us(&self) -> u16 {
        if self.id() == Self::DEFAULT_ID {
            2200
        } else {
            self.field(13)
        }
    }

    /// Return the total timeslot length, in microseconds.
    pub fn timeslot_length_us(&self) -> u16 {
        if self.id() == Self::DEFAULT_ID {
            10_000
        } else {
            self.field(23)
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> TschTimeslot<T> {
    /// Set the timeslot template ID field.
    pub fn set_id(&mut self, id: u8) {
        self.data.as_mut()[0] = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synchronization_asn() {
        let mut data = [0u8; 6];
        let mut ie = TschSynchronization::new(&mut data[..]).unwrap();
        ie.set_absolute_slot_number(0x0102030405);
        ie.set_join_metric(2);

        assert_eq!(data, [0x05, 0x04, 0x03, 0x02, 0x01, 0x02]);

        let ie = TschSynchronization::new(&data[..]).unwrap();
        assert_eq!(ie.absolute_slot_number(), 0x0102030405);
        assert_eq!(ie.join_metric(), 2);
    }

    #[test]
    fn slotframe_and_link_roundtrip() {
        let mut repr = TschSlotframeAndLinkRepr::default();
        let mut sf = SlotframeDescriptorRepr {
            handle: 1,
            size: 101,
            links: Vec::new(),
        };
        sf.links
            .push(LinkInformationRepr {
                timeslot: 3,
                channel_offset: 5,
                link_options: TschLinkOption::Tx | TschLinkOption::Shared,
            })
            .unwrap();
        repr.slotframes.push(sf).unwrap();

        let mut buffer = [0u8; 32];
        let len = repr.buffer_len();
        assert_eq!(len, 1 + 4 + 5);
        repr.emit(&mut buffer[..len]);

        let ie = TschSlotframeAndLink::new(&buffer[..len]).unwrap();
        assert_eq!(ie.number_of_slotframes(), 1);

        let descriptor = ie.slotframe_descriptors().next().unwrap();
        assert_eq!(descriptor.handle(), 1);
        assert_eq!(descriptor.size(), 101);
        assert_eq!(descriptor.links(), 1);

        let link = descriptor.link_informations().next().unwrap();
        assert_eq!(link.timeslot(), 3);
        assert_eq!(link.channel_offset(), 5);
        assert_eq!(
            link.link_options(),
            TschLinkOption::Tx | TschLinkOption::Shared
        );
    }

    #[test]
    fn truncated_descriptor_rejected() {
        // Claims two slotframes but carries only one.
        let data = [0x02, 0x01, 0x65, 0x00, 0x00];
        assert!(TschSlotframeAndLink::new(&data[..]).is_err());
    }

    #[test]
    fn default_timeslot_template() {
        let data = [0x00];
        let ts = TschTimeslot::new(&data[..]).unwrap();
        assert_eq!(ts.id(), 0);
        assert_eq!(ts.timeslot_length_us(), 10_000);
        assert_eq!(ts.tx_offset_us(), 2120);
    }
}
