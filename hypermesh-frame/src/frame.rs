//! The [`Frame`] reader/builder and its field index table maintenance.

use heapless::Vec;

use crate::{
    header_ie_control, pan_id_presence, payload_ie_control, Address, Addressing, AddressingMode,
    AuxSecurityHeader, Error, Field, FieldOffsets, FrameControl, FrameType, FrameVersion,
    HeaderIe, HeaderIeId, HeaderIeIterator, IeKind, NestedSubId, PayloadGroupId, PayloadIe,
    PayloadIeIterator, Result,
};

/// Where a frame under construction currently is in the build sequence.
///
/// The sections of a frame are written front to back; a mutator that would
/// have to move already-written IE bytes is refused with [`Error::Phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildStage {
    /// Header fields (sequence number, addressing) may still change.
    Fields,
    /// Header IEs have been appended.
    HeaderIes,
    /// Payload IEs have been appended.
    PayloadIes,
    /// The payload has been written; the frame is complete.
    Payload,
}

/// An IE whose length bits still grow as children are appended.
#[derive(Debug, Clone, Copy)]
struct OpenIe {
    start: usize,
    kind: IeKind,
}

/// An IEEE 802.15.4-2015 frame: a byte buffer plus the field index table
/// locating each structural section.
///
/// For incoming frames, [`Frame::parse`] walks the header once and fills the
/// table. For outgoing frames, `init_*` starts an empty frame and each
/// mutator keeps the table current while appending.
pub struct Frame<T: AsRef<[u8]>> {
    buffer: T,
    len: usize,
    offsets: FieldOffsets,
    open: Vec<OpenIe, 3>,
    stage: BuildStage,
}

impl<T: AsRef<[u8]>> Frame<T> {
    /// Parse a filled buffer, computing the field index table.
    ///
    /// Parsing is pure: it never modifies the buffer and may be repeated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] when the buffer is shorter than the
    /// sections it announces, and [`Error::InvalidAddressing`] when the
    /// frame is not version 2015 or the addressing modes and PAN ID
    /// compression bit do not form a valid row of the presence table.
    pub fn parse(buffer: T) -> Result<Self> {
        let len = buffer.as_ref().len();
        let mut offsets = FieldOffsets::empty();

        {
            let data = buffer.as_ref();
            let fc = FrameControl::new(data)?;

            let mut offset = FrameControl::<&[u8]>::LEN;

            offsets.set(Field::SequenceNumber, offset);
            if !fc.sequence_number_suppression() {
                offset += 1;
            }

            let dst_mode = fc.dst_addressing_mode();
            let src_mode = fc.src_addressing_mode();
            if dst_mode == AddressingMode::Unknown || src_mode == AddressingMode::Unknown {
                return Err(Error::InvalidAddressing);
            }

            if fc.frame_version() != FrameVersion::Ieee802154_2015 {
                return Err(Error::InvalidAddressing);
            }
            let (dst_pan, src_pan) =
                pan_id_presence(dst_mode, src_mode, fc.pan_id_compression())?;

            offsets.set(Field::DstPanId, offset);
            if dst_pan {
                offset += 2;
            }
            offsets.set(Field::DstAddress, offset);
            offset += dst_mode.size();
            offsets.set(Field::SrcPanId, offset);
            if src_pan {
                offset += 2;
            }
            offsets.set(Field::SrcAddress, offset);
            offset += src_mode.size();

            if offset > len {
                return Err(Error::Truncated);
            }

            offsets.set(Field::AuxSecurity, offset);
            if fc.security_enabled() {
                offset += AuxSecurityHeader::new(&data[offset..])?.len();
                if offset > len {
                    return Err(Error::Truncated);
                }
            }

            offsets.set(Field::InformationElements, offset);
            let payload = if fc.information_elements_present() {
                walk_ie_lists(data, offset)?
            } else {
                offset
            };
            offsets.set(Field::Payload, payload);
        }

        Ok(Self {
            buffer,
            len,
            offsets,
            open: Vec::new(),
            stage: BuildStage::Payload,
        })
    }

    /// Return the field index table of the frame.
    pub fn offsets(&self) -> &FieldOffsets {
        &self.offsets
    }

    /// Return the number of bytes used by the frame.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Return the bytes of the frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer.as_ref()[..self.len]
    }

    /// Return a [`FrameControl`] reader for the frame.
    pub fn frame_control(&self) -> FrameControl<&[u8]> {
        FrameControl::new_unchecked(self.buffer.as_ref())
    }

    fn section(&self, field: Field) -> &[u8] {
        let start = self.offsets.get(field);
        let width = self.offsets.width(field, self.len);
        &self.buffer.as_ref()[start..start + width]
    }

    /// Return the sequence number, unless suppressed.
    pub fn sequence_number(&self) -> Option<u8> {
        self.section(Field::SequenceNumber).first().copied()
    }

    /// Return the destination PAN ID, if carried.
    pub fn dst_pan_id(&self) -> Option<u16> {
        let section = self.section(Field::DstPanId);
        (section.len() == 2).then(|| u16::from_le_bytes([section[0], section[1]]))
    }

    /// Return the source PAN ID, if carried.
    pub fn src_pan_id(&self) -> Option<u16> {
        let section = self.section(Field::SrcPanId);
        (section.len() == 2).then(|| u16::from_le_bytes([section[0], section[1]]))
    }

    /// Return the destination address.
    pub fn dst_address(&self) -> Address {
        Address::from_wire(self.section(Field::DstAddress))
    }

    /// Return the source address.
    pub fn src_address(&self) -> Address {
        Address::from_wire(self.section(Field::SrcAddress))
    }

    /// Returns an [`Iterator`] over the header IEs of the frame.
    pub fn header_ies(&self) -> HeaderIeIterator<'_> {
        HeaderIeIterator::new(self.section(Field::InformationElements))
    }

    /// Returns an [`Iterator`] over the payload IEs of the frame.
    pub fn payload_ies(&self) -> PayloadIeIterator<'_> {
        let ies = self.section(Field::InformationElements);

        let mut headers = HeaderIeIterator::new(ies);
        while headers.next().is_some() {}

        match headers.termination() {
            Some(HeaderIeId::HeaderTermination2) => PayloadIeIterator::new(&[]),
            // Payload IEs follow HT1, or start the list outright.
            _ => PayloadIeIterator::new(&ies[headers.offset()..]),
        }
    }

    /// Return the payload of the frame.
    pub fn payload(&self) -> &[u8] {
        self.section(Field::Payload)
    }
}

/// Walk the IE lists starting at `offset`, returning the payload offset.
///
/// The walk relies on the type bit to distinguish header from payload IEs
/// and on the termination elements (HT1/HT2/PT) to find the payload. Every
/// step checks the recorded IE length against the remaining bytes.
fn walk_ie_lists(data: &[u8], offset: usize) -> Result<usize> {
    let mut pos = offset;

    while pos < data.len() {
        let control = crate::read_control(&data[pos..])?;

        if control >> 15 == 0 {
            let ie = HeaderIe::new(&data[pos..])?;
            pos += 2 + ie.length();
            match ie.id() {
                HeaderIeId::HeaderTermination2 => return Ok(pos),
                HeaderIeId::HeaderTermination1 => continue,
                _ => {}
            }
        } else {
            let ie = PayloadIe::new(&data[pos..])?;
            pos += 2 + ie.length();
            if matches!(ie.group_id(), PayloadGroupId::Termination) {
                return Ok(pos);
            }
        }
    }

    // The lists ran to the end of the buffer: the payload is empty.
    Ok(data.len())
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Frame<T> {
    fn init(buffer: T, frame_type: FrameType) -> Result<Self> {
        if buffer.as_ref().len() < FrameControl::<&[u8]>::LEN {
            return Err(Error::NoResources);
        }

        let mut frame = Self {
            buffer,
            len: FrameControl::<&[u8]>::LEN,
            offsets: FieldOffsets::empty(),
            open: Vec::new(),
            stage: BuildStage::Fields,
        };

        frame.buffer.as_mut()[..2].fill(0);
        let mut fc = FrameControl::new_unchecked(frame.buffer.as_mut());
        fc.set_frame_type(frame_type);
        fc.set_frame_version(FrameVersion::Ieee802154_2015);
        fc.set_sequence_number_suppression(true);

        Ok(frame)
    }

    /// Start building a data frame in the given buffer.
    ///
    /// The default frame control selects version 2015 with the sequence
    /// number suppressed.
    pub fn init_data(buffer: T) -> Result<Self> {
        Self::init(buffer, FrameType::Data)
    }

    /// Start building a beacon frame in the given buffer.
    pub fn init_beacon(buffer: T) -> Result<Self> {
        Self::init(buffer, FrameType::Beacon)
    }

    /// Start building an acknowledgement frame in the given buffer.
    pub fn init_ack(buffer: T) -> Result<Self> {
        Self::init(buffer, FrameType::Ack)
    }

    /// Reserve `extra` bytes at the tail of the frame.
    fn reserve(&mut self, extra: usize) -> Result<usize> {
        if self.len + extra > self.buffer.as_ref().len() {
            return Err(Error::NoResources);
        }
        let start = self.len;
        self.len += extra;
        Ok(start)
    }

    /// Grow the length bits of every currently open IE by `delta` octets.
    fn grow_open(&mut self, delta: usize) -> Result<()> {
        for ie in self.open.iter() {
            let data = self.buffer.as_mut();
            let control = crate::read_control(&data[ie.start..])?;
            let grown = crate::content_length(control, ie.kind) + delta;
            let control = crate::splice_length(control, ie.kind, grown)?;
            data[ie.start..ie.start + 2].copy_from_slice(&control.to_le_bytes());
        }
        Ok(())
    }

    /// Keep the IE and payload table entries pinned to the frame tail while
    /// IEs are being appended.
    fn sync_tail(&mut self) {
        self.offsets.set(Field::Payload, self.len);
    }

    /// Set the sequence number, clearing the suppression bit.
    ///
    /// Shifts every downstream section by one octet when the number was
    /// previously suppressed.
    pub fn set_sequence_number(&mut self, sequence_number: u8) -> Result<()> {
        if self.stage != BuildStage::Fields {
            return Err(Error::Phase);
        }

        let at = self.offsets.get(Field::SequenceNumber);
        if !self.offsets.contains(Field::SequenceNumber, self.len) {
            self.reserve(1)?;
            self.buffer.as_mut().copy_within(at..self.len - 1, at + 1);
            self.offsets.shift_after(Field::SequenceNumber, 1);
        }

        self.buffer.as_mut()[at] = sequence_number;
        FrameControl::new_unchecked(self.buffer.as_mut()).set_sequence_number_suppression(false);
        Ok(())
    }

    /// Set the addressing sections and the PAN ID compression bit.
    ///
    /// The compression bit and the emitted PAN ID fields are derived from
    /// the presence table; combinations outside the table are refused with
    /// [`Error::InvalidAddressing`]. A source PAN ID equal to the
    /// destination one is elided.
    pub fn set_addressing(&mut self, addressing: &Addressing) -> Result<()> {
        if self.stage != BuildStage::Fields {
            return Err(Error::Phase);
        }
        if self.offsets.get(Field::DstPanId) != self.offsets.get(Field::AuxSecurity) {
            return Err(Error::Phase);
        }

        let (compression, emit_dst_pan, emit_src_pan) =
            crate::derive_compression(addressing)?;

        let mut section = Vec::<u8, 20>::new();
        let base = self.offsets.get(Field::DstPanId);

        if emit_dst_pan {
            let pan = addressing.dst_pan_id.ok_or(Error::InvalidAddressing)?;
            section.extend_from_slice(&pan.to_le_bytes()).unwrap();
        }
        self.offsets.set(Field::DstAddress, base + section.len());
        for byte in addressing.dst_addr.as_bytes().iter().rev() {
            section.push(*byte).unwrap();
        }
        self.offsets.set(Field::SrcPanId, base + section.len());
        if emit_src_pan {
            let pan = addressing.src_pan_id.ok_or(Error::InvalidAddressing)?;
            section.extend_from_slice(&pan.to_le_bytes()).unwrap();
        }
        self.offsets.set(Field::SrcAddress, base + section.len());
        for byte in addressing.src_addr.as_bytes().iter().rev() {
            section.push(*byte).unwrap();
        }

        let start = self.reserve(section.len())?;
        debug_assert_eq!(start, base);
        self.buffer.as_mut()[base..base + section.len()].copy_from_slice(&section);

        let end = base + section.len();
        self.offsets.set(Field::AuxSecurity, end);
        self.offsets.set(Field::InformationElements, end);
        self.offsets.set(Field::Payload, end);

        let mut fc = FrameControl::new_unchecked(self.buffer.as_mut());
        fc.set_dst_addressing_mode(addressing.dst_addr.into());
        fc.set_src_addressing_mode(addressing.src_addr.into());
        fc.set_pan_id_compression(compression);
        Ok(())
    }

    /// Set the acknowledgement request bit.
    pub fn set_ack_request(&mut self, ack_request: bool) {
        FrameControl::new_unchecked(self.buffer.as_mut()).set_ack_request(ack_request);
    }

    /// Append a header IE with the given content.
    pub fn append_header_ie(&mut self, id: HeaderIeId, content: &[u8]) -> Result<()> {
        if !matches!(self.stage, BuildStage::Fields | BuildStage::HeaderIes) {
            return Err(Error::Phase);
        }
        if content.len() > IeKind::Header.max_length() {
            return Err(Error::NoResources);
        }

        let start = self.reserve(2 + content.len())?;
        let control = header_ie_control(id as u8, content.len());
        let data = self.buffer.as_mut();
        data[start..start + 2].copy_from_slice(&control.to_le_bytes());
        data[start + 2..start + 2 + content.len()].copy_from_slice(content);

        self.stage = BuildStage::HeaderIes;
        FrameControl::new_unchecked(self.buffer.as_mut())
            .set_information_elements_present(true);
        self.sync_tail();
        Ok(())
    }

    /// Open a payload IE; subsequent nested appends grow it in place.
    ///
    /// When header IEs were appended, a header termination 1 element is
    /// inserted first.
    pub fn begin_payload_ie(&mut self, group_id: PayloadGroupId) -> Result<()> {
        if !self.open.is_empty() {
            return Err(Error::Phase);
        }
        match self.stage {
            BuildStage::HeaderIes => {
                self.append_header_ie(HeaderIeId::HeaderTermination1, &[])?;
            }
            BuildStage::Fields | BuildStage::PayloadIes => {}
            BuildStage::Payload => return Err(Error::Phase),
        }

        let start = self.reserve(2)?;
        let control = payload_ie_control(group_id as u8, 0);
        self.buffer.as_mut()[start..start + 2].copy_from_slice(&control.to_le_bytes());

        self.open
            .push(OpenIe {
                start,
                kind: IeKind::Payload,
            })
            .map_err(|_| Error::NoResources)?;

        self.stage = BuildStage::PayloadIes;
        FrameControl::new_unchecked(self.buffer.as_mut())
            .set_information_elements_present(true);
        self.sync_tail();
        Ok(())
    }

    /// Open a nested IE inside the currently open payload IE.
    pub fn begin_nested_ie(&mut self, sub_id: NestedSubId) -> Result<()> {
        if self.open.is_empty() {
            return Err(Error::Phase);
        }

        let start = self.reserve(2)?;
        let control = crate::nested_ie_control(sub_id, 0);
        self.buffer.as_mut()[start..start + 2].copy_from_slice(&control.to_le_bytes());

        self.grow_open(2)?;
        self.open
            .push(OpenIe {
                start,
                kind: sub_id.kind(),
            })
            .map_err(|_| Error::NoResources)?;
        self.sync_tail();
        Ok(())
    }

    /// Append a complete nested IE inside the currently open payload IE.
    ///
    /// The size increase is propagated to the length bits of every enclosing
    /// IE in place.
    pub fn append_nested_ie(&mut self, sub_id: NestedSubId, content: &[u8]) -> Result<()> {
        if self.open.is_empty() {
            return Err(Error::Phase);
        }
        if content.len() > sub_id.kind().max_length() {
            return Err(Error::NoResources);
        }

        let start = self.reserve(2 + content.len())?;
        let control = crate::nested_ie_control(sub_id, content.len());
        let data = self.buffer.as_mut();
        data[start..start + 2].copy_from_slice(&control.to_le_bytes());
        data[start + 2..start + 2 + content.len()].copy_from_slice(content);

        self.grow_open(2 + content.len())?;
        self.sync_tail();
        Ok(())
    }

    /// Reserve `extra` octets of content inside the innermost open IE and
    /// return them for external writing.
    ///
    /// The length bits of the open IE and of every enclosing IE are grown
    /// before the slice is handed out, so the tree stays consistent while
    /// the caller fills it in.
    pub fn extend_ie(&mut self, extra: usize) -> Result<&mut [u8]> {
        if self.open.is_empty() {
            return Err(Error::Phase);
        }

        let start = self.reserve(extra)?;
        self.grow_open(extra)?;
        self.sync_tail();
        Ok(&mut self.buffer.as_mut()[start..start + extra])
    }

    /// Close the innermost open IE.
    pub fn end_ie(&mut self) -> Result<()> {
        self.open.pop().map(|_| ()).ok_or(Error::Phase)
    }

    /// Copy the payload into the frame.
    ///
    /// Inserts the termination element the preceding IE list requires:
    /// payload termination after payload IEs, header termination 2 after
    /// header IEs only.
    pub fn append_payload(&mut self, payload: &[u8]) -> Result<()> {
        if !self.open.is_empty() {
            return Err(Error::Phase);
        }

        match self.stage {
            BuildStage::PayloadIes if !payload.is_empty() => {
                let start = self.reserve(2)?;
                let control = payload_ie_control(PayloadGroupId::Termination as u8, 0);
                self.buffer.as_mut()[start..start + 2]
                    .copy_from_slice(&control.to_le_bytes());
            }
            BuildStage::HeaderIes if !payload.is_empty() => {
                self.append_header_ie(HeaderIeId::HeaderTermination2, &[])?;
            }
            BuildStage::Payload => return Err(Error::Phase),
            _ => {}
        }

        self.offsets.set(Field::Payload, self.len);
        let start = self.reserve(payload.len())?;
        self.buffer.as_mut()[start..start + payload.len()].copy_from_slice(payload);

        self.stage = BuildStage::Payload;
        Ok(())
    }

    /// Finish building, returning the frame length in octets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Phase`] when an IE is still open.
    pub fn finish(&mut self) -> Result<usize> {
        if !self.open.is_empty() {
            return Err(Error::Phase);
        }

        if self.stage != BuildStage::Payload {
            self.offsets.set(Field::Payload, self.len);
            self.stage = BuildStage::Payload;
        }

        debug_assert!(self.offsets.is_well_formed(self.len));
        Ok(self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NestedSubIdShort, TschSynchronization};

    #[test]
    fn build_and_parse_data_frame() {
        let mut buffer = [0u8; 127];
        let mut frame = Frame::init_data(&mut buffer[..]).unwrap();
        frame.set_sequence_number(1).unwrap();
        frame
            .set_addressing(&Addressing {
                dst_pan_id: Some(0xabcd),
                dst_addr: Address::BROADCAST,
                src_pan_id: Some(0xabcd),
                src_addr: Address::Extended([0x00, 0x12, 0x4b, 0x00, 0x14, 0xb5, 0xd9, 0xc7]),
            })
            .unwrap();
        frame.append_payload(&[0x2b, 0x00, 0x00, 0x00]).unwrap();
        let len = frame.finish().unwrap();

        let parsed = Frame::parse(&buffer[..len]).unwrap();
        assert_eq!(parsed.sequence_number(), Some(1));
        assert_eq!(parsed.dst_pan_id(), Some(0xabcd));
        assert_eq!(parsed.src_pan_id(), None);
        assert!(parsed.frame_control().pan_id_compression());
        assert_eq!(parsed.dst_address(), Address::BROADCAST);
        assert_eq!(
            parsed.src_address(),
            Address::Extended([0x00, 0x12, 0x4b, 0x00, 0x14, 0xb5, 0xd9, 0xc7])
        );
        assert_eq!(parsed.payload(), &[0x2b, 0x00, 0x00, 0x00]);
        assert!(parsed.offsets().is_well_formed(len));
    }

    #[test]
    fn offsets_non_decreasing() {
        let mut buffer = [0u8; 64];
        let mut frame = Frame::init_beacon(&mut buffer[..]).unwrap();
        frame
            .set_addressing(&Addressing {
                dst_pan_id: Some(0xabcd),
                dst_addr: Address::BROADCAST,
                src_pan_id: None,
                src_addr: Address::Short([0x01, 0x00]),
            })
            .unwrap();
        frame.begin_payload_ie(PayloadGroupId::Mlme).unwrap();
        frame
            .append_nested_ie(
                NestedSubId::Short(NestedSubIdShort::TschSynchronization),
                &[0x0e, 0, 0, 0, 0, 0],
            )
            .unwrap();
        frame.end_ie().unwrap();
        let len = frame.finish().unwrap();

        let frame = Frame::parse(&buffer[..len]).unwrap();
        let offsets = frame.offsets();
        assert!(offsets.is_well_formed(len));
        // The last entry is the payload start, here the frame end.
        assert_eq!(offsets.get(Field::Payload), len);
    }

    #[test]
    fn nested_growth_cascades() {
        let mut buffer = [0u8; 64];
        let mut frame = Frame::init_beacon(&mut buffer[..]).unwrap();
        frame.begin_payload_ie(PayloadGroupId::Mlme).unwrap();
        frame
            .append_nested_ie(
                NestedSubId::Short(NestedSubIdShort::TschSynchronization),
                &[1, 2, 3, 4, 5, 6],
            )
            .unwrap();
        frame
            .append_nested_ie(
                NestedSubId::Short(NestedSubIdShort::TschSlotframeAndLink),
                &[0],
            )
            .unwrap();
        frame.end_ie().unwrap();
        let len = frame.finish().unwrap();

        let frame = Frame::parse(&buffer[..len]).unwrap();
        let ie = frame.payload_ies().next().unwrap();
        // 8 octets for the sync IE, 3 for the slotframe IE.
        assert_eq!(ie.length(), 11);
        assert_eq!(ie.nested_ies().count(), 2);
    }

    #[test]
    fn extend_ie_grows_ancestors() {
        let mut buffer = [0u8; 64];
        let mut frame = Frame::init_beacon(&mut buffer[..]).unwrap();
        frame.begin_payload_ie(PayloadGroupId::Mlme).unwrap();
        frame
            .begin_nested_ie(NestedSubId::Short(NestedSubIdShort::TschSynchronization))
            .unwrap();

        let content = frame.extend_ie(TschSynchronization::<&[u8]>::LEN).unwrap();
        let mut sync = TschSynchronization::new(content).unwrap();
        sync.set_absolute_slot_number(0xcafe);
        sync.set_join_metric(1);

        frame.end_ie().unwrap();
        frame.end_ie().unwrap();
        let len = frame.finish().unwrap();

        let frame = Frame::parse(&buffer[..len]).unwrap();
        let ie = frame.payload_ies().next().unwrap();
        assert_eq!(ie.length(), 8);
        let nested = ie.nested_ies().next().unwrap();
        let sync = TschSynchronization::new(nested.content()).unwrap();
        assert_eq!(sync.absolute_slot_number(), 0xcafe);
    }

    #[test]
    fn payload_after_payload_ies_is_terminated() {
        let mut buffer = [0u8; 64];
        let mut frame = Frame::init_data(&mut buffer[..]).unwrap();
        frame
            .set_addressing(&Addressing {
                dst_pan_id: Some(0xabcd),
                dst_addr: Address::Short([0x02, 0x00]),
                src_pan_id: None,
                src_addr: Address::Absent,
            })
            .unwrap();
        frame.begin_payload_ie(PayloadGroupId::Mlme).unwrap();
        frame.end_ie().unwrap();
        frame.append_payload(&[0xaa, 0xbb]).unwrap();
        let len = frame.finish().unwrap();

        let frame = Frame::parse(&buffer[..len]).unwrap();
        assert_eq!(frame.payload(), &[0xaa, 0xbb]);
        assert_eq!(frame.payload_ies().count(), 1);
    }

    #[test]
    fn header_ies_terminated_before_payload() {
        let mut buffer = [0u8; 64];
        let mut frame = Frame::init_ack(&mut buffer[..]).unwrap();
        frame
            .append_header_ie(HeaderIeId::TimeCorrection, &[0xe1, 0x8f])
            .unwrap();
        frame.append_payload(&[0x01]).unwrap();
        let len = frame.finish().unwrap();

        let frame = Frame::parse(&buffer[..len]).unwrap();
        assert_eq!(frame.header_ies().count(), 1);
        assert_eq!(frame.payload(), &[0x01]);
    }

    #[test]
    fn mutators_refused_out_of_phase() {
        let mut buffer = [0u8; 64];
        let mut frame = Frame::init_data(&mut buffer[..]).unwrap();
        frame.append_header_ie(HeaderIeId::TimeCorrection, &[0, 0]).unwrap();
        assert_eq!(frame.set_sequence_number(1), Err(Error::Phase));
        assert_eq!(
            frame.set_addressing(&Addressing::default()),
            Err(Error::Phase)
        );
    }

    #[test]
    fn invalid_addressing_refused() {
        let mut buffer = [0u8; 64];
        let mut frame = Frame::init_data(&mut buffer[..]).unwrap();
        // A source PAN ID without any destination information has no row in
        // the presence table.
        let result = frame.set_addressing(&Addressing {
            dst_pan_id: None,
            dst_addr: Address::Absent,
            src_pan_id: Some(0x1234),
            src_addr: Address::Absent,
        });
        assert_eq!(result, Err(Error::InvalidAddressing));
    }

    #[test]
    fn buffer_exhaustion() {
        let mut buffer = [0u8; 6];
        let mut frame = Frame::init_data(&mut buffer[..]).unwrap();
        assert_eq!(frame.append_payload(&[0u8; 16]), Err(Error::NoResources));
    }

    #[test]
    fn mlme_sync_roundtrip() {
        let mut buffer = [0u8; 127];
        let mut frame = Frame::init_data(&mut buffer[..]).unwrap();
        frame
            .set_addressing(&Addressing {
                dst_pan_id: Some(0xabcd),
                dst_addr: Address::Short([0xab, 0xcd]),
                src_pan_id: None,
                src_addr: Address::Extended([0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]),
            })
            .unwrap();
        frame.begin_payload_ie(PayloadGroupId::Mlme).unwrap();
        let mut sync = [0u8; 6];
        {
            let mut ie = TschSynchronization::new(&mut sync[..]).unwrap();
            ie.set_absolute_slot_number(0x0102030405);
            ie.set_join_metric(2);
        }
        frame
            .append_nested_ie(
                NestedSubId::Short(NestedSubIdShort::TschSynchronization),
                &sync,
            )
            .unwrap();
        frame.end_ie().unwrap();
        let len = frame.finish().unwrap();

        let frame = Frame::parse(&buffer[..len]).unwrap();
        assert_eq!(frame.dst_address(), Address::Short([0xab, 0xcd]));
        assert_eq!(
            frame.src_address(),
            Address::Extended([0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77])
        );

        let mlme = frame.payload_ies().next().unwrap();
        assert_eq!(mlme.group_id(), PayloadGroupId::Mlme);

        let mut nested = mlme.nested_ies();
        let ie = nested.next().unwrap();
        assert_eq!(
            ie.sub_id(),
            NestedSubId::Short(NestedSubIdShort::TschSynchronization)
        );
        let sync = TschSynchronization::new(ie.content()).unwrap();
        assert_eq!(sync.absolute_slot_number(), 0x0102030405);
        assert_eq!(sync.join_metric(), 2);
        assert!(nested.next().is_none());
    }

    #[test]
    fn parse_enhanced_beacon_fixture() {
        // Enhanced beacon carrying TSCH sync, timeslot and slotframe IEs.
        let bytes = [
            0x40, 0xeb, 0xcd, 0xab, 0xff, 0xff, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00,
            0x00, 0x3f, 0x11, 0x88, 0x06, 0x1a, 0x0e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x1c,
            0x00, 0x01, 0xc8, 0x00, 0x01, 0x1b, 0x00,
        ];
        let frame = Frame::parse(&bytes[..]).unwrap();
        assert_eq!(frame.frame_control().frame_type(), FrameType::Beacon);
        assert_eq!(frame.sequence_number(), None);
        assert_eq!(frame.dst_pan_id(), Some(0xabcd));
        assert_eq!(frame.dst_address(), Address::BROADCAST);
        assert!(frame.payload().is_empty());

        let ie = frame.payload_ies().next().unwrap();
        assert_eq!(ie.group_id(), PayloadGroupId::Mlme);
        assert_eq!(ie.nested_ies().count(), 4);
    }
}
