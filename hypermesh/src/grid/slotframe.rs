//! Slotframes and their slots.

use bitflags::bitflags;
use heapless::{Deque, Vec};

use super::asn::Asn;
use super::shared::SharedCell;
use super::Error;
use crate::phy::FrameBuf;

/// Slots one slotframe can hold.
pub const MAX_SLOTS: usize = 8;

/// Frames one TX slot can queue.
pub const TX_QUEUE_DEPTH: usize = 4;

bitflags! {
    /// Slot option bits.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct SlotOptions: u8 {
        /// The slot transmits.
        const TX = 0b0000_0001;
        /// The slot receives.
        const RX = 0b0000_0010;
        /// The slot is shared and contended for.
        const SHARED = 0b0000_0100;
        /// The slot runs a localisation exchange.
        const LOC = 0b0000_1000;
        /// The slot scans for foreign advertisements.
        const SCAN = 0b0001_0000;
    }
}

/// What the dispatcher does when a slot fires.
///
/// The handler owns whatever state it needs; the dispatcher owns the
/// handler.
#[derive(Debug)]
pub enum SlotHandler {
    /// Transmit the head frame of the slot's queue.
    Tx,
    /// Open a receive window for the whole slot.
    Rx,
    /// Contend for the shared cell.
    Shared(SharedCell),
    /// Listen without a schedule, e.g. while joining.
    Scan,
}

/// One cell of a slotframe.
#[derive(Debug)]
pub struct Slot {
    /// Index within the slotframe; active at every ASN where
    /// `asn % numslots == index`.
    pub index: u16,
    /// Option bits.
    pub options: SlotOptions,
    /// Dispatch record.
    pub handler: SlotHandler,
    /// Outgoing frames owned by callers, not by the slot.
    pub tx_queue: Deque<FrameBuf, TX_QUEUE_DEPTH>,
    /// Frames dropped in this slot: failed transmissions and overruns.
    pub dropcount: u32,
    /// Times this slot fired.
    pub count: u32,
}

impl Slot {
    /// Create a slot with an empty queue.
    pub fn new(index: u16, options: SlotOptions, handler: SlotHandler) -> Self {
        Self {
            index,
            options,
            handler,
            tx_queue: Deque::new(),
            dropcount: 0,
            count: 0,
        }
    }
}

/// A periodic schedule of [`MAX_SLOTS`] slots at most, repeating every
/// `numslots` ASNs.
#[derive(Debug)]
pub struct Slotframe {
    id: u8,
    numslots: u16,
    slots: Vec<Slot, MAX_SLOTS>,
    /// Position (in `slots`) of the slot with the smallest forward distance
    /// to the ASN the last selection ran for.
    next: Option<usize>,
}

impl Slotframe {
    /// Create an empty slotframe.
    pub fn new(id: u8, numslots: u16) -> Self {
        debug_assert!(numslots != 0);
        Self {
            id,
            numslots,
            slots: Vec::new(),
            next: None,
        }
    }

    /// The slotframe identifier. Smaller identifiers win scheduling ties.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The period of the slotframe in timeslots.
    pub fn numslots(&self) -> u16 {
        self.numslots
    }

    /// Whether the slotframe has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Add a slot, keeping the list ordered by index.
    ///
    /// The `(slotframe, index)` pair is unique; a second slot on the same
    /// index is refused.
    pub fn add_slot(&mut self, slot: Slot) -> Result<(), Error> {
        if slot.index >= self.numslots {
            return Err(Error::InvalidIndex);
        }
        if self.slots.iter().any(|s| s.index == slot.index) {
            return Err(Error::Duplicate);
        }

        let at = self
            .slots
            .iter()
            .position(|s| s.index > slot.index)
            .unwrap_or(self.slots.len());
        self.slots
            .insert(at, slot)
            .map_err(|_| Error::NoResources)?;
        self.next = None;
        Ok(())
    }

    /// Remove the slot at `index`.
    pub fn remove_slot(&mut self, index: u16) -> Result<Slot, Error> {
        let at = self
            .slots
            .iter()
            .position(|s| s.index == index)
            .ok_or(Error::NotFound)?;
        self.next = None;
        Ok(self.slots.remove(at))
    }

    /// Borrow the slot at `index`.
    pub fn slot(&self, index: u16) -> Option<&Slot> {
        self.slots.iter().find(|s| s.index == index)
    }

    /// Mutably borrow the slot at `index`.
    pub fn slot_mut(&mut self, index: u16) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.index == index)
    }

    /// The index of the slot selected by the last [`Self::compute_next`].
    pub(super) fn next_slot_index(&self) -> Option<u16> {
        self.next.map(|at| self.slots[at].index)
    }

    /// Select the slot with the smallest forward distance to `asn`,
    /// measured in this slotframe's own modulus, and return that distance.
    ///
    /// A slot active exactly at `asn` has distance zero.
    pub(super) fn compute_next(&mut self, asn: Asn) -> Option<u16> {
        if self.slots.is_empty() {
            self.next = None;
            return None;
        }

        let current = asn.slot_in(self.numslots);
        let mut best: Option<(usize, u16)> = None;

        for (at, slot) in self.slots.iter().enumerate() {
            let distance = ((slot.index as u32 + self.numslots as u32 - current as u32)
                % self.numslots as u32) as u16;
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((at, distance));
            }
        }

        let (at, distance) = best.unwrap();
        self.next = Some(at);
        Some(distance)
    }
}
