//! The timeslot scheduler.
//!
//! A set of slotframes with independent periods runs against one Absolute
//! Slot Number. The slot at index `i` of a slotframe with `numslots` slots
//! is active at every ASN `a` with `a % numslots == i`. The [`Grid`] anchors
//! ASN 0 to an absolute timestamp `tasn0`, derives every deadline from
//! `tasn0 + asn * CELL_LENGTH_US`, and drives the platform timer so that
//! [`Grid::slot_isr`] runs at each selected slot boundary.
//!
//! Selection across slotframes picks, per slotframe, the slot with the
//! smallest forward distance to the next ASN measured in the slotframe's
//! own modulus, then the slotframe whose candidate is closest; ties go to
//! the smaller slotframe id. Removing the slot that is currently armed
//! invalidates the selection and recomputes it before the timer can fire.
//!
//! The ISR never raises errors to threads: failures are absorbed into the
//! per-slot drop counters.

pub mod asn;
pub mod hopping;
pub mod shared;
pub mod slotframe;
pub mod timer;

pub use asn::Asn;
pub use hopping::HoppingSequence;
pub use shared::{SharedAction, SharedCell, SharedOutcome, SharedState};
pub use slotframe::{Slot, SlotHandler, SlotOptions, Slotframe};
pub use timer::SlotTimer;

use heapless::Vec;
use rand_core::RngCore;

use crate::constants::{CELL_LENGTH_US, RTC_TICK_US};
use crate::phy::{us_to_ticks, FrameBuf, Radio};
use crate::time::{Duration, Instant};

/// An error raised by schedule manipulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A pool or queue is full.
    NoResources,
    /// The slotframe id or `(slotframe, index)` pair is already installed.
    Duplicate,
    /// No such slotframe or slot.
    NotFound,
    /// The slot index does not fit the slotframe period.
    InvalidIndex,
}

/// The scheduling context: slotframes, the ASN anchor, and the armed timer
/// state.
///
/// A `Grid` owns its slotframes, which own their slots; queued frames stay
/// owned by the callers that copied them in. There is exactly one grid per
/// node, passed explicitly to everything that schedules.
pub struct Grid<T: SlotTimer, R: RngCore, const SF: usize> {
    timer: T,
    rng: R,
    /// Absolute timestamp of ASN 0.
    tasn0: Instant,
    last_asn: Asn,
    last_time: Instant,
    next_asn: Asn,
    next_time: Instant,
    /// Overflow count of the low-frequency counter extension.
    time_extension: u32,
    /// The `(slotframe id, slot index)` the timer is armed for.
    active: Option<(u8, u16)>,
    /// Slotframes ordered by id, so the first minimal candidate wins ties.
    slotframes: Vec<Slotframe, SF>,
    power_up: Duration,
    power_down: Duration,
}

impl<T: SlotTimer, R: RngCore, const SF: usize> Grid<T, R, SF> {
    /// Create a grid anchored at the timer's current time.
    pub fn new(timer: T, rng: R) -> Self {
        let now = timer.now();
        Self {
            timer,
            rng,
            tasn0: now,
            last_asn: Asn::ZERO,
            last_time: now,
            next_asn: Asn::ZERO,
            next_time: now,
            time_extension: 0,
            active: None,
            slotframes: Vec::new(),
            power_up: Duration::ZERO,
            power_down: Duration::ZERO,
        }
    }

    /// Set the power transition budget: how long the platform needs ahead of
    /// a slot to wake, and how long a power-down costs.
    pub fn set_power_budget(&mut self, power_up: Duration, power_down: Duration) {
        self.power_up = power_up;
        self.power_down = power_down;
    }

    /// The ASN of the slot that fired last.
    pub fn asn(&self) -> Asn {
        self.last_asn
    }

    /// The `(slotframe id, slot index)` the timer is armed for.
    pub fn active(&self) -> Option<(u8, u16)> {
        self.active
    }

    /// The deadline the timer is armed for.
    pub fn next_fire(&self) -> Option<Instant> {
        self.active.map(|_| self.next_time)
    }

    /// Access the platform timer.
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// Mask the slot interrupt around thread-context critical sections.
    pub fn lock(&mut self) {
        self.timer.lock();
    }

    /// Unmask the slot interrupt.
    pub fn unlock(&mut self) {
        self.timer.unlock();
    }

    /// Called from the platform when the low-frequency counter extension
    /// overflows.
    pub fn counter_overflow(&mut self) {
        self.time_extension = self.time_extension.wrapping_add(1);
    }

    /// Install an empty slotframe.
    pub fn add_slotframe(&mut self, id: u8, numslots: u16) -> Result<(), Error> {
        if numslots == 0 {
            return Err(Error::InvalidIndex);
        }
        if self.slotframes.iter().any(|sf| sf.id() == id) {
            return Err(Error::Duplicate);
        }

        let at = self
            .slotframes
            .iter()
            .position(|sf| sf.id() > id)
            .unwrap_or(self.slotframes.len());
        self.slotframes
            .insert(at, Slotframe::new(id, numslots))
            .map_err(|_| Error::NoResources)
    }

    /// Remove a slotframe and everything scheduled on it.
    pub fn remove_slotframe(&mut self, id: u8) -> Result<(), Error> {
        let at = self
            .slotframes
            .iter()
            .position(|sf| sf.id() == id)
            .ok_or(Error::NotFound)?;
        self.slotframes.remove(at);

        if matches!(self.active, Some((sf, _)) if sf == id) {
            self.active = None;
        }
        self.reschedule();
        Ok(())
    }

    /// Borrow a slotframe.
    pub fn slotframe(&self, id: u8) -> Option<&Slotframe> {
        self.slotframes.iter().find(|sf| sf.id() == id)
    }

    fn slotframe_mut(&mut self, id: u8) -> Option<&mut Slotframe> {
        self.slotframes.iter_mut().find(|sf| sf.id() == id)
    }

    /// Add a slot to a slotframe and re-arm the timer.
    ///
    /// Adding the first slot of an otherwise empty schedule arms the timer
    /// immediately.
    pub fn add_slot(&mut self, slotframe_id: u8, slot: Slot) -> Result<(), Error> {
        self.slotframe_mut(slotframe_id)
            .ok_or(Error::NotFound)?
            .add_slot(slot)?;
        self.reschedule();
        Ok(())
    }

    /// Remove a slot.
    ///
    /// Removing the slot the timer is currently armed for recomputes the
    /// selection before the ISR can fire on stale state.
    pub fn remove_slot(&mut self, slotframe_id: u8, index: u16) -> Result<Slot, Error> {
        let slot = self
            .slotframe_mut(slotframe_id)
            .ok_or(Error::NotFound)?
            .remove_slot(index)?;

        if self.active == Some((slotframe_id, index)) {
            self.active = None;
        }
        self.reschedule();
        Ok(slot)
    }

    /// Queue a frame on a TX or shared slot.
    pub fn enqueue_tx(
        &mut self,
        slotframe_id: u8,
        index: u16,
        frame: FrameBuf,
    ) -> Result<(), Error> {
        let slot = self
            .slotframe_mut(slotframe_id)
            .and_then(|sf| sf.slot_mut(index))
            .ok_or(Error::NotFound)?;

        if slot.tx_queue.push_back(frame).is_err() {
            slot.dropcount += 1;
            return Err(Error::NoResources);
        }
        Ok(())
    }

    /// The ASN a timestamp falls into.
    ///
    /// Biased forward by one low-frequency tick, so a timestamp read while
    /// the tick it belongs to is still settling lands in the right slot.
    pub fn time_to_asn(&self, at: Instant) -> Asn {
        let us = at.delta_since(self.tasn0).as_us().max(0) as u64;
        Asn::new((us + RTC_TICK_US) / CELL_LENGTH_US)
    }

    /// The absolute timestamp of a slot boundary.
    pub fn asn_to_time(&self, asn: Asn) -> Instant {
        self.tasn0
            .wrapping_add(Duration::from_us((asn.as_u64() * CELL_LENGTH_US) as i64))
    }

    /// Re-anchor the schedule: `tstamp` is the boundary of slot `asn`.
    pub fn sync(&mut self, asn: Asn, tstamp: Instant) {
        self.tasn0 = tstamp - Duration::from_us((asn.as_u64() * CELL_LENGTH_US) as i64);
        self.last_asn = asn;
        self.last_time = tstamp;
        self.reschedule();
    }

    /// Shift the whole timebase by `delta`, atomically with respect to the
    /// timer compare.
    pub fn offset(&mut self, delta: Duration) {
        self.timer.lock();
        self.tasn0 = self.tasn0 + delta;
        self.last_time = self.last_time + delta;
        self.next_time = self.next_time + delta;
        if self.active.is_some() {
            self.timer.arm_compare(self.next_time);
        }
        self.timer.unlock();
    }

    /// Pick the slotframe whose next slot is closest to `from`.
    ///
    /// Distances are measured per slotframe in its own modulus; ties go to
    /// the smaller slotframe id, which sorts first.
    pub(crate) fn select_next(&mut self, from: Asn) -> Option<(usize, u16)> {
        let mut best: Option<(usize, u16)> = None;

        for (at, slotframe) in self.slotframes.iter_mut().enumerate() {
            if let Some(distance) = slotframe.compute_next(from) {
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((at, distance));
                }
            }
        }

        best
    }

    /// Recompute the next slot from the last fired ASN and re-arm.
    fn reschedule(&mut self) {
        let from = self.last_asn + 1;

        match self.select_next(from) {
            Some((at, distance)) => {
                self.next_asn = from + distance as u32;
                self.next_time = self.asn_to_time(self.next_asn);
                let slotframe = &self.slotframes[at];
                self.active = Some((
                    slotframe.id(),
                    slotframe.next_slot_index().expect("selection set next"),
                ));
                self.arm();
            }
            None => {
                self.active = None;
                self.timer.cancel();
            }
        }
    }

    /// Program the timer for `next_time`.
    fn arm(&mut self) {
        let now = self.timer.now();

        if !self.next_time.is_after(now) {
            // Late: fire at the earliest next opportunity and let the
            // handler renormalise against the real ASN.
            self.next_time = now + Duration::from_us(2 * RTC_TICK_US as i64);
        }

        let gap = self.next_time.delta_since(now);
        if self.power_down > Duration::ZERO && gap >= self.power_up + self.power_down {
            self.timer.power_down();
        }
        if self.power_up > Duration::ZERO {
            self.timer.arm_power_up(self.next_time - self.power_up);
        }

        self.timer.arm_compare(self.next_time);
    }

    /// The slot interrupt body: dispatch the armed slot, then select and arm
    /// the next one.
    ///
    /// Handlers run to completion here; nothing in this path blocks or
    /// returns an error.
    pub fn slot_isr<RD: Radio>(&mut self, radio: &mut RD) {
        self.last_asn = self.next_asn;
        self.last_time = self.next_time;

        if let Some((slotframe_id, index)) = self.active {
            let at = us_to_ticks(self.last_time);
            let rng = &mut self.rng;

            let slot = self
                .slotframes
                .iter_mut()
                .find(|sf| sf.id() == slotframe_id)
                .and_then(|sf| sf.slot_mut(index));

            if let Some(slot) = slot {
                slot.count += 1;

                match &mut slot.handler {
                    SlotHandler::Tx => {
                        if let Some(frame) = slot.tx_queue.pop_front() {
                            if radio.tx(frame.as_bytes(), Some(at)).is_err() {
                                slot.dropcount += 1;
                                warning!("tx failed in slot {}", index);
                            }
                        }
                    }
                    SlotHandler::Rx => {
                        radio.rx_enable(Some(at), Some(CELL_LENGTH_US as u32));
                    }
                    SlotHandler::Shared(cell) => {
                        let pending = !slot.tx_queue.is_empty();
                        match cell.step(rng, pending) {
                            SharedAction::Transmit => {
                                if let Some(frame) = slot.tx_queue.pop_front() {
                                    match radio.tx(frame.as_bytes(), Some(at)) {
                                        Ok(_) => cell.feedback(SharedOutcome::Delivered),
                                        Err(_) => {
                                            slot.dropcount += 1;
                                            cell.feedback(SharedOutcome::Collision);
                                        }
                                    }
                                }
                            }
                            SharedAction::Listen => {
                                radio.rx_enable(Some(at), Some(CELL_LENGTH_US as u32));
                            }
                        }
                    }
                    SlotHandler::Scan => radio.rx_enable(None, None),
                }
            }
        }

        self.reschedule();
    }
}

#[cfg(test)]
mod tests {
    use super::timer::tests::TestTimer;
    use super::*;
    use crate::phy::tests::TestRadio;
    use rand_core::SeedableRng;

    type TestGrid = Grid<TestTimer, rand::rngs::StdRng, 4>;

    fn grid() -> TestGrid {
        Grid::new(TestTimer::default(), rand::rngs::StdRng::seed_from_u64(1))
    }

    fn tx_slot(index: u16) -> Slot {
        Slot::new(index, SlotOptions::TX, SlotHandler::Tx)
    }

    fn rx_slot(index: u16) -> Slot {
        Slot::new(index, SlotOptions::RX, SlotHandler::Rx)
    }

    #[test]
    fn adding_first_slot_arms_the_timer() {
        let mut grid = grid();
        grid.add_slotframe(1, 10).unwrap();
        assert!(grid.timer_mut().compare.is_none());

        grid.add_slot(1, rx_slot(3)).unwrap();
        assert!(grid.timer_mut().compare.is_some());
        assert_eq!(grid.active(), Some((1, 3)));
        // Slot 3 of a 10-slot frame, selected from ASN 1.
        assert_eq!(grid.next_fire().unwrap().as_us(), 3 * CELL_LENGTH_US);
    }

    #[test]
    fn closest_slotframe_wins_and_ties_go_to_smaller_id() {
        let mut grid = grid();
        grid.add_slotframe(1, 10).unwrap();
        grid.add_slotframe(2, 20).unwrap();
        grid.add_slot(1, rx_slot(3)).unwrap();
        grid.add_slot(2, rx_slot(6)).unwrap();

        // From ASN 0: distance 3 in slotframe 1, distance 6 in slotframe 2.
        let (at, distance) = grid.select_next(Asn::ZERO).unwrap();
        assert_eq!(grid.slotframes[at].id(), 1);
        assert_eq!(distance, 3);

        // Same distance in both: the smaller slotframe id is chosen.
        grid.remove_slot(2, 6).unwrap();
        grid.add_slot(2, rx_slot(3)).unwrap();
        let (at, distance) = grid.select_next(Asn::ZERO).unwrap();
        assert_eq!(grid.slotframes[at].id(), 1);
        assert_eq!(distance, 3);
    }

    #[test]
    fn removing_the_armed_slot_recomputes_the_timer() {
        let mut grid = grid();
        grid.add_slotframe(1, 10).unwrap();
        grid.add_slot(1, rx_slot(2)).unwrap();
        grid.add_slot(1, rx_slot(7)).unwrap();

        assert_eq!(grid.active(), Some((1, 2)));
        let before = grid.next_fire().unwrap();

        grid.remove_slot(1, 2).unwrap();
        assert_eq!(grid.active(), Some((1, 7)));
        assert!(grid.next_fire().unwrap().is_after(before));

        // Removing the last slot disarms the timer entirely.
        grid.remove_slot(1, 7).unwrap();
        assert_eq!(grid.active(), None);
        assert!(grid.timer_mut().compare.is_none());
    }

    #[test]
    fn isr_transmits_and_rearms() {
        let mut grid = grid();
        let mut radio = TestRadio::default();
        grid.add_slotframe(1, 10).unwrap();
        grid.add_slot(1, tx_slot(4)).unwrap();
        grid.enqueue_tx(1, 4, crate::phy::FrameBuf::from_bytes(&[1, 2, 3]).unwrap())
            .unwrap();

        let fire = grid.next_fire().unwrap();
        grid.timer_mut().now = fire;
        grid.slot_isr(&mut radio);

        assert_eq!(radio.transmitted.len(), 1);
        assert_eq!(radio.transmitted[0].0, vec![1, 2, 3]);
        assert_eq!(grid.asn().as_u64(), 4);
        assert_eq!(grid.slotframe(1).unwrap().slot(4).unwrap().count, 1);

        // Re-armed one slotframe period ahead.
        assert_eq!(
            grid.next_fire().unwrap().delta_since(fire).as_us(),
            10 * CELL_LENGTH_US as i64
        );
    }

    #[test]
    fn rx_slot_opens_receive_window() {
        let mut grid = grid();
        let mut radio = TestRadio::default();
        grid.add_slotframe(1, 5).unwrap();
        grid.add_slot(1, rx_slot(1)).unwrap();

        grid.timer_mut().now = grid.next_fire().unwrap();
        grid.slot_isr(&mut radio);
        assert_eq!(radio.rx_enabled, 1);
    }

    #[test]
    fn time_asn_roundtrip() {
        let grid = grid();
        for a in [0u64, 1, 9, 10_007, 0xff_ffff] {
            let asn = Asn::new(a);
            assert_eq!(grid.time_to_asn(grid.asn_to_time(asn)), asn);
        }
    }

    #[test]
    fn late_programming_fires_soon() {
        let mut grid = grid();
        grid.add_slotframe(1, 4).unwrap();
        // Move time far past the selected boundary before arming.
        grid.timer_mut().now = Instant::from_us(100 * CELL_LENGTH_US);
        grid.add_slot(1, rx_slot(0)).unwrap();

        let fire = grid.next_fire().unwrap();
        let gap = fire.delta_since(grid.timer_mut().now).as_us();
        assert_eq!(gap, 2 * RTC_TICK_US as i64);
    }

    #[test]
    fn sync_re_anchors_the_epoch() {
        let mut grid = grid();
        grid.add_slotframe(1, 10).unwrap();
        grid.add_slot(1, rx_slot(0)).unwrap();

        let tstamp = Instant::from_us(1_234_560);
        grid.sync(Asn::new(100), tstamp);
        assert_eq!(grid.asn_to_time(Asn::new(100)), tstamp);
        assert_eq!(grid.time_to_asn(tstamp), Asn::new(100));
        // Next fire lands on the next multiple of the slotframe period.
        assert_eq!(grid.next_fire().unwrap(), grid.asn_to_time(Asn::new(110)));
    }

    #[test]
    fn offset_shifts_epoch_and_compare() {
        let mut grid = grid();
        grid.add_slotframe(1, 10).unwrap();
        grid.add_slot(1, rx_slot(3)).unwrap();

        let before = grid.next_fire().unwrap();
        grid.offset(Duration::from_us(250));
        assert_eq!(grid.next_fire().unwrap().delta_since(before).as_us(), 250);
        let compare = grid.timer_mut().compare;
        assert_eq!(compare, grid.next_fire());
        assert_eq!(grid.timer_mut().locks, 0);
    }

    #[test]
    fn power_hooks_bracket_long_gaps() {
        let mut grid = grid();
        grid.set_power_budget(Duration::from_us(400), Duration::from_us(600));
        grid.add_slotframe(1, 100).unwrap();
        grid.add_slot(1, rx_slot(50)).unwrap();

        // Half a second of idle is worth powering down for.
        assert!(grid.timer_mut().powered_down);
        let fire = grid.next_fire().unwrap();
        assert_eq!(
            grid.timer_mut().power_up,
            Some(fire - Duration::from_us(400))
        );
    }

    #[test]
    fn full_queue_counts_drops() {
        let mut grid = grid();
        grid.add_slotframe(1, 10).unwrap();
        grid.add_slot(1, tx_slot(0)).unwrap();

        let frame = crate::phy::FrameBuf::from_bytes(&[0u8; 4]).unwrap();
        for _ in 0..slotframe::TX_QUEUE_DEPTH {
            grid.enqueue_tx(1, 0, frame.clone()).unwrap();
        }
        assert_eq!(
            grid.enqueue_tx(1, 0, frame),
            Err(Error::NoResources)
        );
        assert_eq!(grid.slotframe(1).unwrap().slot(0).unwrap().dropcount, 1);
    }
}
