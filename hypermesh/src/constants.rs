//! Stack-wide tunables.
//!
//! Durations are microseconds of the [`crate::time`] timebase.

use crate::time::Duration;

/// Length of one timeslot (cell) in microseconds.
pub const CELL_LENGTH_US: u64 = 10_000;

/// Resolution of the low-frequency wake-up counter in microseconds. Used as
/// the rounding bias when converting a timestamp to an ASN, so a read that
/// races a tick still lands in the right slot.
pub const RTC_TICK_US: u64 = 30;

/// Largest MAC frame the radio exchanges, in octets.
pub const MAX_FRAME_LEN: usize = 127;

/// Lattice pitch the reported Cartesian location snaps to, in meters.
pub const LATTICE_R: f32 = 1.0;

/// Hyperbolic translation distance corresponding to one lattice step.
pub const HYPER_LATTICE_R: f32 = 2.633_915_8;

/// Idle time after which a route entry is evicted.
pub const HYPER_ROUTE_TIMEOUT: Duration = Duration::from_secs(60);

/// Retransmission interval for coordinate requests.
pub const COORD_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Coordinate requests sent before a route is given up on.
pub const MAX_COORD_REQUESTS: u8 = 3;

/// Sliding duplicate-suppression window of the packet cache.
pub const PACKET_CACHE_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the packet cache ring.
pub const PACKET_CACHE_TABLE_SIZE: usize = 16;

/// Capacity of the route table.
pub const HYPER_ROUTE_TABLE_SIZE: usize = 16;

/// Capacity of the neighbor table.
pub const NEIGHBOR_TABLE_SIZE: usize = 16;

/// Capacity of the 6LoWPAN compression context table.
pub const CONTEXT_TABLE_SIZE: usize = 16;
