//! A TSCH (Time-Slotted Channel Hopping) mesh stack that routes IPv6 over a
//! low-power IEEE 802.15.4 radio using hyperbolic-coordinate geographic
//! routing.
//!
//! The crate is layered leaves-first:
//!
//! - [`time`]: the wrap-aware microsecond timebase everything schedules on.
//! - [`phy`]: the radio and timer abstractions the platform implements.
//! - [`net`]: minimal IPv6, UDP and ICMPv6 wire types.
//! - [`lowpan`]: RFC 4944/6282 header compression between [`net`] packets
//!   and 802.15.4 frames.
//! - [`route`]: the hyperbolic routing engine with its route table, packet
//!   cache and per-packet hop-by-hop option.
//! - [`grid`]: the timeslot scheduler that fires slot handlers from a
//!   hardware timer ISR across multiple co-existing slotframes.
//!
//! Frame parsing and building live in the companion `hypermesh-frame` crate.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
pub(crate) mod utils;

pub mod constants;
pub mod grid;
pub mod lowpan;
pub mod net;
pub mod phy;
pub mod route;
pub mod time;
