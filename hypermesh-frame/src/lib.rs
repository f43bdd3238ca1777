//! Zero-copy readers and writers for IEEE 802.15.4-2015 MAC frames.
//!
//! A [`Frame`] couples a byte buffer with a table of [`FieldOffsets`]: the
//! starting byte offset of each structural section of the frame (sequence
//! number, destination PAN ID, destination address, source PAN ID, source
//! address, auxiliary security header, information elements, payload). Equal
//! adjacent offsets mean the section between them is absent. The table is
//! computed once by [`Frame::parse`] for incoming frames, and maintained by
//! every mutator while building outgoing frames, so readers never re-walk the
//! header.
//!
//! ## Reading a frame
//!
//! ```
//! use hypermesh_frame::{Frame, FrameType};
//!
//! let bytes = [
//!     0x40, 0xeb, 0xcd, 0xab, 0xff, 0xff, 0x01, 0x00, 0x01, 0x00, 0x01,
//!     0x00, 0x01, 0x00, 0x00, 0x3f, 0x11, 0x88, 0x06, 0x1a, 0x0e, 0x00,
//!     0x00, 0x00, 0x00, 0x00, 0x01, 0x1c, 0x00, 0x01, 0xc8, 0x00, 0x01,
//!     0x1b, 0x00,
//! ];
//! let frame = Frame::parse(&bytes[..]).unwrap();
//! assert_eq!(frame.frame_control().frame_type(), FrameType::Beacon);
//!
//! for ie in frame.payload_ies() {
//!     // nested IEs of an MLME payload IE
//!     for nested in ie.nested_ies() {
//!         let _ = nested.sub_id();
//!     }
//! }
//! ```
//!
//! ## Building a frame
//!
//! Building is phased: [`Frame::init_data`] (or `init_beacon`/`init_ack`)
//! writes a default frame control word, then sequence number and addressing
//! setters, then IE appends, then the payload. Appends only ever grow the
//! frame; nested IE appends rewrite the length bits of every enclosing IE in
//! place, so the tree stays consistent after each call.
//!
//! ```
//! use hypermesh_frame::{Addressing, Address, Frame, PayloadGroupId, NestedSubId};
//!
//! let mut buffer = [0u8; 127];
//! let mut frame = Frame::init_data(&mut buffer[..]).unwrap();
//! frame
//!     .set_addressing(&Addressing {
//!         dst_pan_id: Some(0xabcd),
//!         dst_addr: Address::Short([0xcd, 0xab]),
//!         src_pan_id: None,
//!         src_addr: Address::Absent,
//!     })
//!     .unwrap();
//! frame.append_payload(&[0xde, 0xad]).unwrap();
//! let len = frame.finish().unwrap();
//! ```
//!
//! ## Information Elements
//!
//! Header IEs and Payload IEs are direct children of the frame; Nested IEs
//! live inside a Payload IE (usually the MLME group). The four kinds differ
//! in how the 2-byte control word splits between length and ID:
//!
//! | Kind          | Type bit | Length bits | ID bits |
//! |---------------|----------|-------------|---------|
//! | Header IE     | 0        | 7           | 8       |
//! | Payload IE    | 1        | 11          | 4       |
//! | Short Nested  | 0        | 8           | 7       |
//! | Long Nested   | 1        | 11          | 4       |
//!
//! Header termination (HT1/HT2) and payload termination (PT) elements close
//! an IE list; the iterators stop there and [`Frame::parse`] uses them to
//! locate the payload.
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

mod frame_control;
pub use frame_control::*;

mod addressing;
pub use addressing::*;

mod offsets;
pub use offsets::*;

mod aux_sec;
pub use aux_sec::*;

mod ie;
pub use ie::*;

mod frame;
pub use frame::*;

mod fcs;
pub use fcs::*;

/// An error raised while reading or writing an IEEE 802.15.4 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The buffer is too short for the structure it claims to contain.
    Truncated,
    /// The addressing-mode combination violates the PAN ID presence table.
    InvalidAddressing,
    /// The frame buffer has no room left for the requested append.
    NoResources,
    /// A builder method was called out of phase order.
    Phase,
}

/// A type alias for `Result<T, hypermesh_frame::Error>`.
pub type Result<T> = core::result::Result<T, Error>;
