//! 6LoWPAN adaptation: RFC 4944 dispatch and RFC 6282 header compression.
//!
//! [`compress`] and [`decompress`] translate between a full IPv6 packet and
//! its LOWPAN_IPHC form, using the IEEE 802.15.4 source and destination
//! addresses and a [`ContextTable`] to elide what the receiver can derive.
//! Only the headers are transformed; the payload behind them is carried
//! verbatim by the caller.

mod context;
pub use context::*;

mod iphc;
pub use iphc::*;

mod nhc;
pub use nhc::*;

/// An error raised by the adaptation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The buffer is too short for the structure it claims to contain.
    Truncated,
    /// The output buffer or a table is full.
    NoResources,
    /// The encoding is not one this node produces or accepts.
    Malformed,
}

/// A type alias for `Result<T, lowpan::Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// The dispatch octet for uncompressed IPv6.
pub const DISPATCH_IPV6: u8 = 0x41;
/// The dispatch octet for ESC.
pub const DISPATCH_ESC: u8 = 0x40;
/// The dispatch prefix of LOWPAN_IPHC (upper three bits).
pub const DISPATCH_IPHC: u8 = 0x60;

/// What the first octet of a 6LoWPAN payload announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatch {
    /// Not a LoWPAN frame; discard.
    Nalp,
    /// Additional dispatch octet follows.
    Esc,
    /// Uncompressed IPv6 header follows.
    Ipv6,
    /// LOWPAN_IPHC compressed header follows.
    Iphc,
    /// Mesh header follows.
    Mesh,
    /// Broadcast header follows.
    Bc0,
    /// First fragment header follows.
    Frag1,
    /// Subsequent fragment header follows.
    FragN,
    /// Reserved or unrecognised dispatch.
    Unknown,
}

/// Classify the first octet of a 6LoWPAN payload.
pub fn dispatch(octet: u8) -> Dispatch {
    match octet {
        DISPATCH_ESC => Dispatch::Esc,
        DISPATCH_IPV6 => Dispatch::Ipv6,
        0x50 => Dispatch::Bc0,
        _ if octet >> 6 == 0b00 => Dispatch::Nalp,
        _ if octet & 0xe0 == DISPATCH_IPHC => Dispatch::Iphc,
        _ if octet >> 6 == 0b10 => Dispatch::Mesh,
        _ if octet & 0xf8 == 0xc0 => Dispatch::Frag1,
        _ if octet & 0xf8 == 0xe0 => Dispatch::FragN,
        _ => Dispatch::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_classes() {
        assert_eq!(dispatch(0x00), Dispatch::Nalp);
        assert_eq!(dispatch(0x3f), Dispatch::Nalp);
        assert_eq!(dispatch(0x40), Dispatch::Esc);
        assert_eq!(dispatch(0x41), Dispatch::Ipv6);
        assert_eq!(dispatch(0x50), Dispatch::Bc0);
        assert_eq!(dispatch(0x60), Dispatch::Iphc);
        assert_eq!(dispatch(0x7e), Dispatch::Iphc);
        assert_eq!(dispatch(0x80), Dispatch::Mesh);
        assert_eq!(dispatch(0xc3), Dispatch::Frag1);
        assert_eq!(dispatch(0xe1), Dispatch::FragN);
        assert_eq!(dispatch(0xd0), Dispatch::Unknown);
    }
}
