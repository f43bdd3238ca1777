//! The per-packet hop-by-hop coordinate option.
//!
//! Every geo-routed packet carries a hop-by-hop extension header with one
//! option holding the originator's packet id and the source and destination
//! coordinates with their sequence numbers. Forwarders reconcile the
//! coordinate fields with their route tables in both directions, rewriting
//! the packet in place when the table knows better.
//!
//! ```notrust
//! +----+-----+------+------+-----------+---------+----------+-----------+------------+
//! | NH | Len | Type | OLen | Packet id | Src seq | Dest seq | Src coord | Dest coord |
//! +----+-----+------+------+-----------+---------+----------+-----------+------------+
//! 0    1     2      3      4           6         7          8           16          24
//! ```
//!
//! Coordinates are two little-endian `f32` components each; the option
//! value is little-endian throughout, like the MAC layer it rides on.

use super::coord::{Coord, CoordSeq};
use crate::net::{next_header, Ipv6Packet};

/// The option type: skip over when unrecognised, mutable in flight.
pub const HYPER_OPT_TYPE: u8 = 0x3e;

/// The full length of the hop-by-hop header carrying the option.
pub const HBH_LEN: usize = 24;

/// A reader/writer for the coordinate hop-by-hop header.
pub struct HyperOpt<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> HyperOpt<T> {
    /// Create a new [`HyperOpt`] reader/writer over the extension header
    /// bytes.
    pub fn new(buffer: T) -> Option<Self> {
        let opt = Self { buffer };
        let data = opt.buffer.as_ref();

        if data.len() < HBH_LEN || data[2] != HYPER_OPT_TYPE || data[3] != 20 {
            return None;
        }

        Some(opt)
    }

    /// Locate the coordinate option inside an IPv6 packet.
    ///
    /// Returns the byte offset of the hop-by-hop header when the packet's
    /// first extension header carries the option.
    pub fn locate(packet: &[u8]) -> Option<usize> {
        let ip = Ipv6Packet::new(packet).ok()?;
        if ip.next_header() != next_header::HOP_BY_HOP {
            return None;
        }

        let at = Ipv6Packet::<&[u8]>::HEADER_LEN;
        HyperOpt::new(packet.get(at..at + HBH_LEN)?).map(|_| at)
    }

    /// Return the next header field of the carrying extension header.
    pub fn next_header(&self) -> u8 {
        self.buffer.as_ref()[0]
    }

    /// Return the originator-assigned packet id.
    pub fn packet_id(&self) -> u16 {
        let data = self.buffer.as_ref();
        u16::from_le_bytes([data[4], data[5]])
    }

    /// Return the source coordinate sequence number.
    pub fn src_seq(&self) -> CoordSeq {
        CoordSeq(self.buffer.as_ref()[6])
    }

    /// Return the destination coordinate sequence number.
    pub fn dest_seq(&self) -> CoordSeq {
        CoordSeq(self.buffer.as_ref()[7])
    }

    fn coord_at(&self, at: usize) -> Coord {
        let data = self.buffer.as_ref();
        let r = f32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        let t = f32::from_le_bytes([data[at + 4], data[at + 5], data[at + 6], data[at + 7]]);
        Coord::new(r, t)
    }

    /// Return the source coordinate.
    pub fn src_coord(&self) -> Coord {
        self.coord_at(8)
    }

    /// Return the destination coordinate.
    pub fn dest_coord(&self) -> Coord {
        self.coord_at(16)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> HyperOpt<T> {
    /// Write the fixed header and option framing over `buffer`, with both
    /// coordinates unknown.
    pub fn init(buffer: T, next_header: u8) -> Option<Self> {
        {
            let data = buffer.as_ref();
            if data.len() < HBH_LEN {
                return None;
            }
        }

        let mut opt = Self { buffer };
        let data = opt.buffer.as_mut();
        data[0] = next_header;
        data[1] = (HBH_LEN / 8 - 1) as u8;
        data[2] = HYPER_OPT_TYPE;
        data[3] = 20;
        opt.set_packet_id(0);
        opt.set_src(Coord::UNKNOWN, CoordSeq::default());
        opt.set_dest(Coord::UNKNOWN, CoordSeq::default());
        Some(opt)
    }

    /// Set the packet id.
    pub fn set_packet_id(&mut self, id: u16) {
        self.buffer.as_mut()[4..6].copy_from_slice(&id.to_le_bytes());
    }

    fn set_coord_at(&mut self, at: usize, coord: Coord) {
        let data = self.buffer.as_mut();
        data[at..at + 4].copy_from_slice(&coord.r.to_le_bytes());
        data[at + 4..at + 8].copy_from_slice(&coord.t.to_le_bytes());
    }

    /// Set the source coordinate and sequence.
    pub fn set_src(&mut self, coord: Coord, seq: CoordSeq) {
        self.buffer.as_mut()[6] = seq.0;
        self.set_coord_at(8, coord);
    }

    /// Set the destination coordinate and sequence.
    pub fn set_dest(&mut self, coord: Coord, seq: CoordSeq) {
        self.buffer.as_mut()[7] = seq.0;
        self.set_coord_at(16, coord);
    }
}
