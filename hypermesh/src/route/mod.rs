//! The hyperbolic geographic routing engine.
//!
//! Forwarding is stateless and greedy: a packet moves to whichever neighbor
//! is hyperbolically closest to the destination coordinate, strictly closer
//! than this node itself. Everything else is soft state in service of that
//! step: a [`RouteTable`] caching destination coordinates, a [`PacketCache`]
//! suppressing flood duplicates, and an on-demand coordinate request
//! protocol riding on ICMPv6 echoes.
//!
//! The engine shares its tables between thread-context senders and the
//! ISR-reachable receive path, so all state sits behind one
//! `critical-section` mutex; entry points take `&self`.

pub mod cache;
pub mod coord;
pub mod neighbor;
pub mod opt;
pub mod table;

pub use cache::{CacheEntry, PacketCache};
pub use coord::{derive, Coord, CoordSeq, LocalCoord};
pub use neighbor::{Neighbor, NeighborTable};
pub use opt::{HyperOpt, HBH_LEN, HYPER_OPT_TYPE};
pub use table::{Route, RouteTable};

use core::cell::RefCell;

use critical_section::Mutex;
use hypermesh_frame::Address;

use crate::constants::{
    COORD_REQUEST_TIMEOUT, HYPER_ROUTE_TABLE_SIZE, MAX_COORD_REQUESTS, NEIGHBOR_TABLE_SIZE,
    PACKET_CACHE_TABLE_SIZE,
};
use crate::net::{next_header, Icmpv6Echo, Ipv6Addr, Ipv6Packet, PacketBuf, ECHO_REQUEST};
use crate::time::Instant;

/// Why the routing engine dropped a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The packet was already seen inside the suppression window.
    Duplicate,
    /// The hop limit reached zero.
    HopLimitExceeded,
    /// The packet cannot be geo-routed and cannot be flooded.
    NoRoute,
    /// A pool, cache or buffer was full.
    NoResources,
    /// The coordinate request gave up after the retry budget.
    Timeout,
    /// The packet is not a well-formed routed packet.
    InvalidFrame,
}

/// What to do with a packet after the engine looked at it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Queue the packet to this link-layer next hop (possibly broadcast).
    Forward(Address),
    /// The packet is for this node's own stack.
    Local,
    /// Discard the packet.
    Drop(Error),
}

/// Deferred work [`Engine::service`] asks the caller to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Broadcast a coordinate request for this destination; build it with
    /// [`Engine::build_coord_request`].
    CoordRequest(Ipv6Addr),
}

struct Inner {
    routes: RouteTable<HYPER_ROUTE_TABLE_SIZE>,
    cache: PacketCache<PACKET_CACHE_TABLE_SIZE>,
    neighbors: NeighborTable<NEIGHBOR_TABLE_SIZE>,
    local: LocalCoord,
    local_addr: Ipv6Addr,
    next_packet_id: u16,
}

/// The routing engine context.
pub struct Engine {
    inner: Mutex<RefCell<Inner>>,
}

impl Engine {
    /// Create an engine for a node reachable at `local_addr`.
    pub fn new(local_addr: Ipv6Addr) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                routes: RouteTable::default(),
                cache: PacketCache::default(),
                neighbors: NeighborTable::default(),
                local: LocalCoord::default(),
                local_addr,
                next_packet_id: 0,
            })),
        }
    }

    /// Feed a Cartesian location report. Returns whether the coordinate was
    /// recomputed.
    pub fn update_location(&self, x: f32, y: f32, z: f32) -> bool {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).local.update_location(x, y, z)
        })
    }

    /// The node's own coordinate and its freshness.
    pub fn local_coord(&self) -> (Coord, CoordSeq) {
        critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            (inner.local.coord(), inner.local.seq())
        })
    }

    /// Pin the node's coordinate directly, bypassing location derivation.
    /// Meant for anchor nodes with surveyed positions.
    pub fn set_coordinate(&self, coord: Coord) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).local.set_fixed(coord));
    }

    /// Record a neighbor's advertised coordinate.
    pub fn neighbor_heard(&self, addr: Address, coord: Coord, seq: CoordSeq) {
        critical_section::with(|cs| {
            self.inner
                .borrow_ref_mut(cs)
                .neighbors
                .update(addr, coord, seq)
        });
    }

    /// Route a locally originated packet: stamp the coordinate option and
    /// pick the link-layer next hop.
    ///
    /// A destination with no cached coordinate floods the packet and leaves
    /// a pending coordinate request behind; [`Engine::service`] drives its
    /// retransmissions.
    pub fn send(&self, packet: &mut PacketBuf, now: Instant) -> Verdict {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;

            let (dst, first_nh, payload_len) = {
                let ip = match Ipv6Packet::new(packet.as_slice()) {
                    Ok(ip) => ip,
                    Err(_) => return Verdict::Drop(Error::InvalidFrame),
                };
                (ip.dst_addr(), ip.next_header(), ip.payload_length())
            };

            // Splice the coordinate option in when the packet has none.
            let at = match HyperOpt::<&[u8]>::locate(packet.as_slice()) {
                Some(at) => at,
                None => {
                    let at = Ipv6Packet::<&[u8]>::HEADER_LEN;
                    if packet.insert(at, HBH_LEN).is_err() {
                        return Verdict::Drop(Error::NoResources);
                    }
                    let slice = packet.as_mut_slice();
                    if HyperOpt::init(&mut slice[at..at + HBH_LEN], first_nh).is_none() {
                        return Verdict::Drop(Error::NoResources);
                    }
                    let mut ip = Ipv6Packet::new_unchecked(slice);
                    ip.set_next_header(next_header::HOP_BY_HOP);
                    ip.set_payload_length(payload_len + HBH_LEN as u16);
                    at
                }
            };

            let packet_id = inner.next_packet_id;
            inner.next_packet_id = inner.next_packet_id.wrapping_add(1);

            let slice = packet.as_mut_slice();
            let Some(mut opt) = HyperOpt::new(&mut slice[at..at + HBH_LEN]) else {
                return Verdict::Drop(Error::InvalidFrame);
            };
            opt.set_packet_id(packet_id);
            let local = inner.local.coord();
            opt.set_src(local, inner.local.seq());

            if dst.is_multicast() {
                return Verdict::Forward(Address::BROADCAST);
            }

            match inner.routes.find(&dst).map(|r| (r.valid, r.coord, r.coord_seq)) {
                Some((true, coord, seq)) => {
                    opt.set_dest(coord, seq);
                    if let Some(route) = inner.routes.find_mut(&dst) {
                        route.last_used = now;
                    }

                    let limit = if local.is_valid() {
                        local.distance(&coord)
                    } else {
                        f32::INFINITY
                    };
                    match inner.neighbors.closest_to(&coord, limit) {
                        Some(neighbor) => Verdict::Forward(neighbor.addr),
                        None => Verdict::Forward(Address::BROADCAST),
                    }
                }
                _ => {
                    // No usable coordinate yet: reserve a route and arm the
                    // request timer; the packet floods meanwhile.
                    if let Ok(route) = inner.routes.alloc(dst, 0, now) {
                        if !route.valid && route.retry_at.is_none() {
                            route.retry_at = Some(now);
                        }
                        route.last_used = now;
                    }
                    Verdict::Forward(Address::BROADCAST)
                }
            }
        })
    }

    /// Take delivery of a packet addressed to this node.
    ///
    /// Updates the reverse route from the source coordinate and filters
    /// duplicates of flooded packets.
    pub fn recv(&self, packet: &[u8], now: Instant) -> Verdict {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;

            let src = match Ipv6Packet::new(packet) {
                Ok(ip) => ip.src_addr(),
                Err(_) => return Verdict::Drop(Error::InvalidFrame),
            };

            let Some(at) = HyperOpt::<&[u8]>::locate(packet) else {
                return Verdict::Local;
            };
            let Some(opt) = HyperOpt::new(&packet[at..at + HBH_LEN]) else {
                return Verdict::Local;
            };

            inner
                .routes
                .observe(src, opt.src_coord(), opt.src_seq(), 0, now);

            let seen = CacheEntry {
                timestamp: now,
                src,
                packet_id: opt.packet_id(),
                fragmented: false,
                frag_offset: 0,
            };
            if inner.cache.insert(seen).is_err() {
                return Verdict::Drop(Error::Duplicate);
            }

            Verdict::Local
        })
    }

    /// Forward a packet destined elsewhere.
    ///
    /// Decrements the hop limit, reconciles the packet's coordinate fields
    /// with the route table in both directions, and picks the next hop; a
    /// destination still without a coordinate is re-flooded. A packet for
    /// which this node is the local minimum goes to the local stack.
    pub fn route(&self, packet: &mut PacketBuf, now: Instant) -> Verdict {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;

            let slice = packet.as_mut_slice();

            let (src, dst, hop_limit) = {
                let ip = match Ipv6Packet::new(&slice[..]) {
                    Ok(ip) => ip,
                    Err(_) => return Verdict::Drop(Error::InvalidFrame),
                };
                (ip.src_addr(), ip.dst_addr(), ip.hop_limit())
            };

            let Some(at) = HyperOpt::<&[u8]>::locate(&slice[..]) else {
                return Verdict::Drop(Error::NoRoute);
            };
            let Some(mut opt) = HyperOpt::new(&mut slice[at..at + HBH_LEN]) else {
                return Verdict::Drop(Error::NoRoute);
            };

            let seen = CacheEntry {
                timestamp: now,
                src,
                packet_id: opt.packet_id(),
                fragmented: false,
                frag_offset: 0,
            };
            if inner.cache.insert(seen).is_err() {
                return Verdict::Drop(Error::Duplicate);
            }

            if hop_limit <= 1 {
                return Verdict::Drop(Error::HopLimitExceeded);
            }

            // Reconcile the source direction: the packet teaches the table,
            // or the table corrects the packet, whichever is fresher.
            inner
                .routes
                .observe(src, opt.src_coord(), opt.src_seq(), 0, now);
            if let Some(route) = inner.routes.find(&src) {
                if route.valid && route.coord_seq.newer_than(opt.src_seq()) {
                    opt.set_src(route.coord, route.coord_seq);
                }
            }

            // Destination direction, both ways as well.
            inner
                .routes
                .observe(dst, opt.dest_coord(), opt.dest_seq(), 0, now);
            if let Some(route) = inner.routes.find_mut(&dst) {
                if route.valid && route.coord_seq.newer_than(opt.dest_seq()) {
                    opt.set_dest(route.coord, route.coord_seq);
                }
                route.last_used = now;
            }

            let dest_coord = opt.dest_coord();

            Ipv6Packet::new_unchecked(&mut slice[..]).set_hop_limit(hop_limit - 1);

            if !dest_coord.is_valid() {
                return Verdict::Forward(Address::BROADCAST);
            }

            let local = inner.local.coord();
            let limit = if local.is_valid() {
                local.distance(&dest_coord)
            } else {
                f32::INFINITY
            };
            match inner.neighbors.closest_to(&dest_coord, limit) {
                Some(neighbor) => Verdict::Forward(neighbor.addr),
                None => Verdict::Local,
            }
        })
    }

    /// Drive the engine's timers.
    ///
    /// Pops one expired packet-cache head, fires at most one due coordinate
    /// request, and returns the work to perform plus the next deadline to
    /// call back at.
    pub fn service(&self, now: Instant) -> (Option<Event>, Option<Instant>) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;

            inner.cache.expire_head(now);

            let due = inner.routes.due_retry(now).map(|route| {
                if route.requests_sent >= MAX_COORD_REQUESTS {
                    (route.dest, true)
                } else {
                    route.requests_sent += 1;
                    route.retry_at = Some(now + COORD_REQUEST_TIMEOUT);
                    (route.dest, false)
                }
            });

            let event = match due {
                Some((dest, true)) => {
                    // The destination never answered: give the route up.
                    inner.routes.remove(&dest);
                    debug!("coordinate request for {} timed out", dest);
                    None
                }
                Some((dest, false)) => Some(Event::CoordRequest(dest)),
                None => None,
            };

            let next = [inner.cache.next_expiry(), inner.routes.next_retry()]
                .into_iter()
                .flatten()
                .reduce(|a, b| if b.is_after(a) { a } else { b });

            (event, next)
        })
    }

    /// Build the broadcast coordinate request for `dest` into `out`.
    pub fn build_coord_request(&self, dest: Ipv6Addr, out: &mut PacketBuf) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let inner = &mut *inner;

            let total =
                Ipv6Packet::<&[u8]>::HEADER_LEN + HBH_LEN + Icmpv6Echo::<&[u8]>::HEADER_LEN;
            out.set_len(total).map_err(|_| Error::NoResources)?;

            let packet_id = inner.next_packet_id;
            inner.next_packet_id = inner.next_packet_id.wrapping_add(1);
            let local_addr = inner.local_addr;

            let slice = out.as_mut_slice();
            slice.fill(0);

            {
                let mut ip = Ipv6Packet::new_unchecked(&mut slice[..]);
                ip.init();
                ip.set_payload_length((HBH_LEN + Icmpv6Echo::<&[u8]>::HEADER_LEN) as u16);
                ip.set_next_header(next_header::HOP_BY_HOP);
                ip.set_hop_limit(64);
                ip.set_src_addr(local_addr);
                ip.set_dst_addr(dest);
            }

            let at = Ipv6Packet::<&[u8]>::HEADER_LEN;
            {
                let mut opt = HyperOpt::init(&mut slice[at..at + HBH_LEN], next_header::ICMPV6)
                    .ok_or(Error::NoResources)?;
                opt.set_packet_id(packet_id);
                opt.set_src(inner.local.coord(), inner.local.seq());
            }

            {
                let mut echo = Icmpv6Echo::new(&mut slice[at + HBH_LEN..])
                    .map_err(|_| Error::NoResources)?;
                echo.set_msg_type(ECHO_REQUEST);
                echo.set_code(0);
                echo.set_identifier(packet_id);
                echo.set_sequence(0);
                echo.fill_checksum(&local_addr, &dest);
            }

            Ok(())
        })
    }
}
