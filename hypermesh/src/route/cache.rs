//! The duplicate-suppression packet cache.

use heapless::Deque;

use super::Error;
use crate::constants::PACKET_CACHE_TIMEOUT;
use crate::net::Ipv6Addr;
use crate::time::Instant;

/// One remembered packet: who sent it and which one it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    /// When the packet was seen.
    pub timestamp: Instant,
    /// The packet's IPv6 source.
    pub src: Ipv6Addr,
    /// The originator-assigned packet id.
    pub packet_id: u16,
    /// Whether the packet was a fragment.
    pub fragmented: bool,
    /// The fragment offset, zero when unfragmented.
    pub frag_offset: u16,
}

impl CacheEntry {
    fn matches(&self, other: &CacheEntry) -> bool {
        self.src == other.src
            && self.packet_id == other.packet_id
            && self.fragmented == other.fragmented
            && self.frag_offset == other.frag_offset
    }
}

/// A FIFO ring of recently seen packets.
///
/// Insertion preserves arrival order; a full ring drops its oldest entry.
/// Expiration pops the head only, then the caller re-walks for the next
/// deadline.
#[derive(Debug, Default)]
pub struct PacketCache<const N: usize> {
    entries: Deque<CacheEntry, N>,
}

impl<const N: usize> PacketCache<N> {
    /// Query whether a matching packet is in the window.
    pub fn contains(&self, entry: &CacheEntry) -> bool {
        self.entries.iter().any(|e| e.matches(entry))
    }

    /// Remember a packet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Duplicate`] when a matching entry is already
    /// cached; the packet has been seen inside the window.
    pub fn insert(&mut self, entry: CacheEntry) -> Result<(), Error> {
        if self.contains(&entry) {
            return Err(Error::Duplicate);
        }

        if self.entries.is_full() {
            self.entries.pop_front();
        }
        // Cannot fail: a slot was just freed if none was available.
        let _ = self.entries.push_back(entry);
        Ok(())
    }

    /// Drop the head entry if its window has passed. One pop per call; the
    /// next deadline comes from [`Self::next_expiry`].
    pub fn expire_head(&mut self, now: Instant) -> bool {
        let expired = self
            .entries
            .front()
            .map_or(false, |e| now.delta_since(e.timestamp) > PACKET_CACHE_TIMEOUT);
        if expired {
            self.entries.pop_front();
        }
        expired
    }

    /// When the current head entry leaves the window.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries
            .front()
            .map(|e| e.timestamp + PACKET_CACHE_TIMEOUT)
    }

    /// The number of cached entries.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Duration;

    fn entry(tail: u8, packet_id: u16, at: i64) -> CacheEntry {
        let mut src = Ipv6Addr::UNSPECIFIED;
        src.0[0] = 0x20;
        src.0[1] = 0x01;
        src.0[2] = 0x0d;
        src.0[3] = 0xb8;
        src.0[15] = tail;
        CacheEntry {
            timestamp: Instant::from_us(at as u64),
            src,
            packet_id,
            fragmented: false,
            frag_offset: 0,
        }
    }

    #[test]
    fn duplicate_detection() {
        let mut cache: PacketCache<8> = PacketCache::default();

        assert!(cache.insert(entry(1, 0x1234, 0)).is_ok());
        assert_eq!(cache.insert(entry(1, 0x1234, 5)), Err(Error::Duplicate));
        assert!(cache.insert(entry(1, 0x1235, 10)).is_ok());
    }

    #[test]
    fn fragments_are_distinct() {
        let mut cache: PacketCache<8> = PacketCache::default();
        let whole = entry(1, 7, 0);
        let mut frag = whole;
        frag.fragmented = true;
        frag.frag_offset = 64;

        assert!(cache.insert(whole).is_ok());
        assert!(cache.insert(frag).is_ok());
        assert_eq!(cache.insert(frag), Err(Error::Duplicate));
    }

    #[test]
    fn full_ring_drops_the_oldest() {
        let mut cache: PacketCache<2> = PacketCache::default();
        cache.insert(entry(1, 1, 0)).unwrap();
        cache.insert(entry(1, 2, 1)).unwrap();
        cache.insert(entry(1, 3, 2)).unwrap();

        assert_eq!(cache.len(), 2);
        // The oldest was evicted, so it is no longer a duplicate.
        assert!(cache.insert(entry(1, 1, 3)).is_ok());
    }

    #[test]
    fn head_expiry_pops_one_at_a_time() {
        let mut cache: PacketCache<8> = PacketCache::default();
        cache.insert(entry(1, 1, 0)).unwrap();
        cache.insert(entry(1, 2, 0)).unwrap();

        let before = Instant::from_us(1_000);
        assert!(!cache.expire_head(before));

        let after = Instant::ZERO + PACKET_CACHE_TIMEOUT + Duration::from_us(1);
        assert!(cache.expire_head(after));
        assert_eq!(cache.len(), 1);
        // Pop-then-walk: the second entry needs its own call.
        assert!(cache.expire_head(after));
        assert_eq!(cache.len(), 0);
        assert!(!cache.expire_head(after));
        assert!(cache.next_expiry().is_none());
    }
}
