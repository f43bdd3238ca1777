//! The stateful-compression context table.

use super::{Error, Result};
use crate::constants::CONTEXT_TABLE_SIZE;
use crate::net::Ipv6Addr;

/// A compression context: an IPv6 prefix a 4-bit context id stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    /// The prefix octets; bits past `prefix_len` are ignored.
    pub prefix: [u8; 16],
    /// The prefix length in bits.
    pub prefix_len: u8,
}

impl Context {
    /// The link-local prefix `fe80::/64`, always installed as context 0.
    pub const LINK_LOCAL: Self = Self {
        prefix: [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        prefix_len: 64,
    };

    /// Query whether `addr` falls under this prefix.
    pub fn covers(&self, addr: &Ipv6Addr) -> bool {
        let full = self.prefix_len as usize / 8;
        let rest = self.prefix_len as usize % 8;

        if addr.0[..full] != self.prefix[..full] {
            return false;
        }
        if rest != 0 {
            let mask = 0xffu8 << (8 - rest);
            if (addr.0[full] ^ self.prefix[full]) & mask != 0 {
                return false;
            }
        }
        true
    }
}

/// The table mapping 4-bit context ids to prefixes.
///
/// Context 0 is reserved for the link-local prefix and cannot be replaced.
pub struct ContextTable {
    slots: [Option<Context>; CONTEXT_TABLE_SIZE],
}

impl Default for ContextTable {
    fn default() -> Self {
        let mut slots = [None; CONTEXT_TABLE_SIZE];
        slots[0] = Some(Context::LINK_LOCAL);
        Self { slots }
    }
}

impl ContextTable {
    /// Create a table with only the reserved link-local context installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a context under `id`.
    ///
    /// # Errors
    ///
    /// Fails for id 0 (reserved) and for ids beyond the 4-bit space.
    pub fn add(&mut self, id: u8, context: Context) -> Result<()> {
        if id == 0 || id as usize >= CONTEXT_TABLE_SIZE {
            return Err(Error::NoResources);
        }
        self.slots[id as usize] = Some(context);
        Ok(())
    }

    /// Remove the context under `id`, if any. Context 0 stays.
    pub fn remove(&mut self, id: u8) {
        if id != 0 && (id as usize) < CONTEXT_TABLE_SIZE {
            self.slots[id as usize] = None;
        }
    }

    /// Look a context up by id.
    pub fn get(&self, id: u8) -> Option<&Context> {
        self.slots.get(id as usize)?.as_ref()
    }

    /// Find the context with the longest prefix covering `addr`, excluding
    /// the reserved link-local context (link-local compresses statelessly).
    pub fn lookup(&self, addr: &Ipv6Addr) -> Option<(u8, &Context)> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(id, slot)| slot.as_ref().map(|c| (id as u8, c)))
            .filter(|(_, c)| c.covers(addr))
            .max_by_key(|(_, c)| c.prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_zero_is_reserved() {
        let mut table = ContextTable::new();
        assert_eq!(table.get(0), Some(&Context::LINK_LOCAL));
        assert_eq!(table.add(0, Context::LINK_LOCAL), Err(Error::NoResources));
        assert_eq!(table.add(16, Context::LINK_LOCAL), Err(Error::NoResources));

        table.remove(0);
        assert!(table.get(0).is_some());
    }

    #[test]
    fn longest_prefix_wins() {
        let mut table = ContextTable::new();
        let mut wide = Context {
            prefix: [0; 16],
            prefix_len: 16,
        };
        wide.prefix[..2].copy_from_slice(&[0x20, 0x01]);
        let mut narrow = wide;
        narrow.prefix[2..4].copy_from_slice(&[0x0d, 0xb8]);
        narrow.prefix_len = 64;

        table.add(1, wide).unwrap();
        table.add(2, narrow).unwrap();

        let mut addr = Ipv6Addr::UNSPECIFIED;
        addr.0[..4].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8]);
        addr.0[15] = 1;

        let (id, _) = table.lookup(&addr).unwrap();
        assert_eq!(id, 2);

        addr.0[2] = 0xff;
        let (id, _) = table.lookup(&addr).unwrap();
        assert_eq!(id, 1);
    }
}
