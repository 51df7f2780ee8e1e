//! Round-robin pool of local addresses.

use log::{debug, info};
use parking_lot::Mutex;
use std::net::IpAddr;

/// An ordered pool of local addresses handed out in rotation.
///
/// Contents and cursor sit behind one lock, so replacing the pool and
/// advancing through it never observe each other half-done.
#[derive(Debug, Default)]
pub struct AddressPool {
    rotation: Mutex<Rotation>,
}

#[derive(Debug, Default)]
struct Rotation {
    addresses: Vec<IpAddr>,
    /// Index of the next address to hand out. Always `< addresses.len()`
    /// unless the pool is empty.
    cursor: usize,
}

impl AddressPool {
    /// Create an empty pool. Rotation stays disabled until addresses are set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool holding the given addresses in order.
    pub fn with_addresses(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        let pool = Self::new();
        pool.set_outgoing_addresses(addresses);
        pool
    }

    /// Replace the pool contents and restart rotation from the first address.
    pub fn set_outgoing_addresses(&self, addresses: impl IntoIterator<Item = IpAddr>) {
        let addresses: Vec<IpAddr> = addresses.into_iter().collect();
        info!("Rotating outgoing connections across {} local addresses", addresses.len());

        let mut rotation = self.rotation.lock();
        rotation.addresses = addresses;
        rotation.cursor = 0;
    }

    /// Get the address at the cursor and advance it, wrapping at the end.
    ///
    /// Returns `None` without side effects when the pool is empty.
    pub fn next_local_address(&self) -> Option<IpAddr> {
        let mut rotation = self.rotation.lock();
        let len = rotation.addresses.len();
        if len == 0 {
            return None;
        }

        let index = rotation.cursor;
        rotation.cursor = (index + 1) % len;
        let address = rotation.addresses[index];
        debug!("Selected local address {} ({}/{})", address, index + 1, len);
        Some(address)
    }

    /// Snapshot of the configured addresses.
    pub fn addresses(&self) -> Vec<IpAddr> {
        self.rotation.lock().addresses.clone()
    }

    pub fn len(&self) -> usize {
        self.rotation.lock().addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotation.lock().addresses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::thread;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn single_address_is_returned_every_time() {
        let pool = AddressPool::new();
        pool.set_outgoing_addresses([addr(1)]);

        assert_eq!(pool.next_local_address(), Some(addr(1)));
        assert_eq!(pool.next_local_address(), Some(addr(1)));
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let pool = AddressPool::new();
        pool.set_outgoing_addresses(Vec::new());

        assert_eq!(pool.next_local_address(), None);
        assert_eq!(pool.next_local_address(), None);
        assert!(pool.is_empty());
    }

    #[test]
    fn rotates_in_insertion_order_and_wraps() {
        let pool = AddressPool::with_addresses([addr(1), addr(2), addr(3)]);

        let seen: Vec<_> = (0..4).filter_map(|_| pool.next_local_address()).collect();
        assert_eq!(seen, vec![addr(1), addr(2), addr(3), addr(1)]);
    }

    #[test]
    fn duplicates_are_kept() {
        let pool = AddressPool::with_addresses([addr(1), addr(1), addr(2)]);

        let seen: Vec<_> = (0..3).filter_map(|_| pool.next_local_address()).collect();
        assert_eq!(seen, vec![addr(1), addr(1), addr(2)]);
    }

    #[test]
    fn replacing_resets_cursor() {
        let pool = AddressPool::with_addresses([addr(1), addr(2)]);
        assert_eq!(pool.next_local_address(), Some(addr(1)));

        pool.set_outgoing_addresses([addr(7), addr(8), addr(9)]);
        assert_eq!(pool.next_local_address(), Some(addr(7)));
        assert_eq!(pool.addresses(), vec![addr(7), addr(8), addr(9)]);
    }

    #[test]
    fn shrinking_the_pool_never_indexes_out_of_range() {
        let pool = AddressPool::with_addresses([addr(1), addr(2), addr(3)]);
        pool.next_local_address();
        pool.next_local_address();

        pool.set_outgoing_addresses([addr(4)]);
        assert_eq!(pool.next_local_address(), Some(addr(4)));
    }

    #[test]
    fn concurrent_rotation_spreads_evenly() {
        let pool = Arc::new(AddressPool::with_addresses([addr(1), addr(2), addr(3), addr(4)]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    (0..1000)
                        .map(|_| pool.next_local_address().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<IpAddr, usize> = HashMap::new();
        for handle in handles {
            for address in handle.join().unwrap() {
                *counts.entry(address).or_default() += 1;
            }
        }

        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&count| count == 2000));
    }

    #[test]
    fn concurrent_replacement_only_yields_pool_members() {
        let pool = Arc::new(AddressPool::with_addresses([addr(1), addr(2), addr(3)]));
        let writer = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for i in 0..500 {
                    if i % 2 == 0 {
                        pool.set_outgoing_addresses([addr(10)]);
                    } else {
                        pool.set_outgoing_addresses([addr(1), addr(2), addr(3)]);
                    }
                }
            })
        };

        let valid = [addr(1), addr(2), addr(3), addr(10)];
        for _ in 0..5000 {
            let address = pool.next_local_address().unwrap();
            assert!(valid.contains(&address));
        }
        writer.join().unwrap();
    }
}
