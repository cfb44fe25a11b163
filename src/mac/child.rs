//! Child bookkeeping: confirmed children and the pending-join reservation
//! slots used between a sent Join-Ack and the corresponding Join-Cfm.

use std::collections::HashMap;

use crate::address::Address;
use crate::scheduler::Time;

/// A confirmed child.
#[derive(Copy, Clone, Debug, Default)]
pub struct ChildRecord {
    pub reply_received_this_round: bool,
    pub missing_duty_cycles: u8,
}

/// A child slot reserved after sending a Join-Ack, awaiting Join-Cfm.
#[derive(Copy, Clone, Debug)]
pub struct PendingChildRecord {
    pub address: Address,
    pub timestamp: Time,
}

/// Children confirmed plus child slots reserved but not yet confirmed,
/// together bounded by `MAX_NUM_CHILDREN`.
#[derive(Default)]
pub struct ChildTable {
    confirmed: HashMap<Address, ChildRecord>,
    pending: HashMap<Address, PendingChildRecord>,
    capacity: u8,
}

impl ChildTable {
    pub fn new(capacity: u8) -> Self {
        ChildTable {
            confirmed: HashMap::new(),
            pending: HashMap::new(),
            capacity,
        }
    }

    pub fn num_children(&self) -> u8 {
        self.confirmed.len() as u8
    }

    /// Reserved slots include outstanding Join-Acks not yet confirmed.
    pub fn has_free_slot(&self) -> bool {
        (self.pending.len() + self.confirmed.len()) < self.capacity as usize
    }

    pub fn reserve(&mut self, address: Address, now: Time) {
        self.pending.insert(address, PendingChildRecord { address, timestamp: now });
    }

    /// Promote a pending reservation to a confirmed child. No-op if there
    /// was no matching pending reservation.
    pub fn confirm(&mut self, address: Address) -> bool {
        if self.pending.remove(&address).is_some() {
            self.confirmed.insert(address, ChildRecord::default());
            true
        } else {
            false
        }
    }

    /// Clear all pending reservations that outlived the Accept-Join phase
    /// they were made in.
    pub fn expire_pending(&mut self) {
        self.pending.clear();
    }

    pub fn mark_replied(&mut self, address: Address) {
        if let Some(child) = self.confirmed.get_mut(&address) {
            child.reply_received_this_round = true;
        }
    }

    /// End-of-round bookkeeping: bump `missing_duty_cycles` for children
    /// that did not reply, reset it for those that did, and drop anyone
    /// past the threshold.
    pub fn end_of_round(&mut self, drop_after_missing: u8) {
        self.confirmed.retain(|_, child| {
            if child.reply_received_this_round {
                child.missing_duty_cycles = 0;
            } else {
                child.missing_duty_cycles += 1;
            }
            child.reply_received_this_round = false;
            child.missing_duty_cycles < drop_after_missing
        });
    }

    pub fn confirmed_addresses(&self) -> impl Iterator<Item = &Address> {
        self.confirmed.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_counts_against_capacity() {
        let mut table = ChildTable::new(2);
        table.reserve(Address::new(1), 0);
        assert!(table.has_free_slot());
        table.reserve(Address::new(2), 0);
        assert!(!table.has_free_slot());
    }

    #[test]
    fn confirm_promotes_and_frees_nothing_extra() {
        let mut table = ChildTable::new(2);
        table.reserve(Address::new(1), 0);
        assert!(table.confirm(Address::new(1)));
        assert_eq!(table.num_children(), 1);
        assert!(table.has_free_slot());
    }

    #[test]
    fn children_dropped_after_three_missed_rounds() {
        let mut table = ChildTable::new(3);
        table.reserve(Address::new(1), 0);
        table.confirm(Address::new(1));
        for _ in 0..3 {
            table.end_of_round(3);
        }
        assert_eq!(table.num_children(), 0);
    }

    #[test]
    fn replying_resets_missing_count() {
        let mut table = ChildTable::new(3);
        table.reserve(Address::new(1), 0);
        table.confirm(Address::new(1));
        table.end_of_round(3);
        table.end_of_round(3);
        table.mark_replied(Address::new(1));
        table.end_of_round(3);
        assert_eq!(table.num_children(), 1);
    }
}
