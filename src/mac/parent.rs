//! Parent bookkeeping: the single active parent record and the bounded
//! candidate set built during Observe.

use crate::address::Address;

/// What a node knows about its current upstream parent. `hops = 255` is the
/// disconnected sentinel.
#[derive(Copy, Clone, Debug)]
pub struct ParentRecord {
    pub address: Address,
    pub hops_to_gateway: u8,
    pub num_children_of_parent: u8,
    pub link_quality_dbm: i16,
    pub uplink_channel: u8,
}

impl ParentRecord {
    pub const DISCONNECTED_HOPS: u8 = 255;
}

/// One candidate overheard during Observe: a prospective parent plus the
/// evidence needed to rank it once we try to join.
#[derive(Copy, Clone, Debug)]
pub struct Candidate {
    pub address: Address,
    pub private_channel: u8,
    pub num_children: u8,
    pub next_accept_join_s: u32,
}

/// Candidates admitted during Observe, bounded to
/// `MAX_NUM_CANDIDATE_PARENT`, insertion order preserved (join attempts try
/// them in the order they were discovered).
#[derive(Default)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
    capacity: u8,
}

impl CandidateSet {
    pub fn new(capacity: u8) -> Self {
        CandidateSet {
            candidates: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.candidates.len() >= self.capacity as usize
    }

    /// Admit a candidate unless already present or the set is full.
    /// Returns `true` if this was the first candidate admitted.
    pub fn admit(&mut self, candidate: Candidate) -> bool {
        if self.is_full() || self.candidates.iter().any(|c| c.address == candidate.address) {
            return false;
        }
        let was_empty = self.candidates.is_empty();
        self.candidates.push(candidate);
        was_empty
    }

    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.get(index)
    }

    /// The earliest announced Accept-Join start among all admitted
    /// candidates; used to schedule when the Join attempt sequence begins.
    pub fn earliest_accept_join_s(&self) -> Option<u32> {
        self.candidates.iter().map(|c| c.next_accept_join_s).min()
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(addr: u16, aj: u32) -> Candidate {
        Candidate {
            address: Address::new(addr),
            private_channel: 1,
            num_children: 0,
            next_accept_join_s: aj,
        }
    }

    #[test]
    fn admits_up_to_capacity_and_ignores_duplicates() {
        let mut set = CandidateSet::new(3);
        assert!(set.admit(candidate(1, 10)));
        assert!(!set.admit(candidate(2, 20)));
        assert!(!set.admit(candidate(1, 30))); // duplicate address
        assert!(!set.admit(candidate(3, 5)));
        assert!(set.is_full());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn earliest_accept_join_is_minimum() {
        let mut set = CandidateSet::new(3);
        set.admit(candidate(1, 30));
        set.admit(candidate(2, 10));
        set.admit(candidate(3, 20));
        assert_eq!(set.earliest_accept_join_s(), Some(10));
    }
}
