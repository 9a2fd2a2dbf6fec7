use std::collections::BTreeMap;

/// Load and capacity of one resource in one time slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// The capacity currently committed by admitted services.
    pub load: i64,

    /// The maximum capacity of the resource. Constant.
    pub capacity: i64,
}

impl Slot {
    pub fn new(capacity: i64) -> Self {
        Slot { load: 0, capacity }
    }

    pub fn residual(&self) -> i64 {
        self.capacity - self.load
    }

    /// Adds `requirement` to the load of this slot.
    ///
    /// # Returns
    /// `true` if the load was adjusted, `false` if the requirement did not fit (an error is logged).
    pub fn insert(&mut self, requirement: i64) -> bool {
        if self.load + requirement > self.capacity {
            log::error!("Reservation exceeds capacity of slot. Load with request: {} Slot capacity: {}", self.load + requirement, self.capacity);
            return false;
        }

        self.load += requirement;
        true
    }

    /// Removes `requirement` from the load of this slot.
    ///
    /// # Returns
    /// `true` if the load was adjusted, `false` if it would become negative (an error is logged).
    pub fn delete(&mut self, requirement: i64) -> bool {
        if self.load < requirement {
            log::error!("Release of {} results in a negative load of slot (load {}) --> Signals an error in the implementation.", requirement, self.load);
            return false;
        }

        self.load -= requirement;
        true
    }
}

/// Sparse per-slot book of one resource. Slots that were never touched have zero load.
#[derive(Debug, Clone)]
pub struct SlotLedger {
    capacity: i64,
    slots: BTreeMap<u32, Slot>,
}

impl SlotLedger {
    pub fn new(capacity: i64) -> Self {
        Self { capacity, slots: BTreeMap::new() }
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    pub fn load(&self, slot: u32) -> i64 {
        self.slots.get(&slot).map_or(0, |s| s.load)
    }

    pub fn residual(&self, slot: u32) -> i64 {
        self.capacity - self.load(slot)
    }

    pub fn can_reserve(&self, slot: u32, requirement: i64) -> bool {
        self.residual(slot) >= requirement
    }

    /// # Returns
    /// `true` if the requirement was committed at `slot`.
    pub fn reserve(&mut self, slot: u32, requirement: i64) -> bool {
        let capacity = self.capacity;
        self.slots.entry(slot).or_insert_with(|| Slot::new(capacity)).insert(requirement)
    }

    pub fn release(&mut self, slot: u32, requirement: i64) -> bool {
        match self.slots.get_mut(&slot) {
            Some(s) => s.delete(requirement),
            None => {
                log::error!("Release on slot {} was not possible, because nothing is reserved there.", slot);
                false
            }
        }
    }

    /// Slots with a non-zero load, in ascending order.
    pub fn busy_slots(&self) -> impl Iterator<Item = (u32, i64)> + '_ {
        self.slots.iter().filter(|(_, s)| s.load > 0).map(|(t, s)| (*t, s.load))
    }

    pub fn reset(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_respects_capacity() {
        let mut ledger = SlotLedger::new(10);
        assert!(ledger.reserve(3, 6));
        assert!(!ledger.reserve(3, 5));
        assert!(ledger.reserve(3, 4));
        assert_eq!(ledger.residual(3), 0);
        assert_eq!(ledger.residual(4), 10);
    }

    #[test]
    fn test_release_rejects_negative_load() {
        let mut ledger = SlotLedger::new(1);
        assert!(!ledger.release(0, 1));
        assert!(ledger.reserve(0, 1));
        assert!(ledger.release(0, 1));
        assert_eq!(ledger.busy_slots().count(), 0);
    }
}
