// Allocation state threaded through the matcher passes.
//
// Spends and earnings are addressed by their position in the Partition; the
// remaining amounts only ever go down, and every allocation is clamped to
// what both sides still have.

use std::collections::BTreeMap;

use crate::partition::Partition;

/// One earning feeding one spend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub earning: usize,
    pub cents: u64,
}

#[derive(Debug, Clone)]
pub struct AllocationState {
    spend_remaining: Vec<u64>,
    earn_remaining: Vec<u64>,
    sources: Vec<Vec<Allocation>>,
}

impl AllocationState {
    /// Fresh state: every spend needs its absolute amount, every earning
    /// has its full amount available
    pub fn new(partition: &Partition) -> Self {
        AllocationState {
            spend_remaining: partition.spends.iter().map(|tx| tx.abs_cents()).collect(),
            earn_remaining: partition.earnings.iter().map(|tx| tx.abs_cents()).collect(),
            sources: vec![Vec::new(); partition.spends.len()],
        }
    }

    pub fn spend_remaining(&self, spend: usize) -> u64 {
        self.spend_remaining[spend]
    }

    pub fn earn_remaining(&self, earning: usize) -> u64 {
        self.earn_remaining[earning]
    }

    /// Allocations recorded for a spend, in the order they were made
    pub fn sources(&self, spend: usize) -> &[Allocation] {
        &self.sources[spend]
    }

    /// Move up to `cents` from an earning to a spend.
    /// Returns the amount actually moved (0 when either side is exhausted).
    pub fn allocate(&mut self, spend: usize, earning: usize, cents: u64) -> u64 {
        let amount = cents
            .min(self.spend_remaining[spend])
            .min(self.earn_remaining[earning]);
        if amount == 0 {
            return 0;
        }

        self.spend_remaining[spend] -= amount;
        self.earn_remaining[earning] -= amount;
        self.sources[spend].push(Allocation {
            earning,
            cents: amount,
        });
        amount
    }

    /// Spends still needing coverage, in partition order
    pub fn unmatched_spends(&self) -> Vec<usize> {
        (0..self.spend_remaining.len())
            .filter(|&i| self.spend_remaining[i] > 0)
            .collect()
    }

    /// Earnings with cents left, in partition order
    pub fn unmatched_earnings(&self) -> Vec<usize> {
        (0..self.earn_remaining.len())
            .filter(|&i| self.earn_remaining[i] > 0)
            .collect()
    }

    pub fn is_settled(&self) -> bool {
        self.unmatched_spends().is_empty() || self.unmatched_earnings().is_empty()
    }

    /// Unallocated cents per earning id
    pub fn remaining_earnings(&self, partition: &Partition) -> BTreeMap<String, u64> {
        partition
            .earnings
            .iter()
            .zip(self.earn_remaining.iter())
            .map(|(tx, &left)| (tx.id.clone(), left))
            .collect()
    }

    /// Recorded sources per spend, earning positions resolved to ids
    pub fn into_sources(self, partition: &Partition) -> Vec<Vec<(String, u64)>> {
        self.sources
            .into_iter()
            .map(|allocs| {
                allocs
                    .into_iter()
                    .map(|a| (partition.earnings[a.earning].id.clone(), a.cents))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    fn partition() -> Partition {
        Partition::split(&[
            Transaction::new("e1", 1, 5_000, ""),
            Transaction::new("s1", 2, -3_000, ""),
            Transaction::new("s2", 3, -4_000, ""),
        ])
    }

    #[test]
    fn test_initial_state() {
        let p = partition();
        let state = AllocationState::new(&p);

        assert_eq!(state.spend_remaining(0), 3_000);
        assert_eq!(state.spend_remaining(1), 4_000);
        assert_eq!(state.earn_remaining(0), 5_000);
        assert_eq!(state.unmatched_spends(), vec![0, 1]);
        assert!(!state.is_settled());
    }

    #[test]
    fn test_allocate_clamps_to_both_sides() {
        let p = partition();
        let mut state = AllocationState::new(&p);

        // Spend need caps it
        assert_eq!(state.allocate(0, 0, 10_000), 3_000);
        // Earning availability caps it
        assert_eq!(state.allocate(1, 0, 4_000), 2_000);
        // Nothing left
        assert_eq!(state.allocate(1, 0, 1), 0);

        assert_eq!(state.spend_remaining(1), 2_000);
        assert_eq!(state.earn_remaining(0), 0);
        assert_eq!(state.sources(1).len(), 1);
        assert!(state.is_settled());

        let remaining = state.remaining_earnings(&p);
        assert_eq!(remaining.get("e1"), Some(&0));

        let sources = state.into_sources(&p);
        assert_eq!(sources[0], vec![("e1".to_string(), 3_000)]);
        assert_eq!(sources[1], vec![("e1".to_string(), 2_000)]);
    }
}
