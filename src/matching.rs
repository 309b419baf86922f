// Multi-Pass Matcher - allocate same-day earnings to spends
//
// Four passes run strictly in order over one AllocationState:
//   1. Exact 1:1      - outstanding spend equals an untouched earning
//   2. Many-to-one    - a group of spends exactly consumes one earning
//   3. One-to-many    - a group of earnings exactly covers one spend
//   4. Greedy         - leftover earnings poured into the smallest needs
// Every pass re-derives the unmatched sets from the state it receives.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::allocation::AllocationState;
use crate::coverage::SpendMatch;
use crate::partition::Partition;
use crate::subset_sum::SubsetSumSolver;
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    Exact,
    ManyToOne,
    OneToMany,
    Greedy,
}

impl MatchPass {
    pub const ALL: [MatchPass; 4] = [
        MatchPass::Exact,
        MatchPass::ManyToOne,
        MatchPass::OneToMany,
        MatchPass::Greedy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPass::Exact => "exact",
            MatchPass::ManyToOne => "many_to_one",
            MatchPass::OneToMany => "one_to_many",
            MatchPass::Greedy => "greedy",
        }
    }
}

/// Result of one matcher run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// One entry per spend, ascending by spend time
    pub matches: Vec<SpendMatch>,

    /// Unallocated cents per earning id
    pub remaining_earnings: BTreeMap<String, u64>,
}

// ============================================================================
// MATCHING ENGINE
// ============================================================================

pub struct MatchingEngine {
    pub solver: SubsetSumSolver,
}

impl MatchingEngine {
    pub fn new() -> Self {
        MatchingEngine {
            solver: SubsetSumSolver::new(),
        }
    }

    pub fn with_max_subset_items(max_subset_items: usize) -> Self {
        MatchingEngine {
            solver: SubsetSumSolver::with_max_items(max_subset_items),
        }
    }

    /// Match one user-day. Never fails: spends nothing can pay for come
    /// back with empty sources.
    pub fn match_transactions(&self, transactions: &[Transaction]) -> MatchOutcome {
        let partition = Partition::split(transactions);
        self.match_partition(&partition)
    }

    pub fn match_partition(&self, partition: &Partition) -> MatchOutcome {
        let mut state = AllocationState::new(partition);

        for pass in MatchPass::ALL {
            if state.is_settled() {
                break;
            }
            let allocations = self.run_pass(pass, partition, &mut state);
            debug!(
                pass = pass.as_str(),
                allocations,
                unmatched_spends = state.unmatched_spends().len(),
                unmatched_earnings = state.unmatched_earnings().len(),
                "matcher pass finished"
            );
        }

        let remaining_earnings = state.remaining_earnings(partition);
        let mut sources = state.into_sources(partition);

        let matches: Vec<SpendMatch> = by_time(&partition.spends)
            .into_iter()
            .map(|i| {
                let spend = &partition.spends[i];
                SpendMatch {
                    spend_tx_id: spend.id.clone(),
                    spend_abs_cents: spend.abs_cents(),
                    sources: std::mem::take(&mut sources[i]),
                }
            })
            .collect();

        info!(
            spends = matches.len(),
            earnings = partition.earnings.len(),
            covered = matches.iter().filter(|m| m.is_covered()).count(),
            "reconciled day"
        );

        MatchOutcome {
            matches,
            remaining_earnings,
        }
    }

    /// Run a single pass; returns how many allocations it made
    pub fn run_pass(
        &self,
        pass: MatchPass,
        partition: &Partition,
        state: &mut AllocationState,
    ) -> usize {
        match pass {
            MatchPass::Exact => self.exact_pass(partition, state),
            MatchPass::ManyToOne => self.many_to_one_pass(partition, state),
            MatchPass::OneToMany => self.one_to_many_pass(state),
            MatchPass::Greedy => self.greedy_pass(state),
        }
    }

    /// Pass 1: spends in time order take the earliest untouched earning of
    /// exactly the outstanding amount
    pub fn exact_pass(&self, partition: &Partition, state: &mut AllocationState) -> usize {
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
        for e in by_time(&partition.earnings) {
            buckets
                .entry(partition.earnings[e].abs_cents())
                .or_default()
                .push(e);
        }

        let mut made = 0;
        for s in by_time(&partition.spends) {
            let need = state.spend_remaining(s);
            if need == 0 {
                continue;
            }
            let Some(candidates) = buckets.get(&need) else {
                continue;
            };
            if let Some(&e) = candidates.iter().find(|&&e| state.earn_remaining(e) >= need) {
                state.allocate(s, e, need);
                made += 1;
            }
        }
        made
    }

    /// Pass 2: largest earnings first, find spends whose outstanding amounts
    /// sum exactly to what the earning has left
    pub fn many_to_one_pass(&self, partition: &Partition, state: &mut AllocationState) -> usize {
        let mut earnings = state.unmatched_earnings();
        earnings.sort_by(|&a, &b| {
            partition.earnings[b]
                .abs_cents()
                .cmp(&partition.earnings[a].abs_cents())
        });

        let mut made = 0;
        for e in earnings {
            let target = state.earn_remaining(e);
            if target == 0 {
                continue;
            }
            let spends = state.unmatched_spends();
            let values: Vec<u64> = spends.iter().map(|&s| state.spend_remaining(s)).collect();

            let Some(picked) = self.solver.solve(&values, target) else {
                continue;
            };
            for i in picked {
                let s = spends[i];
                let need = state.spend_remaining(s);
                if state.allocate(s, e, need) > 0 {
                    made += 1;
                }
            }
        }
        made
    }

    /// Pass 3: largest outstanding spends first, find earnings whose
    /// leftovers sum exactly to the need; each member is drained in turn
    pub fn one_to_many_pass(&self, state: &mut AllocationState) -> usize {
        let mut spends = state.unmatched_spends();
        spends.sort_by(|&a, &b| state.spend_remaining(b).cmp(&state.spend_remaining(a)));

        let mut made = 0;
        for s in spends {
            let target = state.spend_remaining(s);
            if target == 0 {
                continue;
            }
            let earnings = state.unmatched_earnings();
            let values: Vec<u64> = earnings.iter().map(|&e| state.earn_remaining(e)).collect();

            let Some(picked) = self.solver.solve(&values, target) else {
                continue;
            };
            for i in picked {
                let e = earnings[i];
                let available = state.earn_remaining(e);
                if state.allocate(s, e, available) > 0 {
                    made += 1;
                }
            }
        }
        made
    }

    /// Pass 4: smallest needs first, drawing from the largest leftovers.
    /// May leave partial allocations; uses every cent while need remains.
    pub fn greedy_pass(&self, state: &mut AllocationState) -> usize {
        let mut spends = state.unmatched_spends();
        spends.sort_by_key(|&s| state.spend_remaining(s));

        let mut earnings = state.unmatched_earnings();
        earnings.sort_by(|&a, &b| state.earn_remaining(b).cmp(&state.earn_remaining(a)));

        let mut made = 0;
        let mut cursor = 0;
        for s in spends {
            while state.spend_remaining(s) > 0 && cursor < earnings.len() {
                let e = earnings[cursor];
                let available = state.earn_remaining(e);
                if available == 0 {
                    cursor += 1;
                    continue;
                }
                let need = state.spend_remaining(s);
                if state.allocate(s, e, need.min(available)) > 0 {
                    made += 1;
                }
            }
        }
        made
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Positions ordered by transaction time; ties keep input order
fn by_time(transactions: &[Transaction]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..transactions.len()).collect();
    order.sort_by_key(|&i| transactions[i].time);
    order
}

/// Match with the default subset cap
pub fn match_spends_to_earnings(transactions: &[Transaction]) -> MatchOutcome {
    MatchingEngine::new().match_transactions(transactions)
}

// ============================================================================
// TESTS
// ============================================================================
