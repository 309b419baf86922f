use proptest::prelude::*;
use std::collections::HashMap;

use spend_coverage::{
    match_spends_to_earnings, AllocationSource, CoverageReporter, MatchingEngine, Partition,
    SubsetSumSolver, Transaction,
};

/// A day with up to 8 spends and 8 earnings; ids are unique, times may tie
fn day_strategy() -> impl Strategy<Value = Vec<Transaction>> {
    let spends = prop::collection::vec((0i64..86_400, 1i64..20_000), 0..8);
    let earnings = prop::collection::vec((0i64..86_400, 1i64..20_000), 0..8);

    (spends, earnings).prop_map(|(spends, earnings)| {
        let mut txs: Vec<Transaction> = spends
            .into_iter()
            .enumerate()
            .map(|(i, (t, a))| Transaction::new(&format!("s{}", i), t, -a, ""))
            .collect();
        txs.extend(
            earnings
                .into_iter()
                .enumerate()
                .map(|(i, (t, a))| Transaction::new(&format!("e{}", i), t, a, "")),
        );
        txs
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every spend appears exactly once, ordered by time
    #[test]
    fn prop_one_entry_per_spend(txs in day_strategy()) {
        let outcome = match_spends_to_earnings(&txs);
        let spend_count = txs.iter().filter(|t| t.is_spend()).count();
        prop_assert_eq!(outcome.matches.len(), spend_count);

        let times: HashMap<&str, i64> = txs.iter().map(|t| (t.id.as_str(), t.time)).collect();
        for pair in outcome.matches.windows(2) {
            prop_assert!(times[pair[0].spend_tx_id.as_str()] <= times[pair[1].spend_tx_id.as_str()]);
        }
    }

    /// No spend is over-covered and no earning is over-used
    #[test]
    fn prop_no_over_allocation(txs in day_strategy()) {
        let outcome = match_spends_to_earnings(&txs);
        let amounts: HashMap<&str, u64> = txs.iter().map(|t| (t.id.as_str(), t.abs_cents())).collect();

        let mut used: HashMap<&str, u64> = HashMap::new();
        for m in &outcome.matches {
            prop_assert!(m.covered_cents() <= m.spend_abs_cents);
            prop_assert_eq!(m.covered_cents() + m.uncovered_cents(), m.spend_abs_cents);
            for (earning, cents) in &m.sources {
                prop_assert!(*cents > 0);
                prop_assert!(earning.starts_with('e'));
                *used.entry(earning.as_str()).or_insert(0) += cents;
            }
        }
        for (earning, total) in &used {
            prop_assert!(*total <= amounts[earning]);
        }
    }

    /// Allocated cents plus leftover earnings equal total earnings
    #[test]
    fn prop_conservation(txs in day_strategy()) {
        let outcome = match_spends_to_earnings(&txs);
        let partition = Partition::split(&txs);
        let totals = partition.totals();

        let allocated: u64 = outcome.matches.iter().map(|m| m.covered_cents()).sum();
        let left: u64 = outcome.remaining_earnings.values().sum();
        prop_assert_eq!(allocated + left, totals.earn_total);

        let report = CoverageReporter::report(&partition, &outcome.matches, AllocationSource::Deterministic);
        prop_assert_eq!(&report.remaining_earnings, &outcome.remaining_earnings);
        let uncovered: u64 = report.spends.iter().map(|s| s.uncovered_cents).sum();
        prop_assert_eq!(allocated + uncovered, totals.spend_total);
    }

    /// With nothing to draw from, every spend stays fully uncovered
    #[test]
    fn prop_no_earnings_is_a_no_op(amounts in prop::collection::vec(1i64..20_000, 0..10)) {
        let txs: Vec<Transaction> = amounts
            .iter()
            .enumerate()
            .map(|(i, a)| Transaction::new(&format!("s{}", i), i as i64, -a, ""))
            .collect();

        let outcome = match_spends_to_earnings(&txs);
        prop_assert!(outcome.remaining_earnings.is_empty());
        for m in &outcome.matches {
            prop_assert!(m.sources.is_empty());
            prop_assert_eq!(m.uncovered_cents(), m.spend_abs_cents);
        }
    }

    /// Money is never left idle while a spend is short
    #[test]
    fn prop_uncovered_implies_drained(txs in day_strategy()) {
        let outcome = match_spends_to_earnings(&txs);
        if outcome.matches.iter().any(|m| !m.is_covered()) {
            prop_assert!(outcome.remaining_earnings.values().all(|&left| left == 0));
        }
    }

    #[test]
    fn prop_deterministic(txs in day_strategy(), cap in 1usize..8) {
        let engine = MatchingEngine::with_max_subset_items(cap);
        prop_assert_eq!(engine.match_transactions(&txs), engine.match_transactions(&txs));
    }

    /// Whatever the solver returns sums to the target within the cap
    #[test]
    fn prop_solver_hits_target(
        values in prop::collection::vec(1u64..500, 0..10),
        target in 0u64..2_000,
        cap in 1usize..7,
    ) {
        let solver = SubsetSumSolver::with_max_items(cap);
        if let Some(picked) = solver.solve(&values, target) {
            prop_assert!(picked.len() <= cap);
            let mut seen = picked.clone();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), picked.len());
            prop_assert_eq!(picked.iter().map(|&i| values[i]).sum::<u64>(), target);
        }
    }
}

#[test]
fn test_no_exact_groupings_falls_through_to_greedy() {
    // Primes no subset of the other side can hit exactly
    let txs = vec![
        Transaction::new("e1", 10, 1_301, ""),
        Transaction::new("e2", 20, 709, ""),
        Transaction::new("s1", 30, -997, ""),
        Transaction::new("s2", 40, -1_103, ""),
    ];

    let outcome = match_spends_to_earnings(&txs);
    let allocated: u64 = outcome.matches.iter().map(|m| m.covered_cents()).sum();
    assert_eq!(allocated, 2_010);
    assert!(outcome.remaining_earnings.values().all(|&left| left == 0));
    assert_eq!(outcome.matches.iter().filter(|m| m.is_covered()).count(), 1);
}
