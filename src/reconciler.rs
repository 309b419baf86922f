// Daily reconciliation - one user-day in, one coverage report out.
//
// validate -> partition -> match -> (optional refinement) -> report
// The deterministic report is always computed first; a refinement can only
// replace it after passing validation.

use governor::clock::{Clock, DefaultClock};
use tracing::info_span;

use crate::config::CoverageConfig;
use crate::coverage::{AllocationSource, CoverageReport, CoverageReporter};
use crate::error::InputError;
use crate::matching::MatchingEngine;
use crate::partition::Partition;
use crate::refinement::Refiner;
use crate::transaction::{validate_day_set, Transaction};

pub struct Reconciler<C: Clock = DefaultClock> {
    pub engine: MatchingEngine,
    refiner: Option<Refiner<C>>,
}

impl Reconciler<DefaultClock> {
    pub fn new() -> Self {
        Reconciler {
            engine: MatchingEngine::new(),
            refiner: None,
        }
    }

    pub fn from_config(config: &CoverageConfig) -> Self {
        Reconciler {
            engine: MatchingEngine::with_max_subset_items(config.max_subset_items),
            refiner: None,
        }
    }
}

impl Default for Reconciler<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Reconciler<C> {
    pub fn with_refiner<D: Clock>(self, refiner: Refiner<D>) -> Reconciler<D> {
        Reconciler {
            engine: self.engine,
            refiner: Some(refiner),
        }
    }

    /// Reconcile one user-day. Only malformed input is an error; coverage
    /// gaps and refinement failures are part of the report.
    pub fn reconcile(&mut self, transactions: &[Transaction]) -> Result<CoverageReport, InputError> {
        let _span = info_span!("reconcile", transactions = transactions.len()).entered();

        validate_day_set(transactions)?;

        let partition = Partition::split(transactions);
        let outcome = self.engine.match_partition(&partition);

        let (matches, source) = match self.refiner.as_mut() {
            Some(refiner) if refiner.should_refine(&outcome.matches) => {
                refiner.refine_or_fallback(transactions, &partition, outcome.matches)
            }
            _ => (outcome.matches, AllocationSource::Deterministic),
        };

        Ok(CoverageReporter::report(&partition, &matches, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefinementMode;
    use crate::error::ProviderError;
    use crate::rate_limit::CallRateLimiter;
    use crate::refinement::RefinementProvider;
    use governor::clock::FakeRelativeClock;
    use std::time::Duration;

    struct Canned(&'static str);

    impl RefinementProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    fn with_canned(response: &'static str) -> Reconciler<FakeRelativeClock> {
        let limiter =
            CallRateLimiter::with_clock(5, Duration::from_secs(60), FakeRelativeClock::default())
                .unwrap();
        let refiner = Refiner::with_limiter(
            Box::new(Canned(response)),
            limiter,
            RefinementMode::WhenUncovered,
            "test-model",
        );
        Reconciler::new().with_refiner(refiner)
    }

    fn partial_day() -> Vec<Transaction> {
        vec![
            Transaction::new("e1", 1_704_067_210, 10_000, "Salary"),
            Transaction::new("s1", 1_704_067_800, -3_000, "Coffee"),
            Transaction::new("s2", 1_704_068_400, -8_000, "Groceries"),
        ]
    }

    #[test]
    fn test_deterministic_report() {
        let report = Reconciler::new().reconcile(&partial_day()).unwrap();

        assert_eq!(report.totals.spend_total, 11_000);
        assert_eq!(report.totals.earn_total, 10_000);
        assert_eq!(report.allocation_source, AllocationSource::Deterministic);
        assert!(report.spends[0].covered);
        assert_eq!(report.spends[1].uncovered_cents, 1_000);
        assert_eq!(report.remaining_earnings.get("e1"), Some(&0));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let mut txs = partial_day();
        txs.push(Transaction::new("s1", 1_704_069_000, -100, "Again"));

        assert_eq!(
            Reconciler::new().reconcile(&txs),
            Err(InputError::DuplicateId("s1".to_string()))
        );
    }

    #[test]
    fn test_accepted_refinement_recomputes_remaining() {
        let mut reconciler = with_canned(
            r#"{"reconcile": {"spends": [{"tx_id": "s2", "sources": [{"tx_id": "e1", "amount_cents": 8000}]}]}}"#,
        );

        let report = reconciler.reconcile(&partial_day()).unwrap();
        assert_eq!(report.allocation_source, AllocationSource::Refined);
        assert!(!report.spends[0].covered);
        assert!(report.spends[1].covered);
        assert_eq!(report.remaining_earnings.get("e1"), Some(&2_000));
    }

    #[test]
    fn test_rejected_refinement_keeps_deterministic() {
        let mut reconciler = with_canned(
            r#"{"reconcile": {"spends": [{"tx_id": "s2", "sources": [{"tx_id": "e9", "amount_cents": 8000}]}]}}"#,
        );

        let refined = reconciler.reconcile(&partial_day()).unwrap();
        let plain = Reconciler::new().reconcile(&partial_day()).unwrap();
        assert_eq!(refined, plain);
    }

    #[test]
    fn test_overflowing_refinement_keeps_deterministic() {
        let mut reconciler = with_canned(
            r#"{"reconcile": {"spends": [
                {"tx_id": "s1", "sources": [{"tx_id": "e1", "amount_cents": 18446744073709551615}]},
                {"tx_id": "s2", "sources": [{"tx_id": "e1", "amount_cents": 1}]}
            ]}}"#,
        );

        let report = reconciler.reconcile(&partial_day()).unwrap();
        assert_eq!(report.allocation_source, AllocationSource::Deterministic);
        assert_eq!(report, Reconciler::new().reconcile(&partial_day()).unwrap());
    }

    #[test]
    fn test_refinement_skipped_when_all_covered() {
        let mut reconciler = with_canned("not even json");
        let txs = vec![
            Transaction::new("e1", 1, 500, ""),
            Transaction::new("s1", 2, -500, ""),
        ];

        let report = reconciler.reconcile(&txs).unwrap();
        assert_eq!(report.allocation_source, AllocationSource::Deterministic);
        assert!(report.spends[0].covered);
    }
}
