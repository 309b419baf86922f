// Spend Coverage - Core Library
// Matches a day's earnings against its spends and reports what stays uncovered

pub mod allocation;   // Allocation state threaded between matcher passes
pub mod config;
pub mod coverage;     // SpendMatch + Coverage Reporter
pub mod error;
pub mod matching;     // Multi-Pass Matcher
pub mod partition;    // Spends vs earnings
pub mod rate_limit;
pub mod reconciler;   // validate -> match -> refine -> report
pub mod refinement;   // Optional external refinement, strictly validated
pub mod subset_sum;
pub mod transaction;

// Re-export commonly used types
pub use allocation::{Allocation, AllocationState};
pub use config::{CoverageConfig, RefinementConfig, RefinementMode};
pub use coverage::{
    AllocationSource, CoverageReport, CoverageReporter, CoverageSource, SpendCoverage, SpendMatch,
    UNCOVERED_REASON,
};
pub use error::{ConfigError, InputError, ProviderError, RefinementError, Violation};
pub use matching::{match_spends_to_earnings, MatchOutcome, MatchPass, MatchingEngine};
pub use partition::{Partition, Totals};
pub use rate_limit::CallRateLimiter;
pub use reconciler::Reconciler;
pub use refinement::{
    validate_reconcile_payload, RefinementProvider, RefinementRequest, Refiner,
    ResponseFileProvider,
};
pub use subset_sum::{SubsetSumSolver, DEFAULT_MAX_SUBSET_ITEMS};
pub use transaction::{
    compute_set_hash, load_csv, load_json, load_transactions, validate_day_set, DayWindow,
    Transaction,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
