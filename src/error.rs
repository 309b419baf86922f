// Typed errors for the library boundary.
// The matcher itself never fails; these cover input, config and refinement.

use thiserror::Error;

/// Rejected before matching begins
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("transaction at position {0} has an empty id")]
    EmptyId(usize),

    #[error("duplicate transaction id '{0}' in day-set")]
    DuplicateId(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_subset_items must be a positive integer, got '{0}'")]
    InvalidMaxSubsetItems(String),

    #[error("unknown refinement mode '{0}' (expected off, uncovered or always)")]
    UnknownRefinementMode(String),

    #[error("invalid value '{value}' for {key}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("rate limit quota and window must both be non-zero")]
    ZeroRateLimit,
}

/// Failure talking to a refinement provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One breach of the refinement output contract
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing or invalid 'spends' list")]
    MissingSpends,

    #[error("spends[{0}] is not an object")]
    SpendNotObject(usize),

    #[error("spends[{0}].tx_id missing or invalid")]
    SpendIdInvalid(usize),

    #[error("spends[{index}].tx_id '{id}' is not a spend transaction id")]
    UnknownSpend { index: usize, id: String },

    #[error("spends[{index}].tx_id '{id}' appears more than once")]
    DuplicateSpend { index: usize, id: String },

    #[error("spends[{0}].sources must be a list")]
    SourcesNotList(usize),

    #[error("spends[{spend}].sources[{item}] is not an object")]
    SourceNotObject { spend: usize, item: usize },

    #[error("spends[{spend}].sources[{item}].tx_id missing or invalid")]
    SourceIdInvalid { spend: usize, item: usize },

    #[error("spends[{spend}].sources[{item}].tx_id '{id}' is not an earning tx id")]
    UnknownEarning {
        spend: usize,
        item: usize,
        id: String,
    },

    #[error("spends[{spend}].sources[{item}].amount_cents must be a positive integer")]
    InvalidAmount { spend: usize, item: usize },

    #[error("spend '{id}' over-covered: {allocated} > {available}")]
    SpendOverCovered {
        id: String,
        allocated: u64,
        available: u64,
    },

    #[error("earning '{id}' over-used: {allocated} > {available}")]
    EarningOverUsed {
        id: String,
        allocated: u64,
        available: u64,
    },
}

/// Why a refinement was not accepted.
/// Callers downgrade every variant to the deterministic result.
#[derive(Debug, Error)]
pub enum RefinementError {
    #[error("refinement provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("refinement rate limit reached")]
    RateLimited,

    #[error("refinement JSON error: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("refinement response is missing the 'reconcile' object")]
    MissingReconcile,

    #[error("refinement rejected with {} violation(s)", .0.len())]
    Rejected(Vec<Violation>),
}
