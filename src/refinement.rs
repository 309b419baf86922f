//! Optional refinement of the deterministic allocation by an external model.
//!
//! The provider is a black box that receives the day's transactions plus the
//! matcher's own allocation as a seed, and answers with strict JSON:
//!
//! ```json
//! {"reconcile": {"spends": [{"tx_id": "s1", "sources": [{"tx_id": "e1", "amount_cents": 3000}]}]}}
//! ```
//!
//! Nothing in the answer is trusted until it passes [`validate_reconcile_payload`].
//! Any failure downgrades to the deterministic allocation.

use governor::clock::{Clock, DefaultClock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::{RefinementConfig, RefinementMode};
use crate::coverage::{AllocationSource, CoverageSource, SpendMatch};
use crate::error::{ConfigError, ProviderError, RefinementError, Violation};
use crate::partition::Partition;
use crate::rate_limit::CallRateLimiter;
use crate::transaction::{compute_set_hash, Transaction};

// ============================================================================
// PROVIDERS
// ============================================================================

/// A slow, rate-limited and unreliable collaborator
pub trait RefinementProvider {
    fn name(&self) -> &str;

    /// Send the prompt, return the raw response text
    fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Replays a previously captured model response from disk
pub struct ResponseFileProvider {
    path: PathBuf,
}

impl ResponseFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ResponseFileProvider { path: path.into() }
    }
}

impl RefinementProvider for ResponseFileProvider {
    fn name(&self) -> &str {
        "response-file"
    }

    fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Ok(fs::read_to_string(&self.path)?)
    }
}

// ============================================================================
// REQUEST PAYLOAD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendAllocation {
    pub tx_id: String,
    pub sources: Vec<CoverageSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePayload {
    pub spends: Vec<SpendAllocation>,
}

impl ReconcilePayload {
    pub fn from_matches(matches: &[SpendMatch]) -> Self {
        ReconcilePayload {
            spends: matches
                .iter()
                .map(|m| SpendAllocation {
                    tx_id: m.spend_tx_id.clone(),
                    sources: m
                        .sources
                        .iter()
                        .map(|(tx_id, cents)| CoverageSource {
                            tx_id: tx_id.clone(),
                            amount_cents: *cents,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

const RULES: [&str; 5] = [
    "SPEND has negative amount_cents; EARNING has positive amount_cents.",
    "Do not invent transactions. Use only provided ids.",
    "Never allocate more than available in an earning.",
    "Never allocate more than spend absolute amount.",
    "Return STRICT JSON only (no markdown fences).",
];

#[derive(Debug, Clone, Serialize)]
pub struct RefinementRequest {
    pub task: &'static str,
    pub rules: Vec<&'static str>,
    pub output_schema: Value,
    pub transactions: Vec<Transaction>,
    pub suggested_reconcile: ReconcilePayload,
    pub temperature: f32,
}

impl RefinementRequest {
    pub fn new(transactions: &[Transaction], seed: &[SpendMatch]) -> Self {
        RefinementRequest {
            task: "reconcile_daily_spends",
            rules: RULES.to_vec(),
            output_schema: json!({
                "reconcile": {
                    "spends": [{"tx_id": "string", "sources": [{"tx_id": "string", "amount_cents": 123}]}]
                }
            }),
            transactions: transactions.to_vec(),
            suggested_reconcile: ReconcilePayload::from_matches(seed),
            temperature: 0.0,
        }
    }

    pub fn to_prompt(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Check a `reconcile` object against the known spends and earnings
/// (id -> absolute cents). Every breach is collected; on success returns the
/// proposed sources per spend id.
pub fn validate_reconcile_payload(
    payload: &Value,
    spends_by_id: &HashMap<String, u64>,
    earns_by_id: &HashMap<String, u64>,
) -> Result<BTreeMap<String, Vec<(String, u64)>>, Vec<Violation>> {
    let Some(object) = payload.as_object() else {
        return Err(vec![Violation::NotAnObject]);
    };
    let Some(spends) = object.get("spends").and_then(Value::as_array) else {
        return Err(vec![Violation::MissingSpends]);
    };

    let mut violations = Vec::new();
    let mut accepted: BTreeMap<String, Vec<(String, u64)>> = BTreeMap::new();
    let mut earn_used: BTreeMap<String, u64> = BTreeMap::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for (i, item) in spends.iter().enumerate() {
        let Some(item) = item.as_object() else {
            violations.push(Violation::SpendNotObject(i));
            continue;
        };
        let tx_id = match item.get("tx_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id,
            _ => {
                violations.push(Violation::SpendIdInvalid(i));
                continue;
            }
        };
        let Some(&spend_abs) = spends_by_id.get(tx_id) else {
            violations.push(Violation::UnknownSpend {
                index: i,
                id: tx_id.to_string(),
            });
            continue;
        };
        if !seen.insert(tx_id) {
            violations.push(Violation::DuplicateSpend {
                index: i,
                id: tx_id.to_string(),
            });
            continue;
        }

        let sources = match item.get("sources") {
            None | Some(Value::Null) => &[][..],
            Some(Value::Array(list)) => list.as_slice(),
            Some(_) => {
                violations.push(Violation::SourcesNotList(i));
                continue;
            }
        };

        let mut total: u64 = 0;
        let mut proposed = Vec::with_capacity(sources.len());
        for (j, source) in sources.iter().enumerate() {
            let Some(source) = source.as_object() else {
                violations.push(Violation::SourceNotObject { spend: i, item: j });
                continue;
            };
            let earning_id = match source.get("tx_id").and_then(Value::as_str) {
                Some(id) if !id.is_empty() => id,
                _ => {
                    violations.push(Violation::SourceIdInvalid { spend: i, item: j });
                    continue;
                }
            };
            if !earns_by_id.contains_key(earning_id) {
                violations.push(Violation::UnknownEarning {
                    spend: i,
                    item: j,
                    id: earning_id.to_string(),
                });
                continue;
            }
            // as_u64 rejects negatives and fractions
            let amount = match source.get("amount_cents").and_then(Value::as_u64) {
                Some(a) if a > 0 => a,
                _ => {
                    violations.push(Violation::InvalidAmount { spend: i, item: j });
                    continue;
                }
            };

            let used = earn_used.entry(earning_id.to_string()).or_insert(0);
            *used = used.saturating_add(amount);
            total = total.saturating_add(amount);
            proposed.push((earning_id.to_string(), amount));
        }

        if total > spend_abs {
            violations.push(Violation::SpendOverCovered {
                id: tx_id.to_string(),
                allocated: total,
                available: spend_abs,
            });
        }
        accepted.insert(tx_id.to_string(), proposed);
    }

    for (earning_id, used) in &earn_used {
        let available = earns_by_id.get(earning_id).copied().unwrap_or(0);
        if *used > available {
            violations.push(Violation::EarningOverUsed {
                id: earning_id.clone(),
                allocated: *used,
                available,
            });
        }
    }

    if violations.is_empty() {
        Ok(accepted)
    } else {
        Err(violations)
    }
}

/// Parse a raw provider response and validate its `reconcile` object
pub fn parse_refinement(
    raw: &str,
    partition: &Partition,
) -> Result<BTreeMap<String, Vec<(String, u64)>>, RefinementError> {
    let payload: Value = serde_json::from_str(raw.trim())?;
    let reconcile = payload
        .get("reconcile")
        .filter(|r| r.is_object())
        .ok_or(RefinementError::MissingReconcile)?;

    let spends_by_id: HashMap<String, u64> = partition
        .spends
        .iter()
        .map(|tx| (tx.id.clone(), tx.abs_cents()))
        .collect();
    let earns_by_id: HashMap<String, u64> = partition
        .earnings
        .iter()
        .map(|tx| (tx.id.clone(), tx.abs_cents()))
        .collect();

    validate_reconcile_payload(reconcile, &spends_by_id, &earns_by_id)
        .map_err(RefinementError::Rejected)
}

/// Exactly one SpendMatch per spend, in spend time order.
/// Spends the refinement leaves out get no sources.
pub fn complete_matches(
    partition: &Partition,
    mut refined: BTreeMap<String, Vec<(String, u64)>>,
) -> Vec<SpendMatch> {
    let mut spends: Vec<&Transaction> = partition.spends.iter().collect();
    spends.sort_by_key(|tx| tx.time);

    spends
        .into_iter()
        .map(|tx| SpendMatch {
            sources: refined.remove(&tx.id).unwrap_or_default(),
            ..SpendMatch::uncovered(tx)
        })
        .collect()
}

// ============================================================================
// REFINER
// ============================================================================

/// Accepted refinements kept per Refiner before the oldest is evicted
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Owns the provider, its call budget and an in-process cache of accepted
/// refinements keyed by model and transaction set
pub struct Refiner<C: Clock = DefaultClock> {
    provider: Box<dyn RefinementProvider>,
    limiter: CallRateLimiter<C>,
    mode: RefinementMode,
    model: String,
    cache: HashMap<String, Vec<SpendMatch>>,
    /// Insertion order of `cache` keys, oldest first
    cache_order: VecDeque<String>,
    cache_capacity: usize,
}

impl Refiner<DefaultClock> {
    pub fn new(
        provider: Box<dyn RefinementProvider>,
        config: &RefinementConfig,
    ) -> Result<Self, ConfigError> {
        let limiter = CallRateLimiter::new(config.rate_limit, config.window)?;
        Ok(Self::with_limiter(provider, limiter, config.mode, &config.model))
    }
}

impl<C: Clock> Refiner<C> {
    pub fn with_limiter(
        provider: Box<dyn RefinementProvider>,
        limiter: CallRateLimiter<C>,
        mode: RefinementMode,
        model: &str,
    ) -> Self {
        Refiner {
            provider,
            limiter,
            mode,
            model: model.to_string(),
            cache: HashMap::new(),
            cache_order: VecDeque::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Zero disables caching
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    fn remember(&mut self, key: String, matches: &[SpendMatch]) {
        if self.cache_capacity == 0 {
            return;
        }
        while self.cache_order.len() >= self.cache_capacity {
            let Some(oldest) = self.cache_order.pop_front() else {
                break;
            };
            self.cache.remove(&oldest);
        }
        self.cache_order.push_back(key.clone());
        self.cache.insert(key, matches.to_vec());
    }

    pub fn should_refine(&self, matches: &[SpendMatch]) -> bool {
        match self.mode {
            RefinementMode::Off => false,
            RefinementMode::WhenUncovered => matches.iter().any(|m| !m.is_covered()),
            RefinementMode::Always => !matches.is_empty(),
        }
    }

    fn cache_key(&self, transactions: &[Transaction]) -> String {
        format!("{}:{}", self.model, compute_set_hash(transactions))
    }

    /// Ask the provider for a better allocation and validate it strictly
    pub fn refine(
        &mut self,
        transactions: &[Transaction],
        partition: &Partition,
        seed: &[SpendMatch],
    ) -> Result<Vec<SpendMatch>, RefinementError> {
        let key = self.cache_key(transactions);
        if let Some(cached) = self.cache.get(&key) {
            debug!(provider = self.provider.name(), "refinement cache hit");
            return Ok(cached.clone());
        }

        if !self.limiter.try_acquire() {
            return Err(RefinementError::RateLimited);
        }

        let prompt = RefinementRequest::new(transactions, seed).to_prompt()?;
        let raw = self.provider.complete(&prompt)?;
        let refined = parse_refinement(&raw, partition)?;
        if refined.is_empty() {
            return Err(RefinementError::Rejected(vec![Violation::MissingSpends]));
        }

        let matches = complete_matches(partition, refined);
        self.remember(key, &matches);
        Ok(matches)
    }

    /// Refined allocation when accepted, otherwise the seed unchanged
    pub fn refine_or_fallback(
        &mut self,
        transactions: &[Transaction],
        partition: &Partition,
        seed: Vec<SpendMatch>,
    ) -> (Vec<SpendMatch>, AllocationSource) {
        match self.refine(transactions, partition, &seed) {
            Ok(refined) => (refined, AllocationSource::Refined),
            Err(RefinementError::Rejected(violations)) => {
                let details: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
                warn!(
                    provider = self.provider.name(),
                    violations = %details.join("; "),
                    "refinement rejected, keeping deterministic allocation"
                );
                (seed, AllocationSource::Deterministic)
            }
            Err(e) => {
                warn!(
                    provider = self.provider.name(),
                    error = %e,
                    "refinement unavailable, keeping deterministic allocation"
                );
                (seed, AllocationSource::Deterministic)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
