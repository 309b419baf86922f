// Coverage Reporter - per-spend coverage and leftover earnings
//
//   covered_cents   = sum(allocated)
//   uncovered_cents = max(0, spend_abs - covered_cents)
//   covered         = uncovered_cents == 0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::partition::{Partition, Totals};
use crate::transaction::Transaction;

pub const UNCOVERED_REASON: &str = "Not fully compensated by same-day earnings";

// ============================================================================
// SPEND MATCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendMatch {
    pub spend_tx_id: String,
    pub spend_abs_cents: u64,

    /// (earning id, allocated cents), in allocation order
    pub sources: Vec<(String, u64)>,
}

impl SpendMatch {
    pub fn uncovered(spend: &Transaction) -> Self {
        SpendMatch {
            spend_tx_id: spend.id.clone(),
            spend_abs_cents: spend.abs_cents(),
            sources: Vec::new(),
        }
    }

    pub fn covered_cents(&self) -> u64 {
        self.sources
            .iter()
            .fold(0u64, |acc, (_, cents)| acc.saturating_add(*cents))
    }

    pub fn uncovered_cents(&self) -> u64 {
        self.spend_abs_cents.saturating_sub(self.covered_cents())
    }

    pub fn is_covered(&self) -> bool {
        self.uncovered_cents() == 0
    }
}

// ============================================================================
// REPORT OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSource {
    pub tx_id: String,
    pub amount_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendCoverage {
    pub tx_id: String,
    pub covered: bool,
    pub covered_cents: u64,
    pub uncovered_cents: u64,
    pub sources: Vec<CoverageSource>,
    pub reason: Option<String>,
}

impl From<&SpendMatch> for SpendCoverage {
    fn from(m: &SpendMatch) -> Self {
        let covered = m.is_covered();
        SpendCoverage {
            tx_id: m.spend_tx_id.clone(),
            covered,
            covered_cents: m.covered_cents(),
            uncovered_cents: m.uncovered_cents(),
            sources: m
                .sources
                .iter()
                .map(|(tx_id, cents)| CoverageSource {
                    tx_id: tx_id.clone(),
                    amount_cents: *cents,
                })
                .collect(),
            reason: if covered {
                None
            } else {
                Some(UNCOVERED_REASON.to_string())
            },
        }
    }
}

/// Where the final allocation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationSource {
    Deterministic,
    Refined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub totals: Totals,
    pub spends: Vec<SpendCoverage>,
    pub remaining_earnings: BTreeMap<String, u64>,
    pub allocation_source: AllocationSource,
}

impl CoverageReport {
    pub fn covered_count(&self) -> usize {
        self.spends.iter().filter(|s| s.covered).count()
    }

    pub fn uncovered_count(&self) -> usize {
        self.spends.len() - self.covered_count()
    }

    pub fn total_uncovered_cents(&self) -> u64 {
        self.spends.iter().map(|s| s.uncovered_cents).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} spends ({} covered, {} uncovered), spent {}, earned {}, uncovered {}",
            self.spends.len(),
            self.covered_count(),
            self.uncovered_count(),
            self.totals.spend_total,
            self.totals.earn_total,
            self.total_uncovered_cents()
        )
    }
}

// ============================================================================
// REPORTER
// ============================================================================

pub struct CoverageReporter;

impl CoverageReporter {
    /// Unallocated cents per earning: original amount minus everything the
    /// matches draw from it. Earnings no match references keep their full amount.
    pub fn remaining_earnings(
        partition: &Partition,
        matches: &[SpendMatch],
    ) -> BTreeMap<String, u64> {
        let mut used: BTreeMap<&str, u64> = BTreeMap::new();
        for m in matches {
            for (earning_id, cents) in &m.sources {
                let total = used.entry(earning_id.as_str()).or_insert(0);
                *total = total.saturating_add(*cents);
            }
        }

        partition
            .earnings
            .iter()
            .map(|tx| {
                let spent = used.get(tx.id.as_str()).copied().unwrap_or(0);
                (tx.id.clone(), tx.abs_cents().saturating_sub(spent))
            })
            .collect()
    }

    pub fn report(
        partition: &Partition,
        matches: &[SpendMatch],
        allocation_source: AllocationSource,
    ) -> CoverageReport {
        CoverageReport {
            totals: partition.totals(),
            spends: matches.iter().map(SpendCoverage::from).collect(),
            remaining_earnings: Self::remaining_earnings(partition, matches),
            allocation_source,
        }
    }
}
