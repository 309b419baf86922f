use anyhow::{bail, Context, Result};
use chrono::{FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::InputError;

/// One signed bank movement for a user-day.
/// Negative amounts are spends, positive amounts are earnings. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique within one day-set
    pub id: String,

    /// Epoch seconds
    pub time: i64,

    #[serde(alias = "amount")]
    pub amount_cents: i64,

    #[serde(default)]
    pub description: String,
}

impl Transaction {
    pub fn new(id: &str, time: i64, amount_cents: i64, description: &str) -> Self {
        Transaction {
            id: id.to_string(),
            time,
            amount_cents,
            description: description.to_string(),
        }
    }

    pub fn is_spend(&self) -> bool {
        self.amount_cents < 0
    }

    pub fn is_earning(&self) -> bool {
        self.amount_cents > 0
    }

    pub fn abs_cents(&self) -> u64 {
        self.amount_cents.unsigned_abs()
    }
}

// ============================================================================
// BOUNDARY VALIDATION
// ============================================================================

/// Reject shapes the matcher assumes away: empty ids and repeated ids.
pub fn validate_day_set(transactions: &[Transaction]) -> Result<(), InputError> {
    let mut seen = HashSet::with_capacity(transactions.len());

    for (i, tx) in transactions.iter().enumerate() {
        if tx.id.trim().is_empty() {
            return Err(InputError::EmptyId(i));
        }
        if !seen.insert(tx.id.as_str()) {
            return Err(InputError::DuplicateId(tx.id.clone()));
        }
    }

    Ok(())
}

/// Stable hash of a transaction set, independent of input order.
/// Only fields that affect coverage take part.
pub fn compute_set_hash(transactions: &[Transaction]) -> String {
    let mut sorted: Vec<&Transaction> = transactions.iter().collect();
    sorted.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));

    let mut hasher = Sha256::new();
    for tx in sorted {
        hasher.update(format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1e}",
            tx.id, tx.time, tx.amount_cents, tx.description
        ));
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// DAY WINDOW
// ============================================================================

/// Inclusive epoch-second bounds of one calendar day at a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: i64,
    pub end: i64,
}

impl DayWindow {
    pub fn utc(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc().timestamp();
        DayWindow {
            date,
            start,
            end: start + 86_399,
        }
    }

    /// Local midnight at `UTC+offset_minutes` marks the start of the day
    pub fn with_offset(date: NaiveDate, offset_minutes: i32) -> Result<Self> {
        let offset_secs = offset_minutes.checked_mul(60);
        if offset_secs.and_then(FixedOffset::east_opt).is_none() {
            bail!("UTC offset of {} minutes is out of range", offset_minutes);
        }

        let utc = Self::utc(date);
        let shift = i64::from(offset_minutes) * 60;
        Ok(DayWindow {
            date,
            start: utc.start - shift,
            end: utc.end - shift,
        })
    }

    pub fn contains(&self, time: i64) -> bool {
        time >= self.start && time <= self.end
    }

    /// Keep transactions inside the window, ordered by time (stable)
    pub fn select(&self, transactions: &[Transaction]) -> Vec<Transaction> {
        let mut selected: Vec<Transaction> = transactions
            .iter()
            .filter(|tx| self.contains(tx.time))
            .cloned()
            .collect();
        selected.sort_by_key(|tx| tx.time);
        selected
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Load transactions from CSV with header `id,time,amount_cents,description`
pub fn load_csv(path: &Path) -> Result<Vec<Transaction>> {
    let file = File::open(path).context("Failed to open CSV file")?;
    let mut reader = csv::Reader::from_reader(file);

    let mut transactions = Vec::new();
    for (i, result) in reader.deserialize().enumerate() {
        let tx: Transaction =
            result.with_context(|| format!("Failed to parse CSV row {}", i + 1))?;
        transactions.push(tx);
    }

    Ok(transactions)
}

/// Load transactions from a JSON array
pub fn load_json(path: &Path) -> Result<Vec<Transaction>> {
    let file = File::open(path).context("Failed to open JSON file")?;
    let transactions: Vec<Transaction> = serde_json::from_reader(BufReader::new(file))
        .context("Failed to parse transactions JSON")?;
    Ok(transactions)
}

/// Pick the loader from the file extension (`.json`, otherwise CSV)
pub fn load_transactions(path: &Path) -> Result<Vec<Transaction>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        load_json(path)
    } else {
        load_csv(path)
    }
}
