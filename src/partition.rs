// Transaction Partitioner - split a day-set into spends and earnings

use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// Spends (amount < 0) and earnings (amount > 0), input order preserved.
/// Zero-amount transactions belong to neither side.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub spends: Vec<Transaction>,
    pub earnings: Vec<Transaction>,
}

impl Partition {
    pub fn split(transactions: &[Transaction]) -> Self {
        let spends = transactions
            .iter()
            .filter(|tx| tx.is_spend())
            .cloned()
            .collect();
        let earnings = transactions
            .iter()
            .filter(|tx| tx.is_earning())
            .cloned()
            .collect();

        Partition { spends, earnings }
    }

    pub fn is_empty(&self) -> bool {
        self.spends.is_empty() && self.earnings.is_empty()
    }

    pub fn totals(&self) -> Totals {
        let spend_total = saturating_total(&self.spends);
        let earn_total = saturating_total(&self.earnings);

        // Clamped to i64 when the day's totals are absurdly large
        let net = if earn_total >= spend_total {
            i64::try_from(earn_total - spend_total).unwrap_or(i64::MAX)
        } else {
            0i64.saturating_sub_unsigned(spend_total - earn_total)
        };

        Totals {
            spend_total,
            earn_total,
            net,
        }
    }
}

fn saturating_total(transactions: &[Transaction]) -> u64 {
    transactions
        .iter()
        .fold(0u64, |acc, tx| acc.saturating_add(tx.abs_cents()))
}

/// Day totals in cents; `spend_total` is absolute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub spend_total: u64,
    pub earn_total: u64,
    pub net: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_by_sign() {
        let txs = vec![
            Transaction::new("s1", 1, -500, "Lunch"),
            Transaction::new("e1", 2, 1_000, "Refund"),
            Transaction::new("z1", 3, 0, "Card check"),
            Transaction::new("s2", 4, -200, "Bus"),
        ];

        let partition = Partition::split(&txs);
        let spend_ids: Vec<&str> = partition.spends.iter().map(|t| t.id.as_str()).collect();
        let earn_ids: Vec<&str> = partition.earnings.iter().map(|t| t.id.as_str()).collect();

        assert_eq!(spend_ids, vec!["s1", "s2"]);
        assert_eq!(earn_ids, vec!["e1"]);
    }

    #[test]
    fn test_empty_input() {
        let partition = Partition::split(&[]);
        assert!(partition.is_empty());
        assert_eq!(partition.totals(), Totals::default());
    }

    #[test]
    fn test_totals() {
        let txs = vec![
            Transaction::new("e1", 1, 10_000, ""),
            Transaction::new("s1", 2, -3_000, ""),
            Transaction::new("s2", 3, -8_000, ""),
        ];

        let totals = Partition::split(&txs).totals();
        assert_eq!(totals.spend_total, 11_000);
        assert_eq!(totals.earn_total, 10_000);
        assert_eq!(totals.net, -1_000);
    }

    #[test]
    fn test_totals_saturate_instead_of_overflowing() {
        let txs = vec![
            Transaction::new("s1", 1, i64::MIN, ""),
            Transaction::new("s2", 2, i64::MIN, ""),
            Transaction::new("e1", 3, i64::MAX, ""),
            Transaction::new("e2", 4, i64::MAX, ""),
            Transaction::new("e3", 5, i64::MAX, ""),
        ];

        let totals = Partition::split(&txs).totals();
        assert_eq!(totals.spend_total, u64::MAX);
        assert_eq!(totals.earn_total, u64::MAX);
        assert_eq!(totals.net, 0);

        let spends_only = Partition::split(&txs[..2]).totals();
        assert_eq!(spends_only.net, i64::MIN);

        let earnings_only = Partition::split(&txs[2..]).totals();
        assert_eq!(earnings_only.net, i64::MAX);
    }
}
