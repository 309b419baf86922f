// Subset-Sum Solver - bounded backtracking over small daily volumes
//
// Values are visited largest first; at each step the "include" branch is
// explored before "exclude" and the first exact hit wins. With a stable sort
// over (value desc, original index asc) the answer is a pure function of the
// input order, which decides which spends/earnings get grouped together when
// several subsets would work.

/// Default cap on subset size
pub const DEFAULT_MAX_SUBSET_ITEMS: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct SubsetSumSolver {
    /// Upper bound on chosen items; keeps the search tractable
    pub max_items: usize,
}

impl SubsetSumSolver {
    pub fn new() -> Self {
        SubsetSumSolver {
            max_items: DEFAULT_MAX_SUBSET_ITEMS,
        }
    }

    pub fn with_max_items(max_items: usize) -> Self {
        SubsetSumSolver { max_items }
    }

    /// Indices into `values` whose values sum exactly to `target`, or `None`.
    ///
    /// Indices come back in visiting order (largest value first). A target
    /// of zero is satisfied by the empty subset.
    pub fn solve(&self, values: &[u64], target: u64) -> Option<Vec<usize>> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].cmp(&values[a]));

        let sorted: Vec<u64> = order.iter().map(|&i| values[i]).collect();

        // suffix[i] = sum of sorted[i..]
        let mut suffix = vec![0u64; sorted.len() + 1];
        for i in (0..sorted.len()).rev() {
            suffix[i] = suffix[i + 1].saturating_add(sorted[i]);
        }

        let mut search = Search {
            sorted: &sorted,
            suffix: &suffix,
            max_items: self.max_items,
            chosen: Vec::with_capacity(self.max_items.min(sorted.len())),
        };

        if search.descend(0, target) {
            Some(search.chosen.into_iter().map(|pos| order[pos]).collect())
        } else {
            None
        }
    }
}

impl Default for SubsetSumSolver {
    fn default() -> Self {
        Self::new()
    }
}

struct Search<'a> {
    sorted: &'a [u64],
    suffix: &'a [u64],
    max_items: usize,
    chosen: Vec<usize>,
}

impl Search<'_> {
    /// True once `chosen` holds a solution; `chosen` is left untouched then
    fn descend(&mut self, pos: usize, remaining: u64) -> bool {
        if remaining == 0 {
            return true;
        }
        if pos >= self.sorted.len() || self.chosen.len() >= self.max_items {
            return false;
        }
        // Everything left cannot reach the target
        if self.suffix[pos] < remaining {
            return false;
        }

        let value = self.sorted[pos];
        if value <= remaining {
            self.chosen.push(pos);
            if self.descend(pos + 1, remaining - value) {
                return true;
            }
            self.chosen.pop();
        }

        self.descend(pos + 1, remaining)
    }
}
