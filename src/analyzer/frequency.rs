use std::collections::BTreeMap;

/// Occurrence counts for one query parameter within a single cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable<K: Ord + Copy> {
    counts: BTreeMap<K, u64>,
}

impl<K: Ord + Copy> FrequencyTable<K> {
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn count(&self, key: K) -> u64 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Most frequent value and its count. Ties go to the smallest value.
    pub fn mode(&self) -> Option<(K, u64)> {
        // Ascending iteration plus a strict comparison keeps the first (smallest) maximum.
        let mut best: Option<(K, u64)> = None;
        for (&key, &count) in &self.counts {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((key, count)),
            }
        }
        best
    }
}
