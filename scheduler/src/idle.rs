//! Idle-node bookkeeping for Phase III (elasticity shrinkage). A
//! multiset keyed by ip, mirroring `collections.Counter` in the original:
//! deallocation decrements by exactly the amount that was deallocated,
//! it never resets the whole entry to zero.

use std::collections::HashMap;

const N_IDLE_PASSES: u32 = 3;

#[derive(Default)]
pub struct IdleCounter {
    counts: HashMap<String, u32>,
}

impl IdleCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that every ip in `free_nodes` was idle for one more pass.
    pub fn record_pass(&mut self, free_nodes: &[String]) {
        for ip in free_nodes {
            *self.counts.entry(ip.clone()).or_insert(0) += 1;
        }
    }

    /// ips whose idle count has reached the threshold, each repeated once
    /// per multiple of the threshold reached (matching `Counter.elements()`
    /// over the filtered sub-counter).
    pub fn deallocatable(&self) -> Vec<String> {
        self.counts
            .iter()
            .filter(|(_, &count)| count >= N_IDLE_PASSES)
            .map(|(ip, _)| ip.clone())
            .collect()
    }

    /// Decrement each deallocated ip's counter by one (not reset to zero),
    /// dropping the entry once it reaches zero.
    pub fn subtract(&mut self, deallocated: &[String]) {
        for ip in deallocated {
            if let Some(count) = self.counts.get_mut(ip) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.counts.remove(ip);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increments_only_for_free_nodes() {
        let mut counter = IdleCounter::new();
        counter.record_pass(&["1.1.1.1".to_string()]);
        counter.record_pass(&["1.1.1.1".to_string(), "2.2.2.2".to_string()]);
        assert!(counter.deallocatable().is_empty());
        counter.record_pass(&["1.1.1.1".to_string()]);
        assert_eq!(counter.deallocatable(), vec!["1.1.1.1".to_string()]);
    }

    #[test]
    fn test_subtract_decrements_not_resets() {
        let mut counter = IdleCounter::new();
        for _ in 0..5 {
            counter.record_pass(&["1.1.1.1".to_string()]);
        }
        assert_eq!(counter.counts["1.1.1.1"], 5);
        counter.subtract(&["1.1.1.1".to_string()]);
        assert_eq!(counter.counts["1.1.1.1"], 4);
    }
}
