use std::collections::VecDeque;

use crate::artifact::GenerationResult;

pub const HISTORY_CAPACITY: usize = 9;

/// Recent results, most recent first. Never longer than its capacity.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<GenerationResult>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts at the front; returns the entry dropped from the tail, if any.
    pub fn push(&mut self, result: GenerationResult) -> Option<GenerationResult> {
        self.entries.push_front(result);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn get(&self, index: usize) -> Option<&GenerationResult> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenerationResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use crate::artifact::GenerationResult;

    use super::{History, HISTORY_CAPACITY};

    fn result(idx: usize) -> GenerationResult {
        GenerationResult::from_data_uri(format!("data:image/png;base64,{idx}"))
    }

    #[test]
    fn keeps_most_recent_first_and_caps_length() {
        let mut history = History::new();
        let mut dropped = Vec::new();
        for idx in 0..12 {
            if let Some(old) = history.push(result(idx)) {
                dropped.push(old);
            }
            assert!(history.len() <= HISTORY_CAPACITY);
        }
        assert_eq!(history.len(), 9);
        let order: Vec<GenerationResult> = history.iter().cloned().collect();
        let expected: Vec<GenerationResult> = (3..12).rev().map(result).collect();
        assert_eq!(order, expected);
        assert_eq!(dropped, vec![result(0), result(1), result(2)]);
    }

    #[test]
    fn get_indexes_from_newest() {
        let mut history = History::with_capacity(2);
        history.push(result(1));
        history.push(result(2));
        assert_eq!(history.get(0), Some(&result(2)));
        assert_eq!(history.get(1), Some(&result(1)));
        assert_eq!(history.get(2), None);
    }
}
