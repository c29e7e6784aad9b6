//! Backlog of demands that arrived while the agent was busy

use std::collections::VecDeque;

use spotnet_types::Demand;

/// Strict FIFO of pending demands. No dedup, no priority.
#[derive(Debug, Clone, Default)]
pub struct DemandQueue {
    items: VecDeque<Demand>,
}

impl DemandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail, returning the demand's zero-based position
    pub fn push(&mut self, demand: Demand) -> usize {
        self.items.push_back(demand);
        self.items.len() - 1
    }

    /// Remove the head, or `None` when empty
    pub fn pop(&mut self) -> Option<Demand> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&Demand> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Demand> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use spotnet_types::{Address, U256};

    use super::*;

    fn demand(objective: &str) -> Demand {
        Demand {
            model: "QmModel".to_string(),
            objective: objective.to_string(),
            token: Address::ZERO,
            cost: U256::from(1u64),
            validator: Address::ZERO,
            lighthouse: Address::ZERO,
            sender: Address::ZERO,
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = DemandQueue::new();
        assert_eq!(queue.push(demand("a")), 0);
        assert_eq!(queue.push(demand("b")), 1);
        assert_eq!(queue.push(demand("c")), 2);
        assert_eq!(queue.peek().map(|d| d.objective.as_str()), Some("a"));

        let drained: Vec<String> = std::iter::from_fn(|| queue.pop()).map(|d| d.objective).collect();
        assert_eq!(drained, vec!["a", "b", "c"]);
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut queue = DemandQueue::new();
        queue.push(demand("same"));
        queue.push(demand("same"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.iter().filter(|d| d.objective == "same").count(), 2);
    }
}
