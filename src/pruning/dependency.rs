//! Map from prunable nodes to their coupling chains.

use std::collections::HashMap;

use super::node::NodeId;

/// Coupling chains keyed by prunable node, iterated in topological order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyMap {
    entries: Vec<(NodeId, Vec<NodeId>)>,
    index: HashMap<NodeId, usize>,
}

impl DependencyMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chain of `key`, keeping its original position if present.
    pub fn insert(&mut self, key: NodeId, chain: Vec<NodeId>) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = chain,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((key, chain));
            }
        }
    }

    /// Chain of `key`.
    #[must_use]
    pub fn get(&self, key: NodeId) -> Option<&[NodeId]> {
        self.index.get(&key).map(|&i| self.entries[i].1.as_slice())
    }

    /// Whether `key` is a prunable key.
    #[must_use]
    pub fn contains_key(&self, key: NodeId) -> bool {
        self.index.contains_key(&key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }

    /// `(key, chain)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &[NodeId])> {
        self.entries.iter().map(|(key, chain)| (*key, chain.as_slice()))
    }

    /// Mutable access to every chain, in insertion order.
    pub fn chains_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut Vec<NodeId>)> {
        self.entries.iter_mut().map(|(key, chain)| (*key, chain))
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: usize) -> NodeId {
        NodeId::new(i)
    }

    #[test]
    fn test_insert_preserves_order() {
        let mut map = DependencyMap::new();
        map.insert(id(3), vec![id(4)]);
        map.insert(id(1), vec![]);
        map.insert(id(3), vec![id(5), id(6)]);

        assert_eq!(map.keys().collect::<Vec<_>>(), vec![id(3), id(1)]);
        assert_eq!(map.get(id(3)), Some(&[id(5), id(6)][..]));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_missing_key() {
        let map = DependencyMap::new();
        assert!(map.is_empty());
        assert!(map.get(id(0)).is_none());
        assert!(!map.contains_key(id(0)));
    }

    #[test]
    fn test_chains_mut() {
        let mut map = DependencyMap::new();
        map.insert(id(0), vec![id(1), id(2)]);
        for (_, chain) in map.chains_mut() {
            chain.retain(|n| n.index() != 1);
        }
        assert_eq!(map.get(id(0)), Some(&[id(2)][..]));
    }
}
