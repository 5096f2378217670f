//! A single latency band.

use std::collections::HashSet;

use rand::seq::index;

use crate::NetPeerId;

/// Unordered bucket of peers whose latency falls in one band.
#[derive(Debug, Clone)]
pub struct Ring<Id> {
    peers: Vec<Id>,
}

impl<Id> Default for Ring<Id> {
    fn default() -> Self {
        Self { peers: Vec::new() }
    }
}

impl<Id: NetPeerId> Ring<Id> {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a peer.
    pub fn add(&mut self, peer: Id) {
        self.peers.push(peer);
    }

    /// Remove every occurrence of `peer`.
    ///
    /// Returns `true` if anything was removed.
    pub fn remove(&mut self, peer: &Id) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p != peer);
        self.peers.len() != before
    }

    /// Pick up to `count` random peers that are not in `exclude`.
    ///
    /// Walks the first `count` entries of a random permutation of the ring.
    /// Excluded peers still consume a step, so the result can be shorter than
    /// `count` even when the ring has enough eligible peers; the routing table
    /// tops the recommendation up from its whole peer set.
    pub fn recommend(&self, count: usize, exclude: &HashSet<Id>) -> Vec<Id> {
        let amount = count.min(self.peers.len());
        if amount == 0 {
            return Vec::new();
        }

        let mut rng = rand::rng();
        index::sample(&mut rng, self.peers.len(), amount)
            .into_iter()
            .filter_map(|i| self.peers.get(i))
            .filter(|peer| !exclude.contains(*peer))
            .cloned()
            .collect()
    }

    /// Whether `peer` is in this ring.
    pub fn contains(&self, peer: &Id) -> bool {
        self.peers.contains(peer)
    }

    /// Peers in insertion order.
    pub fn peers(&self) -> &[Id] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
