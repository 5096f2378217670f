//! Registry of established artifact streams.
//!
//! The store is the only durable record of a pairing. It tracks which peers
//! have a registered stream and in which direction; the stream itself moves
//! on to the artifact processor.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;
use tracing::trace;
use vertex_net_rings::NetPeerId;

/// Which side opened the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Opened by the remote peer.
    Inbound,
    /// Opened by us.
    Outbound,
}

impl Direction {
    pub const fn is_outbound(self) -> bool {
        matches!(self, Self::Outbound)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-unique identifier of a paired stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Record of one registered stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRegistration {
    pub id: StreamId,
    pub direction: Direction,
}

impl StreamRegistration {
    /// Registration for a new stream in the given direction.
    pub fn new(direction: Direction) -> Self {
        Self {
            id: StreamId::next(),
            direction,
        }
    }
}

/// Registers artifact streams per peer.
pub trait StreamStore<Id: NetPeerId>: Send + Sync + 'static {
    /// Register a stream for `peer`.
    ///
    /// Returns `false` if the registration conflicts with an existing one or
    /// the store is full. Must be atomic: of two racing registrations for the
    /// same peer at most one wins.
    fn add(&self, peer: Id, registration: StreamRegistration) -> bool;

    /// Drop the peer's registration, returning it if there was one.
    fn remove(&self, peer: &Id) -> Option<StreamRegistration>;
}

impl<Id: NetPeerId, S: StreamStore<Id> + ?Sized> StreamStore<Id> for Arc<S> {
    fn add(&self, peer: Id, registration: StreamRegistration) -> bool {
        (**self).add(peer, registration)
    }

    fn remove(&self, peer: &Id) -> Option<StreamRegistration> {
        (**self).remove(peer)
    }
}

/// In-memory [`StreamStore`] allowing one stream per peer.
///
/// Inbound and outbound registrations can be capped independently.
#[derive(Debug)]
pub struct MemoryStreamStore<Id> {
    streams: RwLock<HashMap<Id, StreamRegistration>>,
    max_inbound: Option<usize>,
    max_outbound: Option<usize>,
}

impl<Id: NetPeerId> Default for MemoryStreamStore<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: NetPeerId> MemoryStreamStore<Id> {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            max_inbound: None,
            max_outbound: None,
        }
    }

    /// Cap the number of inbound streams.
    pub fn with_max_inbound(mut self, max: usize) -> Self {
        self.max_inbound = Some(max);
        self
    }

    /// Cap the number of outbound streams.
    pub fn with_max_outbound(mut self, max: usize) -> Self {
        self.max_outbound = Some(max);
        self
    }

    pub fn get(&self, peer: &Id) -> Option<StreamRegistration> {
        self.streams.read().get(peer).copied()
    }

    pub fn contains(&self, peer: &Id) -> bool {
        self.streams.read().contains_key(peer)
    }

    /// Direction of the peer's registered stream.
    pub fn direction_of(&self, peer: &Id) -> Option<Direction> {
        self.get(peer).map(|registration| registration.direction)
    }

    pub fn inbound_count(&self) -> usize {
        self.count(Direction::Inbound)
    }

    pub fn outbound_count(&self) -> usize {
        self.count(Direction::Outbound)
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }

    /// Peers with a registered stream.
    pub fn peers(&self) -> Vec<Id> {
        self.streams.read().keys().cloned().collect()
    }

    fn count(&self, direction: Direction) -> usize {
        count_direction(&self.streams.read(), direction)
    }

    fn limit(&self, direction: Direction) -> Option<usize> {
        match direction {
            Direction::Inbound => self.max_inbound,
            Direction::Outbound => self.max_outbound,
        }
    }
}

fn count_direction<Id>(streams: &HashMap<Id, StreamRegistration>, direction: Direction) -> usize {
    streams
        .values()
        .filter(|registration| registration.direction == direction)
        .count()
}

impl<Id: NetPeerId> StreamStore<Id> for MemoryStreamStore<Id> {
    fn add(&self, peer: Id, registration: StreamRegistration) -> bool {
        let mut streams = self.streams.write();

        if let Some(existing) = streams.get(&peer) {
            trace!(?peer, ?existing, "stream already registered");
            return false;
        }
        if let Some(max) = self.limit(registration.direction)
            && count_direction(&streams, registration.direction) >= max
        {
            trace!(?peer, direction = %registration.direction, max, "stream store full");
            return false;
        }

        streams.insert(peer, registration);
        true
    }

    fn remove(&self, peer: &Id) -> Option<StreamRegistration> {
        self.streams.write().remove(peer)
    }
}
