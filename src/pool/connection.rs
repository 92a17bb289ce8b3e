//! Pooled connection structures
//!
//! A [`PooledConnection`] wraps one reusable HTTP connection handle with
//! timing metadata; an [`IdleQueue`] holds the ones waiting for reuse.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// A connection handle that can tell whether it is still usable
pub trait Reusable {
    /// Whether the peer has not closed the connection
    fn is_reusable(&self) -> bool;
}

impl<B> Reusable for hyper::client::conn::http1::SendRequest<B> {
    fn is_reusable(&self) -> bool {
        !self.is_closed()
    }
}

/// A pooled connection with metadata
#[derive(Debug)]
pub struct PooledConnection<S> {
    /// The underlying connection handle
    pub(crate) sender: S,
    /// When the connection was created
    pub(crate) created_at: Instant,
    /// When the connection was last used
    pub(crate) last_used: Instant,
}

impl<S> PooledConnection<S> {
    /// Wrap a freshly opened connection
    pub fn new(sender: S) -> Self {
        let now = Instant::now();
        PooledConnection {
            sender,
            created_at: now,
            last_used: now,
        }
    }

    /// Check if the connection is stale based on idle timeout
    pub fn is_stale(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() > idle_timeout
    }

    /// Get the age of the connection
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Mark the connection as used
    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// Get a mutable reference to the handle
    pub fn sender_mut(&mut self) -> &mut S {
        &mut self.sender
    }
}

/// Idle connections of one pool, most recently returned last
#[derive(Debug)]
pub struct IdleQueue<S> {
    connections: Mutex<VecDeque<PooledConnection<S>>>,
    max_idle: usize,
    idle_timeout: Duration,
}

impl<S: Reusable> IdleQueue<S> {
    /// Create an empty queue keeping at most `max_idle` connections
    pub fn new(max_idle: usize, idle_timeout: Duration) -> Self {
        IdleQueue {
            connections: Mutex::new(VecDeque::new()),
            max_idle,
            idle_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PooledConnection<S>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the most recently used connection that is still usable
    ///
    /// Stale and closed connections met on the way are dropped.
    pub fn checkout(&self) -> Option<PooledConnection<S>> {
        let mut connections = self.lock();
        while let Some(mut conn) = connections.pop_back() {
            if conn.is_stale(self.idle_timeout) {
                debug!("Dropping idle connection after {:?}", conn.age());
                continue;
            }
            if !conn.sender.is_reusable() {
                debug!("Dropping connection closed by peer");
                continue;
            }
            conn.touch();
            return Some(conn);
        }
        None
    }

    /// Return a connection for reuse; returns false when it was dropped instead
    pub fn put(&self, mut conn: PooledConnection<S>) -> bool {
        if !conn.sender.is_reusable() {
            return false;
        }

        let mut connections = self.lock();
        if connections.len() >= self.max_idle {
            debug!("Idle queue full, dropping returned connection");
            return false;
        }

        conn.touch();
        connections.push_back(conn);
        true
    }

    /// Number of idle connections
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no connection is idle
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every idle connection, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut connections = self.lock();
        let count = connections.len();
        connections.clear();
        count
    }
}
