//! RAII guard for checked-out connections
//!
//! A connection leaves the idle queue for the duration of one exchange.
//! It goes back only through [`ConnectionGuard::release`]; a guard dropped
//! any other way (error, timeout, cancelled future) discards the connection,
//! since its protocol state is unknown.

use super::connection::{IdleQueue, PooledConnection, Reusable};
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// Guard that owns a checked-out connection
pub struct ConnectionGuard<'a, S: Reusable> {
    /// The connection (Option to allow releasing)
    conn: Option<PooledConnection<S>>,
    /// Queue the connection returns to
    queue: &'a IdleQueue<S>,
}

impl<'a, S: Reusable> ConnectionGuard<'a, S> {
    /// Create a new guard
    pub fn new(conn: PooledConnection<S>, queue: &'a IdleQueue<S>) -> Self {
        ConnectionGuard {
            conn: Some(conn),
            queue,
        }
    }

    /// Return the connection to the idle queue after a complete exchange
    pub fn release(mut self) -> bool {
        match self.conn.take() {
            Some(conn) => self.queue.put(conn),
            None => false,
        }
    }
}

impl<S: Reusable> Deref for ConnectionGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        match self.conn.as_ref() {
            Some(conn) => &conn.sender,
            None => unreachable!("connection is only taken by release"),
        }
    }
}

impl<S: Reusable> DerefMut for ConnectionGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.conn.as_mut() {
            Some(conn) => conn.sender_mut(),
            None => unreachable!("connection is only taken by release"),
        }
    }
}

impl<S: Reusable> Drop for ConnectionGuard<'_, S> {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            debug!("Discarding connection after incomplete exchange");
        }
    }
}
