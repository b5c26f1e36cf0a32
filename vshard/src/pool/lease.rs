use super::resource_pool::ResourcePool;
use crate::connection::Connector;
use std::ops::{Deref, DerefMut};
use tokio::sync::SemaphorePermit;
use tracing::debug;

/// RAII lease on a pooled connection
///
/// Dropping the lease releases its slot on every exit path, unwinding
/// included. The connection itself goes back to the free list unless it was
/// marked broken, a request is still in flight, or the lease is dropped during
/// a panic, in which case it is closed.
///
/// Wrap each protocol call in [`begin_request`](Self::begin_request) /
/// [`finish_request`](Self::finish_request) so that a future dropped
/// mid-request does not recycle a connection with an unread reply.
pub struct PooledConnection<'a, C: Connector> {
    pool: &'a ResourcePool<C>,
    connection: Option<C::Connection>,
    broken: bool,
    in_flight: bool,
    // Dropped after `connection` is back on the free list
    _permit: SemaphorePermit<'a>,
}

impl<'a, C: Connector> PooledConnection<'a, C> {
    pub(super) fn new(
        pool: &'a ResourcePool<C>,
        connection: C::Connection,
        permit: SemaphorePermit<'a>,
    ) -> Self {
        Self {
            pool,
            connection: Some(connection),
            broken: false,
            in_flight: false,
            _permit: permit,
        }
    }

    /// Shard slot the connection belongs to
    pub fn slot(&self) -> usize {
        self.pool.slot()
    }

    /// Close the connection on release instead of reusing it
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// A request is about to be written; the connection is unusable until
    /// its reply has been read in full
    pub fn begin_request(&mut self) {
        self.in_flight = true;
    }

    /// The reply of the current request was consumed
    pub fn finish_request(&mut self) {
        self.in_flight = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

impl<C: Connector> Deref for PooledConnection<'_, C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("connection is present until the lease is dropped")
    }
}

impl<C: Connector> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("connection is present until the lease is dropped")
    }
}

impl<C: Connector> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if self.broken || self.in_flight || std::thread::panicking() {
                debug!(
                    "Discarding connection to shard {} ({})",
                    self.pool.slot(),
                    self.pool.address()
                );
                drop(connection);
                return;
            }

            self.pool.release(connection);
        }
    }
}
