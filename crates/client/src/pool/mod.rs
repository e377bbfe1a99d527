//! Bounded connection pool, one per upstream target.
//!
//! The pool couples two pieces of shared state behind one structure so they
//! can never drift apart: a counting admission gate (a semaphore of the pool
//! size) and a LIFO stack of idle sockets. Every checked-out socket holds an
//! owned permit; the permit travels with the socket and is refunded exactly
//! once, when the socket is released or dropped. An abandoned socket can
//! therefore never leak admission capacity.
//!
//! The idle store is LIFO on purpose: the most recently used socket is the
//! most likely to still be warm on the remote side and the least likely to
//! have been reaped by an idle timeout.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use crate::protocol::ClientError;
use crate::transport::{Connector, Transport};

/// A socket checked out of a [`ConnectionPool`].
///
/// Holds the admission permit for its slot. Dropping the socket closes the
/// underlying stream and refunds the slot; returning it to the pool goes
/// through [`ConnectionPool::release`].
#[derive(Debug)]
pub struct PooledSocket {
    transport: Transport,
    permit: OwnedSemaphorePermit,
    reused: bool,
}

impl PooledSocket {
    /// The underlying stream.
    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// Whether this socket came from the idle store rather than a fresh
    /// connect. Stale-connection retries only make sense for reused sockets.
    pub fn was_reused(&self) -> bool {
        self.reused
    }
}

/// A bounded pool of reusable sockets for one (host, port, scheme) target.
#[derive(Debug)]
pub struct ConnectionPool {
    connector: Connector,
    size: usize,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<Transport>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(connector: Connector, size: usize) -> Self {
        Self {
            connector,
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            idle: Mutex::new(Vec::with_capacity(size)),
            closed: AtomicBool::new(false),
        }
    }

    /// Maximum number of concurrently checked-out sockets.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of sockets currently sitting idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    /// Checks a socket out of the pool, suspending while all slots are taken.
    ///
    /// Pops the most recently released idle socket when one exists, else
    /// creates a fresh connection through the connector. On connect failure
    /// the admission slot is refunded before the error propagates.
    pub async fn acquire(&self) -> Result<PooledSocket, ClientError> {
        let permit =
            self.semaphore.clone().acquire_owned().await.map_err(|_| ClientError::PoolClosed)?;

        if self.closed.load(Ordering::Acquire) {
            // permit drops here, refunding the slot
            return Err(ClientError::PoolClosed);
        }

        if let Some(transport) = self.idle.lock().unwrap().pop() {
            trace!("reusing idle socket");
            return Ok(PooledSocket { transport, permit, reused: true });
        }

        let transport = self.connector.connect().await?;
        Ok(PooledSocket { transport, permit, reused: false })
    }

    /// Returns a socket to the pool or closes it.
    ///
    /// A reusable socket goes back onto the idle stack for the next acquire;
    /// a non-reusable one is closed by drop (close errors are irrelevant).
    /// Either way exactly one admission slot is refunded when the carried
    /// permit drops.
    pub fn release(&self, socket: PooledSocket, reusable: bool) {
        let PooledSocket { transport, permit, .. } = socket;

        if reusable {
            // the closed check happens under the idle lock, so a release
            // racing close cannot slip a socket past the drain
            let mut idle = self.idle.lock().unwrap();
            if self.closed.load(Ordering::Acquire) {
                drop(idle);
                trace!("socket discarded");
                drop(transport);
            } else {
                trace!("socket returned to idle store");
                idle.push(transport);
            }
        } else {
            trace!("socket discarded");
            drop(transport);
        }

        drop(permit);
    }

    /// Closes the pool: idle sockets are dropped, waiting and future
    /// acquires fail with `PoolClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();

        let drained = {
            let mut idle = self.idle.lock().unwrap();
            std::mem::take(&mut *idle)
        };
        debug!(count = drained.len(), "pool closed, dropping idle sockets");
        drop(drained);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn local_server() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn pool_for(port: u16, size: usize) -> Arc<ConnectionPool> {
        let connector =
            Connector::new("127.0.0.1".to_string(), port, Duration::from_secs(5), false, None);
        Arc::new(ConnectionPool::new(connector, size))
    }

    async fn keep_accepting(listener: TcpListener) {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            // park accepted connections so they stay open
            tokio::spawn(async move {
                let _stream = stream;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    }

    #[tokio::test]
    async fn acquire_connects_on_empty_pool() {
        let (listener, port) = local_server().await;
        tokio::spawn(keep_accepting(listener));

        let pool = pool_for(port, 2);
        let socket = pool.acquire().await.unwrap();
        assert!(!socket.was_reused());
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn release_and_reuse() {
        let (listener, port) = local_server().await;
        tokio::spawn(keep_accepting(listener));

        let pool = pool_for(port, 2);
        let socket = pool.acquire().await.unwrap();
        pool.release(socket, true);
        assert_eq!(pool.idle_count(), 1);

        let socket = pool.acquire().await.unwrap();
        assert!(socket.was_reused());
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn lifo_reuse_order() {
        let (listener, port) = local_server().await;
        tokio::spawn(keep_accepting(listener));

        let pool = pool_for(port, 2);
        let mut first = pool.acquire().await.unwrap();
        let mut second = pool.acquire().await.unwrap();

        let first_addr = first.transport_mut().local_addr().unwrap();
        let second_addr = second.transport_mut().local_addr().unwrap();
        assert_ne!(first_addr, second_addr);

        pool.release(first, true);
        pool.release(second, true);

        // most recently released comes back first
        let mut socket = pool.acquire().await.unwrap();
        assert_eq!(socket.transport_mut().local_addr().unwrap(), second_addr);
    }

    #[tokio::test]
    async fn non_reusable_release_discards() {
        let (listener, port) = local_server().await;
        tokio::spawn(keep_accepting(listener));

        let pool = pool_for(port, 1);
        let socket = pool.acquire().await.unwrap();
        pool.release(socket, false);
        assert_eq!(pool.idle_count(), 0);

        // slot was refunded: the next acquire succeeds with a fresh connect
        let socket = pool.acquire().await.unwrap();
        assert!(!socket.was_reused());
    }

    #[tokio::test]
    async fn admission_gate_bounds_checkouts() {
        let (listener, port) = local_server().await;
        tokio::spawn(keep_accepting(listener));

        const POOL_SIZE: usize = 3;
        const TASKS: usize = 12;

        let pool = pool_for(port, POOL_SIZE);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let pool = pool.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let socket = pool.acquire().await.unwrap();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                pool.release(socket, true);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= POOL_SIZE);
        assert!(pool.idle_count() <= POOL_SIZE);
    }

    #[tokio::test]
    async fn acquire_suspends_until_release() {
        let (listener, port) = local_server().await;
        tokio::spawn(keep_accepting(listener));

        let pool = pool_for(port, 1);
        let socket = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        pool.release(socket, true);
        let reacquired = waiter.await.unwrap();
        assert!(reacquired.was_reused());
    }

    #[tokio::test]
    async fn connect_failure_refunds_slot() {
        // a port with nothing listening
        let (listener, port) = local_server().await;
        drop(listener);

        let pool = pool_for(port, 1);
        assert!(pool.acquire().await.is_err());
        // the slot came back: the next failure is again a connect error,
        // not a deadlock on the admission gate
        assert!(matches!(pool.acquire().await, Err(ClientError::Connect { .. })));
    }

    #[tokio::test]
    async fn closed_pool_rejects_acquire() {
        let (listener, port) = local_server().await;
        tokio::spawn(keep_accepting(listener));

        let pool = pool_for(port, 1);
        let socket = pool.acquire().await.unwrap();
        pool.release(socket, true);
        assert_eq!(pool.idle_count(), 1);

        pool.close();
        assert_eq!(pool.idle_count(), 0);
        assert!(matches!(pool.acquire().await, Err(ClientError::PoolClosed)));
    }

    #[tokio::test]
    async fn release_after_close_discards() {
        let (listener, port) = local_server().await;
        tokio::spawn(keep_accepting(listener));

        let pool = pool_for(port, 1);
        let socket = pool.acquire().await.unwrap();
        pool.close();

        pool.release(socket, true);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn dropped_socket_refunds_slot() {
        let (listener, port) = local_server().await;
        tokio::spawn(keep_accepting(listener));

        let pool = pool_for(port, 1);
        let socket = pool.acquire().await.unwrap();
        drop(socket);

        // no release call happened, yet the slot is available again
        let socket = pool.acquire().await.unwrap();
        assert!(!socket.was_reused());
    }
}
