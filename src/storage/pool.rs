//! Fixed-size SQLite connection pool
//!
//! Connections live in a flume channel. Checking one out is an async receive;
//! the statement itself runs on the blocking thread pool, and the blocking
//! task puts the connection back into the channel when it finishes, so a
//! caller that stops waiting cannot leak it.

use crate::storage::schema::{initialize_schema, CONNECTION_PRAGMAS};
use crate::storage::{StorageError, StorageResult};
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pool of pre-configured connections to one database file
pub struct ConnectionPool {
    size: usize,
    sender: Mutex<Option<flume::Sender<Connection>>>,
    receiver: flume::Receiver<Connection>,
    closed: Arc<AtomicBool>,
}

impl ConnectionPool {
    /// Opens `size` connections to `path`, creating the schema if needed
    ///
    /// Every connection gets WAL journaling, `synchronous = NORMAL`, a 64 MB
    /// page cache and a busy timeout of `busy_timeout`.
    pub fn open(path: &Path, size: usize, busy_timeout: Duration) -> StorageResult<Self> {
        let size = size.max(1);
        let (sender, receiver) = flume::bounded(size);

        for i in 0..size {
            let conn = Connection::open(path)?;
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch(CONNECTION_PRAGMAS)?;
            if i == 0 {
                initialize_schema(&conn)?;
            }
            sender
                .try_send(conn)
                .map_err(|_| StorageError::PoolClosed)?;
        }

        tracing::debug!(path = %path.display(), size, "Opened connection pool");

        Ok(Self {
            size,
            sender: Mutex::new(Some(sender)),
            receiver,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections currently checked in
    pub fn idle(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Runs `f` with a checked-out connection
    ///
    /// Waits asynchronously for a free connection and runs `f` on the
    /// blocking pool. The connection is checked back in by the blocking task,
    /// even when the returned future is dropped before `f` completes.
    pub async fn with_conn<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(StorageError::PoolClosed);
        }

        let mut conn = self
            .receiver
            .recv_async()
            .await
            .map_err(|_| StorageError::PoolClosed)?;

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        let closed = Arc::clone(&self.closed);

        tokio::task::spawn_blocking(move || {
            let result = f(&mut conn);
            check_in(sender, &closed, conn);
            result
        })
        .await?
    }

    /// Closes every pooled connection
    ///
    /// Idle connections are closed immediately; connections checked out at
    /// this point are closed when they are returned. Calling `close` again is
    /// a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        drop(sender);

        let mut count = 0;
        while let Ok(conn) = self.receiver.try_recv() {
            close_connection(conn);
            count += 1;
        }

        tracing::debug!(closed = count, "Connection pool closed");
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close();
    }
}

/// Returns a connection to the pool, or closes it once the pool is closed
fn check_in(sender: Option<flume::Sender<Connection>>, closed: &AtomicBool, conn: Connection) {
    match sender {
        Some(sender) if !closed.load(Ordering::SeqCst) => {
            if let Err(err) = sender.try_send(conn) {
                close_connection(err.into_inner());
            }
        }
        _ => close_connection(conn),
    }
}

fn close_connection(conn: Connection) {
    if let Err((_, e)) = conn.close() {
        tracing::warn!("Failed to close database connection: {}", e);
    }
}
