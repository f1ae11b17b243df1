//! The data-store seam.
//!
//! Runners only see [`ConnectionProvider`] and [`Connection`]; the concrete
//! store ([`crate::sqlite::SqliteProvider`]) and test doubles plug in here.

use qbench_core::StoreIdentity;

use crate::error::StoreResult;

/// An established connection that can run one statement at a time.
pub trait Connection {
    /// Run `text` to completion, consuming every row and column.
    ///
    /// Returns the number of rows produced (or changed, for statements that
    /// produce none).
    fn execute(&mut self, text: &str) -> StoreResult<u64>;
}

/// Hands out connections. Shared across worker threads behind an `Arc`.
pub trait ConnectionProvider: Send + Sync + 'static {
    type Conn: Connection + Send;

    fn acquire(&self) -> StoreResult<Self::Conn>;

    /// Return a connection. The default closes it.
    fn release(&self, conn: Self::Conn) {
        drop(conn);
    }

    /// Identity recorded in report metadata.
    fn identity(&self) -> StoreIdentity;
}

/// A connection on loan from a provider, released on every exit path.
pub struct ConnectionLease<'a, P: ConnectionProvider + ?Sized> {
    provider: &'a P,
    conn: Option<P::Conn>,
}

impl<'a, P: ConnectionProvider + ?Sized> ConnectionLease<'a, P> {
    pub fn acquire(provider: &'a P) -> StoreResult<Self> {
        let conn = provider.acquire()?;
        Ok(Self {
            provider,
            conn: Some(conn),
        })
    }

    /// The leased connection.
    pub fn conn(&mut self) -> &mut P::Conn {
        self.conn
            .as_mut()
            .unwrap_or_else(|| unreachable!("lease holds its connection until drop"))
    }
}

impl<P: ConnectionProvider + ?Sized> Drop for ConnectionLease<'_, P> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.provider.release(conn);
        }
    }
}
