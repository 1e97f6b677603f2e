use crate::library::BoxedError;
use redis::aio::{Connection, MultiplexedConnection};
use redis::Client;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Connection source for the redis based queueing implementations
///
/// Dedicated connections are handed out for blocking commands (`XREADGROUP` with a
/// block timeout occupies the connection) while a lazily created, shared multiplexed
/// connection serves short-lived commands like `XADD` and `XACK`.
#[derive(Clone)]
pub struct RedisFactory {
    client: Client,
    shared: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl RedisFactory {
    /// Creates a new factory opening connections to the given URL
    pub fn new(url: &str) -> Result<Self, BoxedError> {
        let client = Client::open(url)?;

        Ok(Self {
            client,
            shared: Arc::new(Mutex::new(None)),
        })
    }

    /// Opens a dedicated connection, suitable for blocking commands
    pub async fn owned_connection(&self) -> Result<Connection, BoxedError> {
        Ok(self.client.get_tokio_connection().await?)
    }

    /// Returns a handle to the shared multiplexed connection, creating it on first use
    pub async fn shared_connection(&self) -> Result<MultiplexedConnection, BoxedError> {
        let mut guard = self.shared.lock().await;

        match guard.as_ref() {
            Some(con) => Ok(con.clone()),
            None => {
                let con = self.client.get_multiplexed_tokio_connection().await?;
                *guard = Some(con.clone());
                Ok(con)
            }
        }
    }

    /// Drops the cached multiplexed connection so the next caller establishes a fresh one
    ///
    /// Called by users after a command on the shared connection failed.
    pub async fn invalidate_shared(&self) {
        *self.shared.lock().await = None;
    }
}
