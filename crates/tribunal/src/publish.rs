//! Event publishing.
//!
//! Solution progress events go out on per-contest subjects
//! (`contest-{id}-solutions`); the transport only needs fire-and-forget
//! `publish`. The Redis implementation uses pub/sub channels.

use async_trait::async_trait;

use crate::error::Error;

/// Fire-and-forget publisher for UI fan-out.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), Error>;
}

/// Publishes events onto Redis pub/sub channels.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisPublisher {
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::wrap("publish.connect", "invalid redis url", e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::wrap("publish.connect", "failed to connect to redis", e))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::AsyncCommands::publish(&mut conn, subject, payload)
            .await
            .map_err(|e| Error::wrap("publish.publish", "failed to publish event", e))?;
        Ok(())
    }
}

/// Drops every event; used by tests and local judging.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

#[async_trait]
impl Publisher for NullPublisher {
    async fn publish(&self, _subject: &str, _payload: &[u8]) -> Result<(), Error> {
        Ok(())
    }
}
