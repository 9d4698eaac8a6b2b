use redis::Client;
use redis::aio::ConnectionManager;

/// Connect to the queue's Redis instance and verify it answers.
///
/// The returned manager reconnects on its own after transient connection loss,
/// so a single instance is cloned into every queue handle.
pub async fn connect_queue_redis(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)
        .map_err(|e| anyhow::anyhow!("REDIS_URL is not a valid Redis URL: {}", e))?;
    let mut manager = ConnectionManager::new(client).await?;

    let pong: String = redis::cmd("PING").query_async(&mut manager).await?;
    tracing::info!(reply = %pong, "Connected to Redis queue backend");

    Ok(manager)
}
