//! Hand-off to the identifier minting task.
//!
//! Minting itself happens elsewhere. The batch manager only announces,
//! after its commit, which publications still need an identifier.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Receiver of mint requests. Implementations must be idempotent per
/// publication; callers log failures and carry on.
#[async_trait]
pub trait MintQueue: Send + Sync {
    async fn request_mint(&self, publication_id: &str) -> Result<()>;
}

/// Writes one pending row per publication to the `mint_requests` table.
pub struct OutboxMintQueue {
    pool: SqlitePool,
}

impl OutboxMintQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MintQueue for OutboxMintQueue {
    async fn request_mint(&self, publication_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO mint_requests (publication_id, requested_at, status) VALUES (?, ?, 'pending')",
        )
        .bind(publication_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Number of outbox rows still waiting for the minting task.
pub async fn pending_count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM mint_requests WHERE status = 'pending'")
            .fetch_one(pool)
            .await?;
    Ok(count)
}
