use moka::future::Cache;
use once_cell::sync::Lazy;
use std::time::Duration;

/// jti => revoked, for access tokens logged out before their `exp`.
pub static REVOKED_TOKENS: Lazy<Cache<String, bool>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(86400)) // 24h TTL
        .build()
});

pub async fn revoke(jti: &str) {
    REVOKED_TOKENS.insert(jti.to_string(), true).await;
}

pub async fn is_revoked(jti: &str) -> bool {
    REVOKED_TOKENS.get(jti).await.unwrap_or(false)
}
