// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Redis-backed request logs, shared by every instance pointing at the same
//! server.
//!
//! Each key is a sorted set of admitted requests scored by timestamp. One Lua
//! script prunes, counts, records and reads the oldest entry, so concurrent
//! checks from any number of instances see a consistent log.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use ring::rand::{SecureRandom, SystemRandom};

use super::{RateLimitDecision, RateLimitStore, RateLimitStoreError};

const SLIDING_LOG_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
local allowed = 0
if count < limit then
  redis.call('ZADD', key, now, ARGV[4])
  count = count + 1
  allowed = 1
end
redis.call('PEXPIRE', key, window)

local reset = now + window
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
  reset = tonumber(oldest[2]) + window
end
return {allowed, count, reset}
"#;

/// `(allowed, count, reset_ms)` as returned by the script.
type ScriptReply = (u8, u32, u64);

pub struct RedisRateLimitStore {
    conn: ConnectionManager,
    script: Script,
    rng: SystemRandom,
}

impl RedisRateLimitStore {
    /// Connect to `url` (e.g. `redis://cache:6379/0`). The connection manager
    /// reconnects on its own after the first successful connect.
    pub async fn connect(url: &str) -> Result<Self, RateLimitStoreError> {
        let client = Client::open(url).map_err(|e| RateLimitStoreError(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| RateLimitStoreError(e.to_string()))?;
        Ok(Self {
            conn,
            script: Script::new(SLIDING_LOG_SCRIPT),
            rng: SystemRandom::new(),
        })
    }

    /// Sorted-set member for one request. Unique across instances so two
    /// requests in the same millisecond are both recorded.
    fn member(&self, now_ms: u64) -> Result<String, RateLimitStoreError> {
        let mut nonce = [0u8; 8];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| RateLimitStoreError("random source unavailable".to_string()))?;
        Ok(format!("{now_ms}-{}", hex_encode(&nonce)))
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window_ms: u64,
        now_ms: u64,
    ) -> Result<RateLimitDecision, RateLimitStoreError> {
        let member = self.member(now_ms)?;
        let mut conn = self.conn.clone();
        let reply: ScriptReply = self
            .script
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitStoreError(e.to_string()))?;
        Ok(decision_from_reply(limit, reply))
    }
}

fn decision_from_reply(limit: u32, (allowed, count, reset_ms): ScriptReply) -> RateLimitDecision {
    RateLimitDecision {
        allowed: allowed == 1,
        limit,
        remaining: limit.saturating_sub(count),
        reset_ms,
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admitted_reply_counts_down_remaining() {
        let d = decision_from_reply(3, (1, 2, 1_700_000_060_000));
        assert!(d.allowed);
        assert_eq!(d.remaining, 1);
        assert_eq!(d.reset_ms, 1_700_000_060_000);
    }

    #[test]
    fn rejected_reply_has_nothing_remaining() {
        let d = decision_from_reply(3, (0, 3, 1_700_000_060_000));
        assert!(!d.allowed);
        assert_eq!(d.limit, 3);
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test]
    async fn invalid_url_is_a_store_error() {
        let result = RedisRateLimitStore::connect("not a redis url").await;
        assert!(result.is_err());
    }

    #[test]
    fn hex_encode_is_lowercase_and_padded() {
        assert_eq!(hex_encode(&[0x00, 0x0f, 0xab]), "000fab");
    }
}
