use redis::aio::ConnectionManager;

use crate::metrics::{track_cache_operation, RATE_LIMIT_REJECTIONS_TOTAL};

/// Fixed-window counter; the window starts with the first import.
const FIXED_WINDOW_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])

    local current = redis.call('GET', key)

    if current == false then
        redis.call('SET', key, 1, 'EX', window)
        return 1
    end

    current = tonumber(current)

    if current >= limit then
        return 0
    end

    redis.call('INCR', key)
    return 1
"#;

/// Per-shop limit on spreadsheet imports, shared by all API instances through Redis.
#[derive(Clone)]
pub struct ImportRateLimiter {
    redis: Option<ConnectionManager>,
    limit: u32,
    window_seconds: u64,
}

impl ImportRateLimiter {
    pub fn new(redis: Option<ConnectionManager>, limit: u32, window_seconds: u64) -> Self {
        Self {
            redis,
            limit,
            window_seconds,
        }
    }

    /// Records one import attempt. `Ok(false)` means the shop is over its limit.
    ///
    /// Without Redis, or with `RATE_LIMIT_DISABLED=1`, every import is allowed.
    pub async fn try_acquire(&self, shop_id: &str) -> anyhow::Result<bool> {
        let Some(redis) = &self.redis else {
            return Ok(true);
        };
        if std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1" {
            tracing::debug!("Import rate limiting disabled via RATE_LIMIT_DISABLED=1");
            return Ok(true);
        }

        let mut conn = redis.clone();
        let key = rate_limit_key(shop_id);
        let allowed: u32 = track_cache_operation("import_rate_limit", async {
            redis::Script::new(FIXED_WINDOW_SCRIPT)
                .key(&key)
                .arg(self.limit)
                .arg(self.window_seconds)
                .invoke_async(&mut conn)
                .await
                .map_err(anyhow::Error::from)
        })
        .await?;

        if allowed != 1 {
            RATE_LIMIT_REJECTIONS_TOTAL
                .with_label_values(&["import"])
                .inc();
            tracing::warn!(shop_id = %shop_id, limit = self.limit, "Import rate limit exceeded");
        }
        Ok(allowed == 1)
    }
}

fn rate_limit_key(shop_id: &str) -> String {
    format!("ratelimit:import:{}", shop_id)
}
