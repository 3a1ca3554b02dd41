// /////////////////////////////////////////////////////////////////////////////
// Sealog
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Token-Bucket Rate Limit Filter
//!
//! Classic token bucket: each passing event spends one token; tokens refill
//! continuously at the configured rate. Buckets may be partitioned by a
//! metadata field so independent producers get independent budgets.

use async_trait::async_trait;
use parking_lot::Mutex;
use sealog_domain::services::stage::Filter;
use sealog_domain::{LogEvent, PipelineError};
use std::collections::HashMap;
use std::time::Instant;

/// Configuration for [`RateLimitFilter`].
#[derive(Debug, Clone)]
pub struct RateLimitFilterConfig {
    /// Bucket capacity in tokens.
    pub capacity: u32,
    /// Token refill rate per second.
    pub refill_rate_per_sec: f64,
    /// Metadata field used to partition buckets; `None` = one global bucket.
    pub key_field: Option<String>,
}

impl Default for RateLimitFilterConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_rate_per_sec: 5.0,
            key_field: None,
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter.
pub struct RateLimitFilter {
    capacity: f64,
    refill_rate: f64,
    key_field: Option<String>,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimitFilter {
    /// Creates a rate limiter; capacity is at least one token.
    pub fn new(config: RateLimitFilterConfig) -> Self {
        Self {
            capacity: config.capacity.max(1) as f64,
            refill_rate: config.refill_rate_per_sec.max(0.0),
            key_field: config.key_field,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_key(&self, event: &LogEvent) -> String {
        match &self.key_field {
            None => "global".to_string(),
            Some(field) => event
                .metadata
                .get(field)
                .map(|value| match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| "global".to_string()),
        }
    }
}

#[async_trait]
impl Filter for RateLimitFilter {
    fn name(&self) -> &str {
        "rate_limit"
    }

    async fn filter(&self, event: LogEvent) -> Result<Option<LogEvent>, PipelineError> {
        let key = self.resolve_key(&event);
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            return Ok(None);
        }
        bucket.tokens -= 1.0;
        Ok(Some(event))
    }
}
