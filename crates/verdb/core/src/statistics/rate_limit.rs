// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Rate limiting for background statistics work

use super::cancel::CancellationToken;
use super::config::RateLimitConfig;
use super::lib::{StatsError, StatsResult};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

/// Token bucket for rate limiting
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self { tokens: max_tokens, last_refill: Instant::now(), max_tokens, refill_rate }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available
    fn try_consume(&mut self) -> Result<(), Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        if self.refill_rate <= 0.0 {
            return Err(Duration::from_millis(100));
        }
        Err(Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate))
    }
}

/// Admits units of background work at a bounded rate
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { bucket: Mutex::new(TokenBucket::new(config.burst.max(1) as f64, config.ops_per_second)) }
    }

    /// Wait for admission, then run `f`
    ///
    /// Waiting observes `cancel`; a cancelled wait returns
    /// [`StatsError::Cancelled`] without running `f`.
    pub async fn execute<T, F>(&self, cancel: &CancellationToken, f: F) -> StatsResult<T>
    where
        F: FnOnce() -> StatsResult<T>,
    {
        loop {
            if cancel.is_cancelled() {
                return Err(StatsError::Cancelled);
            }
            let wait = match self.bucket.lock().try_consume() {
                Ok(()) => break,
                Err(wait) => wait,
            };
            trace!(wait_ms = wait.as_millis() as u64, "rate limited");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Err(StatsError::Cancelled),
            }
        }
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_throttle() {
        let limiter = RateLimiter::new(RateLimitConfig { ops_per_second: 50.0, burst: 3 });
        let cancel = CancellationToken::new();
        let start = Instant::now();
        for _ in 0..5 {
            limiter.execute(&cancel, || Ok(())).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_cancel_aborts_wait() {
        let limiter = RateLimiter::new(RateLimitConfig { ops_per_second: 0.0, burst: 1 });
        let cancel = CancellationToken::new();
        limiter.execute(&cancel, || Ok(())).await.unwrap();
        let waiter = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waiter.cancel(None);
        });
        let mut ran = false;
        let result = limiter.execute(&cancel, || {
            ran = true;
            Ok(())
        });
        assert!(matches!(result.await, Err(StatsError::Cancelled)));
        assert!(!ran);
    }
}
